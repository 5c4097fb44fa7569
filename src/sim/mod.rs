//! Simulated backend for development and testing
//!
//! This module provides software stand-ins for the two hardware
//! collaborators, allowing development and testing without a GPS module or
//! synthesizer attached:
//!
//! - [`SimSynthesizer`]: records every driver call and tracks correction,
//!   per-channel frequency, and output-enable state for assertions.
//! - [`SimPpsSource`]: a worker thread that plays the roles of both the GPS
//!   PPS interrupt and the reference clock, delivering a configured number
//!   of reference pulses per window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::CalResult;
use crate::gate::PpsGate;
use crate::traits::FrequencySynthesizer;
use crate::types::EdgeDiscipline;

/// One recorded synthesizer driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthCall {
    SetFrequency { channel: u8, centi_hz: u64 },
    EnableOutput { channel: u8, on: bool },
    SetCorrection { factor: i32 },
}

/// Simulated synthesizer driver
///
/// Behaves like a register file: the latest value per concern wins, and the
/// full call history stays available for inspection.
#[derive(Debug, Default)]
pub struct SimSynthesizer {
    correction: i32,
    frequencies: HashMap<u8, u64>,
    enabled: HashMap<u8, bool>,
    calls: Vec<SynthCall>,
}

impl SimSynthesizer {
    /// Create a simulated synthesizer with all outputs off
    pub fn new() -> Self {
        Self::default()
    }

    /// Last correction factor pushed
    pub fn correction(&self) -> i32 {
        self.correction
    }

    /// Last frequency set on a channel, in hundredths of Hz
    pub fn frequency(&self, channel: u8) -> Option<u64> {
        self.frequencies.get(&channel).copied()
    }

    /// Whether a channel's output is currently enabled
    pub fn is_enabled(&self, channel: u8) -> bool {
        self.enabled.get(&channel).copied().unwrap_or(false)
    }

    /// Full call history, in order
    pub fn calls(&self) -> &[SynthCall] {
        &self.calls
    }

    /// Correction factors pushed, in order
    pub fn corrections_pushed(&self) -> Vec<i32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SynthCall::SetCorrection { factor } => Some(*factor),
                _ => None,
            })
            .collect()
    }
}

impl FrequencySynthesizer for SimSynthesizer {
    fn set_frequency(&mut self, channel: u8, centi_hz: u64) -> CalResult<()> {
        self.frequencies.insert(channel, centi_hz);
        // Tuning a channel also brings its output up, like the bare-metal
        // Si5351 drivers this stands in for
        self.enabled.insert(channel, true);
        self.calls.push(SynthCall::SetFrequency { channel, centi_hz });
        Ok(())
    }

    fn enable_output(&mut self, channel: u8, on: bool) -> CalResult<()> {
        self.enabled.insert(channel, on);
        self.calls.push(SynthCall::EnableOutput { channel, on });
        Ok(())
    }

    fn set_correction(&mut self, factor: i32) -> CalResult<()> {
        self.correction = factor;
        self.calls.push(SynthCall::SetCorrection { factor });
        Ok(())
    }
}

/// Simulated GPS PPS source plus reference clock
///
/// For each entry in the schedule the worker waits for the gate to arm,
/// then delivers one window: the opening PPS edge, the scheduled number of
/// reference pulses, and the remaining edges to close the window. In
/// `PinChange` mode each logical pulse is delivered as two physical
/// transitions (rising then falling). When the schedule runs out the source
/// goes quiet, which is exactly a dead PPS feed.
pub struct SimPpsSource {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimPpsSource {
    /// Spawn a source delivering `schedule[i]` reference pulses in window `i`
    pub fn spawn(gate: Arc<PpsGate>, schedule: Vec<u64>) -> Self {
        Self::with_arm_slop(gate, schedule, 0)
    }

    /// Like [`spawn`](SimPpsSource::spawn), additionally delivering
    /// `arm_slop` stray reference pulses between arm and the opening edge,
    /// to exercise the gate's edge-1 re-zero
    pub fn with_arm_slop(gate: Arc<PpsGate>, schedule: Vec<u64>, arm_slop: u64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = std::thread::spawn(move || run_source(gate, schedule, arm_slop, stop2));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the worker and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimPpsSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_source(gate: Arc<PpsGate>, schedule: Vec<u64>, arm_slop: u64, stop: Arc<AtomicBool>) {
    for window_pulses in schedule {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            if gate.wait_armed(Duration::from_millis(20)) {
                break;
            }
        }
        if arm_slop > 0 {
            gate.clock_reference(arm_slop);
        }
        deliver_pps_pulse(&gate); // opening edge re-zeroes the counter
        gate.clock_reference(window_pulses);
        for _ in 1..gate.window_pulses() {
            deliver_pps_pulse(&gate);
        }
    }
}

fn deliver_pps_pulse(gate: &PpsGate) {
    match gate.discipline() {
        EdgeDiscipline::TrueEdge => gate.handle_trigger(),
        EdgeDiscipline::PinChange => {
            gate.handle_trigger(); // rising
            gate.handle_trigger(); // falling
        }
    }
}
