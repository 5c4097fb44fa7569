//! Configuration and data types for the calibration engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CalError, CalResult};

/// How the PPS trigger source reports edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDiscipline {
    /// True edge-interrupt hardware: one trigger per qualifying (rising) edge
    TrueEdge,
    /// Change-only interrupt hardware: triggers fire on both transitions of
    /// the signal. An internal toggle counts every other transition, starting
    /// with the first, as a qualifying edge.
    PinChange,
}

/// What to do when a non-discarded iteration measures exactly zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLossPolicy {
    /// Abort the remaining iterations, preserving the last committed factor
    Abort,
    /// Log a warning, leave the factor untouched, and continue the cycle
    /// (tolerates transient glitches at the cost of hiding a dead reference)
    Ignore,
}

/// Phase of the calibration controller, observable for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalPhase {
    Idle,
    Armed,
    WaitingForWindow,
    Measured,
    Adjusting,
    Faulted,
    Done,
    Cleanup,
}

/// Frozen counter state taken when the sampling window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSnapshot {
    /// Raw hardware count at freeze
    pub raw_count: u32,
    /// Overflow tally at freeze (one per counter wraparound)
    pub overflow_count: u32,
    /// Qualifying edges seen since arm
    pub edges: u8,
}

impl WindowSnapshot {
    /// Total reference pulses counted during the window for a counter of the
    /// given bit width
    pub fn total_count(&self, width_bits: u8) -> u64 {
        self.raw_count as u64 + (1u64 << width_bits) * self.overflow_count as u64
    }
}

/// One non-discarded iteration of the correction loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationRecord {
    /// Iteration index (never 0; the first window is a discarded transient)
    pub iteration: u32,
    /// Measured frequency in hundredths of Hz
    pub measured_centi_hz: u64,
    /// Correction factor before this iteration's adjustment
    pub previous_factor: i32,
    /// Correction factor after this iteration's adjustment
    pub new_factor: i32,
}

/// Outcome of a completed calibration cycle
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    /// Committed correction factor, consumed by normal operation
    pub committed: i32,
    /// Number of measurement windows processed, including the discarded
    /// iteration 0
    pub iterations_completed: u32,
    /// Per-iteration records for the logging collaborator
    pub records: Vec<CalibrationRecord>,
}

/// Configuration for a calibration cycle
///
/// Defaults match the Si5351/ATmega328p firmware this engine was built for:
/// a 3.2 MHz calibration output (8 MHz processor clock over a 2.5 safety
/// margin) counted for 10 seconds per window, 24 windows per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Target frequency of the calibration output, in hundredths of Hz
    pub target_freq_centi_hz: u64,
    /// Synthesizer channel carrying the calibration output
    pub cal_channel: u8,
    /// Synthesizer channel used during normal (parked) operation
    pub park_channel: u8,
    /// Park channel frequency in Hz
    pub park_freq_hz: u64,
    /// Correction factor to start the cycle from
    pub initial_correction: i32,
    /// Huff-n-Puff step applied per iteration
    pub step: i32,
    /// Number of sampling windows per cycle (window 0 is discarded)
    pub iterations: u32,
    /// Window length in PPS pulses; N pulses yield N-1 measured seconds
    pub window_pulses: u8,
    /// Edge-detection capability of the PPS trigger source
    pub edge_discipline: EdgeDiscipline,
    /// Bit width of the hardware pulse counter
    pub counter_width_bits: u8,
    /// Host processor clock in Hz, bounding the countable frequency
    pub processor_clock_hz: u64,
    /// Safety-margin divisor: each counted pulse must outlast one processor
    /// cycle, so the reference is kept at or below clock / margin
    pub safety_margin: f64,
    /// Settling delay between a correction push and the next arm
    pub stabilization: Duration,
    /// Bound on the wait for a window to complete
    pub window_timeout: Duration,
    /// Zero-measurement handling
    pub signal_loss_policy: SignalLossPolicy,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_freq_centi_hz: 320_000_000, // 3.2 MHz
            cal_channel: 2,
            park_channel: 1,
            park_freq_hz: 150_000_000,
            initial_correction: 0,
            step: 50,
            iterations: 24,
            window_pulses: 11, // 10 seconds of counting
            edge_discipline: EdgeDiscipline::TrueEdge,
            counter_width_bits: 16,
            processor_clock_hz: 8_000_000,
            safety_margin: 2.5,
            stabilization: Duration::from_millis(10),
            window_timeout: Duration::from_secs(15),
            signal_loss_policy: SignalLossPolicy::Abort,
        }
    }
}

impl CalibrationConfig {
    /// Full PPS periods measured per window
    pub fn window_periods(&self) -> u64 {
        self.window_pulses.saturating_sub(1) as u64
    }

    /// Highest reference frequency the counter can reliably capture,
    /// in hundredths of Hz
    pub fn max_calibration_freq_centi_hz(&self) -> u64 {
        (self.processor_clock_hz as f64 / self.safety_margin * 100.0) as u64
    }

    /// Convert a frozen window snapshot into a frequency in hundredths of Hz
    pub fn measured_centi_hz(&self, snapshot: &WindowSnapshot) -> u64 {
        snapshot.total_count(self.counter_width_bits) * 100 / self.window_periods()
    }

    /// Check the configuration for values the hardware cannot honor
    pub fn validate(&self) -> CalResult<()> {
        if self.window_pulses < 2 {
            return Err(CalError::Config(format!(
                "window_pulses must be at least 2, got {}",
                self.window_pulses
            )));
        }
        if self.iterations == 0 {
            return Err(CalError::Config("iterations must be non-zero".to_string()));
        }
        if self.step == 0 {
            return Err(CalError::Config("step must be non-zero".to_string()));
        }
        if self.counter_width_bits == 0 || self.counter_width_bits > 32 {
            return Err(CalError::Config(format!(
                "counter_width_bits must be 1..=32, got {}",
                self.counter_width_bits
            )));
        }
        if !(self.safety_margin > 1.0) {
            return Err(CalError::Config(format!(
                "safety_margin must exceed 1.0, got {}",
                self.safety_margin
            )));
        }
        if self.cal_channel == self.park_channel {
            return Err(CalError::Config(format!(
                "calibration and park channels must differ, both are {}",
                self.cal_channel
            )));
        }
        let bound = self.max_calibration_freq_centi_hz();
        if self.target_freq_centi_hz > bound {
            return Err(CalError::Config(format!(
                "target {} exceeds countable bound {} (clock {} Hz / margin {})",
                self.target_freq_centi_hz, bound, self.processor_clock_hz, self.safety_margin
            )));
        }
        Ok(())
    }
}
