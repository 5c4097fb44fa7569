//! PPS-gated sampling window
//!
//! Converts a one-pulse-per-second trigger stream into a measurement window
//! spanning a fixed number of qualifying edges. The first edge after arming
//! re-zeroes the reference counter, so interrupt latency on the arm call
//! never pollutes the count; the final edge freezes the counter and signals
//! completion.
//!
//! All window state, the counter included, lives under one mutex. Trigger
//! and reference-clock delivery stand in for the interrupt handlers of the
//! original hardware; the lock is the critical section that makes the
//! (raw, overflow) pair tear-free for the controller.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::counter::ReferenceCounter;
use crate::error::{CalError, CalResult};
use crate::types::{EdgeDiscipline, WindowSnapshot};

struct GateState {
    counter: ReferenceCounter,
    edges: u8,
    armed: bool,
    /// Pin-change phase: flipped on every physical trigger, counted when high
    toggle_high: bool,
    /// Set when the window closes; doubles as the completion flag
    frozen: Option<WindowSnapshot>,
}

/// Arm/measure/close window over a PPS edge stream
pub struct PpsGate {
    window_pulses: u8,
    discipline: EdgeDiscipline,
    state: Mutex<GateState>,
    cond: Condvar,
}

impl PpsGate {
    /// Create a disarmed gate
    ///
    /// `window_pulses` qualifying edges close the window, measuring
    /// `window_pulses - 1` full PPS periods.
    pub fn new(
        window_pulses: u8,
        discipline: EdgeDiscipline,
        counter_width_bits: u8,
    ) -> CalResult<Self> {
        if window_pulses < 2 {
            return Err(CalError::HardwareInit(format!(
                "gate needs at least 2 edges to span a window, got {window_pulses}"
            )));
        }
        if counter_width_bits == 0 || counter_width_bits > 32 {
            return Err(CalError::HardwareInit(format!(
                "counter width {counter_width_bits} not supported"
            )));
        }
        Ok(Self {
            window_pulses,
            discipline,
            state: Mutex::new(GateState {
                counter: ReferenceCounter::new(counter_width_bits),
                edges: 0,
                armed: false,
                toggle_high: false,
                frozen: None,
            }),
            cond: Condvar::new(),
        })
    }

    /// Edges that close the window
    pub fn window_pulses(&self) -> u8 {
        self.window_pulses
    }

    /// Edge-detection capability this gate was built for
    pub fn discipline(&self) -> EdgeDiscipline {
        self.discipline
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new sampling window: zero the edge count and counter and
    /// enable the trigger source
    ///
    /// Re-arming while a window is open is a driver bug and fails rather
    /// than silently discarding the measurement in flight.
    pub fn arm(&self) -> CalResult<()> {
        let mut st = self.lock();
        if st.armed {
            return Err(CalError::HardwareInit(
                "gate re-armed while a window is open".to_string(),
            ));
        }
        st.edges = 0;
        st.toggle_high = false;
        st.frozen = None;
        st.counter.arm();
        st.armed = true;
        drop(st);
        tracing::debug!(pulses = self.window_pulses, "sampling window armed");
        self.cond.notify_all();
        Ok(())
    }

    /// Deliver one physical trigger from the PPS source
    ///
    /// In `TrueEdge` mode every trigger is a qualifying edge. In `PinChange`
    /// mode triggers arrive on both transitions and only every other one,
    /// starting with the first, qualifies. Triggers while disarmed are
    /// ignored (the masked-interrupt case).
    pub fn handle_trigger(&self) {
        let mut st = self.lock();
        if !st.armed {
            return;
        }
        if self.discipline == EdgeDiscipline::PinChange {
            st.toggle_high = !st.toggle_high;
            if !st.toggle_high {
                return;
            }
        }
        st.edges += 1;
        if st.edges == 1 {
            // Edge 1 defines the window start; re-zeroing here absorbs any
            // latency between the arm call and the first PPS pulse
            st.counter.arm();
        }
        if st.edges == self.window_pulses {
            st.counter.freeze();
            let snapshot = WindowSnapshot {
                raw_count: st.counter.raw(),
                overflow_count: st.counter.overflow(),
                edges: st.edges,
            };
            st.frozen = Some(snapshot);
            st.armed = false;
            st.toggle_high = false;
            drop(st);
            tracing::debug!(
                raw = snapshot.raw_count,
                overflow = snapshot.overflow_count,
                "sampling window closed"
            );
            self.cond.notify_all();
        }
    }

    /// Deliver reference-clock pulses to the counter
    ///
    /// Counts land only between edge 1 and the closing edge; the counter is
    /// frozen outside the window.
    pub fn clock_reference(&self, pulses: u64) {
        let mut st = self.lock();
        st.counter.count_pulses(pulses);
    }

    /// Whether the current window has closed
    pub fn is_complete(&self) -> bool {
        self.lock().frozen.is_some()
    }

    /// Whether a window is currently open
    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Frozen counter state of the last completed window, if any
    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        self.lock().frozen
    }

    /// Block until the window closes, or fail after `timeout`
    pub fn wait_complete(&self, timeout: Duration) -> CalResult<WindowSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if let Some(snapshot) = st.frozen {
                return Ok(snapshot);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CalError::SamplingTimeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            let (guard, _) = self
                .cond
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            st = guard;
        }
    }

    /// Block until a window is armed; returns false on timeout
    ///
    /// Lets a trigger source (simulated or an ISR shim thread) idle until
    /// the controller opens the next window.
    pub fn wait_armed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if st.armed {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            st = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(discipline: EdgeDiscipline) -> PpsGate {
        PpsGate::new(11, discipline, 16).unwrap()
    }

    #[test]
    fn test_window_closes_after_eleven_edges() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.arm().unwrap();
        g.handle_trigger(); // edge 1 opens the measurement
        g.clock_reference(32_000);
        for _ in 0..9 {
            g.handle_trigger();
            assert!(!g.is_complete());
        }
        g.handle_trigger(); // edge 11
        assert!(g.is_complete());
        assert!(!g.is_armed());
        let snap = g.snapshot().unwrap();
        assert_eq!(snap.raw_count, 32_000);
        assert_eq!(snap.overflow_count, 0);
        assert_eq!(snap.edges, 11);
    }

    #[test]
    fn test_pin_change_needs_two_transitions_per_edge() {
        let g = gate(EdgeDiscipline::PinChange);
        g.arm().unwrap();
        // 2 physical transitions per logical pulse: rising then falling
        g.handle_trigger();
        g.handle_trigger();
        g.clock_reference(10);
        // Edge 11 lands on the 21st transition overall
        for _ in 0..18 {
            g.handle_trigger();
            assert!(!g.is_complete());
        }
        g.handle_trigger(); // 21st transition = 11th rising edge
        assert!(g.is_complete());
        assert_eq!(g.snapshot().unwrap().raw_count, 10);
    }

    #[test]
    fn test_counts_before_first_edge_are_discarded() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.arm().unwrap();
        // Arm-latency jitter: pulses arriving before the opening PPS edge
        g.clock_reference(555);
        g.handle_trigger();
        g.clock_reference(1_000);
        for _ in 0..10 {
            g.handle_trigger();
        }
        assert_eq!(g.snapshot().unwrap().raw_count, 1_000);
    }

    #[test]
    fn test_counts_after_close_are_discarded() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.arm().unwrap();
        for _ in 0..11 {
            g.handle_trigger();
        }
        g.clock_reference(999);
        assert_eq!(g.snapshot().unwrap().raw_count, 0);
    }

    #[test]
    fn test_triggers_while_disarmed_are_ignored() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.handle_trigger();
        g.handle_trigger();
        g.arm().unwrap();
        assert!(!g.is_complete());
        for _ in 0..11 {
            g.handle_trigger();
        }
        assert!(g.is_complete());
    }

    #[test]
    fn test_overflow_accounting_through_gate() {
        let g = PpsGate::new(3, EdgeDiscipline::TrueEdge, 8).unwrap();
        g.arm().unwrap();
        g.handle_trigger();
        g.clock_reference(300); // modulus 256: one wrap + 44
        g.handle_trigger();
        g.handle_trigger();
        let snap = g.snapshot().unwrap();
        assert_eq!(snap.raw_count, 44);
        assert_eq!(snap.overflow_count, 1);
        assert_eq!(snap.total_count(8), 300);
    }

    #[test]
    fn test_double_arm_fails() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.arm().unwrap();
        assert!(matches!(g.arm(), Err(CalError::HardwareInit(_))));
    }

    #[test]
    fn test_rearm_after_completion_resets_window() {
        let g = PpsGate::new(2, EdgeDiscipline::TrueEdge, 16).unwrap();
        g.arm().unwrap();
        g.handle_trigger();
        g.clock_reference(7);
        g.handle_trigger();
        assert_eq!(g.snapshot().unwrap().raw_count, 7);

        g.arm().unwrap();
        assert!(g.snapshot().is_none());
        g.handle_trigger();
        g.clock_reference(9);
        g.handle_trigger();
        assert_eq!(g.snapshot().unwrap().raw_count, 9);
    }

    #[test]
    fn test_wait_complete_times_out_without_pps() {
        let g = gate(EdgeDiscipline::TrueEdge);
        g.arm().unwrap();
        let err = g.wait_complete(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, CalError::SamplingTimeout { .. }));
    }

    #[test]
    fn test_wait_complete_returns_snapshot() {
        use std::sync::Arc;

        let g = Arc::new(gate(EdgeDiscipline::TrueEdge));
        g.arm().unwrap();
        let g2 = Arc::clone(&g);
        let feeder = std::thread::spawn(move || {
            g2.handle_trigger();
            g2.clock_reference(123);
            for _ in 0..10 {
                g2.handle_trigger();
            }
        });
        let snap = g.wait_complete(Duration::from_secs(5)).unwrap();
        assert_eq!(snap.raw_count, 123);
        feeder.join().unwrap();
    }

    #[test]
    fn test_degenerate_gate_rejected() {
        assert!(PpsGate::new(1, EdgeDiscipline::TrueEdge, 16).is_err());
        assert!(PpsGate::new(11, EdgeDiscipline::TrueEdge, 33).is_err());
    }
}
