//! Calibration cycle orchestration
//!
//! Runs a bounded batch of sampling windows against the PPS gate and walks
//! the correction factor toward the target with the Huff-n-Puff method:
//! a fixed step added or subtracted per window based solely on the sign of
//! the measurement error. Over enough iterations the factor settles within
//! one step of the true correction.

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;

use crate::error::{CalError, CalResult};
use crate::gate::PpsGate;
use crate::traits::FrequencySynthesizer;
use crate::types::{
    CalPhase, CalibrationConfig, CalibrationRecord, CalibrationReport, SignalLossPolicy,
};

/// One Huff-n-Puff adjustment
fn huff_n_puff(correction: i32, measured: u64, target: u64, step: i32) -> i32 {
    match measured.cmp(&target) {
        Ordering::Less => correction - step,
        Ordering::Greater => correction + step,
        Ordering::Equal => correction,
    }
}

/// End-to-end calibration cycle driver
///
/// Owns the PPS gate and the persistent correction state. The gate is shared
/// out via [`gate()`](CalibrationController::gate) so a trigger source (a
/// real ISR shim or the simulated `SimPpsSource`) can feed it while
/// [`run()`](CalibrationController::run) blocks on window completion.
pub struct CalibrationController {
    config: CalibrationConfig,
    gate: Arc<PpsGate>,
    correction: i32,
    phase: CalPhase,
}

impl CalibrationController {
    /// Validate the configuration and set up the gate
    pub fn new(config: CalibrationConfig) -> CalResult<Self> {
        config.validate()?;
        let gate = Arc::new(PpsGate::new(
            config.window_pulses,
            config.edge_discipline,
            config.counter_width_bits,
        )?);
        Ok(Self {
            correction: config.initial_correction,
            config,
            gate,
            phase: CalPhase::Idle,
        })
    }

    /// The gate to wire the PPS trigger and reference clock into
    pub fn gate(&self) -> Arc<PpsGate> {
        Arc::clone(&self.gate)
    }

    /// Last committed correction factor
    ///
    /// Remains readable after a faulted cycle, which leaves the value as of
    /// the last successful iteration untouched.
    pub fn correction_factor(&self) -> i32 {
        self.correction
    }

    /// Current phase, for diagnostics
    pub fn phase(&self) -> CalPhase {
        self.phase
    }

    /// Run one full calibration cycle
    ///
    /// Iteration 0 is discarded as a startup transient: no adjustment, no
    /// synthesizer push, no record. On a fault the remaining iterations are
    /// abandoned but cleanup still runs, so the calibration output never
    /// stays live; the committed factor stays at its last good value.
    pub fn run(&mut self, synth: &mut dyn FrequencySynthesizer) -> CalResult<CalibrationReport> {
        let mut records = Vec::new();
        let result = self.run_iterations(synth, &mut records);

        // Park regardless of outcome: calibration output off, default
        // channel back on at its configured frequency
        let cleanup = self.park(synth);

        match result {
            Ok(iterations_completed) => {
                cleanup?;
                self.phase = CalPhase::Cleanup;
                tracing::info!(
                    committed = self.correction,
                    iterations = iterations_completed,
                    "calibration cycle complete"
                );
                Ok(CalibrationReport {
                    committed: self.correction,
                    iterations_completed,
                    records,
                })
            }
            Err(err) => {
                self.phase = CalPhase::Faulted;
                if let Err(park_err) = cleanup {
                    tracing::warn!(error = %park_err, "park after faulted cycle failed");
                }
                tracing::warn!(error = %err, committed = self.correction, "calibration cycle aborted");
                Err(err)
            }
        }
    }

    fn run_iterations(
        &mut self,
        synth: &mut dyn FrequencySynthesizer,
        records: &mut Vec<CalibrationRecord>,
    ) -> CalResult<u32> {
        // Mirror of the firmware's calibration entry: park output off,
        // calibration output up at the target with the starting correction
        synth.set_correction(self.correction)?;
        synth.enable_output(self.config.park_channel, false)?;
        synth.enable_output(self.config.cal_channel, true)?;
        synth.set_frequency(self.config.cal_channel, self.config.target_freq_centi_hz)?;

        for iteration in 0..self.config.iterations {
            self.phase = CalPhase::Armed;
            self.gate.arm()?;

            self.phase = CalPhase::WaitingForWindow;
            let snapshot = self.gate.wait_complete(self.config.window_timeout)?;

            self.phase = CalPhase::Measured;
            let measured = self.config.measured_centi_hz(&snapshot);
            tracing::debug!(
                iteration,
                raw = snapshot.raw_count,
                overflow = snapshot.overflow_count,
                measured_centi_hz = measured,
                "window measured"
            );

            if iteration == 0 {
                // Startup transient: the first window reads low while the
                // output settles, so it is measured and thrown away
                self.phase = CalPhase::Idle;
                continue;
            }

            self.phase = CalPhase::Adjusting;
            let previous = self.correction;
            if measured == 0 {
                match self.config.signal_loss_policy {
                    SignalLossPolicy::Abort => {
                        return Err(CalError::SignalLoss { iteration });
                    }
                    SignalLossPolicy::Ignore => {
                        tracing::warn!(
                            iteration,
                            "measured frequency is zero; leaving correction untouched"
                        );
                    }
                }
            } else {
                self.correction = huff_n_puff(
                    previous,
                    measured,
                    self.config.target_freq_centi_hz,
                    self.config.step,
                );
            }

            records.push(CalibrationRecord {
                iteration,
                measured_centi_hz: measured,
                previous_factor: previous,
                new_factor: self.correction,
            });
            tracing::info!(
                iteration,
                measured_centi_hz = measured,
                previous_factor = previous,
                new_factor = self.correction,
                "calibration step"
            );

            synth.set_correction(self.correction)?;
            synth.set_frequency(self.config.cal_channel, self.config.target_freq_centi_hz)?;

            if !self.config.stabilization.is_zero() {
                thread::sleep(self.config.stabilization);
            }
            self.phase = CalPhase::Idle;
        }

        self.phase = CalPhase::Done;
        Ok(self.config.iterations)
    }

    fn park(&mut self, synth: &mut dyn FrequencySynthesizer) -> CalResult<()> {
        synth.enable_output(self.config.cal_channel, false)?;
        synth.set_frequency(self.config.park_channel, self.config.park_freq_hz * 100)?;
        synth.enable_output(self.config.park_channel, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huff_n_puff_below_target_decreases() {
        assert_eq!(huff_n_puff(0, 3_199_990, 3_200_000, 50), -50);
        assert_eq!(huff_n_puff(-400, 1, 3_200_000, 50), -450);
    }

    #[test]
    fn test_huff_n_puff_above_target_increases() {
        assert_eq!(huff_n_puff(0, 3_200_010, 3_200_000, 50), 50);
        assert_eq!(huff_n_puff(775, u64::MAX, 3_200_000, 25), 800);
    }

    #[test]
    fn test_huff_n_puff_on_target_holds() {
        assert_eq!(huff_n_puff(-6813, 3_200_000, 3_200_000, 50), -6813);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let cfg = CalibrationConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            CalibrationController::new(cfg),
            Err(CalError::Config(_))
        ));
    }

    #[test]
    fn test_fresh_controller_reports_initial_state() {
        let cfg = CalibrationConfig {
            initial_correction: -8213,
            ..Default::default()
        };
        let ctrl = CalibrationController::new(cfg).unwrap();
        assert_eq!(ctrl.correction_factor(), -8213);
        assert_eq!(ctrl.phase(), CalPhase::Idle);
    }
}
