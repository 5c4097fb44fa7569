//! Calibration error types

use thiserror::Error;

/// Result type for calibration operations
pub type CalResult<T> = Result<T, CalError>;

/// Errors that can occur during a calibration cycle
///
/// A fault aborts only the remaining iterations of the current cycle; the
/// last committed correction factor is preserved untouched. There is no
/// automatic cycle-level retry.
#[derive(Error, Debug)]
pub enum CalError {
    /// Measured frequency was exactly zero on a non-discarded iteration,
    /// meaning the reference output is not reaching the counter input
    #[error("reference signal lost: measured frequency was zero at iteration {iteration}")]
    SignalLoss { iteration: u32 },

    /// The sampling window never completed, meaning the PPS source stopped
    /// producing edges
    #[error("sampling window did not complete within {waited_ms}ms (missing PPS source?)")]
    SamplingTimeout { waited_ms: u64 },

    /// Counter or gate failed to arm
    #[error("hardware init failed: {0}")]
    HardwareInit(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Synthesizer driver failure
    #[error("synthesizer driver error: {0}")]
    Synth(String),
}

impl CalError {
    /// Check if this error is recoverable by re-invoking the cycle
    ///
    /// Signal loss and sampling timeouts are typically transient (GPS lock
    /// dropped, cabling glitch); config and init errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CalError::SignalLoss { .. } | CalError::SamplingTimeout { .. }
        )
    }
}
