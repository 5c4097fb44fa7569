//! Synthesizer driver trait definition

use crate::error::CalResult;

/// Interface to the programmable frequency synthesizer under calibration
///
/// This is the seam to the external driver (Si5351 or similar): the engine
/// only needs to retune the calibration output, toggle outputs, and push the
/// correction factor it is converging on. Implementations decide how those
/// map onto register programming.
///
/// # Example
///
/// ```rust
/// use ppscal::sim::SimSynthesizer;
/// use ppscal::FrequencySynthesizer;
///
/// let mut synth = SimSynthesizer::new();
/// synth.set_correction(-125).unwrap();
/// synth.set_frequency(2, 320_000_000).unwrap();
/// synth.enable_output(2, true).unwrap();
/// assert_eq!(synth.correction(), -125);
/// ```
pub trait FrequencySynthesizer {
    /// Tune `channel` to `centi_hz` hundredths of Hz
    fn set_frequency(&mut self, channel: u8, centi_hz: u64) -> CalResult<()>;

    /// Enable or disable a channel's output stage
    fn enable_output(&mut self, channel: u8, on: bool) -> CalResult<()>;

    /// Apply a signed correction factor to the frequency-generation math
    fn set_correction(&mut self, factor: i32) -> CalResult<()>;
}
