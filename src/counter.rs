//! Free-running reference pulse counter with overflow accounting
//!
//! Models a W-bit hardware counter clocked by the signal under calibration,
//! paired with a software tally incremented once per wraparound. The true
//! count over a window is `raw + 2^W * overflow`.

/// Wraparound pulse counter of fixed bit width
///
/// The counter only advances while armed; pulses arriving after `freeze()`
/// (clock input disabled) are discarded, matching a hardware counter whose
/// clock-select bits have been cleared.
#[derive(Debug, Clone)]
pub struct ReferenceCounter {
    width_bits: u8,
    raw: u32,
    overflow: u32,
    enabled: bool,
}

impl ReferenceCounter {
    /// Create a disabled counter of the given bit width (1..=32)
    pub fn new(width_bits: u8) -> Self {
        Self {
            width_bits,
            raw: 0,
            overflow: 0,
            enabled: false,
        }
    }

    fn modulus(&self) -> u64 {
        1u64 << self.width_bits
    }

    /// Zero the count and overflow tally and enable the clock input
    pub fn arm(&mut self) {
        self.raw = 0;
        self.overflow = 0;
        self.enabled = true;
    }

    /// Disable the clock input, preserving the count for readout
    pub fn freeze(&mut self) {
        self.enabled = false;
    }

    /// Deliver a batch of reference pulses
    ///
    /// Batch delivery keeps wrap accounting exact when a simulated clock
    /// hands over a whole inter-edge interval at once.
    pub fn count_pulses(&mut self, pulses: u64) {
        if !self.enabled {
            return;
        }
        let total = self.raw as u64 + pulses;
        self.overflow = self.overflow.wrapping_add((total / self.modulus()) as u32);
        self.raw = (total % self.modulus()) as u32;
    }

    /// Raw hardware count
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Wraparounds since arm
    pub fn overflow(&self) -> u32 {
        self.overflow
    }

    /// Whether the clock input is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
