//! GPS-PPS-disciplined oscillator calibration
//!
//! `ppscal` disciplines the output frequency of a programmable clock
//! synthesizer (Si5351-class) against a GPS-derived one-pulse-per-second
//! timebase. A free output of the synthesizer is fed back into a hardware
//! pulse counter; the PPS signal gates that counter over fixed-length
//! windows (11 edges = 10 measured seconds by default), and a Huff-n-Puff
//! loop nudges a signed correction factor by a fixed step per window until
//! it settles near the oscillator's true drift compensation.
//!
//! The engine is hardware-agnostic: the synthesizer sits behind the
//! [`FrequencySynthesizer`] trait, and PPS triggers plus reference-clock
//! pulses are delivered to the [`PpsGate`] by whatever context stands in for
//! the interrupt handlers — an ISR shim on a real target, or the bundled
//! simulated source for development without hardware.
//!
//! # Feature flags
//!
//! - `sim` (default): simulated synthesizer and PPS source
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ppscal::sim::{SimPpsSource, SimSynthesizer};
//! use ppscal::{CalibrationConfig, CalibrationController};
//!
//! // Short synthetic cycle: 3-edge windows measure 2 seconds each
//! let config = CalibrationConfig {
//!     target_freq_centi_hz: 3_200_000, // 32 kHz
//!     iterations: 3,
//!     window_pulses: 3,
//!     stabilization: Duration::ZERO,
//!     window_timeout: Duration::from_secs(5),
//!     ..Default::default()
//! };
//! let mut controller = CalibrationController::new(config).unwrap();
//! let mut synth = SimSynthesizer::new();
//!
//! // 64_000 pulses over 2 s = 32 kHz: already on target
//! let _pps = SimPpsSource::spawn(controller.gate(), vec![64_000; 3]);
//!
//! let report = controller.run(&mut synth).unwrap();
//! assert_eq!(report.committed, 0);
//! assert_eq!(report.records.len(), 2); // window 0 is discarded
//! ```

pub mod controller;
pub mod counter;
pub mod error;
pub mod gate;
pub mod traits;
pub mod types;

#[cfg(feature = "sim")]
pub mod sim;

// Re-export main types
pub use controller::CalibrationController;
pub use counter::ReferenceCounter;
pub use error::{CalError, CalResult};
pub use gate::PpsGate;
pub use traits::FrequencySynthesizer;
pub use types::{
    CalPhase, CalibrationConfig, CalibrationRecord, CalibrationReport, EdgeDiscipline,
    SignalLossPolicy, WindowSnapshot,
};
