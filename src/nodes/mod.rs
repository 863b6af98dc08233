//! Built-in plugins.
//!
//! ## Sources ([`source`])
//!
//! Add signal to whatever the node already carries:
//! - [`Sine`] - Free-running sine oscillator with frequency/amplitude control
//! - [`SineSynth`] - Polyphonic instrument played by note events
//!
//! ## Effects ([`effect`])
//!
//! Process audio in place:
//! - [`Gain`] - Volume control with smoothing
//! - [`SlewLimiter`] - Smooth rapid changes (for control signals)
//! - [`LatencyDelay`] - Fixed delay reported as latency, for exercising
//!   delay compensation
//!
//! Parameters are addressed by name through the
//! [`Controller`](crate::Controller) and by index on the audio thread.

pub mod effect;
pub mod source;

pub use effect::{Gain, LatencyDelay, SlewLimiter};
pub use source::{Sine, SineSynth};
