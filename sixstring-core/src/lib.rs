// sixstring-core/src/lib.rs

//! The core logic for the real-time guitar tuner.
//! This crate is responsible for spectral analysis, pitch detection,
//! and tuning evaluation. It is completely headless and contains
//! no UI code.

pub mod audio;
pub mod engine;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod tuning;

pub use audio::{AudioConfig, AudioSource, CaptureSource, SyntheticSource};
pub use engine::TunerEngine;
pub use error::{EngineError, Result};

use serde::Serialize;

/// Represents the outcome of a single processing cycle.
///
/// The background worker overwrites the published result wholesale at the
/// end of every cycle; it is never partially updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningResult {
    /// The detected fundamental frequency in Hz, 0.0 when no pitch was found.
    pub detected_frequency: f64,
    /// Deviation from the nearest target string in cents.
    pub cents_offset: f64,
    /// RMS amplitude of the analyzed block.
    pub amplitude: f64,
    /// Whether the offset is within the configured tolerance.
    pub is_in_tune: bool,
    /// Milliseconds since the engine was created (monotonic).
    pub timestamp_ms: i64,
    /// Whether a pitch was found above the amplitude floor.
    pub has_valid_note: bool,
}
