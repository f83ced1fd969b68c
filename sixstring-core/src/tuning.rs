//! # Musical Tuning Module
//!
//! This module turns a frequency estimate and a signal amplitude into a
//! tuning verdict. It owns the cents math, the nearest-target matching
//! against the configured string set, and the mutable tuning settings that
//! the engine snapshots once per cycle.
//!
//! ## Features
//! - Cents deviation based on equal temperament (1200 cents per octave)
//! - Bounded target-string collection with an enforced capacity of 6
//! - Standard-tuning guitar defaults (E2 through E4)
//! - Note-name helpers for display and logging

use crate::error::EngineError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Fixed capacity of the target-string list.
pub const MAX_STRINGS: usize = 6;

/// Chromatic note names indexed by pitch class (0 = C ... 11 = B).
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Mutable tuning parameters, updatable at any time from the foreground.
///
/// The background loop reads one consistent snapshot per cycle; no cycle
/// ever observes a partially updated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningSettings {
    /// Reference pitch for A4 in Hz.
    pub a4_frequency: f64,
    /// Half-width of the in-tune window in cents (inclusive boundary).
    pub tolerance_cents: f64,
    /// Minimum RMS amplitude for a cycle to produce a valid note.
    pub min_amplitude: f64,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            a4_frequency: 440.0,
            tolerance_cents: 5.0,
            min_amplitude: 0.001,
        }
    }
}

impl TuningSettings {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.a4_frequency <= 0.0 {
            return Err(EngineError::InvalidSettings("A4 frequency must be positive"));
        }
        if self.tolerance_cents < 0.0 {
            return Err(EngineError::InvalidSettings("tolerance must be non-negative"));
        }
        if self.min_amplitude < 0.0 {
            return Err(EngineError::InvalidSettings(
                "minimum amplitude must be non-negative",
            ));
        }
        Ok(())
    }
}

/// One target string. Only `target_frequency` participates in the matching
/// math; the rest is descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetString {
    /// 1-based string number (1 is the highest-pitched string).
    pub string_number: i32,
    /// Target frequency in Hz.
    pub target_frequency: f64,
    /// Pitch class, 0-11 (0 = C).
    pub note_index: i32,
    /// Octave number.
    pub octave: i32,
}

impl TargetString {
    /// Display name such as "E2" or "A#3".
    pub fn note_name(&self) -> String {
        let class = self.note_index.rem_euclid(12) as usize;
        format!("{}{}", NOTE_NAMES[class], self.octave)
    }
}

/// The six standard-tuning guitar strings, highest to lowest.
pub static STANDARD_TUNING: Lazy<TargetSet> = Lazy::new(|| {
    let strings = [
        (1, 329.63, 4, 4),  // E4
        (2, 246.94, 11, 3), // B3
        (3, 196.00, 7, 3),  // G3
        (4, 146.83, 2, 3),  // D3
        (5, 110.00, 9, 2),  // A2
        (6, 82.41, 4, 2),   // E2
    ]
    .map(|(string_number, target_frequency, note_index, octave)| TargetString {
        string_number,
        target_frequency,
        note_index,
        octave,
    });
    // The standard set is exactly at capacity, so this can never fail.
    TargetSet::new(&strings).unwrap()
});

/// A bounded collection of target strings.
///
/// The count never exceeds [`MAX_STRINGS`]; oversized updates are rejected
/// rather than silently truncated, and construction is the only way in so
/// the invariant holds everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSet {
    strings: Vec<TargetString>,
}

impl TargetSet {
    /// Builds a target set, enforcing the capacity invariant.
    pub fn new(strings: &[TargetString]) -> crate::Result<Self> {
        if strings.len() > MAX_STRINGS {
            return Err(EngineError::TooManyStrings {
                given: strings.len(),
                capacity: MAX_STRINGS,
            });
        }
        Ok(Self {
            strings: strings.to_vec(),
        })
    }

    pub fn strings(&self) -> &[TargetString] {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for TargetSet {
    fn default() -> Self {
        STANDARD_TUNING.clone()
    }
}

/// Calculates the deviation between two frequencies in cents.
///
/// Cents are a logarithmic unit where 100 cents is one semitone and 1200
/// cents is one octave. Positive values mean the detected pitch is sharp.
/// Non-positive inputs are degenerate and yield 0.
pub fn cents_offset(detected: f64, target: f64) -> f64 {
    if detected <= 0.0 || target <= 0.0 {
        return 0.0;
    }
    1200.0 * (detected / target).log2()
}

/// Finds the target string whose frequency is closest to the detected one.
///
/// Left-to-right linear scan with a strict less-than comparison, so the
/// first of several equally distant targets wins.
pub fn closest_target(detected: f64, targets: &[TargetString]) -> Option<&TargetString> {
    let mut best = targets.first()?;
    let mut best_diff = (detected - best.target_frequency).abs();
    for target in &targets[1..] {
        let diff = (detected - target.target_frequency).abs();
        if diff < best_diff {
            best_diff = diff;
            best = target;
        }
    }
    Some(best)
}

/// Nearest chromatic pitch class (0 = C ... 11 = A is 9) for a frequency,
/// relative to the configured A4 reference. Used for display only.
pub fn nearest_note_index(frequency: f64, a4_frequency: f64) -> Option<usize> {
    if frequency <= 0.0 || a4_frequency <= 0.0 {
        return None;
    }
    let semitones_from_a4 = 12.0 * (frequency / a4_frequency).log2();
    // A is pitch class 9.
    Some((semitones_from_a4.round() as i64 + 9).rem_euclid(12) as usize)
}

/// RMS amplitude over the full, unwindowed sample block.
pub fn rms_amplitude(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// The tuning-specific part of a cycle's result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Verdict {
    pub cents_offset: f64,
    pub is_in_tune: bool,
    pub has_valid_note: bool,
}

/// Assembles the per-cycle tuning verdict.
///
/// A note is only valid when the block's RMS amplitude clears the floor
/// and a positive frequency was detected; otherwise the verdict is all
/// zeros with both flags false, regardless of what the spectrum held.
pub fn evaluate(
    settings: &TuningSettings,
    targets: &TargetSet,
    amplitude: f64,
    detected_frequency: f64,
) -> Verdict {
    if amplitude > settings.min_amplitude && detected_frequency > 0.0 {
        if let Some(target) = closest_target(detected_frequency, targets.strings()) {
            let offset = cents_offset(detected_frequency, target.target_frequency);
            return Verdict {
                cents_offset: offset,
                is_in_tune: offset.abs() <= settings.tolerance_cents,
                has_valid_note: true,
            };
        }
    }
    Verdict::default()
}
