//! # Pitch Detection Module
//!
//! This module extracts a single fundamental-frequency estimate from a
//! magnitude spectrum. It is a deliberately simple single-peak estimator:
//! no parabolic interpolation and no harmonic correction, so the frequency
//! resolution is `sample_rate / N` and must be accepted as the estimator's
//! inherent quantization.
//!
//! ## Features
//! - Search restricted to the guitar-relevant band of [80, 400) Hz
//! - Amplitude floor to reject silence and broadband noise
//! - Ties resolve to the lowest bin (strict greater-than comparison)

/// Lower edge of the search band in Hz (inclusive).
pub const BAND_LOW_HZ: f64 = 80.0;
/// Upper edge of the search band in Hz (exclusive).
pub const BAND_HIGH_HZ: f64 = 400.0;

/// Scans a magnitude spectrum for the dominant pitch within the guitar band.
///
/// # Arguments
/// * `magnitudes` - Magnitude spectrum of length N/2
/// * `sample_rate` - Sample rate in Hz
/// * `transform_size` - The transform size N that produced the spectrum
/// * `min_amplitude` - Noise floor; peaks below it are rejected
///
/// # Returns
/// * `Some(frequency)` - Peak bin converted to Hz as `bin * sample_rate / N`
/// * `None` - No peak above the floor inside the band
pub fn detect_fundamental(
    magnitudes: &[f32],
    sample_rate: u32,
    transform_size: usize,
    min_amplitude: f64,
) -> Option<f64> {
    if magnitudes.is_empty() {
        return None;
    }

    let n = transform_size as f64;
    let rate = f64::from(sample_rate);
    // Bin 0 is DC and never a pitch; the top of the band stays inside the
    // spectrum.
    let min_index = ((BAND_LOW_HZ * n / rate) as usize).max(1);
    let max_index = ((BAND_HIGH_HZ * n / rate) as usize).min(magnitudes.len() - 1);

    let mut peak_index = 0;
    let mut peak_magnitude = 0.0f32;
    for (i, &magnitude) in magnitudes.iter().enumerate().take(max_index).skip(min_index) {
        if magnitude > peak_magnitude {
            peak_magnitude = magnitude;
            peak_index = i;
        }
    }

    if peak_index == 0 || f64::from(peak_magnitude) < min_amplitude {
        return None;
    }

    Some(peak_index as f64 * rate / n)
}
