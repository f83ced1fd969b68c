//! # Spectral Transform Module
//!
//! This module converts fixed-size audio blocks into magnitude spectra for
//! pitch detection. The transform is an in-place iterative radix-2
//! Cooley-Tukey FFT with precomputed Hann window coefficients and a
//! precomputed bit-reversal permutation table.
//!
//! ## Features
//! - Transform size derived once per configuration (largest power of two
//!   that fits the block size)
//! - Hann windowing for reduced spectral leakage
//! - Single-precision throughout; the per-stage twiddle recurrence
//!   accumulates a small rotation error that is tolerated, not corrected
//! - Deterministic and infallible for any input

use num_complex::Complex32;

/// Precomputed spectral state for one audio configuration.
///
/// Owns the window coefficients, the bit-reversal table and the complex
/// working buffer so that a processing cycle performs no allocation.
#[derive(Debug)]
pub struct SpectralTransform {
    size: usize,
    window: Vec<f32>,
    bit_rev: Vec<usize>,
    scratch: Vec<Complex32>,
    magnitudes: Vec<f32>,
}

/// Largest power of two less than or equal to `block_size`, with a floor
/// of 2 so the transform is never degenerate.
fn transform_size(block_size: usize) -> usize {
    let mut n = 2;
    while n * 2 <= block_size {
        n *= 2;
    }
    n
}

impl SpectralTransform {
    /// Derives the spectral tables for the given block size.
    ///
    /// # Arguments
    /// * `block_size` - Number of samples per audio block
    pub fn new(block_size: usize) -> Self {
        let size = transform_size(block_size);

        // Hann window: w[i] = 0.5 * (1 - cos(2*pi*i / (N-1)))
        let n_minus_1 = (size - 1) as f32;
        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
            .collect();

        // Reverse the log2(N)-bit representation of each index.
        let bits = size.trailing_zeros();
        let bit_rev = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        Self {
            size,
            window,
            bit_rev,
            scratch: vec![Complex32::new(0.0, 0.0); size],
            magnitudes: vec![0.0; size / 2],
        }
    }

    /// The transform size N actually in use (a power of two, at most the
    /// configured block size).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transforms a sample block into its magnitude spectrum.
    ///
    /// Samples beyond the block (or beyond N) are treated as zero, so a
    /// short or empty input degenerates gracefully instead of failing.
    ///
    /// # Arguments
    /// * `samples` - Audio block; only the first N samples participate
    ///
    /// # Returns
    /// * Magnitude spectrum of length N/2, where bin k covers frequency
    ///   `k * sample_rate / N` and magnitudes are scaled by 2/N
    pub fn transform(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.size;

        // Windowed copy into the complex working buffer, zero-padded.
        for i in 0..n {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            self.scratch[i] = Complex32::new(sample * self.window[i], 0.0);
        }

        // Bit-reversal permutation; swapping only when i < j visits each
        // pair exactly once.
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                self.scratch.swap(i, j);
            }
        }

        // Iterative butterfly passes for stage lengths 2, 4, 8, ..., N.
        // The twiddle factor e^{-2*pi*i/len} is advanced incrementally
        // within each half-stage.
        let mut len = 2;
        while len <= n {
            let angle = -2.0 * std::f32::consts::PI / len as f32;
            let w_len = Complex32::new(angle.cos(), angle.sin());
            for start in (0..n).step_by(len) {
                let mut w = Complex32::new(1.0, 0.0);
                for k in 0..len / 2 {
                    let a = self.scratch[start + k];
                    let b = self.scratch[start + k + len / 2] * w;
                    self.scratch[start + k] = a + b;
                    self.scratch[start + k + len / 2] = a - b;
                    w *= w_len;
                }
            }
            len *= 2;
        }

        // Only the first half of the spectrum is meaningful for a real
        // input (Nyquist), normalized by N/2.
        let half = n / 2;
        let scale = half as f32;
        for k in 0..half {
            self.magnitudes[k] = self.scratch[k].norm() / scale;
        }
        &self.magnitudes[..half]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;
    use rustfft::num_complex::Complex;

    fn sine_block(frequency: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
            })
            .collect()
    }

    #[test]
    fn test_transform_size_caps_to_power_of_two() {
        assert_eq!(transform_size(4096), 4096);
        assert_eq!(transform_size(5000), 4096);
        assert_eq!(transform_size(2), 2);
        // Degenerate block sizes still get the minimum transform size.
        assert_eq!(transform_size(1), 2);
        assert_eq!(transform_size(0), 2);
    }

    #[test]
    fn test_hann_window_tapers_to_zero() {
        let transform = SpectralTransform::new(1024);
        assert!(transform.window[0].abs() < 1e-6);
        assert!(transform.window[1023].abs() < 1e-6);
        // The window peaks at 1.0 in the middle.
        let mid = transform.window[511].max(transform.window[512]);
        assert!((mid - 1.0).abs() < 1e-3, "window peak was {}", mid);
    }

    #[test]
    fn test_bit_reversal_table() {
        let transform = SpectralTransform::new(8);
        assert_eq!(transform.bit_rev, vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let samples = sine_block(110.0, 44100, 4096);
        let mut transform = SpectralTransform::new(4096);
        let first = transform.transform(&samples).to_vec();
        let second = transform.transform(&samples).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        // 110 Hz at 44.1 kHz with N = 4096 lands on bin round(110*4096/44100) = 10.
        let samples = sine_block(110.0, 44100, 4096);
        let mut transform = SpectralTransform::new(4096);
        let magnitudes = transform.transform(&samples);

        let (peak_bin, _) = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(peak_bin, 10);
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut transform = SpectralTransform::new(512);
        let spectrum = transform.transform(&[]).to_vec();
        assert_eq!(spectrum.len(), 256);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_matches_reference_fft() {
        let n = 1024;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f64 / 44100.0;
                let a = (2.0 * std::f64::consts::PI * 110.0 * t).sin();
                let b = 0.3 * (2.0 * std::f64::consts::PI * 523.25 * t).sin();
                (a + b) as f32
            })
            .collect();

        let mut transform = SpectralTransform::new(n);
        let ours = transform.transform(&samples).to_vec();

        // Reference path: the same Hann window through RustFFT.
        let n_minus_1 = (n - 1) as f32;
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
                Complex { re: s * w, im: 0.0 }
            })
            .collect();
        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(n).process(&mut buffer);

        let scale = (n / 2) as f32;
        for k in 0..n / 2 {
            let reference = buffer[k].norm() / scale;
            assert!(
                (ours[k] - reference).abs() < 1e-3,
                "bin {} diverged: {} vs {}",
                k,
                ours[k],
                reference
            );
        }
    }
}
