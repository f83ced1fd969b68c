//! # Audio Source Module
//!
//! This module defines the pull-style contract between the processing loop
//! and whatever is producing audio, plus the two built-in providers: a
//! deterministic synthetic signal for exercising the pipeline, and a
//! CPAL-backed capture source for real microphone input.
//!
//! ## Features
//! - Blocking pull interface delivering exactly one block per call
//! - Synthetic generator (slowly frequency-modulated sine plus noise)
//! - Automatic audio device selection for live capture
//! - Capture failures degrade to silent blocks instead of stopping the loop

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;

use crate::error::EngineError;

/// Default capture sample rate in Hz (CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default number of samples per processing block.
///
/// Larger blocks give more frequency resolution but increase latency:
/// 4096 samples at 44.1 kHz is ~93 ms of audio and a bin width of ~10.8 Hz.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Immutable engine configuration. Changing it requires building a new
/// engine so the spectral tables are re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per processing block.
    pub buffer_size: usize,
    /// Noise floor for the spectral peak search.
    pub min_amplitude: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            min_amplitude: 0.001,
        }
    }
}

impl AudioConfig {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig("sample rate must be positive"));
        }
        if self.buffer_size == 0 {
            return Err(EngineError::InvalidConfig("buffer size must be positive"));
        }
        if self.min_amplitude < 0.0 {
            return Err(EngineError::InvalidConfig(
                "minimum amplitude must be non-negative",
            ));
        }
        Ok(())
    }
}

/// A pull-style provider of consecutive audio blocks.
///
/// The processing loop calls [`fill_block`](AudioSource::fill_block) once
/// per cycle with a buffer of the configured block size. Implementations
/// may block until enough audio is available and must keep sample values
/// in a bounded amplitude range.
pub trait AudioSource: Send {
    fn fill_block(&mut self, block: &mut [f32]);
}

/// Synthetic stand-in for a real audio source.
///
/// Generates a sine wave whose frequency drifts slowly (plus or minus 2 Hz
/// at 0.5 rad/s, imitating a player's wavering pitch) with uniform noise
/// mixed in. The generator clock advances by exactly one block per pull,
/// so output is deterministic for a given seed.
#[derive(Debug)]
pub struct SyntheticSource {
    sample_rate: u32,
    base_frequency: f64,
    clock: f64,
    random_state: u64,
}

impl SyntheticSource {
    /// A source humming near the low E string (82.41 Hz).
    pub fn new(sample_rate: u32) -> Self {
        Self::with_frequency(sample_rate, 82.41)
    }

    pub fn with_frequency(sample_rate: u32, base_frequency: f64) -> Self {
        Self {
            sample_rate,
            base_frequency,
            clock: 0.0,
            random_state: 0x6A09_E667_F3BC_C909,
        }
    }

    // xorshift64, mapped to [-0.5, 0.5).
    fn next_noise(&mut self) -> f32 {
        let mut x = self.random_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.random_state = x;
        (x >> 40) as f32 / (1u64 << 24) as f32 - 0.5
    }
}

impl AudioSource for SyntheticSource {
    fn fill_block(&mut self, block: &mut [f32]) {
        let dt = 1.0 / f64::from(self.sample_rate);
        for sample in block.iter_mut() {
            let t = self.clock;
            let frequency = self.base_frequency + 2.0 * (t * 0.5).sin();
            let tone = 0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
            *sample = tone + 0.1 * self.next_noise();
            self.clock += dt;
        }
    }
}

/// Live capture source backed by the default CPAL input device.
///
/// CPAL streams are not `Send`, so the stream lives on its own capture
/// thread; the callback accumulates samples into blocks of the requested
/// size and forwards them over a channel. `fill_block` turns that push
/// stream back into the pull contract by blocking on the channel.
pub struct CaptureSource {
    sample_rate: u32,
    frames: Receiver<Vec<f32>>,
    shutdown: Option<Sender<()>>,
    capture_thread: Option<JoinHandle<()>>,
}

impl CaptureSource {
    /// Opens the default input device and starts streaming.
    ///
    /// # Arguments
    /// * `block_size` - Number of samples per delivered block
    ///
    /// # Returns
    /// * `Ok(source)` - Capture running; query the negotiated rate with
    ///   [`sample_rate`](CaptureSource::sample_rate)
    /// * `Err(e)` - No usable input device or stream setup failed
    pub fn open(block_size: usize) -> Result<Self> {
        // A couple of blocks of slack; when the consumer falls behind,
        // frames are dropped at the sender.
        let (frame_tx, frame_rx) = bounded::<Vec<f32>>(4);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (setup_tx, setup_rx) = bounded::<Result<u32>>(1);

        let capture_thread = std::thread::spawn(move || {
            let stream_and_rate = build_input_stream(block_size, frame_tx);
            let stream = match stream_and_rate {
                Ok((stream, sample_rate)) => {
                    let _ = setup_tx.send(Ok(sample_rate));
                    stream
                }
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };

            // Park until shutdown; the stream keeps running in its callback.
            let _ = shutdown_rx.recv();

            if let Err(e) = stream.pause() {
                eprintln!("[CAPTURE] Error pausing stream: {}", e);
            }
            drop(stream);
            eprintln!("[CAPTURE] Capture thread finished");
        });

        let sample_rate = match setup_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = capture_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = capture_thread.join();
                return Err(anyhow!("capture thread exited before reporting a stream"));
            }
        };

        Ok(Self {
            sample_rate,
            frames: frame_rx,
            shutdown: Some(shutdown_tx),
            capture_thread: Some(capture_thread),
        })
    }

    /// The sample rate negotiated with the device.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioSource for CaptureSource {
    fn fill_block(&mut self, block: &mut [f32]) {
        match self.frames.recv() {
            Ok(frame) if frame.len() == block.len() => block.copy_from_slice(&frame),
            Ok(frame) => {
                // Block size mismatch should not happen; pad defensively.
                let n = frame.len().min(block.len());
                block[..n].copy_from_slice(&frame[..n]);
                block[n..].fill(0.0);
            }
            Err(_) => {
                // Capture thread is gone; deliver silence this cycle and
                // keep the processing loop alive.
                block.fill(0.0);
            }
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Builds and starts a mono f32 input stream whose callback re-blocks the
/// device's callback buffers into `block_size` frames.
fn build_input_stream(
    block_size: usize,
    sender: Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    eprintln!("[CAPTURE] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, DEFAULT_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let config = supported_config.with_sample_rate(cpal::SampleRate(DEFAULT_SAMPLE_RATE));
    let sample_rate = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();

    eprintln!("[CAPTURE] Selected sample rate: {} Hz", sample_rate);

    let err_fn = |err| eprintln!("[CAPTURE] An error occurred on the audio stream: {}", err);

    // Accumulates audio across callbacks until a full block is available.
    let mut accumulator: Vec<f32> = Vec::with_capacity(block_size * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            accumulator.extend_from_slice(data);
            while accumulator.len() >= block_size {
                let frame = accumulator[..block_size].to_vec();
                // Drop the frame if the consumer is behind.
                let _ = sender.try_send(frame);
                accumulator.drain(..block_size);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the supported configuration closest to the target rate among the
/// mono f32 options.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}
