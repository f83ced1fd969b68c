//! # Tuner Engine Module
//!
//! This module owns the processing cadence and the producer/consumer
//! handoff. A single background worker pulls one block per cycle from the
//! audio source, drives it through the spectral transform, the pitch
//! detector and the tuning evaluator, and publishes a [`TuningResult`]
//! snapshot for the polling caller.
//!
//! ## Architecture
//! - **Worker thread**: free-running ~16 ms cycle, started by `start` and
//!   joined by `stop`
//! - **Result mailbox**: mutex-guarded single slot with consume-on-read
//!   semantics
//! - **Tuning state**: mutex-guarded settings and target strings, written
//!   by the foreground, snapshotted by the worker once per cycle
//! - **Running flag**: atomic boolean polled by the worker between cycles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::TuningResult;
use crate::audio::{AudioConfig, AudioSource};
use crate::error::EngineError;
use crate::fft::SpectralTransform;
use crate::pitch;
use crate::tuning::{self, TargetSet, TargetString, TuningSettings};

/// Cycle period of the background loop, roughly 60 cycles per second.
///
/// The cadence is free-running: a slow cycle drifts instead of creating
/// backpressure, and stopping waits out at most one period plus the cycle
/// in flight.
const CYCLE_PERIOD: Duration = Duration::from_millis(16);

/// Tuning parameters read by the worker at the start of every cycle.
#[derive(Debug, Clone)]
struct TuningState {
    settings: TuningSettings,
    targets: TargetSet,
}

/// State shared between the engine handle and the worker thread.
///
/// The mutexes only ever guard plain copies and clones, so a poisoned
/// lock would require a panic inside those; unwrapping the guards is safe.
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    latest: Mutex<Option<TuningResult>>,
    tuning: Mutex<TuningState>,
}

/// Everything the worker borrows for its lifetime and hands back on exit,
/// so the engine can be restarted with the same source and tables.
struct WorkerState {
    source: Box<dyn AudioSource>,
    transform: SpectralTransform,
}

/// Caller-owned handle to the pitch-detection engine.
///
/// The handle's lifetime is the engine's lifetime: dropping it stops the
/// worker. All failures surface as [`EngineError`] values; nothing here
/// can take down the worker or the process.
pub struct TunerEngine {
    config: AudioConfig,
    shared: Arc<Shared>,
    epoch: Instant,
    idle: Option<WorkerState>,
    worker: Option<JoinHandle<WorkerState>>,
}

impl TunerEngine {
    /// Creates an engine for the given configuration and audio source.
    ///
    /// Validates the configuration and derives the spectral tables once;
    /// the configuration is immutable afterwards.
    ///
    /// # Arguments
    /// * `config` - Sample rate, block size and spectral noise floor
    /// * `source` - Pull-style audio provider driven once per cycle
    pub fn new(config: AudioConfig, source: Box<dyn AudioSource>) -> crate::Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                latest: Mutex::new(None),
                tuning: Mutex::new(TuningState {
                    settings: TuningSettings::default(),
                    targets: TargetSet::default(),
                }),
            }),
            epoch: Instant::now(),
            idle: Some(WorkerState {
                source,
                transform: SpectralTransform::new(config.buffer_size),
            }),
            worker: None,
        })
    }

    /// Convenience constructor using the default standard-tuning setup.
    pub fn with_defaults(source: Box<dyn AudioSource>) -> crate::Result<Self> {
        Self::new(AudioConfig::default(), source)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Starts the background processing loop.
    ///
    /// # Returns
    /// * `Err(AlreadyRunning)` - The worker is active
    /// * `Err(SourceLost)` - A previous worker panicked away the source
    pub fn start(&mut self) -> crate::Result<()> {
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let state = self.idle.take().ok_or(EngineError::SourceLost)?;

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let config = self.config;
        let epoch = self.epoch;
        self.worker = Some(thread::spawn(move || {
            processing_loop(config, shared, state, epoch)
        }));
        eprintln!("[ENGINE] Capture worker started");
        Ok(())
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// Synchronous and unconditional: the call returns only after the
    /// worker has finished its in-flight cycle, with no timeout. Stopping
    /// an already stopped engine is a no-op.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(state) => self.idle = Some(state),
                Err(_) => eprintln!("[ENGINE] Capture worker panicked; audio source lost"),
            }
            eprintln!("[ENGINE] Capture worker stopped");
        }
    }

    /// Snapshot of the running flag. Never fails.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Replaces the tuning settings and target strings under the lock.
    ///
    /// The worker picks the new values up at the start of its next cycle;
    /// it never observes a torn update.
    ///
    /// # Returns
    /// * `Err(InvalidSettings)` - A settings value failed validation
    /// * `Err(TooManyStrings)` - More targets than the capacity of 6
    pub fn update_tuning(
        &self,
        settings: TuningSettings,
        targets: &[TargetString],
    ) -> crate::Result<()> {
        settings.validate()?;
        let targets = TargetSet::new(targets)?;

        let mut state = self.shared.tuning.lock().unwrap();
        *state = TuningState { settings, targets };
        Ok(())
    }

    /// Takes the latest published result, if a new one exists.
    ///
    /// Reading consumes the "new" status: a second call with no cycle in
    /// between returns `None`.
    pub fn latest_result(&self) -> Option<TuningResult> {
        self.shared.latest.lock().unwrap().take()
    }
}

impl Drop for TunerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The background cycle: pull, transform, detect, evaluate, publish, sleep.
///
/// Runs to completion within each cycle; the only blocking points are the
/// source pull and the terminal join in `stop`. Returns the worker state
/// so the engine can be restarted.
fn processing_loop(
    config: AudioConfig,
    shared: Arc<Shared>,
    mut state: WorkerState,
    epoch: Instant,
) -> WorkerState {
    let mut block = vec![0.0f32; config.buffer_size];

    while shared.running.load(Ordering::SeqCst) {
        let tuning_state = shared.tuning.lock().unwrap().clone();

        state.source.fill_block(&mut block);

        let transform_size = state.transform.size();
        let magnitudes = state.transform.transform(&block);
        let detected = pitch::detect_fundamental(
            magnitudes,
            config.sample_rate,
            transform_size,
            config.min_amplitude,
        );
        let detected_frequency = detected.unwrap_or(0.0);
        let amplitude = tuning::rms_amplitude(&block);
        let verdict = tuning::evaluate(
            &tuning_state.settings,
            &tuning_state.targets,
            amplitude,
            detected_frequency,
        );

        let result = TuningResult {
            detected_frequency,
            cents_offset: verdict.cents_offset,
            amplitude,
            is_in_tune: verdict.is_in_tune,
            timestamp_ms: epoch.elapsed().as_millis() as i64,
            has_valid_note: verdict.has_valid_note,
        };
        *shared.latest.lock().unwrap() = Some(result);

        thread::sleep(CYCLE_PERIOD);
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pure sine at a fixed frequency, no noise, for deterministic checks.
    struct SineSource {
        sample_rate: u32,
        frequency: f64,
        clock: f64,
    }

    impl SineSource {
        fn new(sample_rate: u32, frequency: f64) -> Self {
            Self {
                sample_rate,
                frequency,
                clock: 0.0,
            }
        }
    }

    impl AudioSource for SineSource {
        fn fill_block(&mut self, block: &mut [f32]) {
            let dt = 1.0 / f64::from(self.sample_rate);
            for sample in block.iter_mut() {
                *sample =
                    0.5 * (2.0 * std::f64::consts::PI * self.frequency * self.clock).sin() as f32;
                self.clock += dt;
            }
        }
    }

    struct SilentSource;

    impl AudioSource for SilentSource {
        fn fill_block(&mut self, block: &mut [f32]) {
            block.fill(0.0);
        }
    }

    fn engine_with(source: Box<dyn AudioSource>) -> TunerEngine {
        TunerEngine::new(AudioConfig::default(), source).unwrap()
    }

    /// Polls until the engine publishes a result, with a generous deadline.
    fn poll_result(engine: &TunerEngine) -> TuningResult {
        for _ in 0..500 {
            if let Some(result) = engine.latest_result() {
                return result;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("engine never published a result");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AudioConfig {
            sample_rate: 0,
            ..AudioConfig::default()
        };
        let result = TunerEngine::new(config, Box::new(SilentSource));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_lifecycle_idempotence() {
        let mut engine = engine_with(Box::new(SilentSource));
        assert!(!engine.is_running());

        // Stop before start is a no-op.
        engine.stop();
        engine.stop();

        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.start(), Err(EngineError::AlreadyRunning));

        engine.stop();
        assert!(!engine.is_running());
        engine.stop();
    }

    #[test]
    fn test_engine_restarts_with_the_same_source() {
        let mut engine = engine_with(Box::new(SineSource::new(44100, 110.0)));
        engine.start().unwrap();
        let _ = poll_result(&engine);
        engine.stop();

        engine.start().unwrap();
        let result = poll_result(&engine);
        assert!(result.has_valid_note);
        engine.stop();
    }

    #[test]
    fn test_detects_sine_near_low_a() {
        // 110 Hz quantizes to bin 10 = ~107.67 Hz, which is ~37 cents flat
        // of the A2 string.
        let mut engine = engine_with(Box::new(SineSource::new(44100, 110.0)));
        engine.start().unwrap();
        let result = poll_result(&engine);
        engine.stop();

        assert!(result.has_valid_note);
        let expected = 10.0 * 44100.0 / 4096.0;
        assert!(
            (result.detected_frequency - expected).abs() < 1e-6,
            "detected {} Hz",
            result.detected_frequency
        );
        assert!(result.cents_offset < -30.0 && result.cents_offset > -45.0);
        assert!(!result.is_in_tune);
        assert!(result.amplitude > 0.3);
        assert!(result.timestamp_ms >= 0);
    }

    #[test]
    fn test_result_is_consumed_on_read() {
        let mut engine = engine_with(Box::new(SineSource::new(44100, 110.0)));
        engine.start().unwrap();
        let _ = poll_result(&engine);
        engine.stop();

        // The worker is joined; drain whatever its final cycle published.
        while engine.latest_result().is_some() {}

        // With no writer, consumed means gone.
        assert!(engine.latest_result().is_none());
        assert!(engine.latest_result().is_none());
    }

    #[test]
    fn test_silence_publishes_invalid_result() {
        let mut engine = engine_with(Box::new(SilentSource));
        engine.start().unwrap();
        let result = poll_result(&engine);
        engine.stop();

        assert!(!result.has_valid_note);
        assert!(!result.is_in_tune);
        assert_eq!(result.cents_offset, 0.0);
        assert_eq!(result.detected_frequency, 0.0);
        assert_eq!(result.amplitude, 0.0);
    }

    #[test]
    fn test_update_tuning_validation() {
        let engine = engine_with(Box::new(SilentSource));

        let mut settings = TuningSettings::default();
        settings.tolerance_cents = -1.0;
        assert!(matches!(
            engine.update_tuning(settings, TargetSet::default().strings()),
            Err(EngineError::InvalidSettings(_))
        ));

        let too_many = vec![
            TargetString {
                string_number: 1,
                target_frequency: 100.0,
                note_index: 0,
                octave: 2,
            };
            7
        ];
        assert_eq!(
            engine.update_tuning(TuningSettings::default(), &too_many),
            Err(EngineError::TooManyStrings {
                given: 7,
                capacity: 6
            })
        );
    }

    #[test]
    fn test_updated_settings_reach_the_next_cycle() {
        // Widen the tolerance so the quantized 110 Hz sine counts as in
        // tune against the A2 string.
        let mut engine = engine_with(Box::new(SineSource::new(44100, 110.0)));
        let mut settings = TuningSettings::default();
        settings.tolerance_cents = 50.0;
        engine
            .update_tuning(settings, TargetSet::default().strings())
            .unwrap();

        engine.start().unwrap();
        let result = poll_result(&engine);
        engine.stop();

        assert!(result.has_valid_note);
        assert!(result.is_in_tune, "offset was {}", result.cents_offset);
    }
}
