//! # Sixstring - Terminal Guitar Tuner
//!
//! This binary is a thin polling frontend over the `sixstring-core` engine.
//! It starts the background processing loop, polls the published results a
//! few times a second, and prints a live tuning readout.
//!
//! ## Usage
//! - Default: runs against the built-in synthetic signal (a wavering low E)
//! - `--live`: captures from the default input device instead
//! - `--settings <file>`: JSON overrides for the tuning settings
//! - `--duration <seconds>`: how long to run before stopping

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use sixstring_core::audio::{AudioConfig, AudioSource, CaptureSource, SyntheticSource};
use sixstring_core::engine::TunerEngine;
use sixstring_core::tuning::{self, TargetSet, TuningSettings};
use sixstring_core::TuningResult;

/// Interval between result polls; a little slower than the engine's cycle,
/// so most polls find fresh data.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "sixstring", about = "Real-time guitar tuner")]
struct Args {
    /// Capture from the default input device instead of the synthetic signal
    #[arg(long)]
    live: bool,

    /// Path to a JSON file with tuning settings overrides
    #[arg(long)]
    settings: Option<PathBuf>,

    /// How long to run before stopping, in seconds
    #[arg(long, default_value_t = 10)]
    duration: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    eprintln!("[MAIN] Starting sixstring tuner...");

    let mut config = AudioConfig::default();
    let source: Box<dyn AudioSource> = if args.live {
        let capture = CaptureSource::open(config.buffer_size)
            .context("failed to open the audio input device")?;
        config.sample_rate = capture.sample_rate();
        Box::new(capture)
    } else {
        eprintln!("[MAIN] No --live flag; using the synthetic low-E signal");
        Box::new(SyntheticSource::new(config.sample_rate))
    };

    let mut engine = TunerEngine::new(config, source)?;

    let targets = TargetSet::default();
    if let Some(path) = &args.settings {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: TuningSettings =
            serde_json::from_str(&text).context("settings file is not valid JSON")?;
        engine.update_tuning(settings, targets.strings())?;
        eprintln!("[MAIN] Loaded tuning settings from {}", path.display());
    }

    engine.start()?;
    eprintln!(
        "[MAIN] Engine running at {} Hz, blocks of {} samples",
        engine.config().sample_rate,
        engine.config().buffer_size
    );

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    while Instant::now() < deadline {
        if let Some(result) = engine.latest_result() {
            print_readout(&result, &targets);
        }
        thread::sleep(POLL_INTERVAL);
    }

    engine.stop();
    eprintln!("[MAIN] Done");
    Ok(())
}

/// One line of readout per fresh result.
fn print_readout(result: &TuningResult, targets: &TargetSet) {
    if !result.has_valid_note {
        println!("      --        (no note)");
        return;
    }

    let name = tuning::closest_target(result.detected_frequency, targets.strings())
        .map(|target| target.note_name())
        .unwrap_or_else(|| "?".to_string());
    let direction = if result.is_in_tune {
        "in tune"
    } else if result.cents_offset > 0.0 {
        "sharp"
    } else {
        "flat"
    };

    println!(
        "{:8.2} Hz  {:>3}  {:+7.1} cents  {}",
        result.detected_frequency, name, result.cents_offset, direction
    );
}
