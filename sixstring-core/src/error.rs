//! Centralized error type for the tuning engine.
//!
//! Every failure in this crate is reported to the caller through
//! [`EngineError`]; nothing here terminates the worker thread or the
//! process. "No new data" and the idempotent stop are not errors and are
//! expressed as `Option`/`()` on the engine surface instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The audio configuration failed validation.
    #[error("invalid audio configuration: {0}")]
    InvalidConfig(&'static str),

    /// The tuning settings failed validation.
    #[error("invalid tuning settings: {0}")]
    InvalidSettings(&'static str),

    /// More target strings were supplied than the fixed capacity allows.
    #[error("{given} target strings exceed the capacity of {capacity}")]
    TooManyStrings { given: usize, capacity: usize },

    /// `start` was called while the background worker is running.
    #[error("capture is already running")]
    AlreadyRunning,

    /// The audio source was lost because a previous worker panicked.
    #[error("audio source is no longer available")]
    SourceLost,
}

pub type Result<T> = std::result::Result<T, EngineError>;
