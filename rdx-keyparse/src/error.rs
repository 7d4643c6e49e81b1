//! Error types for the keyparse engine.
//!
//! A pattern that does not match is not an error: matchers report that with
//! `Outcome::Failed`. The types here cover the boundaries around the core,
//! namely startup configuration, the event source and the effect dispatcher.

use thiserror::Error;

/// Startup-time problems. Fatal: the daemon reports them and exits non-zero.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("no input device matched pattern {pattern:?}")]
    NoDeviceMatched {
        pattern: String,
        /// Display names of every device that was available.
        available: Vec<String>,
    },

    #[error("multiple input devices matched pattern {pattern:?}: {}", .candidates.join(", "))]
    AmbiguousDevice {
        pattern: String,
        /// Display names of every matching device.
        candidates: Vec<String>,
    },

    #[error("invalid device pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("unknown key name: {0}")]
    UnknownKey(String),

    #[error("rule {0:?} has an empty pattern")]
    EmptyPattern(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// The event source stopped producing events. Fatal to the engine loop.
#[derive(Error, Debug)]
pub enum SourceFault {
    #[error("event source IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event source closed")]
    Closed,
}

/// An effect could not be performed. Logged, never fatal to matching.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to emit synthetic event: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn shell action {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
