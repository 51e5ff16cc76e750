// THEORY:
// Errors are split by who can cause them. A `FrameError` is raised by a single
// pipeline invocation and is fatal for that frame only: the caller skips the
// frame and every piece of persistent state (hysteresis counters, offset
// history) stays exactly as it was. A `ConfigError` can only happen at start-up
// while constants are being loaded and validated.
//
// "Nothing seen" is deliberately NOT an error. It travels through the system as
// a normal value (`Classification::NoTarget`, `AnalyzedTarget::NoDetection`).

use thiserror::Error;

/// Reasons a frame is rejected before any stage runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is {actual:?} but the session expects {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
    #[error("frame has no pixels")]
    Empty,
}

/// Failures while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
