//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! Nothing in here is ever raised into the profiled program. Collection
//! hot paths absorb their failures locally; only setup, transport and
//! dump/load errors surface to a caller.

use thiserror::Error;

/// Errors raised when a collector registers with its event source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("Event source is busy: {0}")]
    SourceBusy(String),

    #[error("Event source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to spawn sampler thread: {0}")]
    SpawnFailed(String),
}

/// Errors raised by the profiler lifecycle controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfilerError {
    #[error("Profiler already stopped")]
    Finished,

    #[error("Profiler is not running")]
    NotRunning,

    #[error("Collector registration failed: {0}")]
    Collector(#[from] CollectorError),
}

/// Errors raised when combining statistics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("Cannot combine {left} statistics with {right} statistics")]
    ModeMismatch { left: String, right: String },
}

/// Errors that can occur on a viewer connection
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Inconsistent stream: {0}")]
    Stats(#[from] StatsError),

    #[error("Connection closed")]
    Closed,
}

/// Errors that can occur during flamegraph generation
#[derive(Error, Debug)]
pub enum FlamegraphError {
    #[error("Empty stack data")]
    EmptyStacks,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Flamegraph rendering failed: {0}")]
    Render(String),

    #[error("Rendered flamegraph is not valid UTF-8")]
    InvalidSvg(#[from] std::string::FromUtf8Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Unsupported dump version: {0}")]
    UnsupportedVersion(String),
}
