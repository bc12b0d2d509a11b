//! Error types for the conformance runtime and harness

use thiserror::Error;

/// Errors raised by the emulated runtime, memory layer, and configuration.
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Kernel launch error: {0}")]
    Launch(String),

    #[error("Device {from} cannot access memory of device {to}")]
    PeerAccess { from: usize, to: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, ConformanceError>;

/// Build a [`ConformanceError::Runtime`] from a format string.
#[macro_export]
macro_rules! runtime_error {
    ($($arg:tt)*) => {
        $crate::error::ConformanceError::Runtime(format!($($arg)*))
    };
}

/// Build a [`ConformanceError::Memory`] from a format string.
#[macro_export]
macro_rules! memory_error {
    ($($arg:tt)*) => {
        $crate::error::ConformanceError::Memory(format!($($arg)*))
    };
}

/// Build a [`ConformanceError::Launch`] from a format string.
#[macro_export]
macro_rules! launch_error {
    ($($arg:tt)*) => {
        $crate::error::ConformanceError::Launch(format!($($arg)*))
    };
}
