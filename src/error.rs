//! Custom error types for the acquisition core.
//!
//! This module defines the primary error type, `AcqError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of an acquisition session,
//! from serial transport faults to log-file misuse.
//!
//! ## Error Hierarchy
//!
//! `AcqError` is an enum that consolidates the fatal conditions of the core:
//!
//! - **`Transport`**: The serial device could not be opened, read, or
//!   written. Fatal to the current run; surfaced to the caller before any
//!   run header is committed, so the log file is never corrupted by it.
//! - **`Io`**: Wraps standard `std::io::Error`, covering log-file creation
//!   and write failures.
//! - **`Config`**: Wraps errors from the `config` crate (file parsing or
//!   format issues in the settings layers).
//! - **`Configuration`**: Semantic errors in settings that parse cleanly but
//!   are logically invalid (e.g. a zero run count), caught by validation.
//! - **`InvalidRunIndex`**: A run index outside the declared range — a
//!   programming error, surfaced immediately and never retried.
//! - **`UndefinedSymbol`**: A required protocol constant is missing from the
//!   definitions file. Raised at startup, before any device I/O.
//! - **`NotInitialized`**: A log operation was attempted before the file
//!   header was written — a usage error in the calling sequence.
//! - **`Parse`**: A definitions-file value that cannot be coerced to the
//!   requested numeric form.
//!
//! None of these are silently retried by the core; the only built-in
//! resilience is the caller-driven run-restart overwrite in the run log.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AcqResult<T> = std::result::Result<T, AcqError>;

/// Fatal conditions surfaced by the acquisition core.
#[derive(Error, Debug)]
pub enum AcqError {
    /// Serial transport could not be opened, read, or written.
    #[error("Transport error: {0}")]
    Transport(String),

    /// File system failure on the run log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file parsing or layering failure.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings parsed cleanly but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Run index outside the range declared at log creation.
    #[error("Invalid run index {index} (log declares {run_count} runs)")]
    InvalidRunIndex {
        /// The offending index.
        index: usize,
        /// The declared run count.
        run_count: usize,
    },

    /// A required protocol constant is absent from the definitions file.
    #[error("Undefined protocol symbol '{0}'")]
    UndefinedSymbol(String),

    /// Log operation attempted before the file header was written.
    #[error("Run log not initialized: write the file header first")]
    NotInitialized,

    /// A definitions-file value could not be coerced to the requested form.
    #[error("Unparseable constant value: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcqError::Transport("port vanished".to_string());
        assert_eq!(err.to_string(), "Transport error: port vanished");
    }

    #[test]
    fn test_invalid_run_index_display() {
        let err = AcqError::InvalidRunIndex {
            index: 7,
            run_count: 5,
        };
        assert!(err.to_string().contains("run index 7"));
        assert!(err.to_string().contains("5 runs"));
    }

    #[test]
    fn test_undefined_symbol_display() {
        let err = AcqError::UndefinedSymbol("CMD_START".to_string());
        assert!(err.to_string().contains("CMD_START"));
    }
}
