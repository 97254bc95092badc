//! Unified error type for dovimux.
//!
//! All crates funnel their failures into [`Error`]. Per-item failures are
//! caught at the task boundary and logged; only [`Error::Canceled`] aborts a
//! run, which is why it gets its own variant and the [`Error::is_canceled`]
//! check instead of riding along as a tool failure.

use std::path::PathBuf;

/// Unified error type covering all failure modes in dovimux.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external tool binary could not be launched at all.
    #[error("failed to launch {tool}: {message}")]
    Launch {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable description of the spawn failure.
        message: String,
    },

    /// An external tool ran but exited with a non-zero status.
    #[error("{tool} exited with {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// A tool reported success but its expected output file is absent.
    #[error("{tool} claimed success but produced no output at {}", path.display())]
    MissingOutput {
        /// Name of the tool.
        tool: String,
        /// The output path that should have existed.
        path: PathBuf,
    },

    /// Byte transfer between pipeline stages failed.
    #[error("stream transfer failed: {message}")]
    Transfer {
        /// Human-readable description of the I/O failure.
        message: String,
    },

    /// The expected final output path is already occupied.
    ///
    /// Treated as evidence of a race with a concurrent scan or stale catalog
    /// state; the item is reported and skipped, never overwritten.
    #[error("output already exists at {}", path.display())]
    Race {
        /// The occupied path.
        path: PathBuf,
    },

    /// The operation was cancelled via the cooperative cancellation signal.
    ///
    /// A distinguished outcome, not a failure: tasks stop the remaining queue
    /// but do not log it as an error.
    #[error("cancelled")]
    Canceled,

    /// Input data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The external catalog reported a failure.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Media probing failed.
    #[error("probe error: {0}")]
    Probe(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether this error is the distinguished cancellation outcome.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Convenience constructor for [`Error::Launch`].
    pub fn launch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Launch {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, code: Option<i32>) -> Self {
        Error::Tool {
            tool: tool.into(),
            code,
        }
    }

    /// Convenience constructor for [`Error::MissingOutput`].
    pub fn missing_output(tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::MissingOutput {
            tool: tool.into(),
            path: path.into(),
        }
    }

    /// Convenience constructor for [`Error::Transfer`].
    pub fn transfer(message: impl Into<String>) -> Self {
        Error::Transfer {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Race`].
    pub fn race(path: impl Into<PathBuf>) -> Self {
        Error::Race { path: path.into() }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
