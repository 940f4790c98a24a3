//! Error taxonomy for the runtime.
//!
//! Cycle-scope failures are converted to failed cycle results by the
//! orchestrator; the loop itself never aborts on them. `ContractViolation`
//! and `InvalidTransition` indicate programming bugs and surface loudly.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PsycheError>;

#[derive(Debug, Error)]
pub enum PsycheError {
    /// Content failed substrate validation. No write occurred.
    #[error("invalid content for {file}: {reason}")]
    InvalidContent { file: &'static str, reason: String },

    /// Wrong-mode writer use or similar API misuse.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A loop state transition that is not in the state diagram.
    #[error("invalid transition: {from} -> {requested}")]
    InvalidTransition { from: &'static str, requested: &'static str },

    /// Path does not exist. Kept separate from `Io` so callers can branch.
    #[error("{}: not found", path.display())]
    NotFound { path: PathBuf },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON extraction or schema mismatch on model output.
    #[error("failed to parse model output: {0}")]
    Parse(String),

    /// Total session deadline fired.
    #[error("Session timed out after {0}ms")]
    Timeout(u64),

    /// Idle deadline fired (no message for the configured window).
    #[error("Session produced no output for {0}ms")]
    IdleTimeout(u64),

    /// Provider rate limit detected in a failure summary.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Role/file permission matrix denied the operation. No write occurred.
    #[error("{role} may not {op} {file}")]
    PermissionDenied {
        role: &'static str,
        op: &'static str,
        file: &'static str,
    },
}

impl PsycheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PsycheError::NotFound { .. })
    }

    /// Map an I/O error to the taxonomy, preserving path context and
    /// keeping "not found" distinguishable.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            PsycheError::NotFound { path }
        } else {
            PsycheError::Io { path, source }
        }
    }
}
