use vigil_common::{MatcherError, ValidationError};
use vigil_storage::StorageError;

/// Errors raised by the decision engines.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The incoming event is malformed; it never reached any state.
    #[error("Alert: {0}")]
    Validation(#[from] ValidationError),

    /// A rule or silence carries an unusable matcher.
    #[error("Alert: {0}")]
    Matcher(#[from] MatcherError),

    #[error("Alert: {0}")]
    Storage(#[from] StorageError),

    /// The alert row kept changing underneath us, even after one re-read.
    #[error("Alert: concurrent update conflict on {fingerprint}")]
    Conflict { fingerprint: String },

    #[error("Alert: no alert with fingerprint {0}")]
    NotFound(String),

    /// The requested status change is not allowed from the current status.
    #[error("Alert: cannot {action} an alert that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },
}

impl AlertError {
    /// Conflicts and storage hiccups may succeed when the event is replayed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AlertError::Conflict { .. } | AlertError::Storage(_))
    }
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
