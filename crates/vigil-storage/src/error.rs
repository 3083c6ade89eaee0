/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use vigil_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "silence",
///     id: "s-99".to_string(),
/// };
/// assert!(err.to_string().contains("silence"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic concurrency check failed on an alert upsert.
    #[error("Storage: version conflict on {fingerprint} (expected {expected}, found {actual})")]
    VersionConflict {
        fingerprint: String,
        expected: u64,
        actual: u64,
    },

    /// A record failed validation before being stored.
    #[error("Storage: invalid {entity}: {reason}")]
    Invalid { entity: &'static str, reason: String },

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
