use vigil_common::channel::ChannelKind;

/// Errors that can occur while dispatching a notification.
///
/// # Examples
///
/// ```rust
/// use vigil_notify::error::NotifyError;
///
/// let err = NotifyError::Transient("gateway timeout".to_string());
/// assert!(err.is_retryable());
/// assert!(!NotifyError::Cancelled.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// No provider is registered for the channel kind.
    #[error("Notify: no provider for channel type '{0}'")]
    UnsupportedChannel(ChannelKind),

    #[error("Notify: channel '{0}' not found")]
    ChannelNotFound(String),

    #[error("Notify: channel '{0}' is disabled")]
    ChannelDisabled(String),

    /// The endpoint rejected our credentials.
    #[error("Notify: unauthorized by {service}: status={status}")]
    Unauthorized { service: String, status: u16 },

    /// An HTTP request failed before a response arrived.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// A failure that may clear up on its own (5xx, timeout, refused connection).
    #[error("Notify: transient failure: {0}")]
    Transient(String),

    #[error("Notify: circuit open for channel '{0}'")]
    CircuitOpen(String),

    #[error("Notify: delivery cancelled")]
    Cancelled,

    #[error("Notify: gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<NotifyError>,
    },

    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Transient(_) => true,
            NotifyError::Http(e) => e.is_timeout() || e.is_connect(),
            NotifyError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Outcome label used for metrics and history.
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::InvalidConfig(_) => "invalid_config",
            NotifyError::UnsupportedChannel(_) => "unsupported_channel",
            NotifyError::ChannelNotFound(_) => "channel_not_found",
            NotifyError::ChannelDisabled(_) => "channel_disabled",
            NotifyError::Unauthorized { .. } => "unauthorized",
            NotifyError::Http(_) => "http",
            NotifyError::ApiError { .. } => "api_error",
            NotifyError::Transient(_) => "transient",
            NotifyError::CircuitOpen(_) => "circuit_open",
            NotifyError::Cancelled => "cancelled",
            NotifyError::Exhausted { .. } => "exhausted",
            NotifyError::Json(_) => "json",
        }
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
