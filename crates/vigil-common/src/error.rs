/// Errors raised while building label matchers.
///
/// Matchers are compiled when a rule or silence is loaded, so these errors
/// surface at load time and never while an alert is being matched.
///
/// # Examples
///
/// ```rust
/// use vigil_common::matcher::Matcher;
///
/// let err = Matcher::parse("job=~(unclosed").unwrap_err();
/// assert!(err.to_string().contains("job"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatcherError {
    /// The regex of a `=~` / `!~` matcher does not compile.
    #[error("Matcher: invalid regex for label '{name}': {reason}")]
    InvalidRegex { name: String, reason: String },

    /// The label name is empty or contains characters outside `[a-zA-Z0-9_]`.
    #[error("Matcher: invalid label name '{0}'")]
    InvalidLabelName(String),

    /// The textual matcher could not be parsed.
    #[error("Matcher: cannot parse '{0}'")]
    Syntax(String),
}

/// Reasons an incoming alert event is rejected before it reaches any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Validation: alert has no labels")]
    EmptyLabels,

    #[error("Validation: required label '{0}' is missing or empty")]
    MissingLabel(&'static str),

    #[error("Validation: invalid label name '{0}'")]
    InvalidLabelName(String),

    #[error("Validation: '{0}' is not a 64-character lowercase hex fingerprint")]
    InvalidFingerprint(String),

    #[error("Validation: ends_at precedes starts_at")]
    InvertedTimeRange,

    #[error("Validation: {0}")]
    Other(String),
}
