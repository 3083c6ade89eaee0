//! Shared domain types for the vigil alert pipeline.
//!
//! Everything that more than one pipeline stage needs lives here: the
//! [`types::Alert`] record and its raw [`types::IncomingAlert`] form, the
//! label [`fingerprint`] and [`matcher`] library, rule and channel models,
//! and the fire-and-forget [`metrics::MetricsSink`] used by the engines.

pub mod channel;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod matcher;
pub mod metrics;
pub mod rules;
pub mod types;

pub use error::{MatcherError, ValidationError};
pub use fingerprint::Fingerprint;
pub use matcher::{MatchOp, Matcher, MatcherSet};
pub use types::{Alert, AlertGroup, AlertStatus, IncomingAlert, IncomingStatus, Labels, Severity};
