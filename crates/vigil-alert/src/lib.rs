//! Decision engines of the alert pipeline.
//!
//! [`dedup::DedupEngine`] is the admission point for every raw event: it
//! fingerprints the labels, serializes work per fingerprint through
//! [`locks::FingerprintLocks`], applies the alert state transition and
//! emits advisory [`correlation::CorrelationSignal`]s. Notification-eligible
//! alerts then pass the [`silence::SilenceEngine`], the
//! [`inhibition::InhibitionEngine`] and finally the
//! [`routing::RoutingEngine`], which picks receivers.
//!
//! All engines are CPU-only and never await network I/O.

pub mod correlation;
pub mod dedup;
pub mod error;
pub mod grouping;
pub mod inhibition;
pub mod locks;
pub mod routing;
pub mod silence;
pub mod window;

#[cfg(test)]
mod tests;

pub use dedup::{DedupAction, DedupConfig, DedupEngine, DedupOutcome};
pub use error::{AlertError, Result};
pub use inhibition::InhibitionEngine;
pub use routing::{Resolution, RoutingEngine};
pub use silence::SilenceEngine;
