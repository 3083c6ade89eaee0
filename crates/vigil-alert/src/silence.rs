use chrono::{DateTime, Utc};
use vigil_common::rules::Silence;
use vigil_common::Labels;

/// Stateless silence check. Silences are passed in on every call so a
/// silence created a moment ago applies to the very next transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilenceEngine;

impl SilenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// First active silence whose matchers all match `labels`.
    pub fn find_silence<'a>(
        &self,
        labels: &Labels,
        silences: &'a [Silence],
        now: DateTime<Utc>,
    ) -> Option<&'a Silence> {
        silences
            .iter()
            .find(|s| s.is_active(now) && s.matches(labels))
    }

    pub fn is_silenced(&self, labels: &Labels, silences: &[Silence], now: DateTime<Utc>) -> bool {
        self.find_silence(labels, silences, now).is_some()
    }
}
