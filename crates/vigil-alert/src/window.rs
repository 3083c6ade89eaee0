use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use vigil_common::Fingerprint;

/// Time-bounded list of fingerprints seen under one correlation key.
///
/// Entries are kept in observation order; a fingerprint appears at most
/// once, at the position of its latest sighting.
pub struct SlidingWindow {
    span: Duration,
    entries: VecDeque<(DateTime<Utc>, Fingerprint)>,
}

impl SlidingWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, at: DateTime<Utc>, fingerprint: Fingerprint) {
        self.entries.retain(|(_, fp)| *fp != fingerprint);
        self.entries.push_back((at, fingerprint));
        self.evict(at);
    }

    pub fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        while let Some((at, _)) = self.entries.front() {
            if *at < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Fingerprints in the window other than `fingerprint`, oldest first.
    pub fn others(&self, fingerprint: &Fingerprint) -> Vec<Fingerprint> {
        self.entries
            .iter()
            .filter(|(_, fp)| fp != fingerprint)
            .map(|(_, fp)| fp.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
