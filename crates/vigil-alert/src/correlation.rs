use crate::window::SlidingWindow;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use vigil_common::{Fingerprint, Labels};

/// Advisory link between alerts that share a correlation label value
/// within the correlation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationSignal {
    pub label: String,
    pub value: String,
    pub fingerprint: Fingerprint,
    pub related: Vec<Fingerprint>,
}

/// Key: (label name, label value)
type WindowKey = (String, String);

pub struct Correlator {
    labels: Vec<String>,
    span: Duration,
    windows: Mutex<HashMap<WindowKey, SlidingWindow>>,
}

impl Correlator {
    pub fn new(labels: Vec<String>, span: Duration) -> Self {
        Self {
            labels,
            span,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Records `fingerprint` under each configured label it carries and
    /// returns one signal per label whose window already holds other
    /// fingerprints.
    pub fn observe(
        &self,
        labels: &Labels,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Vec<CorrelationSignal> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut signals = Vec::new();

        for name in &self.labels {
            let Some(value) = labels.get(name) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let window = windows
                .entry((name.clone(), value.clone()))
                .or_insert_with(|| SlidingWindow::new(self.span));
            window.push(now, fingerprint.clone());

            let related = window.others(fingerprint);
            if !related.is_empty() {
                tracing::debug!(
                    fingerprint = %fingerprint.short(),
                    label = %name,
                    value = %value,
                    related = related.len(),
                    "Correlated alert"
                );
                signals.push(CorrelationSignal {
                    label: name.clone(),
                    value: value.clone(),
                    fingerprint: fingerprint.clone(),
                    related,
                });
            }
        }
        signals
    }

    /// Drops windows that have gone quiet. Returns the number removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = windows.len();
        windows.retain(|_, window| {
            window.evict(now);
            !window.is_empty()
        });
        before - windows.len()
    }
}
