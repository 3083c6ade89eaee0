use serde::Serialize;
use vigil_common::rules::{Receiver, RoutingRule};
use vigil_common::Labels;

/// Where an alert goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Ids of the rules that contributed receivers, in evaluation order.
    pub matched_rules: Vec<String>,
    pub receivers: Vec<Receiver>,
    /// True when no rule matched and the default receivers were used.
    pub defaulted: bool,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

/// Picks receivers from the routing rule table.
#[derive(Debug, Clone, Default)]
pub struct RoutingEngine {
    default_receivers: Vec<Receiver>,
}

impl RoutingEngine {
    pub fn new(default_receivers: Vec<Receiver>) -> Self {
        Self { default_receivers }
    }

    pub fn default_receivers(&self) -> &[Receiver] {
        &self.default_receivers
    }

    /// First matching rule wins; a rule with `continue_matching` lets
    /// evaluation go on to the next rules. Rules are evaluated in
    /// priority order (descending, ties broken by id) whatever order the
    /// slice is in.
    pub fn resolve(&self, labels: &Labels, rules: &[RoutingRule]) -> Resolution {
        let mut ordered: Vec<&RoutingRule> = rules.iter().filter(|r| r.enabled).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let mut resolution = Resolution::default();
        for rule in ordered {
            if !rule.conditions.matches(labels) {
                continue;
            }
            resolution.matched_rules.push(rule.id.clone());
            for receiver in &rule.receivers {
                if !resolution.receivers.contains(receiver) {
                    resolution.receivers.push(receiver.clone());
                }
            }
            if !rule.continue_matching {
                break;
            }
        }

        if resolution.matched_rules.is_empty() {
            resolution.receivers = self.default_receivers.clone();
            resolution.defaulted = true;
        }
        resolution
    }
}
