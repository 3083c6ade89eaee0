use crate::NotificationMessage;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use vigil_common::rules::DEFAULT_TEMPLATE;
use vigil_common::Alert;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Title and body with `{{...}}` placeholders.
///
/// Supported placeholders: `{{alertname}}`, `{{severity}}`, `{{status}}`,
/// `{{fingerprint}}`, `{{starts_at}}`, `{{labels}}`, `{{label.NAME}}` and
/// `{{annotation.NAME}}`. A missing label or annotation renders empty; an
/// unknown placeholder is left as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub title: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    fn expand(text: &str, alert: &Alert) -> String {
        placeholder()
            .replace_all(text, |caps: &Captures<'_>| {
                let key = &caps[1];
                if let Some(name) = key.strip_prefix("label.") {
                    return alert.labels.get(name).cloned().unwrap_or_default();
                }
                if let Some(name) = key.strip_prefix("annotation.") {
                    return alert.annotations.get(name).cloned().unwrap_or_default();
                }
                match key {
                    "alertname" => alert.alertname().to_string(),
                    "severity" => alert.severity.to_string(),
                    "status" => alert.status.to_string(),
                    "fingerprint" => alert.fingerprint.to_string(),
                    "starts_at" => alert.starts_at.to_rfc3339(),
                    "labels" => vigil_common::types::format_labels(&alert.labels),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    pub fn render(&self, alert: &Alert, channel_id: &str) -> NotificationMessage {
        NotificationMessage {
            channel_id: channel_id.to_string(),
            title: Self::expand(&self.title, alert),
            body: Self::expand(&self.body, alert),
            fingerprint: alert.fingerprint.clone(),
            alertname: alert.alertname().to_string(),
            severity: alert.severity,
            status: alert.status,
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.starts_at,
        }
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(
            "[{{severity}}] {{alertname}} is {{status}}",
            "{{annotation.summary}}\nlabels: {{labels}}\nsince: {{starts_at}}\nfingerprint: {{fingerprint}}",
        )
    }
}

/// Named templates. A receiver naming an unknown template gets `default`.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, MessageTemplate>,
}

impl TemplateSet {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(DEFAULT_TEMPLATE.to_string(), MessageTemplate::default());
        Self { templates }
    }

    pub fn insert(&mut self, name: impl Into<String>, template: MessageTemplate) {
        self.templates.insert(name.into(), template);
    }

    pub fn get(&self, name: &str) -> &MessageTemplate {
        match self.templates.get(name) {
            Some(template) => template,
            None => {
                if name != DEFAULT_TEMPLATE {
                    tracing::debug!(template = %name, "Unknown template, using default");
                }
                self.templates
                    .get(DEFAULT_TEMPLATE)
                    .unwrap_or_else(|| default_template())
            }
        }
    }

    pub fn render(&self, name: &str, alert: &Alert, channel_id: &str) -> NotificationMessage {
        self.get(name).render(alert, channel_id)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, MessageTemplate)> for TemplateSet {
    fn from_iter<I: IntoIterator<Item = (String, MessageTemplate)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, template) in iter {
            set.insert(name, template);
        }
        set
    }
}

fn default_template() -> &'static MessageTemplate {
    static DEFAULT: OnceLock<MessageTemplate> = OnceLock::new();
    DEFAULT.get_or_init(MessageTemplate::default)
}
