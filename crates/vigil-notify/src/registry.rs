use crate::error::{NotifyError, Result};
use crate::NotificationProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use vigil_common::channel::{ChannelKind, NotificationChannel};

/// Maps each [`ChannelKind`] to the provider that delivers it.
///
/// Built once at startup and shared read-only afterwards.
///
/// # Examples
///
/// ```
/// use vigil_common::channel::ChannelKind;
/// use vigil_notify::registry::ProviderRegistry;
///
/// let registry = ProviderRegistry::default();
/// assert!(registry.has_provider(ChannelKind::Webhook));
/// assert!(!registry.has_provider(ChannelKind::Email));
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<ChannelKind, Arc<dyn NotificationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Registers `provider` under its own kind, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn NotificationProvider>) {
        let kind = provider.kind();
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: ChannelKind) -> Result<Arc<dyn NotificationProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(NotifyError::UnsupportedChannel(kind))
    }

    pub fn has_provider(&self, kind: ChannelKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.providers.keys().copied().collect()
    }

    /// Checks that `channel` has a provider and a usable configuration.
    pub fn validate(&self, channel: &NotificationChannel) -> Result<()> {
        if !self.has_provider(channel.kind()) {
            return Err(NotifyError::UnsupportedChannel(channel.kind()));
        }
        channel
            .config
            .validate()
            .map_err(NotifyError::InvalidConfig)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::channels::WebhookProvider::new()));
        registry
    }
}
