use crate::providers::{
    discord::DiscordAdapter, email::EmailAdapter, slack::SlackAdapter, teams::TeamsAdapter,
    zoom::ZoomAdapter,
};
use crate::settings::ProviderEnvironment;
use crate::ProviderAdapter;
use relaydesk_common::types::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lookup from [`Provider`] to the adapter that delivers through it.
///
/// Integration rows carry the provider as a free-form string, so lookups by
/// key can miss; callers report that as `provider_not_registered` for the
/// single destination instead of failing the batch.
///
/// # Examples
///
/// ```
/// use relaydesk_notify::registry::ProviderRegistry;
/// use relaydesk_notify::settings::ProviderEnvironment;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let registry = ProviderRegistry::with_defaults(
///     Arc::new(ProviderEnvironment::default()),
///     Duration::from_secs(15),
/// )
/// .unwrap();
/// assert!(registry.resolve("slack").is_some());
/// assert!(registry.resolve("Teams").is_some());
/// assert!(registry.resolve("pagerduty").is_none());
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registers all built-in adapters sharing one set of environment defaults.
    pub fn with_defaults(
        env: Arc<ProviderEnvironment>,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(SlackAdapter::new(env.clone(), timeout)?));
        registry.register(Arc::new(TeamsAdapter::new(env.clone(), timeout)?));
        registry.register(Arc::new(DiscordAdapter::new(env.clone(), timeout)?));
        registry.register(Arc::new(ZoomAdapter::new(env.clone(), timeout)?));
        registry.register(Arc::new(EmailAdapter::new(env, timeout)?));
        Ok(registry)
    }

    /// Adds or replaces the adapter for its provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Parses a provider key and returns its adapter, if both exist.
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn ProviderAdapter>> {
        key.parse::<Provider>().ok().and_then(|p| self.get(p))
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.adapters.keys().copied().collect();
        providers.sort();
        providers
    }
}
