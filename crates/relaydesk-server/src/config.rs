use relaydesk_escalation::dispatch::DispatchSettings;
use relaydesk_escalation::retry::RetryPolicy;
use relaydesk_escalation::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL. When absent, a SQLite file under `data_dir` is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            data_dir: default_data_dir(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => format!(
                "sqlite://{}/relaydesk.db?mode=rwc",
                self.data_dir.trim_end_matches('/')
            ),
        }
    }

    /// Connection URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        let Some((scheme, rest)) = url.split_once("://") else {
            return url;
        };
        match rest.split_once('@') {
            Some((userinfo, host)) => {
                let user = userinfo.split(':').next().unwrap_or("");
                format!("{scheme}://{user}:***@{host}")
            }
            None => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_outbox_initial_delay_secs")]
    pub outbox_initial_delay_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            outbox_initial_delay_secs: default_outbox_initial_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Runs the background outbox and webhook sweeps.
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_retry_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_retry_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            tick_secs: default_retry_tick_secs(),
            batch_size: default_retry_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs.max(self.base_delay_secs)),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

fn default_dedup_window_secs() -> u64 {
    60
}

fn default_outbox_initial_delay_secs() -> u64 {
    120
}

fn default_retry_enabled() -> bool {
    true
}

fn default_retry_tick_secs() -> u64 {
    30
}

fn default_retry_batch_size() -> u64 {
    50
}

fn default_max_attempts() -> i32 {
    5
}

fn default_base_delay_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database: DatabaseConfig::default(),
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            dispatch: DispatchSettings {
                provider_timeout: Duration::from_secs(self.dispatch.provider_timeout_secs),
                outbox_initial_delay: Duration::from_secs(self.dispatch.outbox_initial_delay_secs),
            },
            webhook_timeout: Duration::from_secs(self.dispatch.webhook_timeout_secs),
            dedup_window: Duration::from_secs(self.dispatch.dedup_window_secs),
            retry: self.retry.enabled.then(|| self.retry.policy()),
            retry_batch_size: self.retry.batch_size,
        }
    }
}

// ---- Seed file types (used by the `init-tenant` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSeedFile {
    pub tenant_id: String,
    #[serde(default)]
    pub integrations: Vec<SeedIntegration>,
    #[serde(default)]
    pub rules: Vec<SeedRule>,
    #[serde(default)]
    pub webhook_endpoints: Vec<SeedWebhookEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedIntegration {
    pub name: String,
    pub provider: String,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Integration names, resolved to ids at seed time.
    #[serde(default)]
    pub integrations: Vec<String>,
    /// Raw destination entries, appended as-is.
    #[serde(default)]
    pub destinations: Vec<relaydesk_common::types::Destination>,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedWebhookEndpoint {
    pub url: String,
    #[serde(default = "default_seed_events")]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

fn default_seed_enabled() -> bool {
    true
}

fn default_seed_events() -> Vec<String> {
    vec![relaydesk_common::types::ESCALATION_TRIGGERED.to_string()]
}
