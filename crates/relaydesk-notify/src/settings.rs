//! Process-level provider defaults and escalation fallbacks.
//!
//! Both are read from the environment once at startup and passed into the
//! adapters and the dispatch engine explicitly, so nothing in the delivery
//! path consults `std::env` directly.

pub const SUPPORT_FALLBACK_TO_EMAIL: &str = "SUPPORT_FALLBACK_TO_EMAIL";
pub const SUPPORT_FROM_EMAIL: &str = "SUPPORT_FROM_EMAIL";
pub const SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const TEAMS_WEBHOOK_URL: &str = "TEAMS_WEBHOOK_URL";
pub const DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ZOOM_WEBHOOK_URL: &str = "ZOOM_WEBHOOK_URL";
pub const ZOOM_ACCOUNT_ID: &str = "ZOOM_ACCOUNT_ID";
pub const ZOOM_BOT_TOKEN: &str = "ZOOM_BOT_TOKEN";
pub const SITE_URL: &str = "SITE_URL";
pub const RESEND_API_KEY: &str = "RESEND_API_KEY";
pub const RESEND_API_BASE: &str = "RESEND_API_BASE";

const DEFAULT_RESEND_API_BASE: &str = "https://api.resend.com";

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Provider credentials used when an integration record does not carry its own.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnvironment {
    pub slack_webhook_url: Option<String>,
    pub teams_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub zoom_webhook_url: Option<String>,
    pub zoom_account_id: Option<String>,
    pub zoom_bot_token: Option<String>,
    pub resend_api_key: Option<String>,
    pub resend_api_base: Option<String>,
    pub support_from_email: Option<String>,
    pub site_url: Option<String>,
}

impl ProviderEnvironment {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the defaults from an arbitrary key lookup; blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            slack_webhook_url: non_empty(lookup(SLACK_WEBHOOK_URL)),
            teams_webhook_url: non_empty(lookup(TEAMS_WEBHOOK_URL)),
            discord_webhook_url: non_empty(lookup(DISCORD_WEBHOOK_URL)),
            zoom_webhook_url: non_empty(lookup(ZOOM_WEBHOOK_URL)),
            zoom_account_id: non_empty(lookup(ZOOM_ACCOUNT_ID)),
            zoom_bot_token: non_empty(lookup(ZOOM_BOT_TOKEN)),
            resend_api_key: non_empty(lookup(RESEND_API_KEY)),
            resend_api_base: non_empty(lookup(RESEND_API_BASE)),
            support_from_email: non_empty(lookup(SUPPORT_FROM_EMAIL)),
            site_url: non_empty(lookup(SITE_URL)),
        }
    }

    pub fn resend_base(&self) -> &str {
        self.resend_api_base
            .as_deref()
            .unwrap_or(DEFAULT_RESEND_API_BASE)
            .trim_end_matches('/')
    }

    /// Dashboard link for a conversation, when `SITE_URL` is configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaydesk_notify::settings::ProviderEnvironment;
    ///
    /// let env = ProviderEnvironment {
    ///     site_url: Some("https://app.example.com/".into()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(
    ///     env.conversation_link("c1").as_deref(),
    ///     Some("https://app.example.com/dashboard/conversations/c1")
    /// );
    /// ```
    pub fn conversation_link(&self, conversation_id: &str) -> Option<String> {
        self.site_url.as_deref().map(|base| {
            format!(
                "{}/dashboard/conversations/{}",
                base.trim_end_matches('/'),
                conversation_id
            )
        })
    }
}

/// Last-resort destinations used when a tenant has nothing configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackConfig {
    pub email: Option<String>,
    pub slack_webhook_url: Option<String>,
}

impl FallbackConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            email: non_empty(lookup(SUPPORT_FALLBACK_TO_EMAIL)),
            slack_webhook_url: non_empty(lookup(SLACK_WEBHOOK_URL)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.slack_webhook_url.is_none()
    }
}
