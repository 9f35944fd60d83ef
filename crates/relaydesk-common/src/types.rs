use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type emitted to tenant webhook endpoints when a conversation is escalated.
pub const ESCALATION_TRIGGERED: &str = "escalation.triggered";

/// Why a conversation was handed to a human.
///
/// # Examples
///
/// ```
/// use relaydesk_common::types::{EscalationReason, Severity};
///
/// let reason: EscalationReason = "low_confidence".parse().unwrap();
/// assert_eq!(reason, EscalationReason::LowConfidence);
/// assert_eq!(reason.to_string(), "low_confidence");
/// assert_eq!(reason.severity(), Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    Restricted,
    Handoff,
    UserRequest,
    FallbackError,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::LowConfidence => "low_confidence",
            EscalationReason::Restricted => "restricted",
            EscalationReason::Handoff => "handoff",
            EscalationReason::UserRequest => "user_request",
            EscalationReason::FallbackError => "fallback_error",
        }
    }

    /// Human-readable label used in message titles.
    pub fn label(&self) -> &'static str {
        match self {
            EscalationReason::LowConfidence => "Low confidence answer",
            EscalationReason::Restricted => "Restricted topic",
            EscalationReason::Handoff => "Handoff requested",
            EscalationReason::UserRequest => "User asked for a human",
            EscalationReason::FallbackError => "Assistant error",
        }
    }

    /// Severity of the internal notification raised for this reason.
    pub fn severity(&self) -> Severity {
        match self {
            EscalationReason::LowConfidence => Severity::Warning,
            EscalationReason::Restricted => Severity::Critical,
            EscalationReason::Handoff => Severity::Warning,
            EscalationReason::UserRequest => Severity::Info,
            EscalationReason::FallbackError => Severity::Critical,
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EscalationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low_confidence" => Ok(EscalationReason::LowConfidence),
            "restricted" => Ok(EscalationReason::Restricted),
            "handoff" => Ok(EscalationReason::Handoff),
            "user_request" => Ok(EscalationReason::UserRequest),
            "fallback_error" => Ok(EscalationReason::FallbackError),
            _ => Err(format!("unknown escalation reason: {s}")),
        }
    }
}

/// Notification severity level, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Human-notification channels an escalation can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Slack,
    Teams,
    Discord,
    Zoom,
    Email,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Slack,
        Provider::Teams,
        Provider::Discord,
        Provider::Zoom,
        Provider::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Slack => "slack",
            Provider::Teams => "teams",
            Provider::Discord => "discord",
            Provider::Zoom => "zoom",
            Provider::Email => "email",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slack" => Ok(Provider::Slack),
            "teams" | "msteams" => Ok(Provider::Teams),
            "discord" => Ok(Provider::Discord),
            "zoom" => Ok(Provider::Zoom),
            "email" => Ok(Provider::Email),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Disabled,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Active => "active",
            IntegrationStatus::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for IntegrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(IntegrationStatus::Active),
            "disabled" | "inactive" => Ok(IntegrationStatus::Disabled),
            _ => Err(format!("unknown integration status: {s}")),
        }
    }
}

/// A tenant-owned connection to a notification provider.
///
/// `provider` stays a plain string because tenants may have rows for
/// providers this build has no adapter for; those surface as
/// `provider_not_registered` at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub id: String,
    pub tenant_id: String,
    pub provider: String,
    pub name: String,
    pub status: IntegrationStatus,
    #[serde(default)]
    pub credentials: Value,
    #[serde(default)]
    pub config: Value,
}

impl IntegrationRecord {
    /// Looks up a non-empty string setting, preferring `config` over `credentials`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaydesk_common::types::{IntegrationRecord, IntegrationStatus};
    /// use serde_json::json;
    ///
    /// let record = IntegrationRecord {
    ///     id: "i1".into(),
    ///     tenant_id: "t1".into(),
    ///     provider: "slack".into(),
    ///     name: "Support".into(),
    ///     status: IntegrationStatus::Active,
    ///     credentials: json!({"webhook_url": "https://hooks.example/creds"}),
    ///     config: json!({"webhook_url": ""}),
    /// };
    /// assert_eq!(record.setting("webhook_url"), Some("https://hooks.example/creds"));
    /// assert_eq!(record.setting("channel"), None);
    /// ```
    pub fn setting(&self, key: &str) -> Option<&str> {
        [&self.config, &self.credentials]
            .into_iter()
            .filter_map(|bag| bag.get(key).and_then(Value::as_str))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.status == IntegrationStatus::Active
    }
}

/// A routing target for an escalation, as stored on rules or passed by callers.
///
/// Three JSON shapes are accepted: `{"integrationId": …}`,
/// `{"directEmail": …, "provider": "email"}` and
/// `{"destination": {"type": …, "email": …, "integrationId": …}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Integration {
        #[serde(rename = "integrationId", alias = "integration_id")]
        integration_id: String,
    },
    DirectEmail {
        #[serde(rename = "directEmail", alias = "direct_email")]
        direct_email: String,
        #[serde(default = "default_direct_provider")]
        provider: String,
    },
    Descriptor { destination: DestinationDescriptor },
}

fn default_direct_provider() -> String {
    Provider::Email.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        rename = "integrationId",
        alias = "integration_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub integration_id: Option<String>,
}

impl Destination {
    pub fn integration(id: impl Into<String>) -> Self {
        Destination::Integration {
            integration_id: id.into(),
        }
    }

    pub fn integration_id(&self) -> Option<&str> {
        match self {
            Destination::Integration { integration_id } => Some(integration_id),
            Destination::DirectEmail { .. } => None,
            Destination::Descriptor { destination } => destination.integration_id.as_deref(),
        }
    }

    /// True when this destination names the given integration, either by id
    /// or by provider key.
    pub fn matches_integration(&self, id: &str, provider: &str) -> bool {
        match self {
            Destination::Integration { integration_id } => integration_id == id,
            Destination::DirectEmail {
                provider: direct_provider,
                ..
            } => direct_provider.eq_ignore_ascii_case(provider),
            Destination::Descriptor { destination } => {
                destination.integration_id.as_deref() == Some(id)
                    || destination.kind.eq_ignore_ascii_case(provider)
            }
        }
    }
}

/// Known keys of the escalation metadata bag; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationMeta {
    #[serde(default, alias = "contactInfo", skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, alias = "siteId", skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, alias = "feedbackId", skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single escalation trigger, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub tenant_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_message: String,
    #[serde(default)]
    pub assistant_answer: Option<String>,
    /// Model confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Source URLs cited by the assistant, in answer order.
    #[serde(default)]
    pub refs: Vec<String>,
    pub reason: EscalationReason,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub meta: EscalationMeta,
}

impl EscalationEvent {
    /// Confidence rendered as a whole percentage, or `"n/a"`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relaydesk_common::types::*;
    /// let mut event = EscalationEvent {
    ///     tenant_id: "t1".into(),
    ///     conversation_id: "c1".into(),
    ///     session_id: None,
    ///     user_message: "help".into(),
    ///     assistant_answer: None,
    ///     confidence: Some(0.234),
    ///     refs: vec![],
    ///     reason: EscalationReason::LowConfidence,
    ///     rule_id: None,
    ///     destinations: vec![],
    ///     meta: EscalationMeta::default(),
    /// };
    /// assert_eq!(event.confidence_label(), "23%");
    /// event.confidence = None;
    /// assert_eq!(event.confidence_label(), "n/a");
    /// ```
    pub fn confidence_label(&self) -> String {
        match self.confidence {
            Some(c) => format!("{:.0}%", c.clamp(0.0, 1.0) * 100.0),
            None => "n/a".to_string(),
        }
    }

    pub fn is_feedback(&self) -> bool {
        self.meta.feedback_id.is_some()
    }
}

/// Where a webhook endpoint's deliveries go, resolved once when the
/// endpoint row is loaded.
///
/// # Examples
///
/// ```
/// use relaydesk_common::types::EndpointTarget;
///
/// assert_eq!(
///     EndpointTarget::parse("internal://integration/slack/42"),
///     EndpointTarget::Internal { provider: "slack".into(), integration_id: "42".into() },
/// );
/// assert!(matches!(EndpointTarget::parse("https://example.com/hook"), EndpointTarget::Http { .. }));
/// assert!(matches!(EndpointTarget::parse("internal://bogus"), EndpointTarget::Invalid { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointTarget {
    Http { url: String },
    Internal { provider: String, integration_id: String },
    Invalid { reason: String },
}

impl EndpointTarget {
    pub const INTERNAL_SCHEME: &'static str = "internal://";

    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        if let Some(rest) = url.strip_prefix(Self::INTERNAL_SCHEME) {
            let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
            return match parts.as_slice() {
                ["integration", provider, id] if !provider.is_empty() && !id.is_empty() => {
                    EndpointTarget::Internal {
                        provider: provider.to_lowercase(),
                        integration_id: (*id).to_string(),
                    }
                }
                _ => EndpointTarget::Invalid {
                    reason: format!("malformed internal webhook url: {url}"),
                },
            };
        }
        if url.starts_with("https://") || url.starts_with("http://") {
            EndpointTarget::Http {
                url: url.to_string(),
            }
        } else {
            EndpointTarget::Invalid {
                reason: format!("unsupported webhook url scheme: {url}"),
            }
        }
    }
}

/// A tenant-registered receiver for one or more event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub tenant_id: String,
    pub url: String,
    pub target: EndpointTarget,
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub is_active: bool,
    pub failure_count: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e == event_type || e == "*")
    }
}

/// An event fanned out to tenant webhook endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub tenant_id: String,
    pub data: Value,
}

/// JSON body POSTed to webhook receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: String,
    pub tenant_id: String,
    pub idempotency_key: String,
}

impl WebhookPayload {
    /// Builds a payload stamped with the current time and a fresh idempotency key.
    pub fn new(event: &WebhookEvent) -> Self {
        Self {
            event_type: event.event_type.clone(),
            data: event.data.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            tenant_id: event.tenant_id.clone(),
            idempotency_key: crate::id::idempotency_key(),
        }
    }
}

/// Per-destination outcome of an escalation dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeliveryResult {
    pub provider: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
}

impl DeliveryResult {
    pub fn failed(
        provider: impl Into<String>,
        integration_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            ok: false,
            id: None,
            url: None,
            error: Some(error.into()),
            integration_id,
        }
    }
}
