//! Escalation delivery to human-notification providers.
//!
//! Each provider (Slack, Microsoft Teams, Discord, Zoom, email) has a
//! [`ProviderAdapter`] that turns an [`EscalationEvent`] into the
//! provider-native payload and performs exactly one outbound call.
//! Adapters are looked up through the [`registry::ProviderRegistry`].

pub mod error;
pub mod providers;
pub mod registry;
pub mod render;
pub mod settings;
pub mod signature;
pub mod utils;


use async_trait::async_trait;
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde::Serialize;

/// Outcome of a single adapter call. Adapters never return `Err`: network
/// failures, non-2xx responses and missing configuration all come back as
/// `ok == false` with an `error` string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendOutcome {
    pub ok: bool,
    /// Provider-side message id, when the provider returns one.
    pub id: Option<String>,
    /// Dashboard link to the escalated conversation.
    pub url: Option<String>,
    pub error: Option<String>,
    pub http_status: Option<u16>,
}

impl SendOutcome {
    pub fn delivered(id: Option<String>, url: Option<String>) -> Self {
        Self {
            ok: true,
            id,
            url,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A notification provider that can deliver an escalation.
///
/// Implementations resolve their webhook URL or API credential from the
/// integration record first and the process environment defaults second.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Formats and sends the escalation through this provider.
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome;

    /// The provider this adapter serves.
    fn provider(&self) -> Provider;
}
