use super::{into_outcome, post_json};
use crate::render::{accent_color, headline};
use crate::settings::ProviderEnvironment;
use crate::utils::{http_client, preview};
use crate::{ProviderAdapter, SendOutcome};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

// Discord embed limits
const MAX_DESCRIPTION: usize = 4000;
const MAX_FIELD_VALUE: usize = 1000;

/// Discord webhook adapter posting a single colour-coded embed.
pub struct DiscordAdapter {
    client: reqwest::Client,
    env: Arc<ProviderEnvironment>,
}

impl DiscordAdapter {
    pub fn new(env: Arc<ProviderEnvironment>, timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            env,
        })
    }

    fn webhook_url<'a>(&'a self, integration: &'a IntegrationRecord) -> Option<&'a str> {
        integration
            .setting("webhook_url")
            .or(self.env.discord_webhook_url.as_deref())
    }

    /// Asks Discord to answer with the created message so its id can be reported.
    fn with_wait(url: &str) -> String {
        if url.contains("wait=") {
            url.to_string()
        } else if url.contains('?') {
            format!("{url}&wait=true")
        } else {
            format!("{url}?wait=true")
        }
    }

    pub fn build_payload(event: &EscalationEvent, link: Option<&str>) -> Value {
        let mut fields = vec![
            json!({"name": "Reason", "value": event.reason.label(), "inline": true}),
            json!({"name": "Confidence", "value": event.confidence_label(), "inline": true}),
            json!({"name": "Conversation", "value": format!("`{}`", event.conversation_id), "inline": true}),
        ];
        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            fields.push(json!({
                "name": "Assistant answered",
                "value": preview(answer, MAX_FIELD_VALUE),
                "inline": false
            }));
        }
        if !event.meta.keywords.is_empty() {
            fields.push(json!({
                "name": "Keywords",
                "value": preview(&event.meta.keywords.join(", "), MAX_FIELD_VALUE),
                "inline": false
            }));
        }
        if !event.refs.is_empty() {
            fields.push(json!({
                "name": "Sources",
                "value": preview(&event.refs.join("\n"), MAX_FIELD_VALUE),
                "inline": false
            }));
        }

        let mut embed = json!({
            "title": headline(event),
            "description": preview(&event.user_message, MAX_DESCRIPTION),
            "color": accent_color(Some(event.reason), event.confidence),
            "fields": fields,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Some(link) = link {
            embed["url"] = Value::String(link.to_string());
        }

        json!({
            "username": "Support Escalations",
            "embeds": [embed],
        })
    }
}

#[async_trait]
impl ProviderAdapter for DiscordAdapter {
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome {
        let Some(url) = self.webhook_url(integration) else {
            return SendOutcome::failed("discord webhook not configured");
        };
        let link = self.env.conversation_link(&event.conversation_id);
        let payload = Self::build_payload(event, link.as_deref());

        let result = post_json(&self.client, "discord", &Self::with_wait(url), &payload, None).await;
        into_outcome("discord", result, Some("id"), link)
    }

    fn provider(&self) -> Provider {
        Provider::Discord
    }
}
