use super::{into_outcome, post_json};
use crate::render::headline;
use crate::settings::ProviderEnvironment;
use crate::utils::{http_client, preview};
use crate::{ProviderAdapter, SendOutcome};
use async_trait::async_trait;
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const MAX_MESSAGE_CHARS: usize = 1500;

/// Zoom Team Chat adapter posting a chatbot ("robot") message.
pub struct ZoomAdapter {
    client: reqwest::Client,
    env: Arc<ProviderEnvironment>,
}

impl ZoomAdapter {
    pub fn new(env: Arc<ProviderEnvironment>, timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            env,
        })
    }

    fn webhook_url<'a>(&'a self, integration: &'a IntegrationRecord) -> Option<&'a str> {
        integration
            .setting("webhook_url")
            .or(self.env.zoom_webhook_url.as_deref())
    }

    fn bot_token<'a>(&'a self, integration: &'a IntegrationRecord) -> Option<&'a str> {
        integration
            .setting("bot_token")
            .or(self.env.zoom_bot_token.as_deref())
    }

    fn head(event: &EscalationEvent) -> Value {
        match &event.meta.feedback_id {
            Some(feedback_id) => json!({
                "text": "Feedback escalation",
                "sub_head": {"text": format!("Feedback {feedback_id}")}
            }),
            None => json!({
                "text": headline(event),
                "sub_head": {"text": format!("Confidence {}", event.confidence_label())}
            }),
        }
    }

    pub fn build_payload(
        event: &EscalationEvent,
        integration: &IntegrationRecord,
        account_id: Option<&str>,
        link: Option<&str>,
    ) -> Value {
        let mut items = vec![
            json!({"key": "Reason", "value": event.reason.label()}),
            json!({"key": "Conversation", "value": event.conversation_id}),
        ];
        if let Some(feedback_id) = &event.meta.feedback_id {
            items.push(json!({"key": "Feedback", "value": feedback_id}));
        }
        if let Some(contact) = &event.meta.contact_info {
            items.push(json!({"key": "Contact", "value": contact}));
        }
        if !event.meta.keywords.is_empty() {
            items.push(json!({"key": "Keywords", "value": event.meta.keywords.join(", ")}));
        }

        let mut body = vec![json!({
            "type": "message",
            "text": format!("Customer: {}", preview(&event.user_message, MAX_MESSAGE_CHARS))
        })];
        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            body.push(json!({
                "type": "message",
                "text": format!("Assistant: {}", preview(answer, MAX_MESSAGE_CHARS))
            }));
        }
        body.push(json!({"type": "fields", "items": items}));
        if let Some(link) = link {
            body.push(json!({"type": "message", "text": "Open conversation", "link": link}));
        }

        let mut payload = json!({
            "content": {
                "head": Self::head(event),
                "body": body,
            }
        });
        for key in ["robot_jid", "to_jid"] {
            if let Some(value) = integration.setting(key) {
                payload[key] = Value::String(value.to_string());
            }
        }
        if let Some(account_id) = account_id {
            payload["account_id"] = Value::String(account_id.to_string());
        }
        payload
    }
}

#[async_trait]
impl ProviderAdapter for ZoomAdapter {
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome {
        let Some(url) = self.webhook_url(integration) else {
            return SendOutcome::failed("zoom webhook not configured");
        };
        let account_id = integration
            .setting("account_id")
            .or(self.env.zoom_account_id.as_deref());
        let link = self.env.conversation_link(&event.conversation_id);
        let payload = Self::build_payload(event, integration, account_id, link.as_deref());

        let result = post_json(
            &self.client,
            "zoom",
            url,
            &payload,
            self.bot_token(integration),
        )
        .await;

        // Zoom answers with `message_id` on the chat API and `id` on some webhook relays
        let id_key = match &result {
            Ok(resp) if resp.json_field("message_id").is_some() => "message_id",
            _ => "id",
        };
        into_outcome("zoom", result, Some(id_key), link)
    }

    fn provider(&self) -> Provider {
        Provider::Zoom
    }
}
