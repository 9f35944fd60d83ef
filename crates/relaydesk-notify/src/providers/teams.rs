use super::{into_outcome, post_json};
use crate::render::{adaptive_card_color, headline};
use crate::settings::ProviderEnvironment;
use crate::utils::{http_client, preview};
use crate::{ProviderAdapter, SendOutcome};
use async_trait::async_trait;
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const MAX_TEXT_CHARS: usize = 2000;

/// Microsoft Teams incoming-webhook adapter posting an Adaptive Card 1.2.
pub struct TeamsAdapter {
    client: reqwest::Client,
    env: Arc<ProviderEnvironment>,
}

impl TeamsAdapter {
    pub fn new(env: Arc<ProviderEnvironment>, timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            env,
        })
    }

    fn webhook_url<'a>(&'a self, integration: &'a IntegrationRecord) -> Option<&'a str> {
        integration
            .setting("webhook_url")
            .or(self.env.teams_webhook_url.as_deref())
    }

    pub fn build_payload(event: &EscalationEvent, link: Option<&str>) -> Value {
        let mut facts = vec![
            json!({"title": "Reason", "value": event.reason.label()}),
            json!({"title": "Confidence", "value": event.confidence_label()}),
            json!({"title": "Conversation", "value": event.conversation_id}),
        ];
        if let Some(session) = &event.session_id {
            facts.push(json!({"title": "Session", "value": session}));
        }
        if !event.meta.keywords.is_empty() {
            facts.push(json!({"title": "Keywords", "value": event.meta.keywords.join(", ")}));
        }
        if let Some(contact) = &event.meta.contact_info {
            facts.push(json!({"title": "Contact", "value": contact}));
        }

        let mut body = vec![
            json!({
                "type": "TextBlock",
                "size": "Large",
                "weight": "Bolder",
                "text": headline(event),
                "color": adaptive_card_color(event.reason),
                "wrap": true
            }),
            json!({"type": "FactSet", "facts": facts}),
            json!({"type": "TextBlock", "text": "**Customer asked**", "wrap": true}),
            json!({"type": "TextBlock", "text": preview(&event.user_message, MAX_TEXT_CHARS), "wrap": true}),
        ];

        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            body.push(json!({"type": "TextBlock", "text": "**Assistant answered**", "wrap": true}));
            body.push(json!({
                "type": "TextBlock",
                "text": preview(answer, MAX_TEXT_CHARS),
                "wrap": true,
                "isSubtle": true
            }));
        }

        if !event.refs.is_empty() {
            let sources: Vec<String> = event
                .refs
                .iter()
                .enumerate()
                .map(|(i, url)| format!("[{}]({})", i + 1, url))
                .collect();
            body.push(json!({
                "type": "TextBlock",
                "text": format!("Sources: {}", sources.join(" ")),
                "wrap": true,
                "size": "Small"
            }));
        }

        let actions: Vec<Value> = link
            .map(|url| json!({"type": "Action.OpenUrl", "title": "Open conversation", "url": url}))
            .into_iter()
            .collect();

        json!({
            "type": "message",
            "attachments": [{
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.2",
                    "body": body,
                    "actions": actions
                }
            }]
        })
    }
}

#[async_trait]
impl ProviderAdapter for TeamsAdapter {
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome {
        let Some(url) = self.webhook_url(integration) else {
            return SendOutcome::failed("teams webhook not configured");
        };
        let link = self.env.conversation_link(&event.conversation_id);
        let payload = Self::build_payload(event, link.as_deref());

        let result = post_json(&self.client, "teams", url, &payload, None).await;
        into_outcome("teams", result, None, link)
    }

    fn provider(&self) -> Provider {
        Provider::Teams
    }
}
