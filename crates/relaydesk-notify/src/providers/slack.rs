use super::{into_outcome, post_json};
use crate::render::{escape_mrkdwn, headline, quote, reason_emoji};
use crate::settings::ProviderEnvironment;
use crate::utils::{http_client, preview};
use crate::{ProviderAdapter, SendOutcome};
use async_trait::async_trait;
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const MAX_SECTION_CHARS: usize = 2900;
const MAX_REFS: usize = 5;

/// Slack incoming-webhook adapter rendering Block Kit messages.
pub struct SlackAdapter {
    client: reqwest::Client,
    env: Arc<ProviderEnvironment>,
}

impl SlackAdapter {
    pub fn new(env: Arc<ProviderEnvironment>, timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            env,
        })
    }

    fn webhook_url<'a>(&'a self, integration: &'a IntegrationRecord) -> Option<&'a str> {
        integration
            .setting("webhook_url")
            .or(self.env.slack_webhook_url.as_deref())
    }

    pub fn build_payload(event: &EscalationEvent, link: Option<&str>) -> Value {
        let title = format!("{} {}", reason_emoji(event.reason), headline(event));

        let mut fields = vec![
            json!({"type": "mrkdwn", "text": format!("*Reason*\n{}", event.reason.label())}),
            json!({"type": "mrkdwn", "text": format!("*Confidence*\n{}", event.confidence_label())}),
            json!({"type": "mrkdwn", "text": format!("*Conversation*\n`{}`", event.conversation_id)}),
        ];
        if let Some(session) = &event.session_id {
            fields.push(json!({"type": "mrkdwn", "text": format!("*Session*\n`{session}`")}));
        }
        if let Some(feedback) = &event.meta.feedback_id {
            fields.push(json!({"type": "mrkdwn", "text": format!("*Feedback*\n`{feedback}`")}));
        }

        let mut blocks = vec![
            json!({"type": "header", "text": {"type": "plain_text", "text": title, "emoji": true}}),
            json!({"type": "section", "fields": fields}),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Customer asked*\n{}",
                        quote(&escape_mrkdwn(&preview(&event.user_message, MAX_SECTION_CHARS)))
                    )
                }
            }),
        ];

        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Assistant answered*\n{}",
                        quote(&escape_mrkdwn(&preview(answer, MAX_SECTION_CHARS)))
                    )
                }
            }));
        }

        let mut details = Vec::new();
        if !event.meta.keywords.is_empty() {
            details.push(format!("*Matched keywords:* {}", escape_mrkdwn(&event.meta.keywords.join(", "))));
        }
        if let Some(contact) = &event.meta.contact_info {
            details.push(format!("*Contact:* {}", escape_mrkdwn(contact)));
        }
        if !details.is_empty() {
            blocks.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": details.join("\n")}}));
        }

        if !event.refs.is_empty() {
            let sources: Vec<String> = event
                .refs
                .iter()
                .take(MAX_REFS)
                .enumerate()
                .map(|(i, url)| format!("<{}|[{}]>", url, i + 1))
                .collect();
            blocks.push(json!({
                "type": "context",
                "elements": [{"type": "mrkdwn", "text": format!("Sources: {}", sources.join(" "))}]
            }));
        }

        if let Some(link) = link {
            blocks.push(json!({
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": {"type": "plain_text", "text": "Open conversation"},
                    "url": link,
                    "style": "primary"
                }]
            }));
        }

        json!({
            "text": format!("{}: {}", headline(event), preview(&event.user_message, 140)),
            "blocks": blocks,
        })
    }
}

#[async_trait]
impl ProviderAdapter for SlackAdapter {
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome {
        let Some(url) = self.webhook_url(integration) else {
            return SendOutcome::failed("slack webhook not configured");
        };
        let link = self.env.conversation_link(&event.conversation_id);
        let mut payload = Self::build_payload(event, link.as_deref());
        if let Some(channel) = integration.setting("channel") {
            payload["channel"] = Value::String(channel.to_string());
        }

        let result = post_json(&self.client, "slack", url, &payload, None).await;
        into_outcome("slack", result, None, link)
    }

    fn provider(&self) -> Provider {
        Provider::Slack
    }
}
