use super::{into_outcome, post_json};
use crate::error::{NotifyError, Result};
use crate::render::{accent_hex, escape_html, headline};
use crate::settings::ProviderEnvironment;
use crate::utils::http_client;
use crate::{ProviderAdapter, SendOutcome};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use relaydesk_common::types::{EscalationEvent, IntegrationRecord, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SMTP_PORT: u16 = 587;

/// Rendered escalation email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Email adapter. Sends through a Resend-compatible HTTP API by default, or
/// over SMTP when the integration carries an `smtp_host`.
pub struct EmailAdapter {
    client: reqwest::Client,
    env: Arc<ProviderEnvironment>,
    timeout: Duration,
}

impl EmailAdapter {
    pub fn new(env: Arc<ProviderEnvironment>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            env,
            timeout,
        })
    }

    /// Recipients from `to` (array or comma list), falling back to `email`.
    pub fn recipients(integration: &IntegrationRecord) -> Vec<String> {
        let from_array = [&integration.config, &integration.credentials]
            .into_iter()
            .filter_map(|bag| bag.get("to").and_then(Value::as_array))
            .flat_map(|list| list.iter().filter_map(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if !from_array.is_empty() {
            return from_array;
        }

        integration
            .setting("to")
            .or_else(|| integration.setting("email"))
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn render(event: &EscalationEvent, link: Option<&str>) -> EmailContent {
        let subject = format!(
            "[Support] {} - conversation {}",
            headline(event),
            event.conversation_id
        );

        let mut text = format!(
            "{}\n\nReason: {}\nConfidence: {}\nConversation: {}\n",
            headline(event),
            event.reason.label(),
            event.confidence_label(),
            event.conversation_id
        );
        if let Some(feedback_id) = &event.meta.feedback_id {
            text.push_str(&format!("Feedback: {feedback_id}\n"));
        }
        if let Some(contact) = &event.meta.contact_info {
            text.push_str(&format!("Contact: {contact}\n"));
        }
        text.push_str(&format!("\nCustomer asked:\n{}\n", event.user_message.trim()));
        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            text.push_str(&format!("\nAssistant answered:\n{}\n", answer.trim()));
        }
        if !event.refs.is_empty() {
            text.push_str("\nSources:\n");
            for url in &event.refs {
                text.push_str(&format!("- {url}\n"));
            }
        }
        if let Some(link) = link {
            text.push_str(&format!("\nOpen conversation: {link}\n"));
        }

        let mut html = format!(
            "<div style=\"font-family:sans-serif;max-width:640px\">\
             <h2 style=\"color:{color}\">{title}</h2>\
             <table cellpadding=\"4\">\
             <tr><td><b>Reason</b></td><td>{reason}</td></tr>\
             <tr><td><b>Confidence</b></td><td>{confidence}</td></tr>\
             <tr><td><b>Conversation</b></td><td>{conversation}</td></tr>",
            color = accent_hex(Some(event.reason), event.confidence),
            title = escape_html(&headline(event)),
            reason = event.reason.label(),
            confidence = event.confidence_label(),
            conversation = escape_html(&event.conversation_id),
        );
        if let Some(feedback_id) = &event.meta.feedback_id {
            html.push_str(&format!(
                "<tr><td><b>Feedback</b></td><td>{}</td></tr>",
                escape_html(feedback_id)
            ));
        }
        if let Some(contact) = &event.meta.contact_info {
            html.push_str(&format!(
                "<tr><td><b>Contact</b></td><td>{}</td></tr>",
                escape_html(contact)
            ));
        }
        html.push_str("</table>");
        html.push_str(&format!(
            "<h3>Customer asked</h3><blockquote>{}</blockquote>",
            escape_html(event.user_message.trim())
        ));
        if let Some(answer) = event.assistant_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            html.push_str(&format!(
                "<h3>Assistant answered</h3><blockquote>{}</blockquote>",
                escape_html(answer.trim())
            ));
        }
        if !event.refs.is_empty() {
            html.push_str("<h3>Sources</h3><ol>");
            for url in &event.refs {
                let url = escape_html(url);
                html.push_str(&format!("<li><a href=\"{url}\">{url}</a></li>"));
            }
            html.push_str("</ol>");
        }
        if let Some(link) = link {
            html.push_str(&format!(
                "<p><a href=\"{}\">Open conversation</a></p>",
                escape_html(link)
            ));
        }
        html.push_str("</div>");

        EmailContent { subject, html, text }
    }

    async fn send_resend(
        &self,
        integration: &IntegrationRecord,
        from: &str,
        to: &[String],
        content: &EmailContent,
    ) -> Result<super::ProviderResponse> {
        let api_key = integration
            .setting("api_key")
            .or(self.env.resend_api_key.as_deref())
            .ok_or_else(|| NotifyError::NotConfigured("email api key".to_string()))?;
        let payload = json!({
            "from": from,
            "to": to,
            "subject": content.subject,
            "html": content.html,
            "text": content.text,
        });
        let url = format!("{}/emails", self.env.resend_base());
        let auth = format!("Bearer {api_key}");
        post_json(&self.client, "email", &url, &payload, Some(&auth)).await
    }

    async fn send_smtp(
        &self,
        integration: &IntegrationRecord,
        smtp_host: &str,
        from: &str,
        to: &[String],
        content: &EmailContent,
    ) -> Result<()> {
        let port = integration
            .config
            .get("smtp_port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .or_else(|| integration.setting("smtp_port").and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_SMTP_PORT);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(port)
            .timeout(Some(self.timeout));
        if let (Some(user), Some(pass)) = (
            integration.setting("smtp_username"),
            integration.setting("smtp_password"),
        ) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }
        let transport = builder.build();

        let from: Mailbox = from
            .parse()
            .map_err(|e| NotifyError::Smtp(format!("invalid sender address: {e}")))?;
        let mut message = Message::builder().from(from).subject(&content.subject);
        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| NotifyError::Smtp(format!("invalid recipient {recipient}: {e}")))?;
            message = message.to(mailbox);
        }
        let message = message
            .multipart(MultiPart::alternative_plain_html(
                content.text.clone(),
                content.html.clone(),
            ))
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for EmailAdapter {
    async fn send_escalation(
        &self,
        event: &EscalationEvent,
        integration: &IntegrationRecord,
    ) -> SendOutcome {
        let to = Self::recipients(integration);
        if to.is_empty() {
            return SendOutcome::failed("email recipient not configured");
        }
        let Some(from) = integration
            .setting("from")
            .or(self.env.support_from_email.as_deref())
        else {
            return SendOutcome::failed("email sender not configured");
        };

        let link = self.env.conversation_link(&event.conversation_id);
        let content = Self::render(event, link.as_deref());

        match integration.setting("smtp_host") {
            Some(host) => match self.send_smtp(integration, host, from, &to, &content).await {
                Ok(()) => {
                    tracing::debug!(recipients = to.len(), "Escalation email sent over SMTP");
                    SendOutcome::delivered(None, link)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Escalation email failed");
                    SendOutcome {
                        url: link,
                        ..SendOutcome::failed(e.to_string())
                    }
                }
            },
            None => {
                let result = self.send_resend(integration, from, &to, &content).await;
                into_outcome("email", result, Some("id"), link)
            }
        }
    }

    fn provider(&self) -> Provider {
        Provider::Email
    }
}
