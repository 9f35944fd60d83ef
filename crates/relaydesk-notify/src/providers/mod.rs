//! Built-in provider adapters.

pub mod discord;
pub mod email;
pub mod slack;
pub mod teams;
pub mod zoom;

use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::SendOutcome;
use serde_json::Value;

/// A 2xx response from a provider endpoint.
#[derive(Debug)]
pub(crate) struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    /// Reads a string or numeric field from a JSON response body.
    pub fn json_field(&self, key: &str) -> Option<String> {
        let body: Value = serde_json::from_str(&self.body).ok()?;
        match body.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// POSTs a JSON payload, mapping non-2xx statuses to [`NotifyError::Api`].
pub(crate) async fn post_json(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    payload: &Value,
    authorization: Option<&str>,
) -> Result<ProviderResponse> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(payload);
    if let Some(auth) = authorization {
        request = request.header("Authorization", auth);
    }

    let resp = request.send().await?;
    let status = resp.status();
    let body = match resp.text().await {
        Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
        Err(e) => format!("[Failed to read response body: {e}]"),
    };

    if status.is_success() {
        Ok(ProviderResponse {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(NotifyError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Flattens a provider call into a [`SendOutcome`], logging failures.
pub(crate) fn into_outcome(
    provider: &str,
    result: Result<ProviderResponse>,
    id_key: Option<&str>,
    link: Option<String>,
) -> SendOutcome {
    match result {
        Ok(resp) => {
            let id = id_key.and_then(|key| resp.json_field(key));
            tracing::debug!(provider, status = resp.status, "Escalation delivered");
            SendOutcome {
                http_status: Some(resp.status),
                ..SendOutcome::delivered(id, link)
            }
        }
        Err(e) => {
            tracing::warn!(provider, error = %e, "Escalation delivery failed");
            SendOutcome {
                http_status: e.status(),
                url: link,
                ..SendOutcome::failed(e.to_string())
            }
        }
    }
}
