//! Utility functions for provider adapters

use std::sync::OnceLock;
use std::time::Duration;

/// Maximum length for request/response body stored in database
pub const MAX_BODY_LENGTH: usize = 4000;

/// Truncate a string to at most `max_len` bytes, snapping back to a char
/// boundary so multi-byte text never splits.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Shorten text to `max_chars` characters, ending with an ellipsis when cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn ensure_crypto_provider() {
    static PROVIDER_INIT: OnceLock<()> = OnceLock::new();
    PROVIDER_INIT.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Builds the outbound HTTP client shared by an adapter.
pub fn http_client(timeout: Duration) -> crate::error::Result<reqwest::Client> {
    ensure_crypto_provider();
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("relaydesk/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
