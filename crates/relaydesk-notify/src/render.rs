//! Shared presentation helpers: urgency colours and text escaping.

use relaydesk_common::types::{EscalationEvent, EscalationReason};

pub const AMBER: u32 = 0xF5_9E_0B;
pub const RED: u32 = 0xEF_44_44;
pub const BLUE: u32 = 0x3B_82_F6;
pub const GREEN: u32 = 0x10_B9_81;
pub const DARK_RED: u32 = 0x99_1B_1B;
pub const INDIGO: u32 = 0x63_66_F1;

/// Accent colour for an escalation.
///
/// A known reason always decides the colour. Without one, very low
/// confidence (< 0.3) is shown red and everything else neutral indigo.
///
/// # Examples
///
/// ```
/// use relaydesk_common::types::EscalationReason;
/// use relaydesk_notify::render::{accent_color, AMBER, INDIGO, RED};
///
/// assert_eq!(accent_color(Some(EscalationReason::LowConfidence), Some(0.1)), AMBER);
/// assert_eq!(accent_color(None, Some(0.1)), RED);
/// assert_eq!(accent_color(None, None), INDIGO);
/// ```
pub fn accent_color(reason: Option<EscalationReason>, confidence: Option<f64>) -> u32 {
    match reason {
        Some(EscalationReason::LowConfidence) => AMBER,
        Some(EscalationReason::Restricted) => RED,
        Some(EscalationReason::Handoff) => BLUE,
        Some(EscalationReason::UserRequest) => GREEN,
        Some(EscalationReason::FallbackError) => DARK_RED,
        None => match confidence {
            Some(c) if c < 0.3 => RED,
            _ => INDIGO,
        },
    }
}

/// `#rrggbb` form of [`accent_color`].
pub fn accent_hex(reason: Option<EscalationReason>, confidence: Option<f64>) -> String {
    format!("#{:06X}", accent_color(reason, confidence))
}

/// Adaptive Card text colour names for each reason.
pub fn adaptive_card_color(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::LowConfidence => "warning",
        EscalationReason::Restricted | EscalationReason::FallbackError => "attention",
        EscalationReason::Handoff => "accent",
        EscalationReason::UserRequest => "good",
    }
}

pub fn reason_emoji(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::LowConfidence => ":warning:",
        EscalationReason::Restricted => ":no_entry:",
        EscalationReason::Handoff => ":raising_hand:",
        EscalationReason::UserRequest => ":wave:",
        EscalationReason::FallbackError => ":rotating_light:",
    }
}

/// Title line shared by every provider.
pub fn headline(event: &EscalationEvent) -> String {
    if event.is_feedback() {
        "Feedback escalation".to_string()
    } else {
        format!("Escalation: {}", event.reason.label())
    }
}

/// Escapes the three characters Slack treats as control sequences in mrkdwn.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Prefixes every line with `>` so chat providers render a block quote.
pub fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!(">{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
