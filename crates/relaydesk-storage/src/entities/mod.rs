pub mod conversation;
pub mod escalation;
pub mod escalation_delivery;
pub mod escalation_rule;
pub mod integration;
pub mod integration_outbox;
pub mod message;
pub mod notification;
pub mod webhook_delivery;
pub mod webhook_endpoint;
