//! Domain types shared by every relaydesk crate: escalation events,
//! routing destinations, integration and webhook endpoint records, and the
//! wire payload delivered to tenant webhook receivers.

pub mod id;
pub mod types;
