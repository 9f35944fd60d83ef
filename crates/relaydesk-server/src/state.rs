use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use relaydesk_escalation::Pipeline;
use relaydesk_storage::DeskStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: DeskStore,
    pub pipeline: Pipeline,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
