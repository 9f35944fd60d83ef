use crate::error::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

pub mod conversation;
pub mod escalation;
pub mod integration;
pub mod notification;
pub mod outbox;
pub mod webhook;

pub use conversation::ConversationExchange;
pub use escalation::{EscalationDeliveryRow, EscalationRow};
pub use integration::{EscalationRuleRow, NewEscalationRule, NewIntegration};
pub use notification::{NewNotification, NotificationRow};
pub use outbox::{NewOutboxEntry, OutboxEntry, OutboxStatus};
pub use webhook::{DeliveryAttempt, NewWebhookEndpoint, WebhookDeliveryRow};

/// Unified access to the relaydesk database.
///
/// Every method is an `async fn` issuing single-row statements; there are no
/// multi-statement transactions, so callers tolerate partial completion.
#[derive(Clone)]
pub struct DeskStore {
    pub(crate) db: DatabaseConnection,
}

impl DeskStore {
    /// Connects and runs pending migrations.
    ///
    /// SQLite example: `sqlite:///var/lib/relaydesk/relaydesk.db?mode=rwc`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!(db_url = %db_url, "Initialized desk store");

        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Parses a JSON TEXT column, treating blank or malformed text as the default.
pub(crate) fn parse_json_column<T>(column: &'static str, raw: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    if raw.trim().is_empty() {
        return T::default();
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(column, error = %e, "Ignoring malformed JSON column");
            T::default()
        }
    }
}
