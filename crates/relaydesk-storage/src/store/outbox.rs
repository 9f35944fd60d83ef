use crate::error::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::integration_outbox::{self, Column as OutCol, Entity as OutEntity};
use crate::store::DeskStore;

/// Lifecycle of an outbox entry: `pending` until a resend succeeds (`sent`)
/// or the attempt budget runs out (`dead`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Dead => "dead",
        }
    }
}

/// A provider send waiting for the retry sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OutboxEntry {
    pub id: String,
    pub tenant_id: String,
    pub provider: String,
    pub integration_id: String,
    /// The original escalation event.
    #[schema(value_type = Object)]
    pub payload: Value,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub tenant_id: String,
    pub provider: String,
    pub integration_id: String,
    pub payload: Value,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
}

fn model_to_entry(m: integration_outbox::Model) -> OutboxEntry {
    let payload = serde_json::from_str(&m.payload).unwrap_or_else(|e| {
        tracing::warn!(outbox_id = %m.id, error = %e, "Outbox payload is not valid JSON");
        Value::Null
    });
    OutboxEntry {
        id: m.id,
        tenant_id: m.tenant_id,
        provider: m.provider,
        integration_id: m.integration_id,
        payload,
        status: m.status,
        attempts: m.attempts,
        next_attempt_at: m.next_attempt_at.with_timezone(&Utc),
        last_error: m.last_error,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl DeskStore {
    pub async fn enqueue_outbox(&self, new: &NewOutboxEntry) -> Result<OutboxEntry> {
        let now = Utc::now().fixed_offset();
        let am = integration_outbox::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(new.tenant_id.clone()),
            provider: Set(new.provider.clone()),
            integration_id: Set(new.integration_id.clone()),
            payload: Set(serde_json::to_string(&new.payload)?),
            status: Set(OutboxStatus::Pending.as_str().to_string()),
            attempts: Set(0),
            next_attempt_at: Set(new.next_attempt_at.fixed_offset()),
            last_error: Set(new.last_error.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_entry(model))
    }

    /// Pending entries whose next attempt is due, oldest first.
    pub async fn list_due_outbox(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<OutboxEntry>> {
        let rows = OutEntity::find()
            .filter(OutCol::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(OutCol::NextAttemptAt.lte(now.fixed_offset()))
            .order_by(OutCol::NextAttemptAt, Order::Asc)
            .limit(limit)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_entry).collect())
    }

    pub async fn mark_outbox_sent(&self, id: &str) -> Result<()> {
        self.update_outbox(id, |am| {
            am.status = Set(OutboxStatus::Sent.as_str().to_string());
            am.last_error = Set(None);
        })
        .await
    }

    pub async fn reschedule_outbox(
        &self,
        id: &str,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let error = error.to_string();
        self.update_outbox(id, move |am| {
            am.attempts = Set(attempts);
            am.next_attempt_at = Set(next_attempt_at.fixed_offset());
            am.last_error = Set(Some(error));
        })
        .await
    }

    pub async fn mark_outbox_dead(&self, id: &str, attempts: i32, error: &str) -> Result<()> {
        let error = error.to_string();
        self.update_outbox(id, move |am| {
            am.status = Set(OutboxStatus::Dead.as_str().to_string());
            am.attempts = Set(attempts);
            am.last_error = Set(Some(error));
        })
        .await
    }

    async fn update_outbox(
        &self,
        id: &str,
        apply: impl FnOnce(&mut integration_outbox::ActiveModel),
    ) -> Result<()> {
        let Some(model) = OutEntity::find_by_id(id).one(self.db()).await? else {
            return Err(crate::StorageError::NotFound {
                entity: "integration_outbox",
                id: id.to_string(),
            });
        };
        let mut am: integration_outbox::ActiveModel = model.into();
        apply(&mut am);
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(())
    }

    pub async fn list_outbox(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<OutboxEntry>> {
        let mut q = OutEntity::find().filter(OutCol::TenantId.eq(tenant_id));
        if let Some(status) = status {
            q = q.filter(OutCol::Status.eq(status));
        }
        let rows = q
            .order_by(OutCol::CreatedAt, Order::Desc)
            .order_by(OutCol::Id, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_entry).collect())
    }

    pub async fn count_outbox(&self, tenant_id: &str, status: Option<&str>) -> Result<u64> {
        let mut q = OutEntity::find().filter(OutCol::TenantId.eq(tenant_id));
        if let Some(status) = status {
            q = q.filter(OutCol::Status.eq(status));
        }
        Ok(q.count(self.db()).await?)
    }
}
