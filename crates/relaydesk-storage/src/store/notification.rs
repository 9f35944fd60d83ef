use crate::error::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::notification::{self, Column as NotifCol, Entity as NotifEntity};
use crate::store::DeskStore;

/// An in-app dashboard notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub tenant_id: String,
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub body: String,
    pub conversation_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: String,
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub body: String,
    pub conversation_id: Option<String>,
}

fn model_to_row(m: notification::Model) -> NotificationRow {
    NotificationRow {
        id: m.id,
        tenant_id: m.tenant_id,
        kind: m.kind,
        severity: m.severity,
        title: m.title,
        body: m.body,
        conversation_id: m.conversation_id,
        is_read: m.is_read,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl DeskStore {
    pub async fn create_notification(&self, new: &NewNotification) -> Result<NotificationRow> {
        let am = notification::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(new.tenant_id.clone()),
            kind: Set(new.kind.clone()),
            severity: Set(new.severity.clone()),
            title: Set(new.title.clone()),
            body: Set(new.body.clone()),
            conversation_id: Set(new.conversation_id.clone()),
            is_read: Set(false),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_row(model))
    }

    pub async fn list_notifications(
        &self,
        tenant_id: &str,
        limit: u64,
    ) -> Result<Vec<NotificationRow>> {
        let rows = NotifEntity::find()
            .filter(NotifCol::TenantId.eq(tenant_id))
            .order_by(NotifCol::CreatedAt, Order::Desc)
            .limit(limit)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_row).collect())
    }
}
