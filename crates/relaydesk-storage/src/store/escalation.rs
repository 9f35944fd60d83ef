use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use relaydesk_common::types::{DeliveryResult, EscalationEvent};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

use crate::entities::escalation::{self, Column as EscCol, Entity as EscEntity};
use crate::entities::escalation_delivery::{self, Column as DelCol, Entity as DelEntity};
use crate::store::DeskStore;

/// A persisted escalation, kept for deduplication and audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRow {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub session_id: Option<String>,
    pub reason: String,
    pub confidence: Option<f64>,
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One destination's outcome for an escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDeliveryRow {
    pub id: String,
    pub escalation_id: String,
    pub provider: String,
    pub integration_id: Option<String>,
    pub ok: bool,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn model_to_escalation(m: escalation::Model) -> EscalationRow {
    EscalationRow {
        id: m.id,
        tenant_id: m.tenant_id,
        conversation_id: m.conversation_id,
        session_id: m.session_id,
        reason: m.reason,
        confidence: m.confidence,
        rule_id: m.rule_id,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

fn model_to_delivery(m: escalation_delivery::Model) -> EscalationDeliveryRow {
    EscalationDeliveryRow {
        id: m.id,
        escalation_id: m.escalation_id,
        provider: m.provider,
        integration_id: m.integration_id,
        ok: m.ok,
        external_id: m.external_id,
        url: m.url,
        error: m.error,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl DeskStore {
    // ---- escalations ----

    /// Most recent escalation for the same conversation and reason created
    /// within `window` of now.
    pub async fn find_recent_escalation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        reason: &str,
        window: Duration,
    ) -> Result<Option<EscalationRow>> {
        let since = (Utc::now() - window).fixed_offset();
        let model = EscEntity::find()
            .filter(EscCol::TenantId.eq(tenant_id))
            .filter(EscCol::ConversationId.eq(conversation_id))
            .filter(EscCol::Reason.eq(reason))
            .filter(EscCol::CreatedAt.gte(since))
            .order_by(EscCol::CreatedAt, Order::Desc)
            .one(self.db())
            .await?;
        Ok(model.map(model_to_escalation))
    }

    pub async fn insert_escalation(&self, event: &EscalationEvent) -> Result<EscalationRow> {
        let am = escalation::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(event.tenant_id.clone()),
            conversation_id: Set(event.conversation_id.clone()),
            session_id: Set(event.session_id.clone()),
            reason: Set(event.reason.as_str().to_string()),
            confidence: Set(event.confidence),
            rule_id: Set(event.rule_id.clone()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_escalation(model))
    }

    // ---- escalation_deliveries ----

    pub async fn insert_escalation_delivery(
        &self,
        escalation_id: &str,
        tenant_id: &str,
        result: &DeliveryResult,
    ) -> Result<EscalationDeliveryRow> {
        let am = escalation_delivery::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            escalation_id: Set(escalation_id.to_string()),
            tenant_id: Set(tenant_id.to_string()),
            provider: Set(result.provider.clone()),
            integration_id: Set(result.integration_id.clone()),
            ok: Set(result.ok),
            external_id: Set(result.id.clone()),
            url: Set(result.url.clone()),
            error: Set(result.error.clone()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_delivery(model))
    }

    pub async fn list_escalation_deliveries(
        &self,
        escalation_id: &str,
    ) -> Result<Vec<EscalationDeliveryRow>> {
        let rows = DelEntity::find()
            .filter(DelCol::EscalationId.eq(escalation_id))
            .order_by(DelCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_delivery).collect())
    }
}
