use crate::error::Result;
use chrono::{DateTime, Utc};
use relaydesk_common::types::{Destination, IntegrationRecord, IntegrationStatus};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::escalation_rule::{self, Column as RuleCol, Entity as RuleEntity};
use crate::entities::integration::{self, Column as IntCol, Entity as IntEntity};
use crate::store::{parse_json_column, DeskStore};

/// Fields for a new integration row.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIntegration {
    pub tenant_id: String,
    pub provider: String,
    pub name: String,
    #[serde(default = "default_status")]
    pub status: IntegrationStatus,
    #[serde(default)]
    pub credentials: Value,
    #[serde(default)]
    pub config: Value,
}

fn default_status() -> IntegrationStatus {
    IntegrationStatus::Active
}

/// An escalation rule with its destination list decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRuleRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub destinations: Vec<Destination>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEscalationRule {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn model_to_record(m: integration::Model) -> IntegrationRecord {
    let status = m.status.parse().unwrap_or_else(|_| {
        tracing::warn!(integration_id = %m.id, status = %m.status, "Unknown integration status, treating as disabled");
        IntegrationStatus::Disabled
    });
    IntegrationRecord {
        credentials: parse_json_column("integrations.credentials", &m.credentials),
        config: parse_json_column("integrations.config", &m.config),
        id: m.id,
        tenant_id: m.tenant_id,
        provider: m.provider,
        name: m.name,
        status,
    }
}

/// Decodes a rule's destination column entry by entry so one malformed
/// element does not hide the rest.
fn decode_destinations(rule_id: &str, raw: &str) -> Vec<Destination> {
    let items: Vec<Value> = parse_json_column("escalation_rules.destinations", raw);
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Destination>(item) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(rule_id, error = %e, "Skipping malformed rule destination");
                None
            }
        })
        .collect()
}

fn model_to_rule(m: escalation_rule::Model) -> EscalationRuleRow {
    EscalationRuleRow {
        keywords: parse_json_column("escalation_rules.keywords", &m.keywords),
        destinations: decode_destinations(&m.id, &m.destinations),
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl DeskStore {
    // ---- integrations ----

    pub async fn list_active_integrations(&self, tenant_id: &str) -> Result<Vec<IntegrationRecord>> {
        let rows = IntEntity::find()
            .filter(IntCol::TenantId.eq(tenant_id))
            .filter(IntCol::Status.eq(IntegrationStatus::Active.as_str()))
            .order_by(IntCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_record).collect())
    }

    /// Fetches an integration by id regardless of tenant; callers enforce ownership.
    pub async fn get_integration(&self, id: &str) -> Result<Option<IntegrationRecord>> {
        let model = IntEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_record))
    }

    pub async fn find_integration_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<IntegrationRecord>> {
        let model = IntEntity::find()
            .filter(IntCol::TenantId.eq(tenant_id))
            .filter(IntCol::Name.eq(name))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_record))
    }

    pub async fn insert_integration(&self, new: &NewIntegration) -> Result<IntegrationRecord> {
        let now = Utc::now().fixed_offset();
        let am = integration::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(new.tenant_id.clone()),
            provider: Set(new.provider.trim().to_lowercase()),
            name: Set(new.name.clone()),
            status: Set(new.status.as_str().to_string()),
            credentials: Set(json_object_text(&new.credentials)?),
            config: Set(json_object_text(&new.config)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_record(model))
    }

    pub async fn set_integration_status(
        &self,
        id: &str,
        status: IntegrationStatus,
    ) -> Result<Option<IntegrationRecord>> {
        let Some(model) = IntEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: integration::ActiveModel = model.into();
        am.status = Set(status.as_str().to_string());
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        Ok(Some(model_to_record(updated)))
    }

    // ---- escalation_rules ----

    pub async fn insert_escalation_rule(&self, new: &NewEscalationRule) -> Result<EscalationRuleRow> {
        let now = Utc::now().fixed_offset();
        let am = escalation_rule::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(new.tenant_id.clone()),
            name: Set(new.name.clone()),
            keywords: Set(serde_json::to_string(&new.keywords)?),
            destinations: Set(serde_json::to_string(&new.destinations)?),
            enabled: Set(new.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_rule(model))
    }

    /// A tenant's rule by id. Rules owned by other tenants are invisible.
    pub async fn get_escalation_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> Result<Option<EscalationRuleRow>> {
        let model = RuleEntity::find_by_id(rule_id)
            .filter(RuleCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_rule))
    }

    pub async fn find_escalation_rule_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<EscalationRuleRow>> {
        let model = RuleEntity::find()
            .filter(RuleCol::TenantId.eq(tenant_id))
            .filter(RuleCol::Name.eq(name))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_rule))
    }
}

fn json_object_text(value: &Value) -> Result<String> {
    if value.is_null() {
        return Ok("{}".to_string());
    }
    Ok(serde_json::to_string(value)?)
}
