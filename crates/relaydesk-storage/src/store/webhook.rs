use crate::error::Result;
use chrono::{DateTime, FixedOffset, Utc};
use relaydesk_common::types::{EndpointTarget, WebhookEndpoint};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::webhook_delivery::{self, Column as DelCol, Entity as DelEntity};
use crate::entities::webhook_endpoint::{self, Column as EpCol, Entity as EpEntity};
use crate::store::{parse_json_column, DeskStore};

/// Fields for a new webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhookEndpoint {
    pub tenant_id: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// One row of the webhook delivery ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WebhookDeliveryRow {
    pub id: String,
    pub webhook_endpoint_id: String,
    pub tenant_id: String,
    pub event_type: String,
    /// The exact JSON body sent to the receiver.
    pub payload: String,
    pub delivery_attempts: i32,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Response details captured for a delivery attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryAttempt {
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
}

fn model_to_endpoint(m: webhook_endpoint::Model) -> WebhookEndpoint {
    WebhookEndpoint {
        target: EndpointTarget::parse(&m.url),
        events: parse_json_column("webhook_endpoints.events", &m.events),
        id: m.id,
        tenant_id: m.tenant_id,
        url: m.url,
        secret: m.secret.filter(|s| !s.is_empty()),
        is_active: m.is_active,
        failure_count: m.failure_count,
        last_success_at: m.last_success_at.map(|t| t.with_timezone(&Utc)),
        last_failure_at: m.last_failure_at.map(|t| t.with_timezone(&Utc)),
    }
}

fn model_to_delivery(m: webhook_delivery::Model) -> WebhookDeliveryRow {
    WebhookDeliveryRow {
        id: m.id,
        webhook_endpoint_id: m.webhook_endpoint_id,
        tenant_id: m.tenant_id,
        event_type: m.event_type,
        payload: m.payload,
        delivery_attempts: m.delivery_attempts,
        response_status: m.response_status,
        response_body: m.response_body,
        delivered_at: m.delivered_at.map(|t| t.with_timezone(&Utc)),
        failed_at: m.failed_at.map(|t| t.with_timezone(&Utc)),
        next_retry_at: m.next_retry_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl DeskStore {
    // ---- webhook_endpoints ----

    pub async fn insert_webhook_endpoint(&self, new: &NewWebhookEndpoint) -> Result<WebhookEndpoint> {
        let now = Utc::now().fixed_offset();
        let am = webhook_endpoint::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(new.tenant_id.clone()),
            url: Set(new.url.trim().to_string()),
            events: Set(serde_json::to_string(&new.events)?),
            secret: Set(new.secret.clone()),
            is_active: Set(new.is_active),
            failure_count: Set(0),
            last_success_at: Set(None),
            last_failure_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_endpoint(model))
    }

    pub async fn get_webhook_endpoint(&self, id: &str) -> Result<Option<WebhookEndpoint>> {
        let model = EpEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_endpoint))
    }

    pub async fn find_webhook_endpoint_by_url(
        &self,
        tenant_id: &str,
        url: &str,
    ) -> Result<Option<WebhookEndpoint>> {
        let model = EpEntity::find()
            .filter(EpCol::TenantId.eq(tenant_id))
            .filter(EpCol::Url.eq(url.trim()))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_endpoint))
    }

    /// Active endpoints of a tenant subscribed to `event_type`.
    ///
    /// The events column is a JSON array, so the subscription match happens
    /// after loading the tenant's active endpoints.
    pub async fn list_subscribed_endpoints(
        &self,
        tenant_id: &str,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>> {
        let rows = EpEntity::find()
            .filter(EpCol::TenantId.eq(tenant_id))
            .filter(EpCol::IsActive.eq(true))
            .order_by(EpCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_endpoint)
            .filter(|ep| ep.subscribes_to(event_type))
            .collect())
    }

    /// Resets the consecutive failure counter after a 2xx delivery.
    pub async fn record_endpoint_success(&self, endpoint_id: &str) -> Result<()> {
        let now = Utc::now().fixed_offset();
        EpEntity::update_many()
            .col_expr(EpCol::FailureCount, Expr::value(0))
            .col_expr(EpCol::LastSuccessAt, Expr::value(now))
            .col_expr(EpCol::UpdatedAt, Expr::value(now))
            .filter(EpCol::Id.eq(endpoint_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn record_endpoint_failure(&self, endpoint_id: &str) -> Result<()> {
        let now = Utc::now().fixed_offset();
        EpEntity::update_many()
            .col_expr(EpCol::FailureCount, Expr::col(EpCol::FailureCount).add(1))
            .col_expr(EpCol::LastFailureAt, Expr::value(now))
            .col_expr(EpCol::UpdatedAt, Expr::value(now))
            .filter(EpCol::Id.eq(endpoint_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    // ---- webhook_deliveries ----

    /// Writes the ledger row before any network attempt is made.
    pub async fn insert_webhook_delivery(
        &self,
        endpoint: &WebhookEndpoint,
        event_type: &str,
        payload: &str,
    ) -> Result<WebhookDeliveryRow> {
        let am = webhook_delivery::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            webhook_endpoint_id: Set(endpoint.id.clone()),
            tenant_id: Set(endpoint.tenant_id.clone()),
            event_type: Set(event_type.to_string()),
            payload: Set(payload.to_string()),
            delivery_attempts: Set(0),
            response_status: Set(None),
            response_body: Set(None),
            delivered_at: Set(None),
            failed_at: Set(None),
            next_retry_at: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_delivery(model))
    }

    pub async fn get_webhook_delivery(&self, id: &str) -> Result<Option<WebhookDeliveryRow>> {
        let model = DelEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_delivery))
    }

    pub async fn mark_delivery_delivered(&self, id: &str, attempt: &DeliveryAttempt) -> Result<()> {
        DelEntity::update_many()
            .col_expr(DelCol::DeliveredAt, Expr::value(Utc::now().fixed_offset()))
            .col_expr(
                DelCol::ResponseStatus,
                Expr::value(attempt.response_status.map(i32::from)),
            )
            .col_expr(DelCol::ResponseBody, Expr::value(attempt.response_body.clone()))
            .col_expr(
                DelCol::NextRetryAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .filter(DelCol::Id.eq(id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Records a failed attempt: bumps `delivery_attempts`, stamps `failed_at`
    /// and schedules (or clears, when `None`) the next retry.
    pub async fn mark_delivery_failed(
        &self,
        id: &str,
        attempt: &DeliveryAttempt,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        DelEntity::update_many()
            .col_expr(
                DelCol::DeliveryAttempts,
                Expr::col(DelCol::DeliveryAttempts).add(1),
            )
            .col_expr(DelCol::FailedAt, Expr::value(Utc::now().fixed_offset()))
            .col_expr(
                DelCol::ResponseStatus,
                Expr::value(attempt.response_status.map(i32::from)),
            )
            .col_expr(DelCol::ResponseBody, Expr::value(attempt.response_body.clone()))
            .col_expr(
                DelCol::NextRetryAt,
                Expr::value(next_retry_at.map(|t| t.fixed_offset())),
            )
            .filter(DelCol::Id.eq(id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Failed, undelivered rows whose retry time has come.
    pub async fn list_due_webhook_deliveries(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        limit: u64,
    ) -> Result<Vec<WebhookDeliveryRow>> {
        let rows = DelEntity::find()
            .filter(DelCol::DeliveredAt.is_null())
            .filter(DelCol::NextRetryAt.is_not_null())
            .filter(DelCol::NextRetryAt.lte(now.fixed_offset()))
            .filter(DelCol::DeliveryAttempts.lt(max_attempts))
            .order_by(DelCol::NextRetryAt, Order::Asc)
            .limit(limit)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_delivery).collect())
    }

    pub async fn list_webhook_deliveries(
        &self,
        endpoint_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<WebhookDeliveryRow>> {
        let rows = DelEntity::find()
            .filter(DelCol::WebhookEndpointId.eq(endpoint_id))
            .order_by(DelCol::CreatedAt, Order::Desc)
            .order_by(DelCol::Id, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_delivery).collect())
    }

    pub async fn count_webhook_deliveries(&self, endpoint_id: &str) -> Result<u64> {
        Ok(DelEntity::find()
            .filter(DelCol::WebhookEndpointId.eq(endpoint_id))
            .count(self.db())
            .await?)
    }
}
