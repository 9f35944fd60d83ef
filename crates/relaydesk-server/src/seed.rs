use crate::config::TenantSeedFile;
use relaydesk_common::types::{Destination, IntegrationStatus};
use relaydesk_storage::store::{NewEscalationRule, NewIntegration, NewWebhookEndpoint};
use relaydesk_storage::DeskStore;
use serde::Serialize;

/// Created/skipped counts of one `init-tenant` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub integrations_created: u32,
    pub integrations_skipped: u32,
    pub rules_created: u32,
    pub rules_skipped: u32,
    pub endpoints_created: u32,
    pub endpoints_skipped: u32,
}

/// Inserts the seed's integrations, rules and webhook endpoints for one
/// tenant. Rows whose name (or url, for endpoints) already exists are left
/// untouched, so running the same seed twice is harmless.
pub async fn init_tenant(store: &DeskStore, seed: &TenantSeedFile) -> anyhow::Result<SeedReport> {
    let tenant_id = seed.tenant_id.trim();
    if tenant_id.is_empty() {
        anyhow::bail!("seed file has an empty tenant_id");
    }
    let mut report = SeedReport::default();

    for item in &seed.integrations {
        if store.find_integration_by_name(tenant_id, &item.name).await?.is_some() {
            report.integrations_skipped += 1;
            continue;
        }
        let status = if item.enabled {
            IntegrationStatus::Active
        } else {
            IntegrationStatus::Disabled
        };
        let record = store
            .insert_integration(&NewIntegration {
                tenant_id: tenant_id.to_string(),
                provider: item.provider.clone(),
                name: item.name.clone(),
                status,
                credentials: item.credentials.clone(),
                config: item.config.clone(),
            })
            .await?;
        tracing::info!(integration_id = %record.id, name = %record.name, provider = %record.provider, "Seeded integration");
        report.integrations_created += 1;
    }

    for rule in &seed.rules {
        if store.find_escalation_rule_by_name(tenant_id, &rule.name).await?.is_some() {
            report.rules_skipped += 1;
            continue;
        }
        let mut destinations = Vec::with_capacity(rule.integrations.len() + rule.destinations.len());
        for name in &rule.integrations {
            match store.find_integration_by_name(tenant_id, name).await? {
                Some(record) => destinations.push(Destination::integration(record.id)),
                None => tracing::warn!(
                    rule = %rule.name,
                    integration = %name,
                    "Seed rule references an unknown integration, dropping destination"
                ),
            }
        }
        destinations.extend(rule.destinations.iter().cloned());

        let row = store
            .insert_escalation_rule(&NewEscalationRule {
                tenant_id: tenant_id.to_string(),
                name: rule.name.clone(),
                keywords: rule.keywords.clone(),
                destinations,
                enabled: rule.enabled,
            })
            .await?;
        tracing::info!(rule_id = %row.id, name = %row.name, destinations = row.destinations.len(), "Seeded escalation rule");
        report.rules_created += 1;
    }

    for endpoint in &seed.webhook_endpoints {
        if store
            .find_webhook_endpoint_by_url(tenant_id, &endpoint.url)
            .await?
            .is_some()
        {
            report.endpoints_skipped += 1;
            continue;
        }
        let row = store
            .insert_webhook_endpoint(&NewWebhookEndpoint {
                tenant_id: tenant_id.to_string(),
                url: endpoint.url.clone(),
                events: endpoint.events.clone(),
                secret: endpoint.secret.clone(),
                is_active: endpoint.enabled,
            })
            .await?;
        tracing::info!(endpoint_id = %row.id, url = %row.url, "Seeded webhook endpoint");
        report.endpoints_created += 1;
    }

    Ok(report)
}
