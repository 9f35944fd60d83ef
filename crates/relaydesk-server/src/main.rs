use anyhow::Result;
use chrono::Utc;
use relaydesk_escalation::Pipeline;
use relaydesk_notify::registry::ProviderRegistry;
use relaydesk_notify::settings::{FallbackConfig, ProviderEnvironment};
use relaydesk_storage::DeskStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use relaydesk_server::app;
use relaydesk_server::config::{ServerConfig, TenantSeedFile};
use relaydesk_server::scheduler::RetryScheduler;
use relaydesk_server::seed;
use relaydesk_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  relaydesk-server [config.toml]                          Start the server");
    eprintln!("  relaydesk-server init-tenant <config.toml> <seed.json>  Seed integrations, rules and webhook endpoints");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    relaydesk_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relaydesk=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-tenant") => {
            let (Some(config_path), Some(seed_path)) = (args.get(2), args.get(3)) else {
                print_usage();
                anyhow::bail!("init-tenant requires <config.toml> and <seed.json> arguments");
            };
            run_init_tenant(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn open_store(config: &ServerConfig) -> Result<DeskStore> {
    if config.database.url.is_none() {
        std::fs::create_dir_all(&config.database.data_dir)?;
    }
    Ok(DeskStore::new(&config.database.connection_url()).await?)
}

async fn run_init_tenant(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed_file: TenantSeedFile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let report = seed::init_tenant(&store, &seed_file).await?;
    tracing::info!(
        tenant_id = %seed_file.tenant_id,
        integrations_created = report.integrations_created,
        integrations_skipped = report.integrations_skipped,
        rules_created = report.rules_created,
        rules_skipped = report.rules_skipped,
        endpoints_created = report.endpoints_created,
        endpoints_skipped = report.endpoints_skipped,
        "Tenant seed finished"
    );
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        db = %config.database.redacted_url(),
        "relaydesk-server starting"
    );

    let store = open_store(&config).await?;

    // Provider credentials are read once here and threaded through.
    let env = Arc::new(ProviderEnvironment::from_env());
    let fallback = FallbackConfig::from_env();
    if fallback.is_empty() {
        tracing::info!("No fallback destinations configured");
    }
    let registry = Arc::new(ProviderRegistry::with_defaults(
        env,
        Duration::from_secs(config.dispatch.provider_timeout_secs),
    )?);
    let pipeline = Pipeline::build(store.clone(), registry, fallback, config.pipeline_settings())?;

    let state = AppState {
        store,
        pipeline: pipeline.clone(),
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(listener, app);

    let retry_handle = if config.retry.enabled {
        let scheduler = RetryScheduler::new(pipeline.sweeper.clone(), config.retry.tick_secs);
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        tracing::info!("Retry scheduler disabled");
        None
    };

    tracing::info!(http = %http_addr, "Server started");

    if let Err(e) = http_server
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(h) = retry_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
