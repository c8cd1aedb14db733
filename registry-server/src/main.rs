//! Schema registry HTTP server binary: loads configuration, builds the
//! configured storage backend, wires it into a [`registry_core::engine::Registry`],
//! and serves the REST surface (spec §6.1) with `axum`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registry_core::api::server::ApiServer;
use registry_core::config::Config;
use registry_core::engine::Registry;
use registry_storage::factory;

#[derive(Parser, Debug, Clone)]
#[command(name = "schema-registry-server")]
#[command(about = "A Confluent-protocol-compatible schema registry")]
#[command(version)]
struct Args {
    /// Configuration file path (env: SCHEMA_REGISTRY_CONFIG_PATH).
    #[arg(short, long, default_value = "schema-registry.toml", env = "SCHEMA_REGISTRY_CONFIG_PATH")]
    config: String,

    /// Listen address, overriding the config file (env: SCHEMA_REGISTRY_LISTEN).
    #[arg(long, env = "SCHEMA_REGISTRY_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_create(std::path::Path::new(&args.config))
        .with_context(|| format!("loading configuration from {}", args.config))?;

    let env_filter = tracing_subscriber::EnvFilter::new(&config.observability.log_level);
    let subscriber = tracing_subscriber::registry().with(env_filter);
    if config.observability.log_format == "json" {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .context("installing Prometheus metrics recorder")?;
        tracing::info!("metrics enabled at /metrics");
        Some(handle)
    } else {
        None
    };

    let storage_kind = config
        .storage
        .to_storage_kind()
        .context("parsing storage.type")?;
    let storage = factory::create(storage_kind, &factory::StorageSettings {
        connection: config.storage.connection.clone(),
    })?;

    let registry = Arc::new(Registry::new(storage));
    registry
        .set_global_config(
            registry_storage::DEFAULT_CONTEXT,
            registry_storage::model::ConfigRecord {
                compatibility_level: Some(config.compatibility.default_level),
                ..Default::default()
            },
        )
        .await
        .context("seeding default compatibility level")?;
    let server = ApiServer::new(registry, config.clone());

    let addr = args.listen.unwrap_or_else(|| config.server.bind_addr.clone());
    tracing::info!("schema registry starting on {addr}");

    let mut router = server.router();
    if let Some(handle) = metrics_handle {
        router = router.route(
            "/metrics",
            axum::routing::get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
