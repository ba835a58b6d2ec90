//! Provider probe - Main entry point.
//!
//! Connects one provider from a connection URL, reports its health and pool
//! statistics as JSON, optionally runs one query, then closes it.

use serde_json::json;
use test_data_provider::Provider;
use test_data_provider::config::Config;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    info!("Starting provider probe v{}", env!("CARGO_PKG_VERSION"));

    let provider_config = config.provider_config()?;
    let provider = match Provider::builder(provider_config)
        .health_timeout(config.health_timeout_duration())
        .build()
        .await
    {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "Failed to connect provider");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            return Err(e.into());
        }
    };

    let health = provider.health_report().await;
    let mut report = json!({
        "family": provider.family(),
        "health": health,
        "server_version": provider.server_version()?,
        "pool": provider.pool_statistics().ok(),
    });

    let mut outcome = Ok(());
    if let Some(query) = &config.query {
        match provider.execute_query(query).await {
            Ok(result) => report["result"] = serde_json::to_value(result.as_ref())?,
            Err(e) => {
                error!(error = %e, "Query failed");
                outcome = Err(e);
            }
        }
    }
    report["cache"] = serde_json::to_value(provider.cache_stats()?)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    provider.close().await;
    info!(healthy = health.healthy, "Probe complete");
    outcome.map_err(Into::into)
}
