//! Kraken Sync - Incremental trade and staking-reward archiver
//!
//! Pulls private account history from Kraken in pages, enriches trades with
//! cached asset-pair metadata, and lands everything in SQLite behind
//! per-stream watermark checkpoints. Safe to re-run at any time.

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kraken_sync::config::Config;
use kraken_sync::kraken::KrakenClient;
use kraken_sync::models::StreamKind;
use kraken_sync::storage::SyncStore;
use kraken_sync::sync::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    info!("🚀 Kraken Sync starting");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.check_api_key_expiry()?;
    config.ensure_database_dir()?;

    let store = Arc::new(
        SyncStore::new(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path))?,
    );
    info!("📊 Database initialized at: {}", config.database_path);

    let client = KrakenClient::new(&config).context("Failed to build Kraken client")?;
    let coordinator = Coordinator::new(config.clone(), store.clone(), client);

    let report = coordinator.run_all(&StreamKind::ALL).await;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(run) => info!(
                "✅ {}: {} fetched, {} stored over {} pages (watermark {})",
                outcome.kind, run.records_fetched, run.records_stored, run.pages, run.new_watermark
            ),
            Err(e) => error!("❌ {}: {}", outcome.kind, e),
        }
    }

    if !report.all_ok() {
        anyhow::bail!("{} stream(s) failed", report.failed_count());
    }

    info!("🏁 Sync complete");
    Ok(())
}

/// Initialize tracing with env-filter overrides
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kraken_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the manifest-dir .env (common when running with
    //    --manifest-path from elsewhere)
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
