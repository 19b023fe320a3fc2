//! Trigger Server
//!
//! Small HTTP front for kicking off a sync run on demand (webhooks, cron
//! with an HTTP client, a curl from a laptop). Each POST /trigger-sync
//! schedules one full run in the background and returns a job name for the
//! logs; the request does not wait for the run to finish.
//!
//! Usage:
//!   cargo run --release --bin trigger-server
//!   curl -X POST localhost:8000/trigger-sync

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use kraken_sync::config::Config;
use kraken_sync::kraken::KrakenClient;
use kraken_sync::models::StreamKind;
use kraken_sync::storage::SyncStore;
use kraken_sync::sync::Coordinator;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trigger_server=info,kraken_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let port = config.trigger_port;
    let state = AppState {
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/trigger-sync", post(trigger_sync))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 Trigger server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    let job_name = format!(
        "kraken-sync-manual-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &Uuid::new_v4().to_string()[..8]
    );

    // Fail the request, not the server, when the run cannot even be set up.
    match schedule_run(&state.config, job_name.clone()) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Manual sync job scheduled.",
                "job_name": job_name,
            })),
        ),
        Err(e) => {
            error!("❌ Failed to schedule sync job: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to schedule sync job",
                    "details": format!("{:#}", e),
                })),
            )
        }
    }
}

/// Open the store and client up front so a misconfigured run surfaces as a
/// 500 instead of a silently-dead background task, then hand off.
fn schedule_run(config: &Arc<Config>, job_name: String) -> Result<()> {
    config.ensure_database_dir()?;
    let store = Arc::new(
        SyncStore::new(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path))?,
    );
    let client = KrakenClient::new(config).context("Failed to build Kraken client")?;
    let coordinator = Coordinator::new((**config).clone(), store, client);

    info!("🚀 Scheduled sync job {}", job_name);
    tokio::spawn(async move {
        let report = coordinator.run_all(&StreamKind::ALL).await;
        if report.all_ok() {
            info!("🏁 Job {} complete", job_name);
        } else {
            error!(
                "❌ Job {} finished with {} failed stream(s)",
                job_name,
                report.failed_count()
            );
        }
    });

    Ok(())
}
