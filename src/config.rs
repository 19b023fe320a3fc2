use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Application configuration, materialized once from the environment and
/// passed explicitly to whoever needs it. Nothing reads env vars after
/// startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_secret: String,
    pub api_base_url: String,
    pub api_key_expiry: Option<NaiveDate>,
    pub database_path: String,
    pub page_limit: u32,
    pub epoch_start: f64,
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub export_enabled: bool,
    pub export_dir: String,
    pub trigger_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("KRAKEN_API_KEY").context("KRAKEN_API_KEY must be set")?;
        let api_secret =
            std::env::var("KRAKEN_API_SECRET").context("KRAKEN_API_SECRET must be set")?;

        let api_base_url = std::env::var("KRAKEN_API_URL")
            .unwrap_or_else(|_| "https://api.kraken.com".to_string());

        let api_key_expiry = match std::env::var("KRAKEN_API_EXPIRY") {
            Ok(raw) => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .context("KRAKEN_API_EXPIRY must be a YYYY-MM-DD date")?,
            ),
            Err(_) => None,
        };

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./data/kraken_sync.db".to_string());

        let page_limit = std::env::var("SYNC_PAGE_LIMIT")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let epoch_start = std::env::var("SYNC_EPOCH_START")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0.0);

        let page_delay_ms = std::env::var("SYNC_PAGE_DELAY_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse()
            .unwrap_or(250);

        let request_timeout_secs = std::env::var("SYNC_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let export_enabled = std::env::var("EXPORT_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let export_dir = std::env::var("EXPORT_DIR").unwrap_or_else(|_| "./outputs".to_string());

        let trigger_port = std::env::var("TRIGGER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        Ok(Self {
            api_key,
            api_secret,
            api_base_url,
            api_key_expiry,
            database_path,
            page_limit,
            epoch_start,
            page_delay_ms,
            request_timeout_secs,
            export_enabled,
            export_dir,
            trigger_port,
        })
    }

    /// Fail on an already-expired key, warn when it is about to lapse.
    /// Keys rotate on a calendar, and a silent 403 mid-run is the worst way
    /// to find out.
    pub fn check_api_key_expiry(&self) -> Result<()> {
        let Some(expiry) = self.api_key_expiry else {
            warn!("⚠️  No expiry date configured for the API key");
            return Ok(());
        };

        let today = Utc::now().date_naive();
        let days_left = (expiry - today).num_days();

        if days_left < 0 {
            anyhow::bail!("API key expired on {}", expiry.format("%B %d, %Y"));
        }
        if days_left <= 14 {
            warn!(
                "⚠️  API key expires on {} ({} days left)",
                expiry.format("%B %d, %Y"),
                days_left
            );
        } else {
            info!("🔑 API key valid until {}", expiry.format("%B %d, %Y"));
        }
        Ok(())
    }

    /// Create the database's parent directory if the path has one.
    pub fn ensure_database_dir(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }
}
