//! Kraken REST client.
//!
//! Private endpoints are form-POSTs signed per request; the public
//! AssetPairs endpoint needs no auth. Pagination windows are passed through
//! as `start`/`end` unix-seconds bounds, and because Kraken treats `end` as
//! inclusive, the raw page is filtered down to the half-open window the
//! `RecordSource` contract promises.

use crate::config::Config;
use crate::error::{classify_api_errors, Result, SyncError};
use crate::kraken::signing::{encode_form, sign_request};
use crate::models::{AssetPairInfo, Record, RewardRecord, StreamKind, TradeRecord};
use crate::sync::source::RecordSource;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const TRADES_HISTORY_PATH: &str = "/0/private/TradesHistory";
const LEDGERS_PATH: &str = "/0/private/Ledgers";
const ASSET_PAIRS_PATH: &str = "/0/public/AssetPairs";

pub struct KrakenClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    page_limit: usize,
    page_delay: Duration,
    last_nonce: Mutex<u64>,
}

impl KrakenClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            page_limit: config.page_limit as usize,
            page_delay: Duration::from_millis(config.page_delay_ms),
            last_nonce: Mutex::new(0),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Kraken rejects reused or decreasing nonces, so the wall clock alone
    /// is not enough when two calls land in the same millisecond.
    fn next_nonce(&self) -> u64 {
        let mut last = self.last_nonce.lock();
        let now_ms = Utc::now().timestamp_millis() as u64;
        *last = now_ms.max(*last + 1);
        *last
    }

    async fn private_call<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let nonce = self.next_nonce().to_string();

        let mut fields: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 1);
        fields.push(("nonce", &nonce));
        for (k, v) in params {
            fields.push((k, v));
        }
        // The signed body and the posted body must be the same bytes
        let body = encode_form(&fields);
        let signature = sign_request(path, &nonce, &body, &self.api_secret)?;

        debug!("📤 POST {} ({} bytes)", path, body.len());

        let resp = self
            .http
            .post(self.url(path))
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("POST {} failed: {}", path, e)))?;

        Self::decode_envelope(path, resp).await
    }

    async fn decode_envelope<T: DeserializeOwned>(
        path: &str,
        resp: reqwest::Response,
    ) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!(
                "{} {}: {}",
                path, status, text
            )));
        }

        let envelope = resp.json::<ApiResponse<T>>().await.map_err(|e| {
            SyncError::Transport(format!("Failed to decode {} response: {}", path, e))
        })?;

        if !envelope.error.is_empty() {
            return Err(classify_api_errors(&envelope.error));
        }

        envelope
            .result
            .ok_or_else(|| SyncError::Transport(format!("{} returned no result", path)))
    }

    fn window_params(floor: f64, before: Option<f64>) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if floor > 0.0 {
            params.push(("start", floor.to_string()));
        }
        if let Some(b) = before {
            params.push(("end", b.to_string()));
        }
        params
    }
}

/// Clamp a raw response page to the half-open `[floor, before)` window,
/// most-recent-first, at most `limit` records. Kraken's `end` bound is
/// inclusive and entries arrive as an unordered map, so both the boundary
/// re-serve and the ordering are fixed up here. Truncation keeps the newest
/// records; anything dropped is older than the resulting cursor and gets
/// fetched on a later page.
fn clamp_page(
    mut records: Vec<Record>,
    floor: f64,
    before: Option<f64>,
    limit: usize,
) -> Vec<Record> {
    records.retain(|r| r.time() >= floor && before.map_or(true, |b| r.time() < b));
    records.sort_by(|a, b| {
        b.time()
            .partial_cmp(&a.time())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    records.truncate(limit);
    records
}

#[async_trait::async_trait]
impl RecordSource for KrakenClient {
    async fn fetch_page(
        &self,
        kind: StreamKind,
        floor: f64,
        before: Option<f64>,
    ) -> Result<Vec<Record>> {
        // Follow-up pages wait out the API's rate limiting
        if before.is_some() && !self.page_delay.is_zero() {
            sleep(self.page_delay).await;
        }

        let raw = match kind {
            StreamKind::Trades => {
                let params = Self::window_params(floor, before);
                let result: TradesHistoryResult =
                    self.private_call(TRADES_HISTORY_PATH, &params).await?;
                debug!(
                    "📥 trades page: {} entries ({} matching total)",
                    result.trades.len(),
                    result.count
                );
                result
                    .trades
                    .into_iter()
                    .map(|(txid, e)| {
                        Record::Trade(TradeRecord {
                            txid,
                            ordertxid: e.ordertxid,
                            pair: e.pair,
                            time: e.time,
                            side: e.side,
                            ordertype: e.ordertype,
                            price: e.price,
                            cost: e.cost,
                            fee: e.fee,
                            volume: e.vol,
                            wsname: None,
                            base: None,
                        })
                    })
                    .collect()
            }
            StreamKind::Rewards => {
                let mut params = vec![("type", "staking".to_string())];
                params.extend(Self::window_params(floor, before));
                let result: LedgersResult = self.private_call(LEDGERS_PATH, &params).await?;
                debug!(
                    "📥 rewards page: {} entries ({} matching total)",
                    result.ledger.len(),
                    result.count
                );
                result
                    .ledger
                    .into_iter()
                    .map(|(ledger_id, e)| {
                        Record::Reward(RewardRecord {
                            ledger_id,
                            refid: e.refid,
                            time: e.time,
                            entry_type: e.entry_type,
                            asset: e.asset,
                            amount: e.amount,
                            fee: e.fee,
                            balance: e.balance,
                        })
                    })
                    .collect()
            }
        };

        Ok(clamp_page(raw, floor, before, self.page_limit))
    }

    async fn fetch_asset_pairs(&self) -> Result<HashMap<String, AssetPairInfo>> {
        let resp = self
            .http
            .get(self.url(ASSET_PAIRS_PATH))
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("GET {} failed: {}", ASSET_PAIRS_PATH, e)))?;

        let pairs: HashMap<String, AssetPairEntry> =
            Self::decode_envelope(ASSET_PAIRS_PATH, resp).await?;

        debug!("📥 asset pairs: {} entries", pairs.len());

        Ok(pairs
            .into_iter()
            .map(|(code, e)| {
                (
                    code,
                    AssetPairInfo {
                        wsname: e.wsname,
                        base: e.base,
                        quote: e.quote,
                    },
                )
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TradesHistoryResult {
    #[serde(default)]
    trades: HashMap<String, TradeEntry>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct TradeEntry {
    ordertxid: Option<String>,
    pair: String,
    time: f64,
    #[serde(rename = "type")]
    side: String,
    ordertype: Option<String>,
    price: String,
    cost: String,
    fee: String,
    vol: String,
}

#[derive(Debug, Deserialize)]
struct LedgersResult {
    #[serde(default)]
    ledger: HashMap<String, LedgerEntry>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct LedgerEntry {
    refid: String,
    time: f64,
    #[serde(rename = "type")]
    entry_type: String,
    asset: String,
    amount: String,
    fee: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct AssetPairEntry {
    wsname: Option<String>,
    base: String,
    quote: Option<String>,
}
