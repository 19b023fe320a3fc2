//! Reference-data cache and trade enrichment.
//!
//! Asset-pair metadata is slow-changing, so it is cached permanently with
//! insert-if-absent writes and refreshed in bulk at most once per run. A
//! pair the exchange genuinely does not list resolves to `None` and the
//! trade keeps its raw pair code as the display fallback.

use crate::error::Result;
use crate::models::{AssetPairInfo, Record};
use crate::storage::SyncStore;
use crate::sync::source::RecordSource;
use std::collections::HashSet;
use tracing::{info, warn};

/// Kraken's legacy X/Z-prefixed asset codes, mapped to their common names.
pub fn normalize_base(raw: &str) -> &str {
    match raw {
        "XXDG" => "DOGE",
        "XETC" => "ETC",
        "XETH" => "ETH",
        "XLTC" => "LTC",
        "XMLN" => "MLN",
        "XREP" => "REP",
        "XXBT" => "BTC",
        "XXLM" => "XLM",
        "XXMR" => "XMR",
        "XXRP" => "XRP",
        "XZEC" => "ZEC",
        other => other,
    }
}

/// Websocket pair names that still carry legacy tickers.
pub fn normalize_wsname(raw: &str) -> &str {
    match raw {
        "XBT/USD" => "BTC/USD",
        "XDG/USD" => "DOGE/USD",
        other => other,
    }
}

/// Store-first pair lookup with a single lazy bulk refresh per run.
pub struct PairCache<'a, S: RecordSource + ?Sized> {
    store: &'a SyncStore,
    source: &'a S,
    refreshed: bool,
}

impl<'a, S: RecordSource + ?Sized> PairCache<'a, S> {
    pub fn new(store: &'a SyncStore, source: &'a S) -> Self {
        Self {
            store,
            source,
            refreshed: false,
        }
    }

    /// Look up a pair code; on the first miss, pull the full reference set
    /// and retry once. `None` after that means the exchange does not list
    /// the code, which callers treat as data, not an error.
    pub async fn resolve(&mut self, pair_code: &str) -> Result<Option<AssetPairInfo>> {
        if let Some(info) = self.store.get_asset_pair(pair_code)? {
            return Ok(Some(info));
        }

        if !self.refreshed {
            self.refresh_all().await?;
            return self.store.get_asset_pair(pair_code);
        }

        Ok(None)
    }

    /// Bulk fetch + insert-if-absent. Safe to repeat: existing entries are
    /// never overwritten, so redundant refreshes converge on one row per
    /// pair code.
    pub async fn refresh_all(&mut self) -> Result<usize> {
        let pairs = self.source.fetch_asset_pairs().await?;
        let inserted = self.store.insert_asset_pairs_if_absent(&pairs)?;
        self.refreshed = true;
        info!(
            "📇 Reference data refreshed: {} pairs fetched, {} new",
            pairs.len(),
            inserted
        );
        Ok(inserted)
    }
}

/// Annotate trade records with `wsname`/`base` from the cache. Unresolvable
/// pairs fall back to the raw pair code, warned once per code. Reward
/// records pass through untouched.
pub async fn enrich_records<S: RecordSource + ?Sized>(
    cache: &mut PairCache<'_, S>,
    records: &mut [Record],
) -> Result<usize> {
    let mut missing_warned: HashSet<String> = HashSet::new();
    let mut enriched = 0usize;

    for record in records.iter_mut() {
        let Record::Trade(trade) = record else {
            continue;
        };

        match cache.resolve(&trade.pair).await? {
            Some(info) => {
                trade.base = Some(normalize_base(&info.base).to_string());
                let wsname = info.wsname.unwrap_or_else(|| trade.pair.clone());
                trade.wsname = Some(normalize_wsname(&wsname).to_string());
            }
            None => {
                if missing_warned.insert(trade.pair.clone()) {
                    warn!(
                        "⚠️  No asset metadata for pair {}, using fallback",
                        trade.pair
                    );
                }
                trade.wsname = Some(trade.pair.clone());
                trade.base = Some(trade.pair.clone());
            }
        }
        enriched += 1;
    }

    if enriched > 0 {
        info!("✨ Enriched {} trades with asset metadata", enriched);
    }
    Ok(enriched)
}
