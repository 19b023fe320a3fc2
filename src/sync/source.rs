use crate::error::Result;
use crate::models::{AssetPairInfo, Record, StreamKind};
use std::collections::HashMap;

/// Where records come from. The live implementation talks to the exchange;
/// tests script one.
///
/// `fetch_page` must honor a half-open window: only records with
/// `floor <= time < before` (no upper bound when `before` is `None`),
/// most-recent-first, at most one page worth. An empty page means the
/// window is exhausted.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(
        &self,
        kind: StreamKind,
        floor: f64,
        before: Option<f64>,
    ) -> Result<Vec<Record>>;

    /// Bulk reference-data fetch: the full pair-code -> metadata map.
    async fn fetch_asset_pairs(&self) -> Result<HashMap<String, AssetPairInfo>>;
}
