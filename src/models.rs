use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Data streams with their own checkpoint and fetch logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Trades,
    Rewards,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Trades, StreamKind::Rewards];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Rewards => "rewards",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed trade from the account history.
///
/// Money fields stay as the decimal strings the exchange serializes; only
/// `time` is numeric on the wire (fractional unix seconds). `wsname` and
/// `base` are filled in by enrichment, not by the fetch itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub txid: String,
    pub ordertxid: Option<String>,
    pub pair: String,
    pub time: f64,
    pub side: String,
    pub ordertype: Option<String>,
    pub price: String,
    pub cost: String,
    pub fee: String,
    pub volume: String,
    pub wsname: Option<String>,
    pub base: Option<String>,
}

/// One staking-reward ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRecord {
    pub ledger_id: String,
    pub refid: String,
    pub time: f64,
    pub entry_type: String,
    pub asset: String,
    pub amount: String,
    pub fee: String,
    pub balance: String,
}

/// A single fetched fact, tagged by stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    Trade(TradeRecord),
    Reward(RewardRecord),
}

impl Record {
    /// Natural key: the exchange-assigned id. Deduplication and upserts key
    /// on this, so re-fetching the same record is always a no-op.
    pub fn external_id(&self) -> &str {
        match self {
            Record::Trade(t) => &t.txid,
            Record::Reward(r) => &r.ledger_id,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            Record::Trade(t) => t.time,
            Record::Reward(r) => r.time,
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            Record::Trade(_) => StreamKind::Trades,
            Record::Reward(_) => StreamKind::Rewards,
        }
    }
}

/// Descriptive metadata for one asset pair, from the bulk reference feed.
/// Dark-pool pairs carry no `wsname`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPairInfo {
    pub wsname: Option<String>,
    pub base: String,
    pub quote: Option<String>,
}

/// Success summary for one stream's run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub records_fetched: usize,
    pub records_stored: usize,
    pub pages: u32,
    pub new_watermark: f64,
}

/// Outcome of one stream within a full invocation.
#[derive(Debug)]
pub struct StreamOutcome {
    pub kind: StreamKind,
    pub result: Result<RunResult, SyncError>,
}

/// Per-invocation aggregate: one outcome per requested stream, in
/// invocation order. One stream failing never removes the others' entries.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<StreamOutcome>,
}

impl RunReport {
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn outcome_for(&self, kind: StreamKind) -> Option<&StreamOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}
