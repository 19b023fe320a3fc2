//! Scripted `RecordSource` for unit tests.

use crate::error::{Result, SyncError};
use crate::models::{AssetPairInfo, Record, RewardRecord, StreamKind, TradeRecord};
use crate::sync::source::RecordSource;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub enum ScriptStep {
    Page(Vec<Record>),
    TransportFailure(String),
    AuthFailure(String),
}

/// Serves pre-scripted pages per stream, then empty pages forever.
/// Records every `fetch_page` call so tests can assert on cursor handling.
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<HashMap<StreamKind, VecDeque<ScriptStep>>>,
    page_calls: Mutex<Vec<(f64, Option<f64>)>>,
    asset_pairs: Mutex<HashMap<String, AssetPairInfo>>,
    pairs_fetches: Mutex<usize>,
    fail_pairs_fetch: Mutex<bool>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, kind: StreamKind, page: Vec<Record>) {
        self.steps
            .lock()
            .entry(kind)
            .or_default()
            .push_back(ScriptStep::Page(page));
    }

    pub fn push_transport_failure(&self, kind: StreamKind, msg: &str) {
        self.steps
            .lock()
            .entry(kind)
            .or_default()
            .push_back(ScriptStep::TransportFailure(msg.to_string()));
    }

    pub fn push_auth_failure(&self, kind: StreamKind, msg: &str) {
        self.steps
            .lock()
            .entry(kind)
            .or_default()
            .push_back(ScriptStep::AuthFailure(msg.to_string()));
    }

    pub fn set_asset_pairs(&self, pairs: HashMap<String, AssetPairInfo>) {
        *self.asset_pairs.lock() = pairs;
    }

    pub fn fail_pairs_fetch(&self) {
        *self.fail_pairs_fetch.lock() = true;
    }

    /// (floor, before) of every fetch_page call, in order.
    pub fn page_calls(&self) -> Vec<(f64, Option<f64>)> {
        self.page_calls.lock().clone()
    }

    /// How many times the bulk reference fetch ran.
    pub fn pairs_fetches(&self) -> usize {
        *self.pairs_fetches.lock()
    }
}

#[async_trait::async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch_page(
        &self,
        kind: StreamKind,
        floor: f64,
        before: Option<f64>,
    ) -> Result<Vec<Record>> {
        self.page_calls.lock().push((floor, before));

        let step = self.steps.lock().get_mut(&kind).and_then(|q| q.pop_front());
        match step {
            Some(ScriptStep::Page(page)) => Ok(page),
            Some(ScriptStep::TransportFailure(msg)) => Err(SyncError::Transport(msg)),
            Some(ScriptStep::AuthFailure(msg)) => Err(SyncError::Authentication(msg)),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_asset_pairs(&self) -> Result<HashMap<String, AssetPairInfo>> {
        *self.pairs_fetches.lock() += 1;
        if *self.fail_pairs_fetch.lock() {
            return Err(SyncError::Transport("asset pairs unavailable".to_string()));
        }
        Ok(self.asset_pairs.lock().clone())
    }
}

pub fn trade(txid: &str, pair: &str, time: f64) -> Record {
    Record::Trade(TradeRecord {
        txid: txid.to_string(),
        ordertxid: Some(format!("O-{}", txid)),
        pair: pair.to_string(),
        time,
        side: "buy".to_string(),
        ordertype: Some("limit".to_string()),
        price: "100.0".to_string(),
        cost: "100.0".to_string(),
        fee: "0.16".to_string(),
        volume: "1.0".to_string(),
        wsname: None,
        base: None,
    })
}

pub fn reward(ledger_id: &str, time: f64) -> Record {
    Record::Reward(RewardRecord {
        ledger_id: ledger_id.to_string(),
        refid: format!("R-{}", ledger_id),
        time,
        entry_type: "staking".to_string(),
        asset: "DOT.S".to_string(),
        amount: "0.5".to_string(),
        fee: "0".to_string(),
        balance: "10.0".to_string(),
    })
}

pub fn pair_info(wsname: Option<&str>, base: &str) -> AssetPairInfo {
    AssetPairInfo {
        wsname: wsname.map(|s| s.to_string()),
        base: base.to_string(),
        quote: Some("ZUSD".to_string()),
    }
}
