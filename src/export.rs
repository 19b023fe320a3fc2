//! File export of synced batches.
//!
//! Mirrors the stored record shapes: one JSON array plus one CSV per run
//! and stream, timestamped filenames. Callers treat failures here as
//! warnings; an export must never fail a sync run.

use crate::models::{Record, RewardRecord, StreamKind, TradeRecord};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const TRADES_HEADER: &str = "txid,ordertxid,pair,time,side,ordertype,price,cost,fee,volume,wsname,base";
const REWARDS_HEADER: &str = "ledger_id,refid,time,entry_type,asset,amount,fee,balance";

/// Write a batch as `<dir>/<kind>_<unix-ts>.json` and `.csv`.
/// Empty batches produce no files. Returns the paths written.
pub fn write_batch(kind: StreamKind, records: &[Record], dir: &str) -> Result<Vec<PathBuf>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create export dir {}", dir))?;

    let stamp = Utc::now().timestamp();
    let base = Path::new(dir).join(format!("{}_{}", kind, stamp));
    let json_path = base.with_extension("json");
    let csv_path = base.with_extension("csv");

    let json = match kind {
        StreamKind::Trades => serde_json::to_string_pretty(&trades_of(records)),
        StreamKind::Rewards => serde_json::to_string_pretty(&rewards_of(records)),
    }
    .context("Failed to serialize batch")?;

    fs::write(&json_path, json)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    fs::write(&csv_path, to_csv(kind, records))
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    info!(
        "💾 Exported {} {} records to {}",
        records.len(),
        kind,
        dir
    );
    Ok(vec![json_path, csv_path])
}

fn trades_of(records: &[Record]) -> Vec<&TradeRecord> {
    records
        .iter()
        .filter_map(|r| match r {
            Record::Trade(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn rewards_of(records: &[Record]) -> Vec<&RewardRecord> {
    records
        .iter()
        .filter_map(|r| match r {
            Record::Reward(rw) => Some(rw),
            _ => None,
        })
        .collect()
}

fn to_csv(kind: StreamKind, records: &[Record]) -> String {
    let mut out = String::new();
    match kind {
        StreamKind::Trades => {
            out.push_str(TRADES_HEADER);
            out.push('\n');
            for t in trades_of(records) {
                let time = t.time.to_string();
                push_row(
                    &mut out,
                    &[
                        &t.txid,
                        t.ordertxid.as_deref().unwrap_or(""),
                        &t.pair,
                        &time,
                        &t.side,
                        t.ordertype.as_deref().unwrap_or(""),
                        &t.price,
                        &t.cost,
                        &t.fee,
                        &t.volume,
                        t.wsname.as_deref().unwrap_or(""),
                        t.base.as_deref().unwrap_or(""),
                    ],
                );
            }
        }
        StreamKind::Rewards => {
            out.push_str(REWARDS_HEADER);
            out.push('\n');
            for r in rewards_of(records) {
                let time = r.time.to_string();
                push_row(
                    &mut out,
                    &[
                        &r.ledger_id,
                        &r.refid,
                        &time,
                        &r.entry_type,
                        &r.asset,
                        &r.amount,
                        &r.fee,
                        &r.balance,
                    ],
                );
            }
        }
    }
    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push('\n');
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
