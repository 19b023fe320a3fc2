//! SQLite-backed persistence for sync runs.
//!
//! One connection behind a mutex is plenty here: a run is sequential, and
//! overlapping external invocations are covered by WAL plus the idempotent
//! write shapes (INSERT OR IGNORE for records and reference entries, a
//! monotonic upsert for checkpoints).

use crate::error::Result;
use crate::models::{AssetPairInfo, Record, RewardRecord, StreamKind, TradeRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
-- WAL lets the inspect CLI read while a run is writing
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS trades (
    txid TEXT PRIMARY KEY,
    ordertxid TEXT,
    pair TEXT NOT NULL,
    time REAL NOT NULL,
    side TEXT NOT NULL,
    ordertype TEXT,
    price TEXT NOT NULL,
    cost TEXT NOT NULL,
    fee TEXT NOT NULL,
    volume TEXT NOT NULL,
    wsname TEXT,
    base TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS rewards (
    ledger_id TEXT PRIMARY KEY,
    refid TEXT NOT NULL,
    time REAL NOT NULL,
    entry_type TEXT NOT NULL,
    asset TEXT NOT NULL,
    amount TEXT NOT NULL,
    fee TEXT NOT NULL,
    balance TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS asset_pairs (
    pair_code TEXT PRIMARY KEY,
    wsname TEXT,
    base TEXT NOT NULL,
    quote TEXT,
    fetched_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS checkpoints (
    stream_kind TEXT PRIMARY KEY,
    watermark REAL NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_trades_time ON trades(time DESC);
CREATE INDEX IF NOT EXISTS idx_rewards_time ON rewards(time DESC);
"#;

/// Record, checkpoint, and reference-data persistence.
pub struct SyncStore {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)?;
        conn.execute_batch(SCHEMA_SQL)?;

        // Verify WAL mode is active (in-memory databases stay on "memory")
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !matches!(journal_mode.to_lowercase().as_str(), "wal" | "memory") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Sync database ready at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- checkpoints ----

    /// Watermark for a stream, `None` when the stream has never committed.
    pub fn checkpoint(&self, kind: StreamKind) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT watermark FROM checkpoints WHERE stream_kind = ?1")?;
        let mut rows = stmt.query(params![kind.as_str()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Advance a stream's watermark. Never moves backward: concurrent
    /// writers land on MAX(existing, proposed), so out-of-order advances
    /// commute. Call this only after the matching batch committed.
    pub fn advance_checkpoint(&self, kind: StreamKind, watermark: f64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO checkpoints (stream_kind, watermark, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(stream_kind) DO UPDATE SET
                watermark = MAX(checkpoints.watermark, excluded.watermark),
                updated_at = excluded.updated_at",
            params![kind.as_str(), watermark],
        )?;
        debug!("🔖 Checkpoint {} -> {}", kind, watermark);
        Ok(())
    }

    // ---- records ----

    /// Persist a batch in one transaction. Returns the number of rows
    /// actually inserted; re-applied records count zero (INSERT OR IGNORE
    /// keyed on the external id).
    pub fn upsert_batch(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let insert_all = || -> rusqlite::Result<usize> {
            let mut inserted = 0usize;
            for record in records {
                let changes = match record {
                    Record::Trade(t) => Self::insert_trade(&conn, t)?,
                    Record::Reward(r) => Self::insert_reward(&conn, r)?,
                };
                inserted += changes;
            }
            Ok(inserted)
        };

        let stored = match insert_all() {
            Ok(inserted) => inserted,
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e.into());
            }
        };

        conn.execute("COMMIT", [])?;

        debug!("📦 Batch stored {} of {} records", stored, records.len());
        Ok(stored)
    }

    fn insert_trade(conn: &Connection, trade: &TradeRecord) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO trades
             (txid, ordertxid, pair, time, side, ordertype, price, cost, fee, volume, wsname, base)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        stmt.execute(params![
            trade.txid,
            trade.ordertxid,
            trade.pair,
            trade.time,
            trade.side,
            trade.ordertype,
            trade.price,
            trade.cost,
            trade.fee,
            trade.volume,
            trade.wsname,
            trade.base,
        ])
    }

    fn insert_reward(conn: &Connection, reward: &RewardRecord) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO rewards
             (ledger_id, refid, time, entry_type, asset, amount, fee, balance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute(params![
            reward.ledger_id,
            reward.refid,
            reward.time,
            reward.entry_type,
            reward.asset,
            reward.amount,
            reward.fee,
            reward.balance,
        ])
    }

    pub fn get_trade(&self, txid: &str) -> Result<Option<TradeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT txid, ordertxid, pair, time, side, ordertype, price, cost, fee, volume,
                    wsname, base
             FROM trades WHERE txid = ?1",
        )?;
        let mut rows = stmt.query(params![txid])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_trade(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_reward(&self, ledger_id: &str) -> Result<Option<RewardRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ledger_id, refid, time, entry_type, asset, amount, fee, balance
             FROM rewards WHERE ledger_id = ?1",
        )?;
        let mut rows = stmt.query(params![ledger_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_reward(row)?))
        } else {
            Ok(None)
        }
    }

    fn row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<TradeRecord> {
        Ok(TradeRecord {
            txid: row.get(0)?,
            ordertxid: row.get(1)?,
            pair: row.get(2)?,
            time: row.get(3)?,
            side: row.get(4)?,
            ordertype: row.get(5)?,
            price: row.get(6)?,
            cost: row.get(7)?,
            fee: row.get(8)?,
            volume: row.get(9)?,
            wsname: row.get(10)?,
            base: row.get(11)?,
        })
    }

    fn row_to_reward(row: &rusqlite::Row) -> rusqlite::Result<RewardRecord> {
        Ok(RewardRecord {
            ledger_id: row.get(0)?,
            refid: row.get(1)?,
            time: row.get(2)?,
            entry_type: row.get(3)?,
            asset: row.get(4)?,
            amount: row.get(5)?,
            fee: row.get(6)?,
            balance: row.get(7)?,
        })
    }

    // ---- reference data ----

    /// Bulk insert-if-absent for the reference set. Existing rows are never
    /// overwritten; returns how many codes were new.
    pub fn insert_asset_pairs_if_absent(
        &self,
        pairs: &HashMap<String, AssetPairInfo>,
    ) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let insert_all = || -> rusqlite::Result<usize> {
            let mut count = 0usize;
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO asset_pairs (pair_code, wsname, base, quote)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (code, info) in pairs {
                count += stmt.execute(params![code, info.wsname, info.base, info.quote])?;
            }
            Ok(count)
        };

        let inserted = match insert_all() {
            Ok(count) => count,
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e.into());
            }
        };

        conn.execute("COMMIT", [])?;
        Ok(inserted)
    }

    pub fn get_asset_pair(&self, pair_code: &str) -> Result<Option<AssetPairInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT wsname, base, quote FROM asset_pairs WHERE pair_code = ?1")?;
        let mut rows = stmt.query(params![pair_code])?;
        if let Some(row) = rows.next()? {
            Ok(Some(AssetPairInfo {
                wsname: row.get(0)?,
                base: row.get(1)?,
                quote: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    // ---- counters / diagnostics ----

    pub fn record_count(&self, kind: StreamKind) -> Result<i64> {
        let table = match kind {
            StreamKind::Trades => "trades",
            StreamKind::Rewards => "rewards",
        };
        let conn = self.conn.lock();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    pub fn asset_pair_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM asset_pairs", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn journal_mode(&self) -> Result<String> {
        let conn = self.conn.lock();
        let mode = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode)
    }
}
