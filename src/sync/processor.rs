//! Per-stream sync pass: fetch, dedup, enrich, persist, checkpoint.

use crate::config::Config;
use crate::error::Result;
use crate::export;
use crate::models::{Record, RunResult, StreamKind};
use crate::storage::SyncStore;
use crate::sync::fetcher::PageWalk;
use crate::sync::pairs::{enrich_records, PairCache};
use crate::sync::source::RecordSource;
use std::collections::HashSet;
use tracing::{info, warn};

pub struct StreamProcessor<'a, S: RecordSource + ?Sized> {
    config: &'a Config,
    store: &'a SyncStore,
    source: &'a S,
}

impl<'a, S: RecordSource + ?Sized> StreamProcessor<'a, S> {
    pub fn new(config: &'a Config, store: &'a SyncStore, source: &'a S) -> Self {
        Self {
            config,
            store,
            source,
        }
    }

    /// One full pass for a stream.
    ///
    /// The order near the end is the whole point: the batch commits to
    /// storage first, the checkpoint advances second. A crash in between
    /// re-fetches some records next run (deduplicated by id) but can never
    /// skip any. Any failure before the commit leaves the checkpoint alone.
    pub async fn run(&self, kind: StreamKind) -> Result<RunResult> {
        let floor = self
            .store
            .checkpoint(kind)?
            .unwrap_or(self.config.epoch_start);
        info!("📥 Syncing {} from watermark {}", kind, floor);

        let mut walk = PageWalk::new(self.source, kind, floor);
        let mut batch: Vec<Record> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut fetched = 0usize;
        let mut min_time: Option<f64> = None;

        while let Some(page) = walk.next_page().await? {
            fetched += page.len();
            for record in page {
                let t = record.time();
                min_time = Some(match min_time {
                    Some(m) => m.min(t),
                    None => t,
                });
                // In-run duplicates can only appear at page boundaries
                if seen.insert(record.external_id().to_string()) {
                    batch.push(record);
                }
            }
        }
        let pages = walk.pages();

        let Some(new_watermark) = min_time else {
            info!("💤 {}: nothing to sync", kind);
            return Ok(RunResult {
                records_fetched: 0,
                records_stored: 0,
                pages,
                new_watermark: floor,
            });
        };

        if kind == StreamKind::Trades {
            let mut cache = PairCache::new(self.store, self.source);
            enrich_records(&mut cache, &mut batch).await?;
        }

        let stored = self.store.upsert_batch(&batch)?;
        self.store.advance_checkpoint(kind, new_watermark)?;

        info!(
            "✅ {}: {} fetched, {} stored over {} pages, watermark -> {}",
            kind, fetched, stored, pages, new_watermark
        );

        if self.config.export_enabled {
            if let Err(e) = export::write_batch(kind, &batch, &self.config.export_dir) {
                warn!("⚠️  Export failed for {}: {:#}", kind, e);
            }
        }

        Ok(RunResult {
            records_fetched: fetched,
            records_stored: stored,
            pages,
            new_watermark,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::sync::testutil::{pair_info, reward, trade, ScriptedSource};
    use std::collections::HashMap;
    use std::fs;

    fn test_config() -> Config {
        Config {
            api_key: "key".to_string(),
            api_secret: "c2VjcmV0".to_string(),
            api_base_url: "https://api.kraken.com".to_string(),
            api_key_expiry: None,
            database_path: ":memory:".to_string(),
            page_limit: 50,
            epoch_start: 0.0,
            page_delay_ms: 0,
            request_timeout_secs: 30,
            export_enabled: false,
            export_dir: "./outputs".to_string(),
            trigger_port: 8000,
        }
    }

    fn store() -> SyncStore {
        SyncStore::new(":memory:").expect("Failed to create in-memory store")
    }

    #[tokio::test]
    async fn multi_page_run_stores_all_and_checkpoints_the_minimum() {
        let config = test_config();
        let store = store();
        let source = ScriptedSource::new();
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L3", 300.0), reward("L2", 200.0)],
        );
        source.push_page(StreamKind::Rewards, vec![reward("L1", 100.5)]);

        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("run succeeds");

        assert_eq!(result.records_fetched, 3);
        assert_eq!(result.records_stored, 3);
        assert_eq!(result.pages, 2);
        assert_eq!(result.new_watermark, 100.5);
        assert_eq!(store.checkpoint(StreamKind::Rewards).unwrap(), Some(100.5));
        assert_eq!(store.record_count(StreamKind::Rewards).unwrap(), 3);
    }

    #[tokio::test]
    async fn boundary_duplicates_are_dropped_in_run() {
        let config = test_config();
        let store = store();
        let source = ScriptedSource::new();
        // L2 appears on both sides of the page boundary
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L3", 300.0), reward("L2", 200.0)],
        );
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L2", 200.0), reward("L1", 100.0)],
        );

        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("run succeeds");

        assert_eq!(result.records_fetched, 4);
        assert_eq!(result.records_stored, 3);
        assert_eq!(store.record_count(StreamKind::Rewards).unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_run_leaves_checkpoint_untouched() {
        let config = test_config();
        let store = store();
        store
            .advance_checkpoint(StreamKind::Trades, 555.0)
            .expect("seed checkpoint");

        let source = ScriptedSource::new();
        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Trades)
            .await
            .expect("empty run succeeds");

        assert_eq!(result.records_fetched, 0);
        assert_eq!(result.new_watermark, 555.0);
        assert_eq!(store.checkpoint(StreamKind::Trades).unwrap(), Some(555.0));
    }

    #[tokio::test]
    async fn failure_mid_walk_stores_nothing_and_keeps_checkpoint() {
        let config = test_config();
        let store = store();
        let source = ScriptedSource::new();
        source.push_page(StreamKind::Rewards, vec![reward("L5", 500.0)]);
        source.push_transport_failure(StreamKind::Rewards, "boom");

        let err = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect_err("run must fail");

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(store.record_count(StreamKind::Rewards).unwrap(), 0);
        assert_eq!(store.checkpoint(StreamKind::Rewards).unwrap(), None);
    }

    #[tokio::test]
    async fn trades_run_enriches_before_persisting() {
        let config = test_config();
        let store = store();
        let source = ScriptedSource::new();
        let mut pairs = HashMap::new();
        pairs.insert("XXBTZUSD".to_string(), pair_info(Some("XBT/USD"), "XXBT"));
        source.set_asset_pairs(pairs);
        source.push_page(
            StreamKind::Trades,
            vec![
                trade("T1", "XXBTZUSD", 900.0),
                trade("T2", "MISSING", 800.0),
            ],
        );

        StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Trades)
            .await
            .expect("run succeeds");

        let t1 = store.get_trade("T1").unwrap().expect("T1 stored");
        assert_eq!(t1.base.as_deref(), Some("BTC"));
        assert_eq!(t1.wsname.as_deref(), Some("BTC/USD"));

        let t2 = store.get_trade("T2").unwrap().expect("T2 stored");
        assert_eq!(t2.base.as_deref(), Some("MISSING"));
        assert_eq!(store.checkpoint(StreamKind::Trades).unwrap(), Some(800.0));
    }

    #[tokio::test]
    async fn rerun_over_same_window_is_idempotent() {
        let config = test_config();
        let store = store();

        let source = ScriptedSource::new();
        source.push_page(StreamKind::Rewards, vec![reward("L1", 100.0)]);
        StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("first run");

        // Next invocation sees the same record again (plus a newer one)
        let source = ScriptedSource::new();
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L2", 150.0), reward("L1", 100.0)],
        );
        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("second run");

        assert_eq!(result.records_fetched, 2);
        assert_eq!(result.records_stored, 1);
        assert_eq!(store.record_count(StreamKind::Rewards).unwrap(), 2);
        // Watermark stays at the oldest boundary (monotonic guard)
        assert_eq!(store.checkpoint(StreamKind::Rewards).unwrap(), Some(100.0));
    }

    #[tokio::test]
    async fn export_enabled_run_writes_batch_files_after_commit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            export_enabled: true,
            export_dir: dir.path().to_str().expect("utf8 path").to_string(),
            ..test_config()
        };
        let store = store();
        let source = ScriptedSource::new();
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L2", 20.0), reward("L1", 10.0)],
        );

        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("run succeeds");

        assert_eq!(result.records_stored, 2);
        assert_eq!(store.checkpoint(StreamKind::Rewards).unwrap(), Some(10.0));

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .expect("read export dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("rewards_") && names[0].ends_with(".csv"));
        assert!(names[1].starts_with("rewards_") && names[1].ends_with(".json"));
    }

    #[tokio::test]
    async fn export_failure_does_not_fail_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A plain file where the export directory should go
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"not a directory").expect("write blocker");

        let config = Config {
            export_enabled: true,
            export_dir: blocker.to_str().expect("utf8 path").to_string(),
            ..test_config()
        };
        let store = store();
        let source = ScriptedSource::new();
        source.push_page(
            StreamKind::Rewards,
            vec![reward("L3", 300.0), reward("L2", 200.0), reward("L1", 100.0)],
        );

        let result = StreamProcessor::new(&config, &store, &source)
            .run(StreamKind::Rewards)
            .await
            .expect("run still succeeds");

        assert_eq!(result.records_stored, 3);
        assert_eq!(store.record_count(StreamKind::Rewards).unwrap(), 3);
        assert_eq!(store.checkpoint(StreamKind::Rewards).unwrap(), Some(100.0));
        assert!(blocker.is_file());
    }
}
