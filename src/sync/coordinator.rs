//! Per-invocation orchestration across streams.

use crate::config::Config;
use crate::models::{RunReport, StreamKind, StreamOutcome};
use crate::storage::SyncStore;
use crate::sync::processor::StreamProcessor;
use crate::sync::source::RecordSource;
use std::sync::Arc;
use tracing::{error, info};

/// Runs each stream to completion and keeps their failures apart: a dead
/// trades fetch still lets rewards sync. Owns its configuration outright;
/// nothing here reads the environment.
pub struct Coordinator<S: RecordSource> {
    config: Config,
    store: Arc<SyncStore>,
    source: S,
}

impl<S: RecordSource> Coordinator<S> {
    pub fn new(config: Config, store: Arc<SyncStore>, source: S) -> Self {
        Self {
            config,
            store,
            source,
        }
    }

    /// Run the given streams sequentially, capturing each outcome.
    /// Never stops mid-way: a failure is recorded and the next stream runs.
    pub async fn run_all(&self, kinds: &[StreamKind]) -> RunReport {
        let mut report = RunReport::default();

        for &kind in kinds {
            let processor = StreamProcessor::new(&self.config, &self.store, &self.source);
            let result = processor.run(kind).await;

            if let Err(e) = &result {
                error!("❌ {} stream failed ({}): {}", kind, e.kind(), e);
            }
            report.outcomes.push(StreamOutcome { kind, result });
        }

        let ok = report.outcomes.len() - report.failed_count();
        info!(
            "📊 Run complete: {}/{} streams ok",
            ok,
            report.outcomes.len()
        );
        report
    }
}
