use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::observability;

/// Background task that rewrites a tenant's WAL once enough appends have
/// accumulated since the last compaction. The rewrite folds the event
/// history into one snapshot-shaped sequence, so replay cost stays
/// proportional to live state rather than total history.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => {
                metrics::counter!(observability::COMPACTIONS_TOTAL).increment(1);
                info!("compacted WAL after {appends} appends");
            }
            Err(e) => {
                tracing::warn!("WAL compaction failed: {e}");
            }
        }
    }
}
