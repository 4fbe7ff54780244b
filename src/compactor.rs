use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;

/// Compact the journal once more than `threshold` events were appended since the last compaction.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appended = engine.journal_appends_since_compact().await;
    if appended <= threshold {
        return false;
    }
    match engine.compact_journal().await {
        Ok(()) => {
            debug!(appended, "compactor ran");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps a property's journal short.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}
