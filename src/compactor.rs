use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::JournaledStore;

/// Background task that compacts the journal once `threshold` appends have
/// accumulated, checking every `period`. Runs until aborted.
pub async fn run_compactor(store: Arc<JournaledStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let appends = match store.appends_since_compact() {
            Ok(n) => n,
            Err(e) => {
                warn!("compactor: {e}");
                continue;
            }
        };
        if appends < threshold {
            continue;
        }
        // Compaction fsyncs and holds writers off; keep it off the async workers.
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.compact()).await {
            Ok(Ok(events)) => info!("compacted journal: {appends} appends → {events} events"),
            Ok(Err(e)) => warn!("compaction failed: {e}"),
            Err(e) => warn!("compaction task panicked: {e}"),
        }
    }
}

pub fn spawn_compactor(store: Arc<JournaledStore>, threshold: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run_compactor(store, threshold, period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::appointment;
    use crate::model::*;
    use crate::notify::CalendarFeed;
    use crate::ports::AppointmentStore;
    use ulid::Ulid;

    #[tokio::test]
    async fn compacts_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            JournaledStore::open(&dir.path().join("compactor.wal"), Arc::new(CalendarFeed::new())).unwrap(),
        );
        let provider = Ulid::new();
        for i in 0..4 {
            let a = store
                .create_if_no_overlap(appointment(provider, Span::new(i * 1000, (i + 1) * 1000)))
                .unwrap();
            store.set_status(a.id, AppointmentStatus::Cancelled).unwrap();
        }
        assert_eq!(store.appends_since_compact().unwrap(), 8);

        let handle = spawn_compactor(store.clone(), 5, Duration::from_millis(10));
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.appends_since_compact().unwrap() == 0 {
                compacted = true;
                break;
            }
        }
        handle.abort();
        assert!(compacted, "journal was never compacted");
        assert_eq!(store.appointment_count(), 4);
    }

    #[tokio::test]
    async fn below_threshold_leaves_journal_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            JournaledStore::open(&dir.path().join("idle.wal"), Arc::new(CalendarFeed::new())).unwrap(),
        );
        store
            .create_if_no_overlap(appointment(Ulid::new(), Span::new(0, 1000)))
            .unwrap();

        let handle = spawn_compactor(store.clone(), 100, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(store.appends_since_compact().unwrap(), 1);
    }
}
