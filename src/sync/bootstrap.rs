//! Startup reconciliation of subscription coverage.

use crate::store::MirrorStore;
use crate::sync::SyncError;
use crate::sync::series::SeriesSubscriptionManager;
use std::sync::Arc;
use tracing::info;

/// Restores full listener coverage after a restart.
///
/// The mirror remembers every series ever announced; re-reading it and
/// attaching each address brings the subscription set back to where it was
/// before the process died. Runs once, after the factory subscription is
/// already live, so a series announced in between is attached exactly once
/// (attach is idempotent).
pub struct BootstrapReconciler {
    store: Arc<dyn MirrorStore>,
    series: Arc<SeriesSubscriptionManager>,
}

impl BootstrapReconciler {
    pub fn new(store: Arc<dyn MirrorStore>, series: Arc<SeriesSubscriptionManager>) -> Self {
        Self { store, series }
    }

    /// Re-attach a subscription for every mirrored collection.
    ///
    /// Returns the number of subscriptions newly opened. Any failure here
    /// leaves coverage incomplete and is surfaced as a startup error.
    pub async fn run(&self) -> Result<usize, SyncError> {
        let collections = self.store.list_collections().await?;
        info!(
            "Re-attaching listeners for {} known series",
            collections.len()
        );

        let mut attached = 0;
        for collection in &collections {
            info!("Re-attaching listener for {}", collection.contract_address);
            if self.series.attach(&collection.contract_address).await? {
                attached += 1;
            }
        }

        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMirrorStore;
    use crate::sync::factory::FactorySubscription;
    use crate::sync::testing::{ScriptedEventSource, announcement};

    #[tokio::test]
    async fn bootstrap_attaches_every_known_series_once() {
        let source = Arc::new(ScriptedEventSource::new());
        let store = Arc::new(MemoryMirrorStore::new());
        store.seed_collection("0xc1", "One", "ONE", "ipfs://1", 1);
        store.seed_collection("0xc2", "Two", "TWO", "ipfs://2", 1);
        store.seed_collection("0xc3", "Three", "THR", "ipfs://3", 1);

        let manager = Arc::new(SeriesSubscriptionManager::new(
            source.clone(),
            store.clone(),
        ));
        let bootstrap = BootstrapReconciler::new(store.clone(), manager.clone());

        assert_eq!(bootstrap.run().await.expect("bootstrap failed"), 3);
        assert_eq!(manager.active_count().await, 3);
        assert_eq!(source.series_subscribe_count(), 3);

        // A second pass finds everything already attached.
        assert_eq!(bootstrap.run().await.expect("bootstrap failed"), 0);
        assert_eq!(manager.active_count().await, 3);
        assert_eq!(source.series_subscribe_count(), 3);
    }

    #[tokio::test]
    async fn bootstrap_tolerates_a_concurrent_announcement() {
        let source = Arc::new(ScriptedEventSource::new());
        let store = Arc::new(MemoryMirrorStore::new());
        store.seed_collection("0xc2", "Two", "TWO", "ipfs://2", 1);

        let manager = Arc::new(SeriesSubscriptionManager::new(
            source.clone(),
            store.clone(),
        ));
        let factory = FactorySubscription::new(store.clone(), manager.clone());
        let bootstrap = BootstrapReconciler::new(store.clone(), manager.clone());

        // The factory announces 0xc1 while bootstrap has not run yet.
        factory
            .apply_announcement(&announcement("0xCREATOR", "0xC1", "One", "ONE", "ipfs://1"))
            .await
            .expect("announcement failed");

        // Bootstrap now sees both collections but only opens the missing one.
        assert_eq!(bootstrap.run().await.expect("bootstrap failed"), 1);
        assert_eq!(manager.active_count().await, 2);
        assert_eq!(source.series_subscribe_count(), 2);
    }
}
