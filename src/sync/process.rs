//! Composition root for the indexing engine.
//!
//! The `IndexerProcess` wires the factory subscription, the bootstrap pass
//! and the series subscription manager together and keeps them alive for the
//! lifetime of the process. The factory subscription is opened before
//! bootstrap reads the mirror, so a series announced in between is attached
//! (idempotently) rather than missed.

use crate::ledger::EventSource;
use crate::store::MirrorStore;
use crate::sync::SyncError;
use crate::sync::bootstrap::BootstrapReconciler;
use crate::sync::factory::FactorySubscription;
use crate::sync::series::SeriesSubscriptionManager;
use std::sync::Arc;
use tracing::{error, info};

/// Long-running process that mirrors factory and series events.
pub struct IndexerProcess {
    source: Arc<dyn EventSource>,
    factory_address: String,
    series: Arc<SeriesSubscriptionManager>,
    factory: Arc<FactorySubscription>,
    bootstrap: BootstrapReconciler,
}

impl IndexerProcess {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn MirrorStore>,
        factory_address: String,
    ) -> Self {
        let series = Arc::new(SeriesSubscriptionManager::new(source.clone(), store.clone()));
        let factory = Arc::new(FactorySubscription::new(store.clone(), series.clone()));
        let bootstrap = BootstrapReconciler::new(store, series.clone());

        Self {
            source,
            factory_address,
            series,
            factory,
            bootstrap,
        }
    }

    /// Number of live series subscriptions; a liveness hook for callers that
    /// own the reconnect policy.
    pub async fn subscription_count(&self) -> usize {
        self.series.active_count().await
    }

    /// Announcements that disagreed with the mirror so far.
    pub fn divergence_count(&self) -> u64 {
        self.factory.divergence_count()
    }

    /// Run the engine for the lifetime of its subscriptions.
    ///
    /// Failure to open the factory subscription or to finish bootstrap is a
    /// startup failure. After startup the engine only returns once the
    /// gateway stops delivering on every stream; per-event failures never
    /// propagate this far.
    pub async fn run(&self) -> Result<(), SyncError> {
        let factory_stream = self.source.subscribe_factory(&self.factory_address).await?;
        info!(
            "Listening for series announcements at factory {}",
            self.factory_address
        );

        let factory = self.factory.clone();
        let factory_task = tokio::spawn(async move { factory.run(factory_stream).await });

        let attached = self.bootstrap.run().await?;
        info!("Bootstrap complete: {} series listeners restored", attached);

        if let Err(e) = factory_task.await {
            error!("Factory subscription task failed: {}", e);
        }
        self.series.join_all().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SeriesEvent;
    use crate::store::{MemoryMirrorStore, MirrorStore};
    use crate::sync::series::MEDIA_TYPE_UNKNOWN;
    use crate::sync::testing::{ScriptedEventSource, announcement};

    #[tokio::test]
    async fn factory_entry_and_mint_flow_lands_in_the_mirror() {
        let source = Arc::new(ScriptedEventSource::new());
        source.set_hold_open(false);
        source.push_factory(announcement(
            "0xCREATOR", "0xSERIES", "Demo", "DMO", "ipfs://meta",
        ));
        source.push_series(
            "0xseries",
            SeriesEvent::EntryAdded {
                entry_index: 0,
                content_uri: "ipfs://e0".to_string(),
                title: "Intro".to_string(),
                description: "desc".to_string(),
            },
        );
        source.push_series(
            "0xseries",
            SeriesEvent::Minted {
                recipient: "0xUSER".to_string(),
                token_id: 7,
            },
        );

        let store = Arc::new(MemoryMirrorStore::new());
        let process = IndexerProcess::new(source, store.clone(), "0xfac".to_string());

        process.run().await.expect("run failed");

        let creator = store.user_by_wallet("0xcreator").expect("creator missing");
        let collection = store
            .collection_by_address("0xseries")
            .await
            .expect("lookup failed")
            .expect("collection missing");
        assert_eq!(collection.name, "Demo");
        assert_eq!(collection.symbol, "DMO");
        assert_eq!(collection.owner_id, creator.id);

        let entry = store.entry(collection.id, 0).expect("entry missing");
        assert_eq!(entry.cid, "ipfs://e0");
        assert_eq!(entry.media_type, MEDIA_TYPE_UNKNOWN);

        let minter = store.user_by_wallet("0xuser").expect("recipient missing");
        let record = store.ownership(collection.id, 7).expect("record missing");
        assert_eq!(record.user_id, minter.id);

        assert_eq!(process.divergence_count(), 0);
    }

    #[tokio::test]
    async fn bootstrap_runs_against_a_prepopulated_mirror() {
        let source = Arc::new(ScriptedEventSource::new());
        source.set_hold_open(false);
        source.push_series(
            "0xc1",
            SeriesEvent::Minted {
                recipient: "0xUSER".to_string(),
                token_id: 1,
            },
        );

        let store = Arc::new(MemoryMirrorStore::new());
        let collection = store.seed_collection("0xc1", "One", "ONE", "ipfs://1", 1);

        let process = IndexerProcess::new(source, store.clone(), "0xfac".to_string());
        process.run().await.expect("run failed");

        assert!(store.ownership(collection.id, 1).is_some());
    }
}
