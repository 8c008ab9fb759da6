//! Factory subscription: discovery of new series contracts.

use crate::ledger::{EventStream, SeriesAnnounced, normalize_address};
use crate::store::{CollectionRow, CreateOutcome, MirrorStore, NewCollection};
use crate::sync::SyncError;
use crate::sync::series::SeriesSubscriptionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};

/// The single long-lived subscription to the factory contract.
///
/// Each announcement upserts the creating user, mirrors the collection row
/// if it is new, and asks the series manager to start listening. A failing
/// announcement is logged and skipped; the loop itself only ends when the
/// gateway stream does.
pub struct FactorySubscription {
    store: Arc<dyn MirrorStore>,
    series: Arc<SeriesSubscriptionManager>,
    divergences: AtomicU64,
}

impl FactorySubscription {
    pub fn new(store: Arc<dyn MirrorStore>, series: Arc<SeriesSubscriptionManager>) -> Self {
        Self {
            store,
            series,
            divergences: AtomicU64::new(0),
        }
    }

    /// Announcements whose fields disagreed with an existing mirror row.
    ///
    /// The mirror is never rewritten on disagreement; this counter is the
    /// observable signal that it happened.
    pub fn divergence_count(&self) -> u64 {
        self.divergences.load(Ordering::Relaxed)
    }

    /// Consume the announcement stream until it ends.
    pub async fn run(&self, mut stream: EventStream<SeriesAnnounced>) {
        use futures_util::StreamExt;

        while let Some(item) = stream.next().await {
            match item {
                Ok(announcement) => {
                    if let Err(e) = self.apply_announcement(&announcement).await {
                        error!(
                            "Failed to process announcement for {}: {}",
                            announcement.series, e
                        );
                    }
                }
                Err(e) => {
                    error!("Factory subscription error: {}", e);
                }
            }
        }

        warn!("Factory announcement stream ended");
    }

    /// Mirror one series announcement and attach its subscription.
    pub(crate) async fn apply_announcement(
        &self,
        announcement: &SeriesAnnounced,
    ) -> Result<(), SyncError> {
        let creator = normalize_address(&announcement.creator);
        let series = normalize_address(&announcement.series);

        info!(
            "Series {} ({}) announced by {} at {}",
            announcement.name, announcement.symbol, creator, series
        );

        let owner = self.store.upsert_user(&creator).await?;

        match self.store.collection_by_address(&series).await? {
            Some(existing) => self.check_divergence(&existing, announcement),
            None => match self
                .store
                .create_collection(NewCollection {
                    contract_address: series.clone(),
                    name: announcement.name.clone(),
                    symbol: announcement.symbol.clone(),
                    metadata_uri: announcement.metadata_uri.clone(),
                    owner_id: owner.id,
                })
                .await?
            {
                CreateOutcome::Created(_) => {
                    info!("Mirrored collection {} for {}", series, owner.wallet);
                }
                // Another handler created the row between read and write.
                CreateOutcome::AlreadyExists(existing) => {
                    self.check_divergence(&existing, announcement)
                }
                CreateOutcome::NameTaken => {
                    self.divergences.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Name ({}, {}) announced for {} is claimed by another collection, leaving mirror untouched",
                        announcement.name, announcement.symbol, series
                    );
                }
            },
        }

        self.series.attach(&series).await?;
        Ok(())
    }

    fn check_divergence(&self, stored: &CollectionRow, announcement: &SeriesAnnounced) {
        if stored.name != announcement.name
            || stored.symbol != announcement.symbol
            || stored.metadata_uri != announcement.metadata_uri
        {
            self.divergences.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Announcement for {} disagrees with mirror: announced ({}, {}, {}), stored ({}, {}, {}); keeping stored row",
                stored.contract_address,
                announcement.name,
                announcement.symbol,
                announcement.metadata_uri,
                stored.name,
                stored.symbol,
                stored.metadata_uri
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMirrorStore;
    use crate::sync::testing::{ScriptedEventSource, announcement};

    fn subscription(
        source: &Arc<ScriptedEventSource>,
        store: &Arc<MemoryMirrorStore>,
    ) -> FactorySubscription {
        let manager = Arc::new(SeriesSubscriptionManager::new(
            source.clone(),
            store.clone(),
        ));
        FactorySubscription::new(store.clone(), manager)
    }

    #[tokio::test]
    async fn replayed_announcement_creates_one_collection() {
        let source = Arc::new(ScriptedEventSource::new());
        let store = Arc::new(MemoryMirrorStore::new());
        let factory = subscription(&source, &store);

        let event = announcement("0xCREATOR", "0xSERIES", "Demo", "DMO", "ipfs://meta");
        factory
            .apply_announcement(&event)
            .await
            .expect("first announcement failed");
        factory
            .apply_announcement(&event)
            .await
            .expect("replayed announcement failed");

        assert_eq!(store.collection_count(), 1);
        assert_eq!(store.user_count(), 1);
        assert_eq!(factory.divergence_count(), 0);
        assert_eq!(source.series_subscribe_count(), 1);
    }

    #[tokio::test]
    async fn divergent_announcement_keeps_stored_row() {
        let source = Arc::new(ScriptedEventSource::new());
        let store = Arc::new(MemoryMirrorStore::new());
        let factory = subscription(&source, &store);

        factory
            .apply_announcement(&announcement(
                "0xCREATOR", "0xSERIES", "A", "AAA", "ipfs://meta",
            ))
            .await
            .expect("first announcement failed");
        factory
            .apply_announcement(&announcement(
                "0xCREATOR", "0xSERIES", "B", "BBB", "ipfs://other",
            ))
            .await
            .expect("divergent announcement failed");

        let stored = store
            .collection_by_address("0xseries")
            .await
            .expect("lookup failed")
            .expect("collection missing");
        assert_eq!(stored.name, "A");
        assert_eq!(stored.symbol, "AAA");
        assert_eq!(stored.metadata_uri, "ipfs://meta");
        assert_eq!(factory.divergence_count(), 1);
    }

    #[tokio::test]
    async fn claimed_name_is_surfaced_without_creating_a_row() {
        let source = Arc::new(ScriptedEventSource::new());
        let store = Arc::new(MemoryMirrorStore::new());
        let factory = subscription(&source, &store);

        factory
            .apply_announcement(&announcement(
                "0xCREATOR", "0xAAA", "Demo", "DMO", "ipfs://meta",
            ))
            .await
            .expect("first announcement failed");
        factory
            .apply_announcement(&announcement(
                "0xCREATOR", "0xBBB", "Demo", "DMO", "ipfs://other",
            ))
            .await
            .expect("conflicting announcement failed");

        assert_eq!(store.collection_count(), 1);
        assert_eq!(factory.divergence_count(), 1);
    }
}
