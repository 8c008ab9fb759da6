//! Per-series subscriptions and their registry.
//!
//! The `SeriesSubscriptionManager` owns every live series subscription, keyed
//! by contract address. `attach` is idempotent, so the factory subscription
//! and the bootstrap pass can both request the same series without
//! double-listening. Each subscription runs as its own task; events are
//! applied to the mirror with per-event error isolation.

use crate::ledger::{EventSource, EventStream, SeriesEvent, normalize_address};
use crate::store::{EntryFields, MirrorStore};
use crate::sync::SyncError;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Media type recorded for entries until the population API refines it.
pub const MEDIA_TYPE_UNKNOWN: &str = "unknown";

type Registry = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Owns zero or more per-series subscriptions, keyed by contract address.
///
/// Guarantees at most one active subscription per address at any time. A
/// subscription whose stream ends removes itself from the registry, so
/// `active_count` and `is_attached` reflect liveness and the caller can
/// decide whether to re-attach.
pub struct SeriesSubscriptionManager {
    source: Arc<dyn EventSource>,
    store: Arc<dyn MirrorStore>,
    active: Registry,
}

impl SeriesSubscriptionManager {
    pub fn new(source: Arc<dyn EventSource>, store: Arc<dyn MirrorStore>) -> Self {
        Self {
            source,
            store,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start listening for events from `series_address`.
    ///
    /// Returns `true` if a new subscription was opened and `false` if one was
    /// already active. The registry lock is held across the subscribe call,
    /// so concurrent attaches serialize; event handlers never take this lock.
    pub async fn attach(&self, series_address: &str) -> Result<bool, SyncError> {
        let address = normalize_address(series_address);

        let mut active = self.active.lock().await;
        if active.contains_key(&address) {
            debug!("Subscription for {} already active, skipping", address);
            return Ok(false);
        }

        let stream = self.source.subscribe_series(&address).await?;
        info!("Listening for series events at {}", address);

        let handle = tokio::spawn(run_series_subscription(
            address.clone(),
            stream,
            self.store.clone(),
            self.active.clone(),
        ));
        active.insert(address, handle);

        Ok(true)
    }

    /// Whether a subscription for `series_address` is currently running.
    pub async fn is_attached(&self, series_address: &str) -> bool {
        self.active
            .lock()
            .await
            .contains_key(&normalize_address(series_address))
    }

    /// Number of live series subscriptions.
    ///
    /// A count that drops without a matching request means a gateway stream
    /// went away; the caller owns the reconnect policy.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Wait until every running subscription task has finished.
    ///
    /// Series streams are unbounded in production, so this returns only once
    /// the gateway stops delivering; it exists for orderly teardown.
    pub async fn join_all(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut active = self.active.lock().await;
                active.drain().map(|(_, handle)| handle).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Series subscription task failed: {}", e);
                }
            }
        }
    }
}

/// Consume one series event stream until it ends.
///
/// Every event is handled in isolation: a store failure or malformed event
/// is logged and dropped, never allowed to break the subscription.
async fn run_series_subscription(
    address: String,
    mut stream: EventStream<SeriesEvent>,
    store: Arc<dyn MirrorStore>,
    registry: Registry,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let Err(e) = apply_series_event(&address, &event, store.as_ref()).await {
                    warn!("Dropping series event for {}: {}", address, e);
                }
            }
            Err(e) => {
                error!("Series subscription error for {}: {}", address, e);
            }
        }
    }

    warn!("Series event stream for {} ended", address);
    registry.lock().await.remove(&address);
}

/// Apply one decoded series event to the mirror.
pub(crate) async fn apply_series_event(
    series_address: &str,
    event: &SeriesEvent,
    store: &dyn MirrorStore,
) -> Result<(), SyncError> {
    match event {
        SeriesEvent::EntryAdded {
            entry_index,
            content_uri,
            title,
            description,
        } => {
            let Some(collection) = store.collection_by_address(series_address).await? else {
                // The factory handler creates the row; tolerate the ordering
                // gap and drop the event rather than inventing a parent.
                warn!(
                    "Entry {} for unknown series {}, dropping",
                    entry_index, series_address
                );
                return Ok(());
            };

            store
                .upsert_entry(
                    collection.id,
                    *entry_index as i64,
                    EntryFields {
                        cid: content_uri.clone(),
                        media_type: MEDIA_TYPE_UNKNOWN.to_string(),
                        title: title.clone(),
                        description: description.clone(),
                    },
                )
                .await?;

            info!(
                "Mirrored entry {} of {} -> {}",
                entry_index, series_address, content_uri
            );
        }
        SeriesEvent::Minted {
            recipient,
            token_id,
        } => {
            let Some(collection) = store.collection_by_address(series_address).await? else {
                warn!(
                    "Mint of token {} for unknown series {}, dropping",
                    token_id, series_address
                );
                return Ok(());
            };

            let owner = store.upsert_user(&normalize_address(recipient)).await?;
            store
                .upsert_ownership(collection.id, *token_id as i64, owner.id)
                .await?;

            info!(
                "Mirrored mint of token {} in {} to {}",
                token_id, series_address, owner.wallet
            );
        }
    }

    Ok(())
}
