//! Ledger gateway integration: typed event subscriptions over GraphQL.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

pub mod client;
pub mod types;

pub use client::GatewayLedgerClient;
pub use types::*;

/// Lazy, unbounded stream of decoded events from one contract subscription.
///
/// Delivery is at-least-once: reconnects and gateway replays can duplicate
/// events, and the stream may end silently on transport loss. Consumers must
/// stay idempotent and must not assume liveness.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, LedgerError>> + Send>>;

/// Source of decoded contract events.
///
/// One implementation speaks to the real gateway; tests script their own.
#[async_trait]
pub trait EventSource: Send + Sync {
	/// Subscribe to series announcements emitted by the factory contract.
	async fn subscribe_factory(
		&self,
		factory_address: &str,
	) -> Result<EventStream<SeriesAnnounced>, LedgerError>;

	/// Subscribe to entry and mint events emitted by one series contract.
	async fn subscribe_series(
		&self,
		series_address: &str,
	) -> Result<EventStream<SeriesEvent>, LedgerError>;
}
