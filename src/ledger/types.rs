//! Types for the ledger gateway subscription protocol

use serde::{Deserialize, Serialize};

/// Announcement of a newly deployed series contract, emitted by the factory.
///
/// This struct represents one `SeriesCreated` event as decoded by the gateway,
/// carrying the creator wallet, the deployed contract address and the series
/// metadata recorded on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesAnnounced {
	/// Wallet address of the account that created the series.
	pub creator: String,
	/// Address of the deployed series contract.
	pub series: String,
	/// Display name of the series.
	pub name: String,
	/// Token symbol of the series.
	pub symbol: String,
	/// Off-chain metadata reference for the series.
	#[serde(rename = "metadataURI")]
	pub metadata_uri: String,
}

/// Events emitted by a single series contract.
///
/// This enum represents the event types a series subscription can yield.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum SeriesEvent {
	/// A content entry was appended to the series.
	EntryAdded {
		/// Chain-assigned, zero-based index of the entry within its series.
		#[serde(rename = "entryIndex")]
		entry_index: u64,
		/// Content reference (CID-style URI) for the entry payload.
		#[serde(rename = "contentURI")]
		content_uri: String,
		/// Entry title (may be empty for older contracts).
		#[serde(default)]
		title: String,
		/// Entry description (may be empty for older contracts).
		#[serde(default)]
		description: String,
	},
	/// A token was minted to a recipient.
	Minted {
		/// Wallet address receiving the token.
		#[serde(rename = "to")]
		recipient: String,
		/// Chain-assigned token id, unique within its series.
		#[serde(rename = "tokenId")]
		token_id: u64,
	},
}

/// Lowercase an address so lookups and registry keys are case-insensitive.
///
/// Gateways are inconsistent about checksummed casing; every address must go
/// through here before it is used as a store or registry key.
pub fn normalize_address(address: &str) -> String {
	address.trim().to_ascii_lowercase()
}

/// Error types for gateway queries and subscriptions
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("GraphQL error: {0}")]
	GraphQL(String),

	#[error("No data returned")]
	NoData,

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Subscription error: {0}")]
	Subscription(String),
}
