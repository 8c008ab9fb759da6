//! Mirror store access.
//!
//! The mirror is a read-optimized relational projection of ledger state.
//! Every write is an upsert keyed by chain-assigned natural identifiers
//! (wallet address, contract address, entry index, token id), which makes
//! duplicate and out-of-order delivery safe. Two backends implement the same
//! contract: Postgres for production and an in-memory store for tests and
//! short-lived runs.

pub mod memory;
pub mod postgres;

pub use memory::MemoryMirrorStore;
pub use postgres::PgMirrorStore;

use chrono::{DateTime, Utc};

/// A wallet known to the mirror.
///
/// Created implicitly the first time its address appears as a creator or a
/// recipient; never deleted here.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
	pub id: i64,
	/// Lowercased wallet address, globally unique.
	pub wallet: String,
}

/// A mirrored series contract.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRow {
	pub id: i64,
	/// Lowercased deployed contract address, globally unique and immutable.
	pub contract_address: String,
	pub name: String,
	pub symbol: String,
	pub metadata_uri: String,
	/// Populated by the upload API, never by the indexer.
	pub cover_image: Option<String>,
	/// Owning user, set at creation and immutable.
	pub owner_id: i64,
	pub created_at: DateTime<Utc>,
}

/// One content entry within a collection, keyed by (collection, entry index).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntryRow {
	pub id: i64,
	pub collection_id: i64,
	pub entry_index: i64,
	/// Content reference (CID-style URI).
	pub cid: String,
	pub media_type: String,
	pub title: String,
	pub description: String,
}

/// First-mint ownership record, keyed by (collection, token id).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OwnershipRow {
	pub id: i64,
	pub collection_id: i64,
	pub token_id: i64,
	pub user_id: i64,
}

/// Fields for a collection row created from a factory announcement.
#[derive(Debug, Clone)]
pub struct NewCollection {
	pub contract_address: String,
	pub name: String,
	pub symbol: String,
	pub metadata_uri: String,
	pub owner_id: i64,
}

/// Entry fields supplied by an entry-added event.
#[derive(Debug, Clone)]
pub struct EntryFields {
	pub cid: String,
	pub media_type: String,
	pub title: String,
	pub description: String,
}

/// Outcome of a create-if-absent collection write.
#[derive(Debug)]
pub enum CreateOutcome {
	/// The row was created by this call.
	Created(CollectionRow),
	/// A row for this contract address already existed; it is returned
	/// unchanged so the caller can compare fields.
	AlreadyExists(CollectionRow),
	/// The (name, symbol) pair is already claimed by a different contract.
	/// The mirror is left untouched.
	NameTaken,
}

/// Error types for mirror store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Row missing after write: {0}")]
	MissingRow(String),
}

/// Persistence contract for the four mirrored entities.
///
/// Every operation is atomic at the single-row level: two callers racing on
/// the same natural key must collapse to one row. Implementations delegate
/// that guarantee to the backend's conditional-write primitive rather than
/// in-process locking.
#[async_trait::async_trait]
pub trait MirrorStore: Send + Sync {
	/// Create the user for `wallet` if absent; either way, return the row.
	async fn upsert_user(&self, wallet: &str) -> Result<UserRow, StoreError>;

	/// Look up a collection by its contract address.
	async fn collection_by_address(
		&self,
		contract_address: &str,
	) -> Result<Option<CollectionRow>, StoreError>;

	/// Create a collection if no row exists for its contract address.
	/// A uniqueness conflict is an outcome, not an error.
	async fn create_collection(&self, new: NewCollection) -> Result<CreateOutcome, StoreError>;

	/// Insert or update the entry at (collection, entry index).
	///
	/// On update only the content reference and media type are rewritten;
	/// title and description keep their stored values.
	async fn upsert_entry(
		&self,
		collection_id: i64,
		entry_index: i64,
		fields: EntryFields,
	) -> Result<EntryRow, StoreError>;

	/// Record the first mint of (collection, token id) for `user_id`.
	///
	/// If the record already exists it is returned unchanged; ownership is
	/// never reassigned here.
	async fn upsert_ownership(
		&self,
		collection_id: i64,
		token_id: i64,
		user_id: i64,
	) -> Result<OwnershipRow, StoreError>;

	/// All collections currently mirrored.
	async fn list_collections(&self) -> Result<Vec<CollectionRow>, StoreError>;
}
