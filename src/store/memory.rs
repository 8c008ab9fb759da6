//! In-memory mirror store.
//!
//! Holds the same four tables as the Postgres backend in RAM, with the same
//! upsert semantics. Useful for tests and short-lived local runs; all data
//! is lost when the process exits.

use super::{
	CollectionRow, CreateOutcome, EntryFields, EntryRow, MirrorStore, NewCollection,
	OwnershipRow, StoreError, UserRow,
};
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
	next_id: i64,
	users: Vec<UserRow>,
	collections: Vec<CollectionRow>,
	entries: Vec<EntryRow>,
	ownerships: Vec<OwnershipRow>,
}

impl Inner {
	fn allocate_id(&mut self) -> i64 {
		self.next_id += 1;
		self.next_id
	}
}

/// In-memory implementation of the mirror store contract.
#[derive(Default)]
pub struct MemoryMirrorStore {
	inner: Mutex<Inner>,
}

impl MemoryMirrorStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of user rows.
	pub fn user_count(&self) -> usize {
		self.inner.lock().unwrap().users.len()
	}

	/// Number of collection rows.
	pub fn collection_count(&self) -> usize {
		self.inner.lock().unwrap().collections.len()
	}

	/// Number of entry rows.
	pub fn entry_count(&self) -> usize {
		self.inner.lock().unwrap().entries.len()
	}

	/// Number of ownership rows.
	pub fn ownership_count(&self) -> usize {
		self.inner.lock().unwrap().ownerships.len()
	}

	/// Look up a user by wallet address.
	pub fn user_by_wallet(&self, wallet: &str) -> Option<UserRow> {
		self.inner
			.lock()
			.unwrap()
			.users
			.iter()
			.find(|u| u.wallet == wallet)
			.cloned()
	}

	/// Look up an entry by its natural key.
	pub fn entry(&self, collection_id: i64, entry_index: i64) -> Option<EntryRow> {
		self.inner
			.lock()
			.unwrap()
			.entries
			.iter()
			.find(|e| e.collection_id == collection_id && e.entry_index == entry_index)
			.cloned()
	}

	/// Look up an ownership record by its natural key.
	pub fn ownership(&self, collection_id: i64, token_id: i64) -> Option<OwnershipRow> {
		self.inner
			.lock()
			.unwrap()
			.ownerships
			.iter()
			.find(|o| o.collection_id == collection_id && o.token_id == token_id)
			.cloned()
	}

	/// Insert a collection row directly, bypassing announcement handling.
	///
	/// Lets tests and local tools seed a mirror that predates the process.
	pub fn seed_collection(
		&self,
		contract_address: &str,
		name: &str,
		symbol: &str,
		metadata_uri: &str,
		owner_id: i64,
	) -> CollectionRow {
		let mut inner = self.inner.lock().unwrap();
		let row = CollectionRow {
			id: inner.allocate_id(),
			contract_address: contract_address.to_string(),
			name: name.to_string(),
			symbol: symbol.to_string(),
			metadata_uri: metadata_uri.to_string(),
			cover_image: None,
			owner_id,
			created_at: Utc::now(),
		};
		inner.collections.push(row.clone());
		row
	}
}

#[async_trait::async_trait]
impl MirrorStore for MemoryMirrorStore {
	async fn upsert_user(&self, wallet: &str) -> Result<UserRow, StoreError> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(existing) = inner.users.iter().find(|u| u.wallet == wallet) {
			return Ok(existing.clone());
		}
		let row = UserRow {
			id: inner.allocate_id(),
			wallet: wallet.to_string(),
		};
		inner.users.push(row.clone());
		Ok(row)
	}

	async fn collection_by_address(
		&self,
		contract_address: &str,
	) -> Result<Option<CollectionRow>, StoreError> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.collections
			.iter()
			.find(|c| c.contract_address == contract_address)
			.cloned())
	}

	async fn create_collection(&self, new: NewCollection) -> Result<CreateOutcome, StoreError> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(existing) = inner
			.collections
			.iter()
			.find(|c| c.contract_address == new.contract_address)
		{
			return Ok(CreateOutcome::AlreadyExists(existing.clone()));
		}
		if inner
			.collections
			.iter()
			.any(|c| c.name == new.name && c.symbol == new.symbol)
		{
			return Ok(CreateOutcome::NameTaken);
		}
		let row = CollectionRow {
			id: inner.allocate_id(),
			contract_address: new.contract_address,
			name: new.name,
			symbol: new.symbol,
			metadata_uri: new.metadata_uri,
			cover_image: None,
			owner_id: new.owner_id,
			created_at: Utc::now(),
		};
		inner.collections.push(row.clone());
		Ok(CreateOutcome::Created(row))
	}

	async fn upsert_entry(
		&self,
		collection_id: i64,
		entry_index: i64,
		fields: EntryFields,
	) -> Result<EntryRow, StoreError> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(existing) = inner
			.entries
			.iter_mut()
			.find(|e| e.collection_id == collection_id && e.entry_index == entry_index)
		{
			existing.cid = fields.cid;
			existing.media_type = fields.media_type;
			return Ok(existing.clone());
		}
		let row = EntryRow {
			id: inner.allocate_id(),
			collection_id,
			entry_index,
			cid: fields.cid,
			media_type: fields.media_type,
			title: fields.title,
			description: fields.description,
		};
		inner.entries.push(row.clone());
		Ok(row)
	}

	async fn upsert_ownership(
		&self,
		collection_id: i64,
		token_id: i64,
		user_id: i64,
	) -> Result<OwnershipRow, StoreError> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(existing) = inner
			.ownerships
			.iter()
			.find(|o| o.collection_id == collection_id && o.token_id == token_id)
		{
			// Already minted; the stored owner stands.
			return Ok(existing.clone());
		}
		let row = OwnershipRow {
			id: inner.allocate_id(),
			collection_id,
			token_id,
			user_id,
		};
		inner.ownerships.push(row.clone());
		Ok(row)
	}

	async fn list_collections(&self) -> Result<Vec<CollectionRow>, StoreError> {
		Ok(self.inner.lock().unwrap().collections.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry_fields(cid: &str, media_type: &str, title: &str) -> EntryFields {
		EntryFields {
			cid: cid.to_string(),
			media_type: media_type.to_string(),
			title: title.to_string(),
			description: "desc".to_string(),
		}
	}

	#[tokio::test]
	async fn upsert_user_is_idempotent() {
		let store = MemoryMirrorStore::new();
		let first = store.upsert_user("0xabc").await.expect("upsert failed");
		let second = store.upsert_user("0xabc").await.expect("upsert failed");
		assert_eq!(first.id, second.id);
		assert_eq!(store.user_count(), 1);
	}

	#[tokio::test]
	async fn entry_update_rewrites_content_but_keeps_title() {
		let store = MemoryMirrorStore::new();
		let collection = store.seed_collection("0xseries", "Demo", "DMO", "ipfs://meta", 1);

		store
			.upsert_entry(collection.id, 0, entry_fields("ipfs://v1", "unknown", "Intro"))
			.await
			.expect("create failed");
		store
			.upsert_entry(collection.id, 0, entry_fields("ipfs://v2", "video/mp4", "Renamed"))
			.await
			.expect("update failed");

		assert_eq!(store.entry_count(), 1);
		let entry = store.entry(collection.id, 0).expect("entry missing");
		assert_eq!(entry.cid, "ipfs://v2");
		assert_eq!(entry.media_type, "video/mp4");
		assert_eq!(entry.title, "Intro");
	}

	#[tokio::test]
	async fn ownership_is_never_reassigned() {
		let store = MemoryMirrorStore::new();
		let collection = store.seed_collection("0xseries", "Demo", "DMO", "ipfs://meta", 1);
		let alice = store.upsert_user("0xalice").await.expect("upsert failed");
		let bob = store.upsert_user("0xbob").await.expect("upsert failed");

		let first = store
			.upsert_ownership(collection.id, 7, alice.id)
			.await
			.expect("mint failed");
		let replay = store
			.upsert_ownership(collection.id, 7, bob.id)
			.await
			.expect("replay failed");

		assert_eq!(store.ownership_count(), 1);
		assert_eq!(first.user_id, alice.id);
		assert_eq!(replay.user_id, alice.id);
	}

	#[tokio::test]
	async fn create_collection_reports_name_conflicts() {
		let store = MemoryMirrorStore::new();
		store.seed_collection("0xaaa", "Demo", "DMO", "ipfs://meta", 1);

		let outcome = store
			.create_collection(NewCollection {
				contract_address: "0xbbb".to_string(),
				name: "Demo".to_string(),
				symbol: "DMO".to_string(),
				metadata_uri: "ipfs://other".to_string(),
				owner_id: 1,
			})
			.await
			.expect("create failed");

		assert!(matches!(outcome, CreateOutcome::NameTaken));
		assert_eq!(store.collection_count(), 1);
	}
}
