//! Postgres-backed mirror store.
//!
//! Expects the schema owned by the API's migration tooling: `users (id,
//! wallet)` unique on `wallet`; `collections (id, contract_address, name,
//! symbol, metadata_uri, cover_image, owner_id, created_at)` unique on
//! `contract_address` and on `(name, symbol)`; `entries` unique on
//! `(collection_id, entry_index)`; `user_nfts` unique on `(collection_id,
//! token_id)`. All writes go through `INSERT ... ON CONFLICT`, so concurrent
//! handlers racing on one natural key collapse to a single row.

use super::{
	CollectionRow, CreateOutcome, EntryFields, EntryRow, MirrorStore, NewCollection,
	OwnershipRow, StoreError, UserRow,
};
use sqlx::PgPool;

/// Mirror store over a shared Postgres connection pool
#[derive(Clone)]
pub struct PgMirrorStore {
	pool: PgPool,
}

impl PgMirrorStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait::async_trait]
impl MirrorStore for PgMirrorStore {
	async fn upsert_user(&self, wallet: &str) -> Result<UserRow, StoreError> {
		if let Some(row) = sqlx::query_as::<_, UserRow>(
			"INSERT INTO users (wallet) VALUES ($1)
			 ON CONFLICT (wallet) DO NOTHING
			 RETURNING id, wallet",
		)
		.bind(wallet)
		.fetch_optional(&self.pool)
		.await?
		{
			return Ok(row);
		}

		// Lost the race or the row predates this call; read it back.
		sqlx::query_as::<_, UserRow>("SELECT id, wallet FROM users WHERE wallet = $1")
			.bind(wallet)
			.fetch_optional(&self.pool)
			.await?
			.ok_or_else(|| StoreError::MissingRow(format!("user {}", wallet)))
	}

	async fn collection_by_address(
		&self,
		contract_address: &str,
	) -> Result<Option<CollectionRow>, StoreError> {
		let row = sqlx::query_as::<_, CollectionRow>(
			"SELECT id, contract_address, name, symbol, metadata_uri, cover_image, owner_id, created_at
			 FROM collections WHERE contract_address = $1",
		)
		.bind(contract_address)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	async fn create_collection(&self, new: NewCollection) -> Result<CreateOutcome, StoreError> {
		let inserted = sqlx::query_as::<_, CollectionRow>(
			"INSERT INTO collections (contract_address, name, symbol, metadata_uri, owner_id)
			 VALUES ($1, $2, $3, $4, $5)
			 ON CONFLICT (contract_address) DO NOTHING
			 RETURNING id, contract_address, name, symbol, metadata_uri, cover_image, owner_id, created_at",
		)
		.bind(&new.contract_address)
		.bind(&new.name)
		.bind(&new.symbol)
		.bind(&new.metadata_uri)
		.bind(new.owner_id)
		.fetch_optional(&self.pool)
		.await;

		match inserted {
			Ok(Some(row)) => Ok(CreateOutcome::Created(row)),
			Ok(None) => match self.collection_by_address(&new.contract_address).await? {
				Some(row) => Ok(CreateOutcome::AlreadyExists(row)),
				None => Err(StoreError::MissingRow(format!(
					"collection {}",
					new.contract_address
				))),
			},
			// The (name, symbol) unique index fired: the pair is claimed.
			Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
				match self.collection_by_address(&new.contract_address).await? {
					Some(row) => Ok(CreateOutcome::AlreadyExists(row)),
					None => Ok(CreateOutcome::NameTaken),
				}
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn upsert_entry(
		&self,
		collection_id: i64,
		entry_index: i64,
		fields: EntryFields,
	) -> Result<EntryRow, StoreError> {
		let row = sqlx::query_as::<_, EntryRow>(
			"INSERT INTO entries (collection_id, entry_index, cid, media_type, title, description)
			 VALUES ($1, $2, $3, $4, $5, $6)
			 ON CONFLICT (collection_id, entry_index)
			 DO UPDATE SET cid = EXCLUDED.cid, media_type = EXCLUDED.media_type
			 RETURNING id, collection_id, entry_index, cid, media_type, title, description",
		)
		.bind(collection_id)
		.bind(entry_index)
		.bind(&fields.cid)
		.bind(&fields.media_type)
		.bind(&fields.title)
		.bind(&fields.description)
		.fetch_one(&self.pool)
		.await?;

		Ok(row)
	}

	async fn upsert_ownership(
		&self,
		collection_id: i64,
		token_id: i64,
		user_id: i64,
	) -> Result<OwnershipRow, StoreError> {
		if let Some(row) = sqlx::query_as::<_, OwnershipRow>(
			"INSERT INTO user_nfts (collection_id, token_id, user_id)
			 VALUES ($1, $2, $3)
			 ON CONFLICT (collection_id, token_id) DO NOTHING
			 RETURNING id, collection_id, token_id, user_id",
		)
		.bind(collection_id)
		.bind(token_id)
		.bind(user_id)
		.fetch_optional(&self.pool)
		.await?
		{
			return Ok(row);
		}

		// Already minted; the stored owner stands.
		sqlx::query_as::<_, OwnershipRow>(
			"SELECT id, collection_id, token_id, user_id FROM user_nfts
			 WHERE collection_id = $1 AND token_id = $2",
		)
		.bind(collection_id)
		.bind(token_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| {
			StoreError::MissingRow(format!("ownership {}/{}", collection_id, token_id))
		})
	}

	async fn list_collections(&self) -> Result<Vec<CollectionRow>, StoreError> {
		let rows = sqlx::query_as::<_, CollectionRow>(
			"SELECT id, contract_address, name, symbol, metadata_uri, cover_image, owner_id, created_at
			 FROM collections ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}
}
