mod config;
mod ledger;
mod store;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use crate::config::IndexerConfig;
use crate::ledger::GatewayLedgerClient;
use crate::store::{MemoryMirrorStore, MirrorStore, PgMirrorStore};
use crate::sync::IndexerProcess;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("sqlx=warn".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting series mirror indexer");

	let config = match IndexerConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};

	let ledger = GatewayLedgerClient::new(
		config.gateway_url.clone(),
		config.gateway_ws_url.clone(),
	);

	match ledger.ping().await {
		Ok(height) => info!("Ledger gateway reachable, chain head at {}", height),
		Err(e) => {
			error!("Ledger gateway unreachable: {}", e);
			return;
		}
	}

	let store: Arc<dyn MirrorStore> = if config.database_url == "memory" {
		info!("Using ephemeral in-memory mirror store");
		Arc::new(MemoryMirrorStore::new())
	} else {
		let pool = match PgPoolOptions::new()
			.max_connections(8)
			.connect(&config.database_url)
			.await
		{
			Ok(pool) => pool,
			Err(e) => {
				error!("Failed to connect to mirror store: {}", e);
				return;
			}
		};
		info!("Connected to mirror store");
		Arc::new(PgMirrorStore::new(pool))
	};

	let process = Arc::new(IndexerProcess::new(
		Arc::new(ledger),
		store,
		config.factory_address.clone(),
	));

	// Periodic liveness report: a subscription count that drops without a
	// detach means a gateway stream died and needs re-attaching.
	let status = process.clone();
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(Duration::from_secs(60));
		interval.tick().await;
		loop {
			interval.tick().await;
			info!(
				"{} series subscriptions live, {} divergence warnings so far",
				status.subscription_count().await,
				status.divergence_count()
			);
		}
	});

	if let Err(e) = process.run().await {
		error!("Indexer terminated: {}", e);
	}
}
