//! Process configuration.
//!
//! The indexer is configured entirely through the environment: gateway
//! endpoints, the factory contract to watch, and the mirror database.

use std::env;

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing environment variable: {0}")]
	Missing(&'static str),

	#[error("Invalid factory address: {0}")]
	InvalidFactoryAddress(String),
}

/// Runtime configuration for the indexer process
#[derive(Debug, Clone)]
pub struct IndexerConfig {
	/// HTTP endpoint of the ledger gateway's GraphQL API.
	pub gateway_url: String,
	/// WebSocket endpoint for gateway subscriptions.
	pub gateway_ws_url: String,
	/// Address of the factory contract announcing new series.
	pub factory_address: String,
	/// Postgres connection string for the mirror store, or `memory` for an
	/// ephemeral in-memory mirror.
	pub database_url: String,
}

impl IndexerConfig {
	/// Load configuration from the environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		let config = Self {
			gateway_url: required("LEDGER_GATEWAY_URL")?,
			gateway_ws_url: required("LEDGER_GATEWAY_WS_URL")?,
			factory_address: required("FACTORY_ADDRESS")?,
			database_url: required("DATABASE_URL")?,
		};
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let address = self.factory_address.trim();
		let hex = address.strip_prefix("0x").unwrap_or("");
		if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(ConfigError::InvalidFactoryAddress(
				self.factory_address.clone(),
			));
		}
		Ok(())
	}
}

fn required(name: &'static str) -> Result<String, ConfigError> {
	env::var(name).map_err(|_| ConfigError::Missing(name))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config_with_factory(factory_address: &str) -> IndexerConfig {
		IndexerConfig {
			gateway_url: "http://localhost:4000/graphql".to_string(),
			gateway_ws_url: "ws://localhost:4000/graphql/ws".to_string(),
			factory_address: factory_address.to_string(),
			database_url: "postgres://localhost/mirror".to_string(),
		}
	}

	#[test]
	fn validate_accepts_hex_factory_address() {
		let config = config_with_factory("0xDeAdBeEf00000000000000000000000000000001");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn validate_rejects_non_hex_factory_address() {
		assert!(config_with_factory("not-an-address").validate().is_err());
		assert!(config_with_factory("0x").validate().is_err());
	}
}
