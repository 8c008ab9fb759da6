//!
//! GraphQL client for the ledger gateway with subscription support.
//!
//! This module provides an async client for interacting with the gateway that
//! decodes contract events. It supports HTTP queries and real-time event
//! subscriptions over WebSocket using the graphql-transport-ws subprotocol.
//! All methods are async and designed for use with Tokio.

use super::types::*;
use super::{EventSource, EventStream};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info};

/// Ledger gateway client
#[derive(Clone)]
pub struct GatewayLedgerClient {
	/// The underlying HTTP client for GraphQL queries.
	http_client: Client,
	/// The base URL for the gateway GraphQL HTTP endpoint.
	gateway_url: String,
	/// The WebSocket URL for real-time subscriptions.
	ws_url: String,
}

impl GatewayLedgerClient {
	/// Create a new gateway client.
	///
	/// # Arguments
	/// * `gateway_url` - The HTTP endpoint for GraphQL queries.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	pub fn new(gateway_url: String, ws_url: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			gateway_url,
			ws_url,
		}
	}

	/// Current chain head height as reported by the gateway.
	pub async fn chain_head(&self) -> Result<u64, LedgerError> {
		let query = r#"
            query ChainHead {
                chainHead {
                    height
                }
            }
        "#;

		let response = self.execute_query(query, None).await?;

		response
			.get("data")
			.and_then(|data| data.get("chainHead"))
			.and_then(|head| head.get("height"))
			.and_then(|height| height.as_u64())
			.ok_or(LedgerError::NoData)
	}

	/// Probe the gateway until it answers, with exponential backoff.
	///
	/// Transport failures are retried for up to a minute; any other error is
	/// surfaced immediately. Intended for startup, before any subscription is
	/// opened.
	pub async fn ping(&self) -> Result<u64, LedgerError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(Duration::from_secs(60)),
			..ExponentialBackoff::default()
		};

		retry(policy, move || async move {
			self.chain_head().await.map_err(|e| match e {
				LedgerError::Http(_) => {
					debug!("Gateway not reachable yet: {}", e);
					backoff::Error::transient(e)
				}
				other => backoff::Error::permanent(other),
			})
		})
		.await
	}

	/// Open a graphql-transport-ws subscription and return the stream of raw
	/// payload values found under `field` in each data frame.
	///
	/// # Errors
	/// Returns `LedgerError` if the WebSocket connection or the subscription
	/// handshake fails.
	async fn open_subscription(
		&self,
		subscription_id: &str,
		subscription_query: String,
		field: &'static str,
	) -> Result<EventStream<serde_json::Value>, LedgerError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		// Create WebSocket request with required subprotocol
		let mut request = self.ws_url.clone().into_client_request()?;
		request.headers_mut().insert(
			"Sec-WebSocket-Protocol",
			"graphql-transport-ws".parse().map_err(|_| {
				LedgerError::GraphQL("Invalid WebSocket subprotocol header value".to_string())
			})?,
		);

		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		// Send connection init
		let init_message = json!({
			"type": "connection_init"
		});
		ws_sender
			.send(Message::Text(init_message.to_string()))
			.await?;

		// Wait for connection ack
		if let Some(msg) = ws_receiver.next().await {
			match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type")
						!= Some(&serde_json::Value::String("connection_ack".to_string()))
					{
						return Err(LedgerError::Subscription(
							"Connection not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(LedgerError::Subscription(
						"Unexpected message type during handshake".to_string(),
					));
				}
			}
		}

		let start_message = json!({
			"id": subscription_id,
			"type": "subscribe",
			"payload": {
				"query": subscription_query
			}
		});

		ws_sender
			.send(Message::Text(start_message.to_string()))
			.await?;

		// Translate transport frames into a stream of payload values
		let stream = ws_receiver.filter_map(move |msg| async move {
			match msg {
				Ok(Message::Text(text)) => {
					match serde_json::from_str::<serde_json::Value>(&text) {
						Ok(parsed) => {
							if let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) {
								match msg_type {
									"next" => {
										if let Some(payload) = parsed
											.get("payload")
											.and_then(|p| p.get("data"))
											.and_then(|d| d.get(field))
										{
											Some(Ok(payload.clone()))
										} else {
											Some(Err(LedgerError::NoData))
										}
									}
									"error" => {
										let error_msg = parsed
											.get("payload")
											.and_then(|p| p.get("message"))
											.and_then(|m| m.as_str())
											.unwrap_or("Unknown subscription error");
										Some(Err(LedgerError::GraphQL(error_msg.to_string())))
									}
									"complete" => {
										debug!("Subscription completed");
										None // End of the subscription
									}
									_ => {
										debug!("Ignoring message type: {}", msg_type);
										None // Skip keep-alive and ack frames
									}
								}
							} else {
								Some(Err(LedgerError::GraphQL(
									"Message missing type field".to_string(),
								)))
							}
						}
						Err(e) => Some(Err(LedgerError::Json(e))),
					}
				}
				Ok(_) => Some(Err(LedgerError::GraphQL(
					"Unexpected message type".to_string(),
				))),
				Err(e) => Some(Err(LedgerError::WebSocket(e))),
			}
		});

		Ok(Box::pin(stream))
	}

	/// Execute a GraphQL query over HTTP.
	///
	/// # Arguments
	/// * `query` - The GraphQL query string.
	/// * `variables` - Optional variables for the query.
	///
	/// # Returns
	/// The JSON response from the gateway, or a `LedgerError` if the request
	/// fails.
	pub async fn execute_query(
		&self,
		query: &str,
		variables: Option<serde_json::Value>,
	) -> Result<serde_json::Value, LedgerError> {
		let request_body = json!({
			"query": query,
			"variables": variables
		});

		let response = self
			.http_client
			.post(&self.gateway_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(LedgerError::GraphQL(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let response_json: serde_json::Value = response.json().await?;

		if let Some(errors) = response_json.get("errors") {
			return Err(LedgerError::GraphQL(format!(
				"GraphQL errors: {}",
				errors
			)));
		}

		Ok(response_json)
	}
}

#[async_trait]
impl EventSource for GatewayLedgerClient {
	async fn subscribe_factory(
		&self,
		factory_address: &str,
	) -> Result<EventStream<SeriesAnnounced>, LedgerError> {
		let subscription_query = format!(
			r#"
            subscription FactoryEvents {{
                seriesAnnouncements(factory: "{}") {{
                    creator
                    series
                    name
                    symbol
                    metadataURI
                }}
            }}
            "#,
			factory_address
		);

		let raw = self
			.open_subscription("factory-events", subscription_query, "seriesAnnouncements")
			.await?;

		info!("Subscribed to factory announcements at {}", factory_address);

		let stream = raw.map(|item| {
			item.and_then(|value| {
				serde_json::from_value::<SeriesAnnounced>(value).map_err(|e| {
					error!("Failed to deserialize series announcement: {}", e);
					LedgerError::Json(e)
				})
			})
		});

		Ok(Box::pin(stream))
	}

	async fn subscribe_series(
		&self,
		series_address: &str,
	) -> Result<EventStream<SeriesEvent>, LedgerError> {
		let subscription_query = format!(
			r#"
            subscription SeriesEvents {{
                seriesEvents(address: "{}") {{
                    __typename
                    ... on EntryAdded {{
                        entryIndex
                        contentURI
                        title
                        description
                    }}
                    ... on Minted {{
                        to
                        tokenId
                    }}
                }}
            }}
            "#,
			series_address
		);

		let subscription_id = format!("series-{}", series_address);
		let raw = self
			.open_subscription(&subscription_id, subscription_query, "seriesEvents")
			.await?;

		info!("Subscribed to series events at {}", series_address);

		let stream = raw.map(|item| {
			item.and_then(|value| {
				serde_json::from_value::<SeriesEvent>(value).map_err(|e| {
					error!("Failed to deserialize series event: {}", e);
					LedgerError::Json(e)
				})
			})
		});

		Ok(Box::pin(stream))
	}
}
