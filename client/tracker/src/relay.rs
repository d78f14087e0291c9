use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::event::ConversionEvent;

pub const DEFAULT_RELAY_PATH: &str = "/.netlify/functions/track-conversion";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

/// Delivery channel to the server-side conversion relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Posts the event and returns the relay's JSON reply, whatever its status.
    async fn send(&self, event: &ConversionEvent) -> Result<Value, TransportError>;
}

#[derive(Clone)]
pub struct HttpRelay {
    client: Client,
    url: String,
}

impl HttpRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn send(&self, event: &ConversionEvent) -> Result<Value, TransportError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        tracing::debug!(
            status = response.status().as_u16(),
            event_id = %event.event_id,
            "relay responded"
        );
        Ok(response.json().await?)
    }
}
