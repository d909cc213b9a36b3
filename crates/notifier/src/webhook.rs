//! HTTP webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::transport::{DeliveryRequest, OutboundTransport, TransportError};

/// Header carrying the endpoint's auth key.
pub const AUTH_HEADER: &str = "x-ins-auth-key";

/// Delivers requests by POSTing JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: Client,
    url: String,
    auth_key: Option<String>,
}

impl WebhookTransport {
    pub fn new(
        url: impl Into<String>,
        auth_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OutboundTransport for WebhookTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<String, TransportError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.auth_key {
            builder = builder.header(AUTH_HEADER, key);
        }

        tracing::debug!(item_id = request.item_id, url = %self.url, "Sending delivery request");

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
