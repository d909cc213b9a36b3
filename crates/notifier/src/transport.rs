//! Delivery request/response shapes and the transport seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body posted to the delivery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Item the request was built from; not part of the wire body.
    #[serde(skip)]
    pub item_id: i64,
    pub to: String,
    pub content: String,
}

impl DeliveryRequest {
    pub fn new(item_id: i64, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            item_id,
            to: to.into(),
            content: content.into(),
        }
    }
}

/// Response returned by the delivery endpoint on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

impl DeliveryResponse {
    /// Parse a raw response body and extract the delivery id.
    pub fn parse(body: &str) -> Result<Self, ResponseParseError> {
        let response: DeliveryResponse = serde_json::from_str(body)?;
        if response.message_id.trim().is_empty() {
            return Err(ResponseParseError::MissingDeliveryId);
        }
        Ok(response)
    }
}

/// Failure to reach the delivery endpoint or to get an accepted response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// The endpoint answered, but the body did not carry a usable delivery id.
#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response carried no messageId")]
    MissingDeliveryId,
}

/// Performs the network call for one delivery request.
///
/// Returns the raw response body of an accepted request; interpreting it is
/// left to [`DeliveryResponse::parse`].
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> Result<String, TransportError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
