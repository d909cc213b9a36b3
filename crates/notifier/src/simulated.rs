//! Transport that accepts every request without touching the network.
//!
//! Useful when the real endpoint is unavailable; the response has the same
//! shape the webhook endpoint returns.

use async_trait::async_trait;
use chrono::Utc;

use crate::transport::{DeliveryRequest, DeliveryResponse, OutboundTransport, TransportError};

#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport;

impl SimulatedTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutboundTransport for SimulatedTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<String, TransportError> {
        let response = DeliveryResponse {
            message: "Message sent successfully".to_string(),
            message_id: format!("SIMULATED_MSG_{}_{}", request.item_id, Utc::now().timestamp()),
        };

        tracing::info!(
            item_id = request.item_id,
            delivery_id = %response.message_id,
            "Simulated delivery accepted"
        );

        // Serializing a struct of two strings cannot fail.
        Ok(serde_json::to_string(&response).unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
