//! Outbound delivery for pending items.
//!
//! The dispatch pipeline talks to an [`OutboundTransport`]; two are provided:
//! - [`WebhookTransport`] POSTs the delivery request to an HTTP endpoint
//! - [`SimulatedTransport`] fabricates a successful response without network I/O

pub mod simulated;
pub mod transport;
pub mod webhook;

pub use simulated::SimulatedTransport;
pub use transport::{
    DeliveryRequest, DeliveryResponse, OutboundTransport, ResponseParseError, TransportError,
};
pub use webhook::WebhookTransport;
