//! Transport capability — the pub/sub client the correlator drives.
//!
//! Adapters deliver broker notifications from their own task into the
//! channel returned by [`Transport::connect`]. That receiver is the only
//! message handler; dropping it detaches the session from the transport.

pub mod memory;
pub mod mqtt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use meshtask_core::QoS;

pub use memory::{MemoryBroker, MemoryTransport};
pub use mqtt::MqttTransport;

/// Capacity of the event channel handed out by adapters.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker accepted a subscription request.
    SubAck,
    /// The broker refused a subscription request.
    SubRejected { reason: String },
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: Bytes },
    /// The connection dropped; no further events follow.
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("subscription to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("disconnect failed: {0}")]
    Disconnect(String),
    #[error("connection closed: {0}")]
    Closed(String),
}

/// A publish/subscribe client.
///
/// `connect` must be called first; the returned receiver yields every
/// suback and message until the connection closes.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
