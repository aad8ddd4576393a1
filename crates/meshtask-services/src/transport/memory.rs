//! In-process broker — topic fan-out without a network.
//!
//! Used by the test suites to stand in for a real broker and for the mesh
//! gateway behind it: a responder publishes canned replies whenever its
//! command topic receives a message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use meshtask_core::QoS;

use super::{Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY};

struct Subscriber {
    client: u64,
    topic: String,
    tx: mpsc::Sender<TransportEvent>,
}

struct Responder {
    on: String,
    reply_topic: String,
    replies: Vec<Bytes>,
}

#[derive(Default)]
struct BrokerState {
    clients: HashMap<u64, mpsc::Sender<TransportEvent>>,
    subscribers: Vec<Subscriber>,
    responders: Vec<Responder>,
    published: Vec<(String, Bytes)>,
    withhold_suback: bool,
    reject_subscriptions: bool,
    pending_subacks: Vec<mpsc::Sender<TransportEvent>>,
    refuse_connections: bool,
    connects: usize,
    disconnects: usize,
    next_client: u64,
}

impl BrokerState {
    fn deliver(&self, topic: &str, payload: &Bytes) {
        for sub in self.subscribers.iter().filter(|s| s.topic == topic) {
            let event = TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if sub.tx.try_send(event).is_err() {
                tracing::debug!(client = sub.client, topic, "memory broker dropped message");
            }
        }
    }
}

/// Shared broker handle. Clones refer to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client bound to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            client: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whenever `on` receives a publish, deliver `replies` on `reply_topic`
    /// in order.
    pub fn respond_to<I>(&self, on: &str, reply_topic: &str, replies: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let replies = replies
            .into_iter()
            .map(|v| Bytes::from(v.to_string()))
            .collect();
        self.state().responders.push(Responder {
            on: on.to_string(),
            reply_topic: reply_topic.to_string(),
            replies,
        });
    }

    /// Accept subscriptions without acknowledging them. Turning this off
    /// acknowledges every subscription held back so far.
    pub fn withhold_suback(&self, withhold: bool) {
        let mut state = self.state();
        state.withhold_suback = withhold;
        if !withhold {
            for tx in state.pending_subacks.drain(..) {
                let _ = tx.try_send(TransportEvent::SubAck);
            }
        }
    }

    /// Answer every subscription with a refusal.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.state().reject_subscriptions = reject;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse_connections = refuse;
    }

    /// Publish from outside any client, as a device would.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        self.state().deliver(topic, &payload.into());
    }

    /// Tell every connected client the connection dropped.
    pub fn close_all(&self, reason: &str) {
        let state = self.state();
        for tx in state.clients.values() {
            let _ = tx.try_send(TransportEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }

    /// Payloads published by clients on `topic`.
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.state()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }
}

/// One client connection to a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: MemoryBroker,
    client: Option<u64>,
}

impl MemoryTransport {
    fn client_id(&self) -> Result<u64, String> {
        self.client.ok_or_else(|| "not connected".to_string())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let mut state = self.broker.state();
        if state.refuse_connections {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let id = state.next_client;
        state.next_client += 1;
        state.clients.insert(id, tx);
        state.connects += 1;
        self.client = Some(id);
        Ok(rx)
    }

    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        let client = self.client_id().map_err(|reason| TransportError::Subscribe {
            topic: topic.to_string(),
            reason,
        })?;
        let mut state = self.broker.state();
        let tx = state
            .clients
            .get(&client)
            .cloned()
            .ok_or_else(|| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "unknown client".to_string(),
            })?;
        if state.reject_subscriptions {
            let _ = tx.try_send(TransportEvent::SubRejected {
                reason: format!("not authorized for {}", topic),
            });
            return Ok(());
        }
        if state.withhold_suback {
            state.pending_subacks.push(tx.clone());
        } else {
            let _ = tx.try_send(TransportEvent::SubAck);
        }
        state.subscribers.push(Subscriber {
            client,
            topic: topic.to_string(),
            tx,
        });
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        _qos: QoS,
        _retain: bool,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.client_id().map_err(|reason| TransportError::Publish {
            topic: topic.to_string(),
            reason,
        })?;
        let mut state = self.broker.state();
        state.published.push((topic.to_string(), payload.clone()));
        state.deliver(topic, &payload);

        let replies: Vec<(String, Bytes)> = state
            .responders
            .iter()
            .filter(|r| r.on == topic)
            .flat_map(|r| r.replies.iter().map(|p| (r.reply_topic.clone(), p.clone())))
            .collect();
        for (reply_topic, reply) in replies {
            state.deliver(&reply_topic, &reply);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let client = self.client.take().ok_or_else(|| {
            TransportError::Disconnect("not connected".to_string())
        })?;
        let mut state = self.broker.state();
        state.subscribers.retain(|s| s.client != client);
        state.clients.remove(&client);
        state.disconnects += 1;
        Ok(())
    }
}
