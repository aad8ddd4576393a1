//! MQTT adapter over rumqttc.
//!
//! `connect` drives the event loop inline until the broker's CONNACK so a
//! refused connection surfaces as an error there. After that a pump task
//! owns the event loop and forwards subacks and publishes to the session.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, SubAck, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use meshtask_core::config::MqttConfig;
use meshtask_core::QoS;

use super::{Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY};

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 16;
/// How long `disconnect` waits for the pump to flush DISCONNECT.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn to_mqtt(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

pub struct MqttTransport {
    options: MqttOptions,
    client: Option<AsyncClient>,
    pump: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(host: &str, port: u16, client_id: &str) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        Self {
            options,
            client: None,
            pump: None,
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(&config.host, config.port, &config.client_id)
    }

    pub fn broker_address(&self) -> (String, u16) {
        self.options.broker_address()
    }

    fn client(&self) -> Result<&AsyncClient, String> {
        self.client.as_ref().ok_or_else(|| "not connected".to_string())
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }

        let (host, port) = self.options.broker_address();
        tracing::debug!(%host, port, "mqtt connected");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.pump = Some(tokio::spawn(pump_events(eventloop, tx)));
        self.client = Some(client);
        Ok(rx)
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let subscribe_err = |reason: String| TransportError::Subscribe {
            topic: topic.to_string(),
            reason,
        };
        self.client()
            .map_err(subscribe_err)?
            .subscribe(topic, to_mqtt(qos))
            .await
            .map_err(|e| subscribe_err(e.to_string()))
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let publish_err = |reason: String| TransportError::Publish {
            topic: topic.to_string(),
            reason,
        };
        self.client()
            .map_err(publish_err)?
            .publish(topic, to_mqtt(qos), retain, payload.to_vec())
            .await
            .map_err(|e| publish_err(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| TransportError::Disconnect("not connected".to_string()))?;
        let result = client
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()));

        if let Some(mut pump) = self.pump.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut pump).await.is_err() {
                tracing::warn!("mqtt event loop did not stop, aborting");
                pump.abort();
            }
        }
        result
    }
}

/// Forward broker notifications until DISCONNECT goes out or the
/// connection fails. Keeps polling after the receiver is dropped so
/// queued requests still reach the broker.
async fn pump_events(mut eventloop: EventLoop, tx: mpsc::Sender<TransportEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(ack))) => suback_event(&ack),
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload,
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("mqtt disconnect sent");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "mqtt event loop stopped");
                let _ = tx
                    .send(TransportEvent::Closed {
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        // A closed receiver means the session detached; keep draining.
        let _ = tx.send(event).await;
    }
}

fn suback_event(ack: &SubAck) -> TransportEvent {
    if ack.return_codes.contains(&SubscribeReasonCode::Failure) {
        TransportEvent::SubRejected {
            reason: format!("broker refused subscription (packet {})", ack.pkid),
        }
    } else {
        TransportEvent::SubAck
    }
}
