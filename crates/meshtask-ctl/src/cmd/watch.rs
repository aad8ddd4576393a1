//! Follow a topic and print what arrives.

use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};

use meshtask_core::config::MeshtaskConfig;
use meshtask_core::{QoS, ResponsePayload};
use meshtask_services::{MqttTransport, Transport, TransportError, TransportEvent};

pub async fn cmd_watch(config: &MeshtaskConfig, topic: Option<String>) -> Result<()> {
    config.mqtt.validate()?;
    let topic = topic.unwrap_or_else(|| config.mqtt.topics.telemetry.clone());
    let broker = format!("{}:{}", config.mqtt.host, config.mqtt.port);

    let mut transport = MqttTransport::from_config(&config.mqtt);
    let stop = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    watch(&mut transport, &topic, stop, &mut std::io::stdout())
        .await
        .with_context(|| {
            format!("failed to watch {} on {} — is the broker running?", topic, broker)
        })
        .map(|_| ())
}

/// Print every message on `topic` until `stop` resolves or the connection
/// drops. Returns the number of messages printed.
pub async fn watch<T: Transport>(
    transport: &mut T,
    topic: &str,
    stop: impl Future<Output = ()>,
    out: &mut impl Write,
) -> Result<usize> {
    let mut events = transport.connect().await?;
    let result = follow(transport, &mut events, topic, stop, out).await;
    drop(events);
    if let Err(e) = transport.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
    result
}

async fn follow<T: Transport>(
    transport: &mut T,
    events: &mut tokio::sync::mpsc::Receiver<TransportEvent>,
    topic: &str,
    stop: impl Future<Output = ()>,
    out: &mut impl Write,
) -> Result<usize> {
    transport.subscribe(topic, QoS::AtMostOnce).await?;
    writeln!(out, "Watching {} (Ctrl-C to stop)", topic)?;

    tokio::pin!(stop);
    let mut seen = 0;
    loop {
        let event = tokio::select! {
            _ = &mut stop => return Ok(seen),
            event = events.recv() => event,
        };
        match event {
            Some(TransportEvent::Message { topic, payload }) => {
                let body = ResponsePayload::from_bytes(&payload).body;
                writeln!(out, "  ┌─ {}", topic)?;
                for line in serde_json::to_string_pretty(&body)?.lines() {
                    writeln!(out, "  │  {}", line)?;
                }
                writeln!(out, "  └─")?;
                seen += 1;
            }
            Some(TransportEvent::SubAck) => tracing::debug!(topic, "watch subscription active"),
            Some(TransportEvent::SubRejected { reason }) => {
                let topic = topic.to_string();
                return Err(TransportError::Subscribe { topic, reason }.into());
            }
            Some(TransportEvent::Closed { reason }) => {
                return Err(TransportError::Closed(reason).into())
            }
            None => return Err(TransportError::Closed("event stream ended".to_string()).into()),
        }
    }
}
