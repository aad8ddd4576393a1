//! meshtask integration test harness.
//!
//! Most tests run the full validate → dispatch → correlate path against the
//! in-process broker, with a responder standing in for the mesh gateway.
//!
//! `broker` tests talk to a real MQTT broker and are skipped unless one is
//! named in the environment:
//!
//!   MESHTASK_TEST_BROKER=127.0.0.1:1883 cargo test --test integration

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use meshtask_core::TaskBatch;
use meshtask_services::{
    validate, CorrelationOutcome, Correlator, MemoryBroker, MemoryTransport, Topics,
};

mod broker;
mod correlation;
mod validation;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const COMMAND_TOPIC: &str = "/sensors/commands";
pub const RESPONSE_TOPIC: &str = "/sensors/results";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn topics() -> Topics {
    Topics {
        command: COMMAND_TOPIC.to_string(),
        response: RESPONSE_TOPIC.to_string(),
    }
}

/// A memory broker whose gateway answers every command with `replies`.
pub fn gateway<I: IntoIterator<Item = Value>>(replies: I) -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.respond_to(COMMAND_TOPIC, RESPONSE_TOPIC, replies);
    broker
}

pub fn correlator(broker: &MemoryBroker) -> Correlator<MemoryTransport> {
    Correlator::new(broker.transport(), topics(), WAIT)
}

/// Validate operator text and dispatch it through `broker`.
pub async fn submit(broker: &MemoryBroker, raw: &str) -> Result<CorrelationOutcome> {
    let batch: TaskBatch = validate(raw).context("batch rejected")?;
    let outcome = correlator(broker).dispatch(&batch).await?;
    Ok(outcome)
}

/// Decode the `n`th payload published on the command topic.
pub fn published_json(broker: &MemoryBroker, n: usize) -> Value {
    let published = broker.published(COMMAND_TOPIC);
    serde_json::from_slice(&published[n]).expect("published payload is JSON")
}

/// `host:port` of a real broker, if the environment names one.
pub fn test_broker() -> Option<(String, u16)> {
    let addr = std::env::var("MESHTASK_TEST_BROKER").ok()?;
    let (host, port) = addr.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}
