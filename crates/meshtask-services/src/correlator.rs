//! Response correlator — one publish/collect round trip per batch.
//!
//! connect → subscribe → wait for suback → publish → collect replies until
//! the session completes, the device reports an error, or the wait window
//! closes. The connection is closed on every path once it was opened.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};

use meshtask_core::config::TopicsConfig;
use meshtask_core::wire::{batch_digest, encode_batch};
use meshtask_core::{QoS, ResponsePayload, TaskBatch};

use crate::session::{CorrelationSession, Observation, SessionState};
use crate::transport::{Transport, TransportError, TransportEvent};

/// Topic pair used for one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub response: String,
}

impl From<&TopicsConfig> for Topics {
    fn from(config: &TopicsConfig) -> Self {
        Self {
            command: config.command.clone(),
            response: config.response.clone(),
        }
    }
}

/// How a round trip ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationOutcome {
    /// Every awaited reply arrived. `last` is the reply that completed it.
    Completed { last: ResponsePayload },
    /// The device rejected the request.
    ErrorSignaled { payload: ResponsePayload },
    /// The wait window closed first.
    TimedOut {
        waited: Duration,
        during: SessionState,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Correlator<T> {
    transport: T,
    topics: Topics,
    wait: Duration,
}

impl<T: Transport> Correlator<T> {
    pub fn new(transport: T, topics: Topics, wait: Duration) -> Self {
        Self {
            transport,
            topics,
            wait,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Publish `batch` and wait for its replies.
    ///
    /// Transport failures abort the round trip; the connection is still
    /// closed (best effort) if it had been opened.
    pub async fn dispatch(
        &mut self,
        batch: &TaskBatch,
    ) -> Result<CorrelationOutcome, DispatchError> {
        let payload = Bytes::from(encode_batch(batch)?);
        let digest = batch_digest(&payload);
        let mut session = CorrelationSession::for_batch(batch);

        session.advance(SessionState::Connecting);
        let events = match timeout(self.wait, self.transport.connect()).await {
            Ok(connected) => connected?,
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "no answer from broker within {}s",
                    self.wait.as_secs()
                ))
                .into())
            }
        };

        let result = self.round_trip(&mut session, events, payload, &digest).await;

        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(batch = %digest, error = %e, "disconnect failed");
        }
        session.advance(SessionState::Disconnected);

        match &result {
            Ok(outcome) => tracing::info!(batch = %digest, ?outcome, "round trip finished"),
            Err(e) => tracing::warn!(batch = %digest, error = %e, "round trip aborted"),
        }
        result.map_err(DispatchError::from)
    }

    /// Everything between connect and disconnect. Consumes the event
    /// receiver so the session is detached before disconnect runs.
    async fn round_trip(
        &mut self,
        session: &mut CorrelationSession,
        mut events: mpsc::Receiver<TransportEvent>,
        payload: Bytes,
        digest: &str,
    ) -> Result<CorrelationOutcome, TransportError> {
        session.advance(SessionState::SubscribePending);
        self.transport
            .subscribe(&self.topics.response, QoS::AtLeastOnce)
            .await?;

        // Publishing before the suback could lose a fast reply.
        session.advance(SessionState::AwaitingSuback);
        let suback_deadline = Instant::now() + self.wait;
        loop {
            match next_event(&mut events, suback_deadline).await? {
                None => return Ok(self.timed_out(session)),
                Some(TransportEvent::SubAck) => break,
                Some(TransportEvent::SubRejected { reason }) => {
                    return Err(TransportError::Subscribe {
                        topic: self.topics.response.clone(),
                        reason,
                    })
                }
                Some(TransportEvent::Message { topic, .. }) => {
                    tracing::debug!(%topic, "message before suback ignored");
                }
                Some(TransportEvent::Closed { reason }) => {
                    return Err(TransportError::Closed(reason))
                }
            }
        }

        self.transport
            .publish(&self.topics.command, QoS::AtLeastOnce, false, payload)
            .await?;
        session.advance(SessionState::Published);
        tracing::info!(
            batch = %digest,
            topic = %self.topics.command,
            awaiting = session.expected().len(),
            "batch published"
        );

        let deadline = Instant::now() + self.wait;
        session.advance(SessionState::AwaitingResponses);
        loop {
            match next_event(&mut events, deadline).await? {
                None => return Ok(self.timed_out(session)),
                Some(TransportEvent::Message { topic, payload })
                    if topic == self.topics.response =>
                {
                    let response = ResponsePayload::from_bytes(&payload);
                    match session.observe(&response) {
                        Observation::Completed => {
                            return Ok(CorrelationOutcome::Completed { last: response })
                        }
                        Observation::ErrorSignaled => {
                            return Ok(CorrelationOutcome::ErrorSignaled { payload: response })
                        }
                        Observation::Matched { .. } | Observation::Ignored => {}
                    }
                }
                Some(TransportEvent::Message { topic, .. }) => {
                    tracing::debug!(%topic, "message on unrelated topic ignored");
                }
                Some(TransportEvent::SubAck | TransportEvent::SubRejected { .. }) => {}
                Some(TransportEvent::Closed { reason }) => {
                    return Err(TransportError::Closed(reason))
                }
            }
        }
    }

    fn timed_out(&self, session: &mut CorrelationSession) -> CorrelationOutcome {
        let during = session.state();
        session.advance(SessionState::TimedOut);
        CorrelationOutcome::TimedOut {
            waited: self.wait,
            during,
        }
    }
}

/// Next event before `deadline`; `Ok(None)` once the deadline passes.
async fn next_event(
    events: &mut mpsc::Receiver<TransportEvent>,
    deadline: Instant,
) -> Result<Option<TransportEvent>, TransportError> {
    match timeout_at(deadline, events.recv()).await {
        Err(_) => Ok(None),
        Ok(Some(event)) => Ok(Some(event)),
        Ok(None) => Err(TransportError::Closed("event stream ended".to_string())),
    }
}
