//! Correlation session — what a dispatched batch is still waiting for.
//!
//! One session per dispatch. It is owned by the correlator's waiting logic
//! and fed one response at a time from the transport's event channel, so it
//! needs no locking of its own.

use std::fmt;

use meshtask_core::{Opcode, ResponsePayload, TaskBatch};

/// Round-trip progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    SubscribePending,
    AwaitingSuback,
    Published,
    AwaitingResponses,
    Completed,
    ErrorSignaled,
    TimedOut,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ErrorSignaled | Self::TimedOut)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::SubscribePending => "subscribe pending",
            Self::AwaitingSuback => "awaiting suback",
            Self::Published => "published",
            Self::AwaitingResponses => "awaiting responses",
            Self::Completed => "completed",
            Self::ErrorSignaled => "error signaled",
            Self::TimedOut => "timed out",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Replies of this kind are acknowledged inline and never awaited.
pub fn is_self_acknowledging(opcode: Opcode) -> bool {
    opcode == Opcode::GetStatus
}

/// Effect of one response on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Nothing left to wait for.
    Completed,
    /// The device reported a failure.
    ErrorSignaled,
    /// Matched one expected reply; others remain.
    Matched { remaining: usize },
    /// Not relevant to this batch.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CorrelationSession {
    /// Multiset of reply kinds still owed, in batch order.
    expected: Vec<Opcode>,
    state: SessionState,
}

impl CorrelationSession {
    pub fn for_batch(batch: &TaskBatch) -> Self {
        let expected = batch
            .requested_opcodes()
            .filter(|op| !is_self_acknowledging(*op))
            .collect();
        Self {
            expected,
            state: SessionState::Idle,
        }
    }

    pub fn expected(&self) -> &[Opcode] {
        &self.expected
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, logging the transition.
    pub fn advance(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "correlation session transition");
        self.state = next;
    }

    /// Apply one response-topic message.
    ///
    /// An empty expectation completes on anything. Otherwise a matching
    /// `type` consumes one expected instance, and an `error: true` fails the
    /// session even while replies are still owed.
    pub fn observe(&mut self, response: &ResponsePayload) -> Observation {
        if self.state.is_terminal() {
            return Observation::Ignored;
        }

        if self.expected.is_empty() {
            self.advance(SessionState::Completed);
            return Observation::Completed;
        }

        let position = response.kind().and_then(|kind| {
            self.expected
                .iter()
                .position(|op| op.as_str() == kind)
        });
        if let Some(position) = position {
            let matched = self.expected.remove(position);
            tracing::debug!(
                kind = %matched,
                remaining = self.expected.len(),
                "expected reply received"
            );
            if self.expected.is_empty() {
                self.advance(SessionState::Completed);
                return Observation::Completed;
            }
            return Observation::Matched {
                remaining: self.expected.len(),
            };
        }

        if response.is_error() {
            self.advance(SessionState::ErrorSignaled);
            return Observation::ErrorSignaled;
        }

        tracing::debug!(kind = ?response.kind(), "ignoring unrelated reply");
        Observation::Ignored
    }
}
