//! The per-request retry/forward policy.
//!
//! One [`Attempt`] tracks one outstanding request through
//! `Pending → {Completed, Failed, Retrying}`. Transitions are pure: the
//! caller reports what it observed and acts on the returned
//! [`RetryDecision`]. A `Retry` decision always means "re-resolve the
//! leader and resend the identical request" — same id, same sequence —
//! because duplicate suppression belongs to the session sequencer, not to
//! this policy.

use crate::error::ConnectionLost;
use crate::error::ErrorKind;
use crate::error::ProtocolError;

/// Lifecycle state of one outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Sent on the currently bound connection, awaiting a response.
    Pending,
    /// A retryable failure was observed; the request is being resent.
    Retrying,
    /// An `OK` response was delivered to the caller.
    Completed,
    /// A terminal failure was surfaced to the caller.
    Failed,
}

/// What the caller must do next with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Deliver the response to the caller.
    Complete,
    /// Re-resolve the current leader and resend the identical request.
    Retry,
    /// Surface the error; do not resend automatically.
    Fail(ProtocolError),
}

/// Retry state machine for one request.
///
/// `max_attempts` is the caller-imposed bound; without one, retryable
/// failures are retried indefinitely. Abandoning an attempt is always safe:
/// the sequence number it occupied stays reserved in the sequencer, and a
/// later resend under that sequence is a retry, not a new operation.
#[derive(Debug, Clone)]
pub struct Attempt {
    state: RetryState,
    attempts: u32,
    max_attempts: Option<u32>,
}

impl Attempt {
    /// Start tracking a freshly sent request.
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            state: RetryState::Pending,
            attempts: 1,
            max_attempts,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Number of sends so far, counting the initial one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A response arrived; `error` is its classification, `None` for `OK`.
    pub fn on_response(&mut self, error: Option<&ErrorKind>) -> RetryDecision {
        debug_assert!(
            matches!(self.state, RetryState::Pending | RetryState::Retrying),
            "response observed in state {:?}",
            self.state
        );
        match error {
            None => {
                self.state = RetryState::Completed;
                RetryDecision::Complete
            }
            Some(kind) if kind.is_retryable() => self.retry_or_fail(ProtocolError::Remote(kind.clone())),
            Some(kind) => {
                tracing::debug!(error = %kind, "terminal response error");
                self.state = RetryState::Failed;
                RetryDecision::Fail(ProtocolError::Remote(kind.clone()))
            }
        }
    }

    /// The connection broke (or timed out) before any response.
    ///
    /// Retryable: the operation may or may not have applied, and resending
    /// under the same sequence number is safe either way.
    pub fn on_connection_lost(&mut self, lost: ConnectionLost) -> RetryDecision {
        debug_assert!(
            matches!(self.state, RetryState::Pending | RetryState::Retrying),
            "connection loss observed in state {:?}",
            self.state
        );
        self.retry_or_fail(ProtocolError::ConnectionLost(lost))
    }

    fn retry_or_fail(&mut self, error: ProtocolError) -> RetryDecision {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                tracing::debug!(attempts = self.attempts, "attempt bound reached; failing");
                self.state = RetryState::Failed;
                return RetryDecision::Fail(error);
            }
        }
        self.attempts += 1;
        self.state = RetryState::Retrying;
        RetryDecision::Retry
    }
}
