//! Client-side consistency tracking across servers and reconnects.
//!
//! One session may observe responses produced by different cluster members
//! over its lifetime. The tracker enforces the two client-visible ordering
//! guarantees: command-response commit indexes never regress, and an event
//! published at index `E` reaches the caller before any command response
//! whose index is at or beyond `E`.

use crate::message::OperationResponse;

/// Verdict on one command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// In order; release the response to the caller.
    Deliver(OperationResponse),

    /// The response outran event delivery; it is buffered and will be
    /// released by [`ConsistencyTracker::deliver_events`].
    Held,

    /// The response claims a commit index below the session's observed
    /// high-water mark: a stale server. Discard it and do not adopt the
    /// server that produced it until it catches up.
    Regression { index: u64, high_water: u64 },
}

/// Tracks the index and event-index high-water marks for one session.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyTracker {
    /// Highest commit index observed in a delivered command response.
    response_index: u64,

    /// Highest event index delivered to the caller.
    event_index: u64,

    /// Command responses held until event delivery catches up, in arrival
    /// order.
    held: Vec<OperationResponse>,
}

impl ConsistencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_index(&self) -> u64 {
        self.response_index
    }

    pub fn event_index(&self) -> u64 {
        self.event_index
    }

    /// Admit an `OK` command response.
    ///
    /// Error responses carry no meaningful index and must not be admitted.
    pub fn admit_command(&mut self, response: OperationResponse) -> Admission {
        if response.index < self.response_index {
            tracing::warn!(
                index = response.index,
                high_water = self.response_index,
                "rejecting command response: commit index regression"
            );
            return Admission::Regression {
                index: response.index,
                high_water: self.response_index,
            };
        }
        if response.event_index > self.event_index {
            tracing::debug!(
                response_event_index = response.event_index,
                delivered = self.event_index,
                "holding command response until event delivery catches up"
            );
            self.held.push(response);
            return Admission::Held;
        }
        self.response_index = response.index;
        Admission::Deliver(response)
    }

    /// Record that every event up to and including `up_to` has been
    /// delivered to the caller, and release any held responses that were
    /// waiting on those events, in arrival order.
    pub fn deliver_events(&mut self, up_to: u64) -> Vec<OperationResponse> {
        if up_to <= self.event_index {
            return Vec::new();
        }
        self.event_index = up_to;

        let mut released = Vec::new();
        let mut still_held = Vec::new();
        for response in self.held.drain(..) {
            if response.event_index > up_to {
                still_held.push(response);
                continue;
            }
            // The high-water mark may have advanced while this response
            // was held; it must still pass the regression check.
            if response.index < self.response_index {
                tracing::warn!(
                    index = response.index,
                    high_water = self.response_index,
                    "dropping held response: regressed while waiting for events"
                );
                continue;
            }
            self.response_index = response.index;
            released.push(response);
        }
        self.held = still_held;
        released
    }

    /// Number of responses currently held awaiting events.
    pub fn held_len(&self) -> usize {
        self.held.len()
    }
}
