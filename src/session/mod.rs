//! Per-session protocol state.
//!
//! [`ClientSession`] is the client half: it owns the sequence counter, the
//! consistency tracker and the acknowledgement cursors for one registered
//! session. The server half lives in [`server`]: gap-free ordering,
//! duplicate suppression and event publication.
//!
//! Session state is single-owner. Nothing here synchronizes: an embedder
//! that shares a session across threads must serialize access itself.

pub mod server;

mod sequencer;

#[cfg(test)]
mod sequencer_test;
#[cfg(test)]
mod server_test;

pub use sequencer::Sequencer;

use std::collections::VecDeque;
use std::fmt;

use crate::consistency::Admission;
use crate::consistency::ConsistencyTracker;
use crate::error::InvalidArgument;
use crate::message::CloseRequest;
use crate::message::CommandRequest;
use crate::message::KeepAliveRequest;
use crate::message::OperationPayload;
use crate::message::OperationResponse;
use crate::message::PublishRequest;
use crate::message::PublishResponse;
use crate::message::QueryRequest;

/// A state machine event delivered to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Event index: the position of this event in the session's event
    /// stream.
    pub index: u64,
    pub payload: OperationPayload,
}

/// Client-side state of one registered session.
///
/// Builds sequenced operation requests, interprets operation responses
/// through the [`ConsistencyTracker`], and accepts server-pushed event
/// batches. The sequence counter is owned exclusively by this value; the
/// protocol never repairs or guesses sequence numbers.
pub struct ClientSession {
    id: u64,
    sequencer: Sequencer,
    tracker: ConsistencyTracker,
    /// Highest sequence whose response has been received; reported to the
    /// server in keep-alives so it can evict its duplicate-response cache.
    response_sequence: u64,
    /// Events delivered in order, awaiting pickup by the caller.
    events: VecDeque<SessionEvent>,
}

impl ClientSession {
    /// Create the state for session `id`.
    ///
    /// Request ids are assigned by the connection owner and passed in; the
    /// session owns only the sequence counter.
    pub fn new(id: u64) -> Result<Self, InvalidArgument> {
        if id < 1 {
            return Err(InvalidArgument::new("session must be at least 1"));
        }
        Ok(Self {
            id,
            sequencer: Sequencer::new(),
            tracker: ConsistencyTracker::new(),
            response_sequence: 0,
            events: VecDeque::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tracker(&self) -> &ConsistencyTracker {
        &self.tracker
    }

    /// Highest sequence whose response has been received.
    pub fn response_sequence(&self) -> u64 {
        self.response_sequence
    }

    /// Build a command request, assigning its sequence number.
    ///
    /// The returned request is what gets resent verbatim on every retry.
    pub fn command_request(&mut self, id: u64, operation: OperationPayload) -> Result<CommandRequest, InvalidArgument> {
        let sequence = self.sequencer.assign();
        CommandRequest::new(id, self.id, sequence, operation)
    }

    /// Build a query request, assigning its sequence number.
    pub fn query_request(&mut self, id: u64, operation: OperationPayload) -> Result<QueryRequest, InvalidArgument> {
        let sequence = self.sequencer.assign();
        QueryRequest::new(id, self.id, sequence, operation)
    }

    /// Build a keep-alive carrying the session's acknowledgement cursors.
    pub fn keep_alive_request(&self, id: u64) -> Result<KeepAliveRequest, InvalidArgument> {
        KeepAliveRequest::new(id, self.id, self.response_sequence, self.tracker.event_index())
    }

    pub fn close_request(&self, id: u64) -> Result<CloseRequest, InvalidArgument> {
        CloseRequest::new(id, self.id)
    }

    /// Admit an `OK` command response through the consistency tracker.
    pub fn admit_command(&mut self, sequence: u64, response: OperationResponse) -> Admission {
        let admission = self.tracker.admit_command(response);
        if matches!(admission, Admission::Deliver(_)) {
            self.note_response(sequence);
        }
        admission
    }

    /// Record receipt of the response for `sequence` (queries, and command
    /// responses released from hold).
    pub fn note_response(&mut self, sequence: u64) {
        if sequence > self.response_sequence {
            self.response_sequence = sequence;
        }
    }

    /// Handle a server-pushed event batch.
    ///
    /// Returns the acknowledgement to send back, plus any command responses
    /// the tracker released now that event delivery has caught up. A batch
    /// that does not continue exactly at the delivered high-water is not
    /// applied; the acknowledgement's `event_index` tells the server where
    /// to retransmit from.
    pub fn handle_publish(&mut self, publish: &PublishRequest) -> (PublishResponse, Vec<OperationResponse>) {
        let delivered = self.tracker.event_index();
        if publish.session != self.id {
            tracing::warn!(
                session = publish.session,
                own = self.id,
                "ignoring publish for another session"
            );
            return (PublishResponse::ok(publish.id, delivered), Vec::new());
        }
        let count = publish.event_index.checked_sub(publish.previous_index);
        if publish.previous_index != delivered || count != Some(publish.events.len() as u64) {
            tracing::debug!(
                previous_index = publish.previous_index,
                delivered,
                "publish does not continue at delivered high-water; requesting retransmit"
            );
            return (PublishResponse::ok(publish.id, delivered), Vec::new());
        }

        for (offset, payload) in publish.events.iter().enumerate() {
            self.events.push_back(SessionEvent {
                index: publish.previous_index + 1 + offset as u64,
                payload: payload.clone(),
            });
        }
        let released = self.tracker.deliver_events(publish.event_index);
        (PublishResponse::ok(publish.id, publish.event_index), released)
    }

    /// Drain the events received so far, in index order.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientSession{{id={}, next_sequence={}, response_sequence={}, index={}, event_index={}}}",
            self.id,
            self.sequencer.next_sequence(),
            self.response_sequence,
            self.tracker.response_index(),
            self.tracker.event_index()
        )
    }
}
