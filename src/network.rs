//! Collaborator interfaces implemented by the embedding system.
//!
//! The protocol core performs no I/O and owns no clock. Everything that
//! blocks or suspends sits behind these traits: an ordered reliable byte
//! channel, leader resolution, and the server-side apply hook into the
//! replicated state machine.

use anyerror::AnyError;
use bytes::Bytes;

use crate::error::ConnectionLost;
use crate::message::OperationPayload;

/// A cluster member address, e.g. `host:port`.
pub type Address = String;

/// An ordered, reliable byte channel to one cluster member.
///
/// Frames are complete wire frames produced by [`crate::codec`]. Both
/// directions fail with [`ConnectionLost`] when the channel breaks; the
/// protocol layer reacts by re-resolving the leader and resending, never by
/// repairing the channel itself.
pub trait Transport {
    /// Bind the channel to `address`, dropping any previous binding.
    fn connect(&mut self, address: &Address) -> Result<(), ConnectionLost>;

    fn send(&mut self, frame: Bytes) -> Result<(), ConnectionLost>;

    /// Receive the next complete frame. Blocks (or suspends, in an async
    /// embedding) until one arrives.
    fn receive(&mut self) -> Result<Bytes, ConnectionLost>;
}

/// Resolves the cluster member currently authorized to order commits.
pub trait LeaderResolver {
    /// The current leader address, or `None` when leadership is unknown.
    fn current_leader(&mut self) -> Option<Address>;
}

/// Result of applying one operation to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Commit index at which the operation was evaluated.
    pub index: u64,
    /// Highest event index published to the session as of this operation.
    pub event_index: u64,
    /// Operation output; `None` means the operation produced no output.
    pub result: Option<OperationPayload>,
}

/// Server-side hook into the replicated state machine.
///
/// The consensus layer has already ordered and committed the operation by
/// the time these are called; a returned error is the state machine's
/// semantic rejection and is surfaced to the caller verbatim as an
/// application error.
pub trait StateMachine {
    /// Apply a mutating command.
    fn apply(
        &mut self,
        session: u64,
        sequence: u64,
        operation: &OperationPayload,
    ) -> Result<Applied, AnyError>;

    /// Evaluate a read-only query.
    fn query(
        &mut self,
        session: u64,
        sequence: u64,
        operation: &OperationPayload,
    ) -> Result<Applied, AnyError>;
}
