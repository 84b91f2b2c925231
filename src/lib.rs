//! Session-scoped client protocol for a replicated state machine.
//!
//! `raftsession` implements the request/response contract between a client
//! and a Raft-family cluster: validated message construction, a
//! length-prefixed tagged wire codec, per-session gap-free sequencing with
//! at-most-once application, consistency tracking across leader changes,
//! and the retry/forward policy that decides what a client does when a
//! request fails, times out, or lands on the wrong node.
//!
//! The consensus algorithm, the physical transport and the clock are
//! external collaborators: the crate consumes them through the traits in
//! [`network`] and performs no I/O of its own. Every piece of protocol
//! state is single-owner; embedders that share a session across threads
//! serialize access themselves.
//!
//! A typical client flow:
//!
//! 1. Register a session ([`SessionClient::register`]); the response
//!    carries the session id.
//! 2. Submit commands and queries; each gets a dense, strictly increasing
//!    sequence number, and a retried request keeps its original number so
//!    the cluster can suppress duplicates.
//! 3. Interpret responses: commit indexes never regress within a session,
//!    and an event published at index `E` reaches the caller before any
//!    command response whose index is at or beyond `E`.

pub mod codec;
pub mod error;
pub mod message;
pub mod network;
pub mod retry;
pub mod session;
pub mod testing;

mod client;
mod consistency;

#[cfg(test)]
mod consistency_test;

pub use anyerror;
pub use anyerror::AnyError;

pub use crate::client::SessionClient;
pub use crate::consistency::Admission;
pub use crate::consistency::ConsistencyTracker;
pub use crate::error::ErrorKind;
pub use crate::error::ProtocolError;
pub use crate::message::OperationPayload;
pub use crate::message::Request;
pub use crate::message::Response;
pub use crate::message::Status;
pub use crate::network::Applied;
pub use crate::network::LeaderResolver;
pub use crate::network::StateMachine;
pub use crate::network::Transport;
pub use crate::retry::Attempt;
pub use crate::retry::RetryDecision;
pub use crate::retry::RetryState;
pub use crate::session::server::SessionManager;
pub use crate::session::ClientSession;
pub use crate::session::SessionEvent;
