//! Error types exposed by this crate.
//!
//! Two layers are distinguished: [`ErrorKind`] is the closed classification
//! carried inside an `ERROR` response on the wire, while [`ProtocolError`]
//! covers everything the protocol layer can raise locally, including
//! conditions that never reach the wire such as [`InvalidArgument`].

use std::fmt;

use anyerror::AnyError;

/// A request or response could not be constructed from the given fields.
///
/// Raised at build time, before any transmission; never sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument: {reason}")]
pub struct InvalidArgument {
    pub reason: String,
}

impl InvalidArgument {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// A received frame could not be decoded.
///
/// Decoding is all-or-nothing: an unknown type tag, a truncated body or
/// trailing garbage all indicate a corrupt channel, and the connection that
/// produced the frame should be dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed frame: {reason}")]
pub struct MalformedFrame {
    pub reason: String,
}

impl MalformedFrame {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// The byte channel to the remote end broke before a response was observed.
///
/// This does not imply the operation failed: it may already have committed.
/// Resending with the same sequence number is always safe because the server
/// applies each sequence at most once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection lost: {detail}")]
pub struct ConnectionLost {
    pub detail: AnyError,
}

impl ConnectionLost {
    pub fn new(detail: impl fmt::Display) -> Self {
        Self {
            detail: AnyError::error(detail),
        }
    }
}

/// Error classification carried in an `ERROR` response.
///
/// This is the fixed wire taxonomy: servers produce exactly these kinds and
/// the retry policy interprets them. Application-level failure detail rides
/// along verbatim in [`ErrorKind::Application`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(thiserror::Error)]
pub enum ErrorKind {
    /// The cluster has no known leader; retry after re-resolving.
    #[error("no leader available")]
    NoLeader,

    /// The receiving node is not the leader; retry against the current one.
    #[error("receiving node is not the leader")]
    NotLeader,

    /// The session exceeded its keep-alive timeout and was closed.
    #[error("session expired")]
    SessionExpired,

    /// The session id is not (or no longer) known to the cluster.
    ///
    /// Also answers a replay of a sequence whose cached response was already
    /// acknowledged and evicted: that only happens when a session id is
    /// reused with restarted sequencing, which is an error condition.
    #[error("unknown session")]
    SessionUnknown,

    /// The state machine rejected the operation semantically.
    #[error("application rejected the operation: {0}")]
    Application(AnyError),
}

impl ErrorKind {
    /// Whether the retry policy may resend the identical request.
    ///
    /// Leadership errors are transient; everything else is terminal for the
    /// request (and for the session, in the expired/unknown cases).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NoLeader | ErrorKind::NotLeader)
    }
}

/// Any error the protocol layer can surface to a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error(transparent)]
    MalformedFrame(#[from] MalformedFrame),

    #[error(transparent)]
    ConnectionLost(#[from] ConnectionLost),

    /// A terminal error reported by the cluster in a response.
    #[error(transparent)]
    Remote(#[from] ErrorKind),
}

impl ProtocolError {
    /// Whether the fate of the operation is unknown.
    ///
    /// `false` means the operation definitely did not apply and may be
    /// resubmitted as a new operation. `true` means it may have committed
    /// before the failure was observed; the caller should query idempotently
    /// or resend under the same sequence number.
    pub fn is_outcome_unknown(&self) -> bool {
        match self {
            ProtocolError::InvalidArgument(_) => false,
            ProtocolError::MalformedFrame(_) => true,
            ProtocolError::ConnectionLost(_) => true,
            ProtocolError::Remote(kind) => match kind {
                // An Application error comes from evaluating the operation,
                // so its fate is known: rejected.
                ErrorKind::Application(_) => false,
                ErrorKind::NoLeader | ErrorKind::NotLeader => false,
                ErrorKind::SessionExpired | ErrorKind::SessionUnknown => true,
            },
        }
    }
}
