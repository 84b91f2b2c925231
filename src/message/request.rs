use std::fmt;

use crate::error::InvalidArgument;
use crate::message::OperationPayload;

/// A client-to-cluster protocol request.
///
/// The variant set is closed. `Connect`, `Register`, `KeepAlive` and `Close`
/// manage the session lifecycle; `Command` and `Query` carry operations
/// against the replicated state machine. `Publish` is the one
/// server-initiated member: event delivery from the cluster to the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Request {
    Connect(ConnectRequest),
    Register(RegisterRequest),
    KeepAlive(KeepAliveRequest),
    Command(CommandRequest),
    Query(QueryRequest),
    Close(CloseRequest),
    Publish(PublishRequest),
}

impl Request {
    /// The client-assigned correlation id.
    pub fn id(&self) -> u64 {
        match self {
            Request::Connect(r) => r.id,
            Request::Register(r) => r.id,
            Request::KeepAlive(r) => r.id,
            Request::Command(r) => r.id,
            Request::Query(r) => r.id,
            Request::Close(r) => r.id,
            Request::Publish(r) => r.id,
        }
    }

    /// The session this request belongs to, if it is session-scoped.
    pub fn session(&self) -> Option<u64> {
        match self {
            Request::Connect(_) | Request::Register(_) => None,
            Request::KeepAlive(r) => Some(r.session),
            Request::Command(r) => Some(r.session),
            Request::Query(r) => Some(r.session),
            Request::Close(r) => Some(r.session),
            Request::Publish(r) => Some(r.session),
        }
    }

    /// The per-session sequence number, if this is an operation request.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Request::Command(r) => Some(r.sequence),
            Request::Query(r) => Some(r.sequence),
            _ => None,
        }
    }

    /// Re-check the construction invariants on a request built outside the
    /// validating constructors, e.g. decoded from a received frame.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        match self {
            Request::Connect(r) => check_client(&r.client),
            Request::Register(r) => check_client(&r.client),
            Request::KeepAlive(r) => check_session(r.session),
            Request::Command(r) => {
                check_session(r.session)?;
                check_sequence(r.sequence)?;
                r.operation.check()
            }
            Request::Query(r) => {
                check_session(r.session)?;
                check_sequence(r.sequence)?;
                r.operation.check()
            }
            Request::Close(r) => check_session(r.session),
            Request::Publish(r) => {
                check_session(r.session)?;
                if r.events.is_empty() {
                    return Err(InvalidArgument::new("publish must carry at least one event"));
                }
                if r.event_index <= r.previous_index {
                    return Err(InvalidArgument::new(format!(
                        "event_index {} must be greater than previous_index {}",
                        r.event_index, r.previous_index
                    )));
                }
                for event in &r.events {
                    event.check()?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Connect(r) => write!(f, "Connect{{id={}, client={}}}", r.id, r.client),
            Request::Register(r) => {
                write!(f, "Register{{id={}, client={}, timeout={}}}", r.id, r.client, r.timeout_millis)
            }
            Request::KeepAlive(r) => write!(
                f,
                "KeepAlive{{id={}, session={}, command_sequence={}, event_index={}}}",
                r.id, r.session, r.command_sequence, r.event_index
            ),
            Request::Command(r) => write!(
                f,
                "Command{{id={}, session={}, sequence={}, operation={}}}",
                r.id, r.session, r.sequence, r.operation
            ),
            Request::Query(r) => write!(
                f,
                "Query{{id={}, session={}, sequence={}, operation={}}}",
                r.id, r.session, r.sequence, r.operation
            ),
            Request::Close(r) => write!(f, "Close{{id={}, session={}}}", r.id, r.session),
            Request::Publish(r) => write!(
                f,
                "Publish{{id={}, session={}, previous_index={}, event_index={}, events={}}}",
                r.id,
                r.session,
                r.previous_index,
                r.event_index,
                r.events.len()
            ),
        }
    }
}

/// Opens a connection-scoped exchange for an already-registered client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct ConnectRequest {
    pub id: u64,
    /// Client identity, assigned out of band.
    pub client: String,
}

impl ConnectRequest {
    pub fn new(id: u64, client: impl ToString) -> Result<Self, InvalidArgument> {
        let client = client.to_string();
        if client.is_empty() {
            return Err(InvalidArgument::new("client must not be empty"));
        }
        Ok(Self { id, client })
    }
}

/// Registers a new session; the response supplies the session id used by
/// every operation request thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct RegisterRequest {
    pub id: u64,
    pub client: String,
    /// Requested session timeout; the server may grant a different value.
    pub timeout_millis: u64,
}

impl RegisterRequest {
    pub fn new(id: u64, client: impl ToString, timeout_millis: u64) -> Result<Self, InvalidArgument> {
        let client = client.to_string();
        if client.is_empty() {
            return Err(InvalidArgument::new("client must not be empty"));
        }
        Ok(Self {
            id,
            client,
            timeout_millis,
        })
    }
}

/// Session heartbeat, doubling as the client's acknowledgement cursor.
///
/// `command_sequence` is the highest sequence whose response the client has
/// received; the server may evict cached responses at or below it.
/// `event_index` is the highest event index the client has delivered to its
/// caller; the server may drop queued events at or below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct KeepAliveRequest {
    pub id: u64,
    pub session: u64,
    pub command_sequence: u64,
    pub event_index: u64,
}

impl KeepAliveRequest {
    pub fn new(
        id: u64,
        session: u64,
        command_sequence: u64,
        event_index: u64,
    ) -> Result<Self, InvalidArgument> {
        check_session(session)?;
        Ok(Self {
            id,
            session,
            command_sequence,
            event_index,
        })
    }
}

/// Submits a mutating operation to the replicated state machine.
///
/// Commands are applied in sequence order within their session. Sequence
/// numbers are never skipped; a failed command is resent with its original
/// sequence number, and the cluster applies each sequence at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct CommandRequest {
    pub id: u64,
    pub session: u64,
    pub sequence: u64,
    pub operation: OperationPayload,
}

impl CommandRequest {
    pub fn new(
        id: u64,
        session: u64,
        sequence: u64,
        operation: OperationPayload,
    ) -> Result<Self, InvalidArgument> {
        check_session(session)?;
        check_sequence(sequence)?;
        Ok(Self {
            id,
            session,
            sequence,
            operation,
        })
    }
}

/// Submits a read-only operation.
///
/// Queries share the command sequencing discipline; they may additionally be
/// served by an up-to-date replica rather than only the leader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct QueryRequest {
    pub id: u64,
    pub session: u64,
    pub sequence: u64,
    pub operation: OperationPayload,
}

impl QueryRequest {
    pub fn new(
        id: u64,
        session: u64,
        sequence: u64,
        operation: OperationPayload,
    ) -> Result<Self, InvalidArgument> {
        check_session(session)?;
        check_sequence(sequence)?;
        Ok(Self {
            id,
            session,
            sequence,
            operation,
        })
    }
}

/// Closes a session explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct CloseRequest {
    pub id: u64,
    pub session: u64,
}

impl CloseRequest {
    pub fn new(id: u64, session: u64) -> Result<Self, InvalidArgument> {
        check_session(session)?;
        Ok(Self { id, session })
    }
}

/// Server-pushed event delivery for one session.
///
/// Events are delivered in index order. `previous_index` is the index of the
/// event preceding this batch; a client whose delivered high-water does not
/// match answers with its actual high-water so the server retransmits from
/// there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct PublishRequest {
    pub id: u64,
    pub session: u64,
    /// Event index preceding `events`.
    pub previous_index: u64,
    /// Event index of the last payload in `events`.
    pub event_index: u64,
    pub events: Vec<OperationPayload>,
}

impl PublishRequest {
    pub fn new(
        id: u64,
        session: u64,
        previous_index: u64,
        event_index: u64,
        events: Vec<OperationPayload>,
    ) -> Result<Self, InvalidArgument> {
        check_session(session)?;
        if events.is_empty() {
            return Err(InvalidArgument::new("publish must carry at least one event"));
        }
        if event_index <= previous_index {
            return Err(InvalidArgument::new(format!(
                "event_index {} must be greater than previous_index {}",
                event_index, previous_index
            )));
        }
        Ok(Self {
            id,
            session,
            previous_index,
            event_index,
            events,
        })
    }
}

fn check_client(client: &str) -> Result<(), InvalidArgument> {
    if client.is_empty() {
        return Err(InvalidArgument::new("client must not be empty"));
    }
    Ok(())
}

fn check_session(session: u64) -> Result<(), InvalidArgument> {
    if session < 1 {
        return Err(InvalidArgument::new("session must be at least 1"));
    }
    Ok(())
}

fn check_sequence(sequence: u64) -> Result<(), InvalidArgument> {
    if sequence < 1 {
        return Err(InvalidArgument::new("sequence must be at least 1"));
    }
    Ok(())
}
