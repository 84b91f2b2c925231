use std::fmt;

use crate::error::ErrorKind;
use crate::error::InvalidArgument;
use crate::message::OperationPayload;

/// Outcome marker of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Status {
    Ok,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// A cluster-to-client protocol response, one variant per request type.
///
/// Command and Query responses share the [`OperationResponse`] body; the
/// variant tag keeps them distinct under structural equality.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Response {
    Connect(ConnectResponse),
    Register(RegisterResponse),
    KeepAlive(KeepAliveResponse),
    Command(OperationResponse),
    Query(OperationResponse),
    Close(CloseResponse),
    Publish(PublishResponse),
}

impl Response {
    /// The correlation id of the request this responds to.
    pub fn id(&self) -> u64 {
        match self {
            Response::Connect(r) => r.id,
            Response::Register(r) => r.id,
            Response::KeepAlive(r) => r.id,
            Response::Command(r) => r.id,
            Response::Query(r) => r.id,
            Response::Close(r) => r.id,
            Response::Publish(r) => r.id,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Response::Connect(r) => r.status,
            Response::Register(r) => r.status,
            Response::KeepAlive(r) => r.status,
            Response::Command(r) => r.status,
            Response::Query(r) => r.status,
            Response::Close(r) => r.status,
            Response::Publish(r) => r.status,
        }
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        match self {
            Response::Connect(r) => r.error.as_ref(),
            Response::Register(r) => r.error.as_ref(),
            Response::KeepAlive(r) => r.error.as_ref(),
            Response::Command(r) => r.error.as_ref(),
            Response::Query(r) => r.error.as_ref(),
            Response::Close(r) => r.error.as_ref(),
            Response::Publish(r) => r.error.as_ref(),
        }
    }

    /// Re-check the construction invariants on a response built outside the
    /// validating constructors, e.g. decoded from a received frame.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        check_status(self.status(), self.error())?;
        match self {
            Response::Register(r) => {
                if r.status == Status::Ok && r.session < 1 {
                    return Err(InvalidArgument::new("session must be at least 1"));
                }
                Ok(())
            }
            Response::Command(r) => r.check(),
            Response::Query(r) => r.check(),
            _ => Ok(()),
        }
    }
}

fn check_status(status: Status, error: Option<&ErrorKind>) -> Result<(), InvalidArgument> {
    match (status, error) {
        (Status::Ok, None) | (Status::Error, Some(_)) => Ok(()),
        (Status::Ok, Some(_)) => Err(InvalidArgument::new("an OK response cannot carry an error")),
        (Status::Error, None) => Err(InvalidArgument::new("an ERROR response must carry an error")),
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Connect(r) => write!(f, "Connect{{id={}, status={}}}", r.id, r.status),
            Response::Register(r) => write!(
                f,
                "Register{{id={}, status={}, session={}, timeout={}}}",
                r.id, r.status, r.session, r.timeout_millis
            ),
            Response::KeepAlive(r) => write!(f, "KeepAlive{{id={}, status={}}}", r.id, r.status),
            Response::Command(r) => write!(f, "Command{}", r),
            Response::Query(r) => write!(f, "Query{}", r),
            Response::Close(r) => write!(f, "Close{{id={}, status={}}}", r.id, r.status),
            Response::Publish(r) => write!(
                f,
                "Publish{{id={}, status={}, event_index={}}}",
                r.id, r.status, r.event_index
            ),
        }
    }
}

/// Response to a [`ConnectRequest`](crate::message::ConnectRequest), carrying
/// cluster routing metadata for the freshly bound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct ConnectResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
    pub leader: Option<String>,
    pub members: Vec<String>,
}

impl ConnectResponse {
    pub fn ok(id: u64, leader: Option<String>, members: Vec<String>) -> Self {
        Self {
            id,
            status: Status::Ok,
            error: None,
            leader,
            members,
        }
    }

    pub fn error(id: u64, error: ErrorKind) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error),
            leader: None,
            members: Vec::new(),
        }
    }
}

/// Response to a [`RegisterRequest`](crate::message::RegisterRequest).
///
/// On success `session` is the newly issued session id, consumed by every
/// operation request for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct RegisterResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
    pub session: u64,
    /// Granted session timeout.
    pub timeout_millis: u64,
    pub leader: Option<String>,
    pub members: Vec<String>,
}

impl RegisterResponse {
    pub fn ok(
        id: u64,
        session: u64,
        timeout_millis: u64,
        leader: Option<String>,
        members: Vec<String>,
    ) -> Result<Self, InvalidArgument> {
        if session < 1 {
            return Err(InvalidArgument::new("session must be at least 1"));
        }
        Ok(Self {
            id,
            status: Status::Ok,
            error: None,
            session,
            timeout_millis,
            leader,
            members,
        })
    }

    pub fn error(id: u64, error: ErrorKind) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error),
            session: 0,
            timeout_millis: 0,
            leader: None,
            members: Vec::new(),
        }
    }
}

/// Response to a [`KeepAliveRequest`](crate::message::KeepAliveRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct KeepAliveResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
    pub leader: Option<String>,
    pub members: Vec<String>,
}

impl KeepAliveResponse {
    pub fn ok(id: u64, leader: Option<String>, members: Vec<String>) -> Self {
        Self {
            id,
            status: Status::Ok,
            error: None,
            leader,
            members,
        }
    }

    pub fn error(id: u64, error: ErrorKind) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error),
            leader: None,
            members: Vec::new(),
        }
    }
}

/// Response to a [`CloseRequest`](crate::message::CloseRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct CloseResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
}

impl CloseResponse {
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            status: Status::Ok,
            error: None,
        }
    }

    pub fn error(id: u64, error: ErrorKind) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error),
        }
    }
}

/// Body shared by Command and Query responses.
///
/// `index` is the state machine commit index at which the operation was
/// evaluated; it never decreases across the responses one session observes.
/// `event_index` is the highest event index the session had observed when
/// this response was produced, and orders event delivery relative to
/// operation completion. `result` is present only on `OK`, and may still be
/// `None`, meaning the operation produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct OperationResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
    pub index: u64,
    pub event_index: u64,
    pub result: Option<OperationPayload>,
}

impl OperationResponse {
    /// Successful response; infallible because the index domain is already
    /// non-negative. Wire-boundary construction goes through the builder.
    pub fn ok(id: u64, index: u64, event_index: u64, result: Option<OperationPayload>) -> Self {
        Self {
            id,
            status: Status::Ok,
            error: None,
            index,
            event_index,
            result,
        }
    }

    /// Failed response. Error responses carry no meaningful index.
    pub fn error(id: u64, error: ErrorKind) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error),
            index: 0,
            event_index: 0,
            result: None,
        }
    }

    fn check(&self) -> Result<(), InvalidArgument> {
        if self.status == Status::Error && self.result.is_some() {
            return Err(InvalidArgument::new("an ERROR response cannot carry a result"));
        }
        if let Some(result) = &self.result {
            result.check()?;
        }
        Ok(())
    }

    /// Start building a response for the request with `id`.
    pub fn builder(id: u64) -> OperationResponseBuilder {
        OperationResponseBuilder {
            id,
            error: None,
            index: 0,
            event_index: 0,
            result: None,
        }
    }
}

impl fmt::Display for OperationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id={}, status={}, index={}, event_index={}}}",
            self.id, self.status, self.index, self.event_index
        )
    }
}

/// One-shot builder for [`OperationResponse`].
///
/// Index fields are accepted as signed values to preserve the wire contract
/// that a negative index is rejected at build time, before transmission.
#[derive(Debug, Clone)]
pub struct OperationResponseBuilder {
    id: u64,
    error: Option<ErrorKind>,
    index: u64,
    event_index: u64,
    result: Option<OperationPayload>,
}

impl OperationResponseBuilder {
    pub fn with_index(mut self, index: i64) -> Result<Self, InvalidArgument> {
        if index < 0 {
            return Err(InvalidArgument::new(format!("index must not be negative, got {}", index)));
        }
        self.index = index as u64;
        Ok(self)
    }

    pub fn with_event_index(mut self, event_index: i64) -> Result<Self, InvalidArgument> {
        if event_index < 0 {
            return Err(InvalidArgument::new(format!(
                "event_index must not be negative, got {}",
                event_index
            )));
        }
        self.event_index = event_index as u64;
        Ok(self)
    }

    pub fn with_result(mut self, result: Option<OperationPayload>) -> Self {
        self.result = result;
        self
    }

    pub fn with_error(mut self, error: ErrorKind) -> Self {
        self.error = Some(error);
        self
    }

    /// Finish the build. Status is derived: `ERROR` iff an error was set,
    /// and a result may only accompany `OK`.
    pub fn build(self) -> Result<OperationResponse, InvalidArgument> {
        let status = match self.error {
            None => Status::Ok,
            Some(_) => Status::Error,
        };
        if status == Status::Error && self.result.is_some() {
            return Err(InvalidArgument::new("an ERROR response cannot carry a result"));
        }
        Ok(OperationResponse {
            id: self.id,
            status,
            error: self.error,
            index: self.index,
            event_index: self.event_index,
            result: self.result,
        })
    }
}

/// Client acknowledgement of a [`PublishRequest`](crate::message::PublishRequest).
///
/// Always `OK`; `event_index` reports the client's delivered high-water so a
/// server that raced ahead can retransmit from the right position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct PublishResponse {
    pub id: u64,
    pub status: Status,
    pub error: Option<ErrorKind>,
    pub event_index: u64,
}

impl PublishResponse {
    pub fn ok(id: u64, event_index: u64) -> Self {
        Self {
            id,
            status: Status::Ok,
            error: None,
            event_index,
        }
    }
}
