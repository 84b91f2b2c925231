//! Server-side session handling.
//!
//! [`ServerSession`] enforces the per-session ordering contract before
//! anything reaches the state machine: gap-free application in sequence
//! order, at-most-once application per sequence number with cached-response
//! replay, and event publication in index order. [`SessionManager`] owns the
//! sessions of one server, allocates session ids and dispatches requests.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;

use anyerror::AnyError;

use crate::error::ErrorKind;
use crate::error::InvalidArgument;
use crate::message::CloseResponse;
use crate::message::ConnectResponse;
use crate::message::KeepAliveRequest;
use crate::message::KeepAliveResponse;
use crate::message::OperationPayload;
use crate::message::OperationResponse;
use crate::message::PublishRequest;
use crate::message::PublishResponse;
use crate::message::RegisterResponse;
use crate::message::Request;
use crate::message::Response;
use crate::network::Address;
use crate::network::StateMachine;
use crate::session::SessionEvent;

/// Whether an operation mutates state or only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Command,
    Query,
}

struct PendingOperation {
    id: u64,
    kind: OperationKind,
    operation: OperationPayload,
}

/// Server-side state of one registered session.
pub struct ServerSession {
    id: u64,
    /// Highest sequence applied to the state machine.
    last_applied: u64,
    /// Responses cached for duplicate replay, keyed by sequence. Evicted
    /// when the client's keep-alive acknowledges receipt.
    responses: BTreeMap<u64, (OperationKind, OperationResponse)>,
    /// Operations held because an earlier sequence has not arrived yet.
    pending: BTreeMap<u64, PendingOperation>,
    max_pending: usize,
    /// Index of the last event published to this session.
    event_index: u64,
    /// Highest event index the client has acknowledged.
    ack_event_index: u64,
    /// Published events not yet acknowledged, retained for retransmission.
    events: VecDeque<SessionEvent>,
    next_publish_id: u64,
}

impl ServerSession {
    pub fn new(id: u64, max_pending: usize) -> Self {
        Self {
            id,
            last_applied: 0,
            responses: BTreeMap::new(),
            pending: BTreeMap::new(),
            max_pending,
            event_index: 0,
            ack_event_index: 0,
            events: VecDeque::new(),
            next_publish_id: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Number of cached responses awaiting acknowledgement.
    pub fn cached_responses(&self) -> usize {
        self.responses.len()
    }

    /// Handle one operation request, in sequence order.
    ///
    /// Returns the responses that became ready: the duplicate replay, or the
    /// applied operation plus any held successors it unblocked. An
    /// out-of-order arrival yields no response until the gap fills.
    pub fn handle_operation(
        &mut self,
        kind: OperationKind,
        id: u64,
        sequence: u64,
        operation: &OperationPayload,
        sm: &mut impl StateMachine,
    ) -> Vec<(OperationKind, OperationResponse)> {
        if sequence <= self.last_applied {
            return vec![self.replay_duplicate(kind, id, sequence)];
        }

        if sequence > self.last_applied + 1 {
            if self.pending.len() >= self.max_pending {
                tracing::warn!(
                    session = self.id,
                    sequence,
                    waiting_for = self.last_applied + 1,
                    "pending limit reached; failing out-of-order operation"
                );
                let error = ErrorKind::Application(AnyError::error(format!(
                    "sequence {} cannot be held: sequence {} was never received",
                    sequence,
                    self.last_applied + 1
                )));
                return vec![(kind, OperationResponse::error(id, error))];
            }
            tracing::debug!(
                session = self.id,
                sequence,
                waiting_for = self.last_applied + 1,
                "holding out-of-order operation"
            );
            self.pending.insert(sequence, PendingOperation {
                id,
                kind,
                operation: operation.clone(),
            });
            return Vec::new();
        }

        // In order: apply, then drain every held successor that is now
        // contiguous.
        let mut ready = vec![self.apply_one(kind, id, sequence, operation, sm)];
        while let Some(held) = self.pending.remove(&(self.last_applied + 1)) {
            let sequence = self.last_applied + 1;
            ready.push(self.apply_one(held.kind, held.id, sequence, &held.operation, sm));
        }
        ready
    }

    fn replay_duplicate(&self, kind: OperationKind, id: u64, sequence: u64) -> (OperationKind, OperationResponse) {
        match self.responses.get(&sequence) {
            Some((kind, response)) => {
                tracing::debug!(
                    session = self.id,
                    sequence,
                    "duplicate operation; replaying cached response"
                );
                (*kind, response.clone())
            }
            None => {
                // The cache below `sequence` was evicted on the client's own
                // acknowledgement, so a replay can only mean the session id
                // is being reused with restarted sequencing.
                tracing::warn!(
                    session = self.id,
                    sequence,
                    last_applied = self.last_applied,
                    "replay of an acknowledged sequence; rejecting"
                );
                (kind, OperationResponse::error(id, ErrorKind::SessionUnknown))
            }
        }
    }

    fn apply_one(
        &mut self,
        kind: OperationKind,
        id: u64,
        sequence: u64,
        operation: &OperationPayload,
        sm: &mut impl StateMachine,
    ) -> (OperationKind, OperationResponse) {
        let applied = match kind {
            OperationKind::Command => sm.apply(self.id, sequence, operation),
            OperationKind::Query => sm.query(self.id, sequence, operation),
        };
        let response = match applied {
            Ok(a) => OperationResponse::ok(id, a.index, a.event_index, a.result),
            Err(e) => {
                tracing::debug!(session = self.id, sequence, error = %e, "state machine rejected operation");
                OperationResponse::error(id, ErrorKind::Application(e))
            }
        };
        // A rejection still consumes the sequence: the operation was
        // evaluated, and a resend must see the same outcome.
        self.last_applied = sequence;
        self.responses.insert(sequence, (kind, response.clone()));
        (kind, response)
    }

    /// Apply the client's keep-alive acknowledgement cursors.
    pub fn handle_keep_alive(&mut self, request: &KeepAliveRequest) {
        let evicted = self.responses.len();
        self.responses = match request.command_sequence.checked_add(1) {
            Some(from) => self.responses.split_off(&from),
            // Every representable sequence is acknowledged.
            None => BTreeMap::new(),
        };
        let evicted = evicted - self.responses.len();
        if evicted > 0 {
            tracing::debug!(
                session = self.id,
                command_sequence = request.command_sequence,
                evicted,
                "evicted acknowledged responses"
            );
        }
        self.ack_events(request.event_index);
    }

    /// Publish a batch of events to this session.
    ///
    /// Assigns indexes continuing the session's event stream and returns the
    /// publish message to push to the client.
    pub fn publish(&mut self, payloads: Vec<OperationPayload>) -> Result<PublishRequest, InvalidArgument> {
        let previous_index = self.event_index;
        for payload in &payloads {
            self.event_index += 1;
            self.events.push_back(SessionEvent {
                index: self.event_index,
                payload: payload.clone(),
            });
        }
        let id = self.next_publish_id;
        self.next_publish_id += 1;
        PublishRequest::new(id, self.id, previous_index, self.event_index, payloads)
    }

    /// Handle the client's acknowledgement of a publish.
    ///
    /// If the client reports a high-water behind this session's stream, the
    /// unacknowledged tail is retransmitted from there.
    pub fn handle_publish_ack(
        &mut self,
        ack: &PublishResponse,
    ) -> Result<Option<PublishRequest>, InvalidArgument> {
        self.ack_events(ack.event_index);
        if ack.event_index >= self.event_index {
            return Ok(None);
        }
        let tail: Vec<OperationPayload> = self
            .events
            .iter()
            .filter(|e| e.index > ack.event_index)
            .map(|e| e.payload.clone())
            .collect();
        if tail.is_empty() {
            return Ok(None);
        }
        tracing::debug!(
            session = self.id,
            from = ack.event_index,
            to = self.event_index,
            "retransmitting events"
        );
        let id = self.next_publish_id;
        self.next_publish_id += 1;
        let publish = PublishRequest::new(id, self.id, ack.event_index, self.event_index, tail)?;
        Ok(Some(publish))
    }

    fn ack_events(&mut self, event_index: u64) {
        if event_index > self.ack_event_index {
            self.ack_event_index = event_index;
        }
        while let Some(front) = self.events.front() {
            if front.index > event_index {
                break;
            }
            self.events.pop_front();
        }
    }
}

/// Sessions of one server: id allocation, expiry and request dispatch.
///
/// The consensus layer reports this server's role through
/// [`set_routing`](Self::set_routing); a non-leader answers session and
/// operation requests with the leadership error that sends the client to the
/// right place.
pub struct SessionManager {
    next_session: u64,
    sessions: HashMap<u64, ServerSession>,
    expired: BTreeSet<u64>,
    is_leader: bool,
    leader: Option<Address>,
    members: Vec<Address>,
    default_timeout_millis: u64,
    max_pending_per_session: usize,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            next_session: 1,
            sessions: HashMap::new(),
            expired: BTreeSet::new(),
            is_leader: true,
            leader: None,
            members: Vec::new(),
            default_timeout_millis: 30_000,
            max_pending_per_session: 64,
        }
    }

    /// Bound on out-of-order operations held per session before the newest
    /// arrival is failed.
    pub fn with_max_pending_per_session(mut self, max_pending: usize) -> Self {
        self.max_pending_per_session = max_pending;
        self
    }

    /// Update the routing metadata advertised in responses.
    pub fn set_routing(&mut self, is_leader: bool, leader: Option<Address>, members: Vec<Address>) {
        self.is_leader = is_leader;
        self.leader = leader;
        self.members = members;
    }

    pub fn session(&self, id: u64) -> Option<&ServerSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: u64) -> Option<&mut ServerSession> {
        self.sessions.get_mut(&id)
    }

    /// Expire a session whose keep-alive timeout elapsed (the timer is the
    /// embedder's). Subsequent requests on it answer `SessionExpired`.
    pub fn expire_session(&mut self, id: u64) {
        if self.sessions.remove(&id).is_some() {
            tracing::info!(session = id, "session expired");
            self.expired.insert(id);
        }
    }

    /// Dispatch one client request, producing the responses to send back.
    ///
    /// An out-of-order operation may produce no response yet; an in-order
    /// one may additionally release responses for held successors.
    pub fn handle_request(&mut self, request: &Request, sm: &mut impl StateMachine) -> Vec<Response> {
        match request {
            Request::Connect(r) => {
                vec![Response::Connect(ConnectResponse::ok(
                    r.id,
                    self.leader.clone(),
                    self.members.clone(),
                ))]
            }

            Request::Register(r) => {
                if let Some(error) = self.leadership_error() {
                    return vec![Response::Register(RegisterResponse::error(r.id, error))];
                }
                let session = self.next_session;
                self.next_session += 1;
                self.sessions.insert(session, ServerSession::new(session, self.max_pending_per_session));
                let timeout = if r.timeout_millis == 0 {
                    self.default_timeout_millis
                } else {
                    r.timeout_millis
                };
                tracing::info!(session, client = %r.client, timeout, "registered session");
                let response = RegisterResponse::ok(
                    r.id,
                    session,
                    timeout,
                    self.leader.clone(),
                    self.members.clone(),
                )
                .map(Response::Register);
                match response {
                    Ok(response) => vec![response],
                    // Session ids start at 1; ok() cannot reject them.
                    Err(e) => vec![Response::Register(RegisterResponse::error(
                        r.id,
                        ErrorKind::Application(AnyError::error(e)),
                    ))],
                }
            }

            Request::KeepAlive(r) => {
                if let Some(error) = self.leadership_error() {
                    return vec![Response::KeepAlive(KeepAliveResponse::error(r.id, error))];
                }
                match self.sessions.get_mut(&r.session) {
                    Some(session) => {
                        session.handle_keep_alive(r);
                        vec![Response::KeepAlive(KeepAliveResponse::ok(
                            r.id,
                            self.leader.clone(),
                            self.members.clone(),
                        ))]
                    }
                    None => {
                        let error = self.missing_session_error(r.session);
                        vec![Response::KeepAlive(KeepAliveResponse::error(r.id, error))]
                    }
                }
            }

            Request::Command(r) => {
                self.dispatch_operation(OperationKind::Command, r.id, r.session, r.sequence, &r.operation, sm)
            }

            Request::Query(r) => {
                self.dispatch_operation(OperationKind::Query, r.id, r.session, r.sequence, &r.operation, sm)
            }

            Request::Close(r) => {
                if let Some(error) = self.leadership_error() {
                    return vec![Response::Close(CloseResponse::error(r.id, error))];
                }
                match self.sessions.remove(&r.session) {
                    Some(_) => {
                        tracing::info!(session = r.session, "session closed");
                        vec![Response::Close(CloseResponse::ok(r.id))]
                    }
                    None => {
                        let error = self.missing_session_error(r.session);
                        vec![Response::Close(CloseResponse::error(r.id, error))]
                    }
                }
            }

            Request::Publish(r) => {
                tracing::warn!(session = r.session, "server received a publish frame; dropping");
                Vec::new()
            }
        }
    }

    fn dispatch_operation(
        &mut self,
        kind: OperationKind,
        id: u64,
        session: u64,
        sequence: u64,
        operation: &OperationPayload,
        sm: &mut impl StateMachine,
    ) -> Vec<Response> {
        let wrap = |kind: OperationKind, response: OperationResponse| match kind {
            OperationKind::Command => Response::Command(response),
            OperationKind::Query => Response::Query(response),
        };

        if let Some(error) = self.leadership_error() {
            return vec![wrap(kind, OperationResponse::error(id, error))];
        }
        match self.sessions.get_mut(&session) {
            Some(state) => state
                .handle_operation(kind, id, sequence, operation, sm)
                .into_iter()
                .map(|(kind, response)| wrap(kind, response))
                .collect(),
            None => {
                let error = self.missing_session_error(session);
                vec![wrap(kind, OperationResponse::error(id, error))]
            }
        }
    }

    fn leadership_error(&self) -> Option<ErrorKind> {
        if self.is_leader {
            return None;
        }
        match self.leader {
            Some(_) => Some(ErrorKind::NotLeader),
            None => Some(ErrorKind::NoLeader),
        }
    }

    fn missing_session_error(&self, session: u64) -> ErrorKind {
        if self.expired.contains(&session) {
            ErrorKind::SessionExpired
        } else {
            ErrorKind::SessionUnknown
        }
    }
}
