//! The client-side submit loop.
//!
//! [`SessionClient`] drives one session against the cluster: it binds the
//! transport to the resolved leader, registers the session, and pushes each
//! operation through the sequencer, the codec, the consistency tracker and
//! the retry policy until a terminal outcome is reached. Server-pushed
//! `Publish` frames are handled inline, so the event-ordering guarantee
//! holds for responses delivered by this loop.

use crate::codec;
use crate::codec::Frame;
use crate::error::ConnectionLost;
use crate::error::ErrorKind;
use crate::error::InvalidArgument;
use crate::error::MalformedFrame;
use crate::error::ProtocolError;
use crate::message::ConnectRequest;
use crate::message::OperationPayload;
use crate::message::OperationResponse;
use crate::message::RegisterRequest;
use crate::message::Request;
use crate::message::Response;
use crate::network::Address;
use crate::network::LeaderResolver;
use crate::network::Transport;
use crate::retry::Attempt;
use crate::retry::RetryDecision;
use crate::consistency::Admission;
use crate::session::server::OperationKind;
use crate::session::ClientSession;
use crate::session::SessionEvent;

/// A client session driver over a [`Transport`] and a [`LeaderResolver`].
///
/// All methods are synchronous and drive at most one operation at a time;
/// the per-sequence pipelining the protocol permits is left to embedders
/// that manage their own in-flight window.
pub struct SessionClient<T, R>
where
    T: Transport,
    R: LeaderResolver,
{
    transport: T,
    resolver: R,
    client: String,
    session: Option<ClientSession>,
    /// Target the transport is currently bound to.
    bound: Option<Address>,
    next_request_id: u64,
    /// Caller-imposed attempt bound; `None` retries indefinitely.
    max_attempts: Option<u32>,
}

impl<T, R> SessionClient<T, R>
where
    T: Transport,
    R: LeaderResolver,
{
    pub fn new(transport: T, resolver: R, client: impl ToString) -> Self {
        Self {
            transport,
            resolver,
            client: client.to_string(),
            session: None,
            bound: None,
            next_request_id: 1,
            max_attempts: None,
        }
    }

    /// Bound the number of attempts per request. Unset, retryable failures
    /// are retried indefinitely.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// The registered session id, once [`register`](Self::register) succeeded.
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id())
    }

    /// Register a session with the cluster.
    ///
    /// `timeout_millis` is the requested keep-alive timeout; 0 asks for the
    /// server default. Returns the granted session id.
    pub fn register(&mut self, timeout_millis: u64) -> Result<u64, ProtocolError> {
        let id = self.assign_request_id();
        let request = Request::Register(RegisterRequest::new(id, &self.client, timeout_millis)?);
        let response = self.request_with_retry(&request)?;
        match response {
            Response::Register(r) => {
                let session = ClientSession::new(r.session)?;
                tracing::info!(session = r.session, timeout = r.timeout_millis, "session registered");
                self.session = Some(session);
                Ok(r.session)
            }
            other => Err(Self::unexpected_variant(&request, &other).into()),
        }
    }

    /// Submit a command; returns its result payload on success.
    pub fn submit_command(&mut self, operation: OperationPayload) -> Result<Option<OperationPayload>, ProtocolError> {
        self.submit_operation(OperationKind::Command, operation)
    }

    /// Submit a query; returns its result payload on success.
    pub fn submit_query(&mut self, operation: OperationPayload) -> Result<Option<OperationPayload>, ProtocolError> {
        self.submit_operation(OperationKind::Query, operation)
    }

    /// Send a keep-alive carrying the session's acknowledgement cursors.
    pub fn keep_alive(&mut self) -> Result<(), ProtocolError> {
        let id = self.assign_request_id();
        let request = Request::KeepAlive(self.session_mut()?.keep_alive_request(id)?);
        let response = self.request_with_retry(&request)?;
        match response {
            Response::KeepAlive(_) => Ok(()),
            other => Err(Self::unexpected_variant(&request, &other).into()),
        }
    }

    /// Close the session explicitly.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        let id = self.assign_request_id();
        let request = Request::Close(self.session_mut()?.close_request(id)?);
        let response = self.request_with_retry(&request)?;
        self.session = None;
        match response {
            Response::Close(_) => Ok(()),
            other => Err(Self::unexpected_variant(&request, &other).into()),
        }
    }

    /// Drain events received so far, in index order.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        match self.session.as_mut() {
            Some(session) => session.take_events(),
            None => Vec::new(),
        }
    }

    fn submit_operation(
        &mut self,
        kind: OperationKind,
        operation: OperationPayload,
    ) -> Result<Option<OperationPayload>, ProtocolError> {
        // Build once: the id and sequence number are assigned here and kept
        // across every resend.
        let id = self.assign_request_id();
        let (request, sequence) = {
            let session = self.session_mut()?;
            match kind {
                OperationKind::Command => {
                    let r = session.command_request(id, operation)?;
                    let sequence = r.sequence;
                    (Request::Command(r), sequence)
                }
                OperationKind::Query => {
                    let r = session.query_request(id, operation)?;
                    let sequence = r.sequence;
                    (Request::Query(r), sequence)
                }
            }
        };

        let mut attempt = Attempt::new(self.max_attempts);
        loop {
            let response = match self.try_exchange(&request) {
                Ok(response) => response,
                Err(lost) => {
                    self.unbind();
                    match attempt.on_connection_lost(lost) {
                        RetryDecision::Retry => continue,
                        RetryDecision::Fail(e) => return Err(e),
                        RetryDecision::Complete => unreachable!("connection loss cannot complete a request"),
                    }
                }
            };

            let body = match (kind, response) {
                (OperationKind::Command, Response::Command(body)) => body,
                (OperationKind::Query, Response::Query(body)) => body,
                (_, other) => return Err(Self::unexpected_variant(&request, &other).into()),
            };

            match attempt.on_response(body.error.as_ref()) {
                RetryDecision::Complete => {}
                RetryDecision::Retry => {
                    self.unbind();
                    continue;
                }
                RetryDecision::Fail(e) => return Err(e),
            }

            // Queries are not index-tracked; only command responses pass
            // through the consistency admission.
            if kind == OperationKind::Query {
                let session = self.session_mut()?;
                session.note_response(sequence);
                return Ok(body.result);
            }

            let admission = self.session_mut()?.admit_command(sequence, body);
            match admission {
                Admission::Deliver(body) => return Ok(body.result),
                Admission::Held => {
                    let body = self.await_release(request.id())?;
                    self.session_mut()?.note_response(sequence);
                    return Ok(body.result);
                }
                Admission::Regression { index, high_water } => {
                    // A stale server answered. Stay off it until it catches
                    // up: re-resolve and resend, classified like a
                    // leadership miss.
                    tracing::warn!(index, high_water, "discarding stale response; re-resolving");
                    match attempt.on_response(Some(&ErrorKind::NotLeader)) {
                        RetryDecision::Retry => {
                            self.unbind();
                            continue;
                        }
                        RetryDecision::Fail(e) => return Err(e),
                        RetryDecision::Complete => unreachable!("a regression cannot complete a request"),
                    }
                }
            }
        }
    }

    /// Exchange a non-operation request under the retry policy.
    fn request_with_retry(&mut self, request: &Request) -> Result<Response, ProtocolError> {
        let mut attempt = Attempt::new(self.max_attempts);
        loop {
            let response = match self.try_exchange(request) {
                Ok(response) => response,
                Err(lost) => {
                    self.unbind();
                    match attempt.on_connection_lost(lost) {
                        RetryDecision::Retry => continue,
                        RetryDecision::Fail(e) => return Err(e),
                        RetryDecision::Complete => unreachable!("connection loss cannot complete a request"),
                    }
                }
            };
            match attempt.on_response(response.error()) {
                RetryDecision::Complete => return Ok(response),
                RetryDecision::Retry => {
                    self.unbind();
                    continue;
                }
                RetryDecision::Fail(e) => return Err(e),
            }
        }
    }

    /// One send/receive round: bind to the leader if needed, send the
    /// request, and receive until the matching response arrives. Publish
    /// frames and stale responses are handled inline.
    fn try_exchange(&mut self, request: &Request) -> Result<Response, ConnectionLost> {
        self.ensure_bound()?;
        let frame = match codec::encode_request(request) {
            Ok(frame) => frame,
            Err(e) => return Err(ConnectionLost::new(e)),
        };
        self.transport.send(frame)?;
        loop {
            let bytes = self.transport.receive()?;
            let frame = match codec::decode_frame(&bytes) {
                Ok(frame) => frame,
                // A frame that does not decode means the channel is
                // corrupt; drop the connection and let the retry policy
                // take over.
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable frame; dropping connection");
                    return Err(ConnectionLost::new(e));
                }
            };
            match frame {
                Frame::Request(Request::Publish(publish)) => {
                    self.handle_publish_frame(&publish)?;
                }
                Frame::Request(other) => {
                    tracing::warn!(request = %other, "unexpected request frame from server; ignoring");
                }
                Frame::Response(response) if response.id() == request.id() => {
                    return Ok(response);
                }
                Frame::Response(stale) => {
                    // A response for an abandoned request; its sequence
                    // slot settles server-side, nothing to do here.
                    tracing::debug!(response = %stale, "ignoring response for an abandoned request");
                }
            }
        }
    }

    /// Receive until the held response with `id` is released by event
    /// delivery.
    fn await_release(&mut self, id: u64) -> Result<OperationResponse, ProtocolError> {
        loop {
            let bytes = match self.transport.receive() {
                Ok(bytes) => bytes,
                Err(lost) => {
                    self.unbind();
                    return Err(lost.into());
                }
            };
            let frame = match codec::decode_frame(&bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable frame; dropping connection");
                    self.unbind();
                    return Err(ConnectionLost::new(e).into());
                }
            };
            match frame {
                Frame::Request(Request::Publish(publish)) => {
                    let released = self.handle_publish_frame(&publish)?;
                    if let Some(body) = released.into_iter().find(|r| r.id == id) {
                        return Ok(body);
                    }
                }
                other => {
                    tracing::debug!("ignoring frame while awaiting event delivery: {:?}", other);
                }
            }
        }
    }

    fn handle_publish_frame(
        &mut self,
        publish: &crate::message::PublishRequest,
    ) -> Result<Vec<OperationResponse>, ConnectionLost> {
        let (ack, released) = match self.session.as_mut() {
            Some(session) => session.handle_publish(publish),
            None => return Ok(Vec::new()),
        };
        let frame =
            codec::encode_response(&Response::Publish(ack)).map_err(ConnectionLost::new)?;
        self.transport.send(frame)?;
        Ok(released)
    }

    /// Resolve the current leader and bind the transport to it, issuing the
    /// connect handshake on a fresh binding.
    fn ensure_bound(&mut self) -> Result<(), ConnectionLost> {
        if self.bound.is_some() {
            return Ok(());
        }
        let leader = match self.resolver.current_leader() {
            Some(leader) => leader,
            None => return Err(ConnectionLost::new(ErrorKind::NoLeader)),
        };
        self.transport.connect(&leader)?;
        tracing::debug!(leader = %leader, "bound to leader");
        self.bound = Some(leader);

        let id = self.assign_request_id();
        let connect = match ConnectRequest::new(id, &self.client) {
            Ok(connect) => Request::Connect(connect),
            Err(e) => return Err(ConnectionLost::new(e)),
        };
        let frame = codec::encode_request(&connect).map_err(ConnectionLost::new)?;
        self.transport.send(frame)?;
        loop {
            let bytes = self.transport.receive()?;
            match codec::decode_frame(&bytes).map_err(ConnectionLost::new)? {
                Frame::Response(Response::Connect(r)) if r.id == id => return Ok(()),
                other => {
                    tracing::debug!("ignoring frame during connect handshake: {:?}", other);
                }
            }
        }
    }

    fn unbind(&mut self) {
        self.bound = None;
    }

    fn assign_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn session_mut(&mut self) -> Result<&mut ClientSession, InvalidArgument> {
        self.session
            .as_mut()
            .ok_or_else(|| InvalidArgument::new("no session registered; call register() first"))
    }

    fn unexpected_variant(request: &Request, response: &Response) -> MalformedFrame {
        MalformedFrame::new(format!(
            "response variant does not match request: sent {}, received {}",
            request, response
        ))
    }
}
