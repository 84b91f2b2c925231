use pretty_assertions::assert_eq;

use crate::error::ErrorKind;
use crate::message::KeepAliveRequest;
use crate::message::PublishResponse;
use crate::message::RegisterRequest;
use crate::message::Request;
use crate::message::Response;
use crate::message::Status;
use crate::session::server::OperationKind;
use crate::session::server::ServerSession;
use crate::session::server::SessionManager;
use crate::testing::payload;
use crate::testing::MemStateMachine;

#[test]
fn test_in_order_application_and_ordering_law() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    let first = session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"a"), &mut sm);
    let second = session.handle_operation(OperationKind::Command, 2, 2, &payload("set", b"b"), &mut sm);
    assert_eq!(1, first.len());
    assert_eq!(1, second.len());

    // Index is non-decreasing in sequence order.
    assert!(first[0].1.index <= second[0].1.index);
    assert_eq!(2, session.last_applied());
    assert_eq!(2, sm.applied.len());
    Ok(())
}

#[test]
fn test_duplicate_is_not_reapplied() -> anyhow::Result<()> {
    // Scenario: apply at some commit index, then resend the identical
    // request; the recorded response comes back and the machine is not
    // touched again.
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::starting_at(99);

    let op = payload("set", b"x=1");
    let first = session.handle_operation(OperationKind::Command, 1, 1, &op, &mut sm);
    assert_eq!(100, first[0].1.index);
    assert_eq!(1, sm.applied.len());

    let replay = session.handle_operation(OperationKind::Command, 1, 1, &op, &mut sm);
    assert_eq!(first, replay);
    assert_eq!(1, sm.applied.len());
    Ok(())
}

#[test]
fn test_out_of_order_is_held_until_gap_fills() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    // Sequence 2 before sequence 1: held, no response yet.
    let held = session.handle_operation(OperationKind::Command, 2, 2, &payload("set", b"b"), &mut sm);
    assert!(held.is_empty());
    assert_eq!(0, sm.applied.len());

    // Sequence 1 arrives: both apply, in program order.
    let ready = session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"a"), &mut sm);
    assert_eq!(2, ready.len());
    assert_eq!(1, ready[0].1.id);
    assert_eq!(2, ready[1].1.id);
    assert_eq!(
        vec![(5, 1, payload("set", b"a")), (5, 2, payload("set", b"b"))],
        sm.applied
    );
    Ok(())
}

#[test]
fn test_pending_bound_fails_newest_arrival() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 1);
    let mut sm = MemStateMachine::new();

    assert!(session.handle_operation(OperationKind::Command, 3, 3, &payload("set", b"c"), &mut sm).is_empty());

    let overflow = session.handle_operation(OperationKind::Command, 5, 5, &payload("set", b"e"), &mut sm);
    assert_eq!(1, overflow.len());
    assert_eq!(Status::Error, overflow[0].1.status);
    assert!(matches!(overflow[0].1.error, Some(ErrorKind::Application(_))));
    // Nothing was applied; the gap is still open.
    assert_eq!(0, sm.applied.len());
    Ok(())
}

#[test]
fn test_application_error_consumes_the_sequence() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();
    sm.reject_tags.insert("bad".to_string());

    let op = payload("bad", b"");
    let first = session.handle_operation(OperationKind::Command, 1, 1, &op, &mut sm);
    assert_eq!(Status::Error, first[0].1.status);
    assert_eq!(1, session.last_applied());

    // A resend sees the same recorded rejection, not a fresh evaluation.
    let replay = session.handle_operation(OperationKind::Command, 1, 1, &op, &mut sm);
    assert_eq!(first, replay);
    Ok(())
}

#[test]
fn test_keep_alive_evicts_acknowledged_responses() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    for sequence in 1..=3 {
        session.handle_operation(OperationKind::Command, sequence, sequence, &payload("set", b"v"), &mut sm);
    }
    assert_eq!(3, session.cached_responses());

    session.handle_keep_alive(&KeepAliveRequest::new(9, 5, 2, 0)?);
    assert_eq!(1, session.cached_responses());
    Ok(())
}

#[test]
fn test_keep_alive_at_maximum_cursor_evicts_everything() -> anyhow::Result<()> {
    // The largest representable cursor acknowledges every sequence.
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"v"), &mut sm);
    session.handle_keep_alive(&KeepAliveRequest::new(9, 5, u64::MAX, 0)?);
    assert_eq!(0, session.cached_responses());
    Ok(())
}

#[test]
fn test_replay_of_evicted_sequence_is_rejected() -> anyhow::Result<()> {
    // Sequencing restarts only with a new session id; replaying an
    // acknowledged sequence means the id is being reused.
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"v"), &mut sm);
    session.handle_keep_alive(&KeepAliveRequest::new(9, 5, 1, 0)?);

    let replay = session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"v"), &mut sm);
    assert_eq!(Some(ErrorKind::SessionUnknown), replay[0].1.error);
    assert_eq!(1, sm.applied.len());
    Ok(())
}

#[test]
fn test_publish_assigns_contiguous_event_indexes() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);

    let publish = session.publish(vec![payload("ev", b"a"), payload("ev", b"b")])?;
    assert_eq!(0, publish.previous_index);
    assert_eq!(2, publish.event_index);

    let next = session.publish(vec![payload("ev", b"c")])?;
    assert_eq!(2, next.previous_index);
    assert_eq!(3, next.event_index);
    Ok(())
}

#[test]
fn test_publish_ack_behind_triggers_retransmission() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    session.publish(vec![payload("ev", b"a"), payload("ev", b"b"), payload("ev", b"c")])?;

    // Client only saw the first event.
    let retransmit = session.handle_publish_ack(&PublishResponse::ok(1, 1))?.expect("tail expected");
    assert_eq!(1, retransmit.previous_index);
    assert_eq!(3, retransmit.event_index);
    assert_eq!(2, retransmit.events.len());

    // Fully acknowledged: nothing left to send.
    assert!(session.handle_publish_ack(&PublishResponse::ok(2, 3))?.is_none());
    Ok(())
}

#[test]
fn test_manager_register_allocates_dense_session_ids() -> anyhow::Result<()> {
    let mut manager = SessionManager::new();
    let mut sm = MemStateMachine::new();

    for expect in 1..=3u64 {
        let request = Request::Register(RegisterRequest::new(expect, "client", 0)?);
        let responses = manager.handle_request(&request, &mut sm);
        match &responses[0] {
            Response::Register(r) => {
                assert_eq!(Status::Ok, r.status);
                assert_eq!(expect, r.session);
            }
            other => panic!("expected a register response, got {}", other),
        }
    }
    Ok(())
}

#[test]
fn test_manager_distinguishes_unknown_from_expired() -> anyhow::Result<()> {
    let mut manager = SessionManager::new();
    let mut sm = MemStateMachine::new();

    let register = Request::Register(RegisterRequest::new(1, "client", 0)?);
    manager.handle_request(&register, &mut sm);

    // Never-registered id.
    let request = Request::KeepAlive(KeepAliveRequest::new(2, 99, 0, 0)?);
    let responses = manager.handle_request(&request, &mut sm);
    assert_eq!(Some(&ErrorKind::SessionUnknown), responses[0].error());

    // Registered, then expired by the keep-alive timer.
    manager.expire_session(1);
    let request = Request::KeepAlive(KeepAliveRequest::new(3, 1, 0, 0)?);
    let responses = manager.handle_request(&request, &mut sm);
    assert_eq!(Some(&ErrorKind::SessionExpired), responses[0].error());
    Ok(())
}

#[test]
fn test_manager_rejects_operations_when_not_leader() -> anyhow::Result<()> {
    let mut manager = SessionManager::new();
    let mut sm = MemStateMachine::new();
    manager.handle_request(&Request::Register(RegisterRequest::new(1, "client", 0)?), &mut sm);

    let command =
        Request::Command(crate::message::CommandRequest::new(2, 1, 1, payload("set", b"v"))?);

    manager.set_routing(false, Some("n2:7000".to_string()), vec!["n2:7000".to_string()]);
    let responses = manager.handle_request(&command, &mut sm);
    assert_eq!(Some(&ErrorKind::NotLeader), responses[0].error());

    manager.set_routing(false, None, vec![]);
    let responses = manager.handle_request(&command, &mut sm);
    assert_eq!(Some(&ErrorKind::NoLeader), responses[0].error());

    // Back in charge: the identical resend applies normally.
    manager.set_routing(true, None, vec![]);
    let responses = manager.handle_request(&command, &mut sm);
    assert_eq!(Status::Ok, responses[0].status());
    assert_eq!(1, sm.applied.len());
    Ok(())
}

#[test]
fn test_manager_close_then_unknown() -> anyhow::Result<()> {
    let mut manager = SessionManager::new();
    let mut sm = MemStateMachine::new();
    manager.handle_request(&Request::Register(RegisterRequest::new(1, "client", 0)?), &mut sm);

    let close = Request::Close(crate::message::CloseRequest::new(2, 1)?);
    let responses = manager.handle_request(&close, &mut sm);
    assert_eq!(Status::Ok, responses[0].status());

    let responses = manager.handle_request(&close, &mut sm);
    assert_eq!(Some(&ErrorKind::SessionUnknown), responses[0].error());
    Ok(())
}

#[test]
fn test_queries_share_the_sequencing_path() -> anyhow::Result<()> {
    let mut session = ServerSession::new(5, 64);
    let mut sm = MemStateMachine::new();

    session.handle_operation(OperationKind::Command, 1, 1, &payload("set", b"v"), &mut sm);
    let query = session.handle_operation(OperationKind::Query, 2, 2, &payload("get", b"k"), &mut sm);
    assert_eq!(Status::Ok, query[0].1.status);
    assert_eq!(OperationKind::Query, query[0].0);
    assert_eq!(1, sm.queried.len());

    // Duplicate queries replay the cache like commands.
    let replay = session.handle_operation(OperationKind::Query, 2, 2, &payload("get", b"k"), &mut sm);
    assert_eq!(query, replay);
    assert_eq!(1, sm.queried.len());
    Ok(())
}
