use std::collections::HashSet;

use pretty_assertions::assert_eq;

use crate::message::CommandRequest;
use crate::message::PublishRequest;
use crate::message::QueryRequest;
use crate::message::Request;
use crate::testing::payload;

#[test]
fn test_command_request_valid_build() -> anyhow::Result<()> {
    let r = CommandRequest::new(1, 5, 1, payload("set", b"x=1"))?;
    assert_eq!(1, r.id);
    assert_eq!(5, r.session);
    assert_eq!(1, r.sequence);
    assert_eq!("set", r.operation.tag);
    Ok(())
}

#[test]
fn test_command_request_rejects_zero_session_and_sequence() {
    assert!(CommandRequest::new(1, 0, 1, payload("set", b"")).is_err());
    assert!(CommandRequest::new(1, 5, 0, payload("set", b"")).is_err());
    assert!(QueryRequest::new(1, 0, 1, payload("get", b"")).is_err());
    assert!(QueryRequest::new(1, 5, 0, payload("get", b"")).is_err());
}

#[test]
fn test_structural_equality_over_session_sequence_operation() -> anyhow::Result<()> {
    let a = CommandRequest::new(1, 5, 3, payload("set", b"x=1"))?;
    let b = CommandRequest::new(1, 5, 3, payload("set", b"x=1"))?;
    let c = CommandRequest::new(1, 5, 4, payload("set", b"x=1"))?;

    assert_eq!(a, b);
    assert_ne!(a, c);
    Ok(())
}

#[test]
fn test_variant_tag_is_part_of_identity() -> anyhow::Result<()> {
    // Same fields, different operation kind: not equal.
    let command = Request::Command(CommandRequest::new(1, 5, 3, payload("op", b"v"))?);
    let query = Request::Query(QueryRequest::new(1, 5, 3, payload("op", b"v"))?);
    assert_ne!(command, query);
    Ok(())
}

#[test]
fn test_request_hashing_is_structural() -> anyhow::Result<()> {
    let mut set = HashSet::new();
    set.insert(Request::Command(CommandRequest::new(1, 5, 3, payload("set", b"x"))?));
    set.insert(Request::Command(CommandRequest::new(1, 5, 3, payload("set", b"x"))?));
    set.insert(Request::Command(CommandRequest::new(1, 5, 4, payload("set", b"x"))?));
    assert_eq!(2, set.len());
    Ok(())
}

#[test]
fn test_request_accessors() -> anyhow::Result<()> {
    let r = Request::Command(CommandRequest::new(7, 5, 3, payload("set", b"x"))?);
    assert_eq!(7, r.id());
    assert_eq!(Some(5), r.session());
    assert_eq!(Some(3), r.sequence());

    let c = Request::Connect(crate::message::ConnectRequest::new(9, "client-1")?);
    assert_eq!(9, c.id());
    assert_eq!(None, c.session());
    assert_eq!(None, c.sequence());
    Ok(())
}

#[test]
fn test_publish_request_validation() -> anyhow::Result<()> {
    // Continuity: event_index must exceed previous_index, and the batch
    // must not be empty.
    assert!(PublishRequest::new(1, 5, 3, 4, vec![payload("ev", b"a")]).is_ok());
    assert!(PublishRequest::new(1, 5, 3, 3, vec![payload("ev", b"a")]).is_err());
    assert!(PublishRequest::new(1, 5, 3, 4, vec![]).is_err());
    assert!(PublishRequest::new(1, 0, 3, 4, vec![payload("ev", b"a")]).is_err());
    Ok(())
}

#[test]
fn test_empty_payload_tag_rejected() {
    assert!(crate::message::OperationPayload::new("", vec![1]).is_err());
}
