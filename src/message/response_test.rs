use pretty_assertions::assert_eq;

use crate::error::ErrorKind;
use crate::message::OperationResponse;
use crate::message::RegisterResponse;
use crate::message::Response;
use crate::message::Status;
use crate::testing::payload;

#[test]
fn test_negative_index_rejected_at_build_time() {
    // Rejected before any transmission can happen.
    assert!(OperationResponse::builder(1).with_index(-1).is_err());
    assert!(OperationResponse::builder(1).with_event_index(-1).is_err());
}

#[test]
fn test_zero_index_accepted() -> anyhow::Result<()> {
    let r = OperationResponse::builder(1).with_index(0)?.with_event_index(0)?.build()?;
    assert_eq!(0, r.index);
    assert_eq!(0, r.event_index);
    assert_eq!(Status::Ok, r.status);
    Ok(())
}

#[test]
fn test_status_derived_from_error() -> anyhow::Result<()> {
    let ok = OperationResponse::builder(1)
        .with_index(100)?
        .with_result(Some(payload("res", b"ok")))
        .build()?;
    assert_eq!(Status::Ok, ok.status);
    assert_eq!(None, ok.error);
    assert!(ok.result.is_some());

    let err = OperationResponse::builder(1).with_error(ErrorKind::NotLeader).build()?;
    assert_eq!(Status::Error, err.status);
    assert_eq!(Some(ErrorKind::NotLeader), err.error);
    assert_eq!(None, err.result);
    Ok(())
}

#[test]
fn test_error_response_cannot_carry_result() {
    let build = OperationResponse::builder(1)
        .with_error(ErrorKind::NotLeader)
        .with_result(Some(payload("res", b"x")))
        .build();
    assert!(build.is_err());
}

#[test]
fn test_ok_result_may_be_absent() -> anyhow::Result<()> {
    // OK with no output is a valid response.
    let r = OperationResponse::builder(1).with_index(3)?.build()?;
    assert_eq!(Status::Ok, r.status);
    assert_eq!(None, r.result);
    Ok(())
}

#[test]
fn test_register_response_rejects_zero_session() {
    assert!(RegisterResponse::ok(1, 0, 1000, None, vec![]).is_err());
    assert!(RegisterResponse::ok(1, 1, 1000, None, vec![]).is_ok());
}

#[test]
fn test_response_variant_tag_is_part_of_identity() {
    let body = OperationResponse::ok(1, 100, 0, Some(payload("res", b"v")));
    assert_ne!(Response::Command(body.clone()), Response::Query(body));
}

#[test]
fn test_operation_response_structural_equality() {
    let a = OperationResponse::ok(1, 100, 2, Some(payload("res", b"v")));
    let b = OperationResponse::ok(1, 100, 2, Some(payload("res", b"v")));
    let c = OperationResponse::ok(1, 101, 2, Some(payload("res", b"v")));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_response_accessors() {
    let r = Response::Command(OperationResponse::error(4, ErrorKind::SessionExpired));
    assert_eq!(4, r.id());
    assert_eq!(Status::Error, r.status());
    assert_eq!(Some(&ErrorKind::SessionExpired), r.error());
}
