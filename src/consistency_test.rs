use pretty_assertions::assert_eq;

use crate::consistency::Admission;
use crate::consistency::ConsistencyTracker;
use crate::message::OperationResponse;
use crate::testing::payload;

fn response(index: u64, event_index: u64) -> OperationResponse {
    OperationResponse::ok(1, index, event_index, Some(payload("res", b"v")))
}

#[test]
fn test_index_high_water_advances() {
    let mut tracker = ConsistencyTracker::new();
    assert!(matches!(tracker.admit_command(response(100, 0)), Admission::Deliver(_)));
    assert_eq!(100, tracker.response_index());

    assert!(matches!(tracker.admit_command(response(120, 0)), Admission::Deliver(_)));
    assert_eq!(120, tracker.response_index());
}

#[test]
fn test_equal_index_is_not_a_regression() {
    // Non-decreasing, not strictly increasing.
    let mut tracker = ConsistencyTracker::new();
    assert!(matches!(tracker.admit_command(response(100, 0)), Admission::Deliver(_)));
    assert!(matches!(tracker.admit_command(response(100, 0)), Admission::Deliver(_)));
}

#[test]
fn test_regression_is_rejected() {
    // A later response claiming an earlier index comes from a stale server.
    let mut tracker = ConsistencyTracker::new();
    assert!(matches!(tracker.admit_command(response(100, 0)), Admission::Deliver(_)));

    match tracker.admit_command(response(90, 0)) {
        Admission::Regression { index, high_water } => {
            assert_eq!(90, index);
            assert_eq!(100, high_water);
        }
        other => panic!("expected a regression, got {:?}", other),
    }
    // The high-water mark is untouched by the rejected response.
    assert_eq!(100, tracker.response_index());
}

#[test]
fn test_response_is_held_until_events_catch_up() {
    let mut tracker = ConsistencyTracker::new();

    // The response saw event 2 server-side; the client has delivered none.
    assert_eq!(Admission::Held, tracker.admit_command(response(50, 2)));
    assert_eq!(1, tracker.held_len());
    assert_eq!(0, tracker.response_index());

    // Event 1 alone is not enough.
    assert!(tracker.deliver_events(1).is_empty());
    assert_eq!(1, tracker.held_len());

    // Event 2 releases the response; only then does the index advance.
    let released = tracker.deliver_events(2);
    assert_eq!(vec![response(50, 2)], released);
    assert_eq!(0, tracker.held_len());
    assert_eq!(50, tracker.response_index());
    assert_eq!(2, tracker.event_index());
}

#[test]
fn test_release_preserves_arrival_order() {
    let mut tracker = ConsistencyTracker::new();
    assert_eq!(Admission::Held, tracker.admit_command(response(50, 1)));
    assert_eq!(Admission::Held, tracker.admit_command(response(51, 2)));

    let released = tracker.deliver_events(2);
    assert_eq!(vec![response(50, 1), response(51, 2)], released);
    assert_eq!(51, tracker.response_index());
}

#[test]
fn test_held_response_that_regressed_is_dropped_on_release() {
    let mut tracker = ConsistencyTracker::new();
    assert_eq!(Admission::Held, tracker.admit_command(response(50, 1)));

    // A newer response advances the high-water while the first is held.
    assert!(matches!(tracker.admit_command(response(60, 0)), Admission::Deliver(_)));

    let released = tracker.deliver_events(1);
    assert!(released.is_empty());
    assert_eq!(60, tracker.response_index());
}

#[test]
fn test_stale_event_delivery_is_a_no_op() {
    let mut tracker = ConsistencyTracker::new();
    assert!(tracker.deliver_events(3).is_empty());
    assert_eq!(3, tracker.event_index());
    assert!(tracker.deliver_events(2).is_empty());
    assert_eq!(3, tracker.event_index());
}
