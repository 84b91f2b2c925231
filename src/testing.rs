//! Test doubles for embedders and for this crate's own tests.

use std::collections::BTreeSet;

use anyerror::AnyError;

use crate::message::OperationPayload;
use crate::network::Applied;
use crate::network::StateMachine;

/// An in-memory state machine that echoes operations back as results.
///
/// Commands advance the commit index by one and are recorded in
/// [`applied`](Self::applied); queries are evaluated at the current index
/// and recorded in [`queried`](Self::queried). Operations whose payload tag
/// is in [`reject_tags`](Self::reject_tags) are rejected, exercising the
/// application-error path.
#[derive(Debug, Default)]
pub struct MemStateMachine {
    index: u64,
    event_index: u64,
    /// Commands applied, as `(session, sequence, operation)`.
    pub applied: Vec<(u64, u64, OperationPayload)>,
    /// Queries evaluated, as `(session, sequence, operation)`.
    pub queried: Vec<(u64, u64, OperationPayload)>,
    /// Payload tags the machine rejects.
    pub reject_tags: BTreeSet<String>,
}

impl MemStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the commit index at `index`, so the first command applies at
    /// `index + 1`.
    pub fn starting_at(index: u64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Set the event high-water stamped into subsequent results.
    pub fn set_event_index(&mut self, event_index: u64) {
        self.event_index = event_index;
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

impl StateMachine for MemStateMachine {
    fn apply(
        &mut self,
        session: u64,
        sequence: u64,
        operation: &OperationPayload,
    ) -> Result<Applied, AnyError> {
        if self.reject_tags.contains(&operation.tag) {
            return Err(AnyError::error(format!("tag {:?} rejected", operation.tag)));
        }
        self.index += 1;
        self.applied.push((session, sequence, operation.clone()));
        Ok(Applied {
            index: self.index,
            event_index: self.event_index,
            result: Some(operation.clone()),
        })
    }

    fn query(
        &mut self,
        session: u64,
        sequence: u64,
        operation: &OperationPayload,
    ) -> Result<Applied, AnyError> {
        if self.reject_tags.contains(&operation.tag) {
            return Err(AnyError::error(format!("tag {:?} rejected", operation.tag)));
        }
        self.queried.push((session, sequence, operation.clone()));
        Ok(Applied {
            index: self.index,
            event_index: self.event_index,
            result: Some(operation.clone()),
        })
    }
}

/// Build an opaque payload for tests.
pub fn payload(tag: &str, data: &[u8]) -> OperationPayload {
    OperationPayload::new(tag, data.to_vec()).expect("valid test payload")
}
