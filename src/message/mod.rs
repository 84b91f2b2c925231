//! Protocol messages exchanged between a client session and the cluster.
//!
//! Every message is an immutable value constructed through a validating
//! constructor or builder. Equality is structural: the variant tag plus the
//! field tuple, which is what lets the retry policy recognize a resend as
//! the identical request.

mod request;
mod response;

#[cfg(test)]
mod request_test;
#[cfg(test)]
mod response_test;

pub use request::CloseRequest;
pub use request::CommandRequest;
pub use request::ConnectRequest;
pub use request::KeepAliveRequest;
pub use request::PublishRequest;
pub use request::QueryRequest;
pub use request::RegisterRequest;
pub use request::Request;
pub use response::CloseResponse;
pub use response::ConnectResponse;
pub use response::KeepAliveResponse;
pub use response::OperationResponse;
pub use response::OperationResponseBuilder;
pub use response::PublishResponse;
pub use response::RegisterResponse;
pub use response::Response;
pub use response::Status;

use std::fmt;

use crate::error::InvalidArgument;

/// A serialized command, query, result or event payload.
///
/// The protocol layer treats operation payloads as opaque: a stable type tag
/// naming the registered payload type, plus the bytes produced by that
/// type's registered encoder. The [`PayloadRegistry`] resolves the tag back
/// to the original type at decode time.
///
/// [`PayloadRegistry`]: crate::codec::PayloadRegistry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct OperationPayload {
    /// Registered type tag; never empty.
    pub tag: String,

    /// Encoded payload bytes.
    pub data: Vec<u8>,
}

impl OperationPayload {
    pub fn new(tag: impl ToString, data: Vec<u8>) -> Result<Self, InvalidArgument> {
        let payload = Self {
            tag: tag.to_string(),
            data,
        };
        payload.check()?;
        Ok(payload)
    }

    pub(crate) fn check(&self) -> Result<(), InvalidArgument> {
        if self.tag.is_empty() {
            return Err(InvalidArgument::new("operation payload tag must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for OperationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}B)", self.tag, self.data.len())
    }
}
