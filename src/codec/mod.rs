//! Wire codec: length-prefixed, type-tagged frames.
//!
//! A frame is `[u32 length (BE)][u8 message tag][bincode body]`, where
//! `length` covers the tag and body. The tag space is closed; decoding an
//! unknown tag, a truncated body, trailing bytes or a body violating the
//! message construction invariants yields [`MalformedFrame`], which callers
//! must treat as a corrupt channel.
//!
//! The round-trip law holds for every valid message: decoding an encoded
//! message yields a structurally equal value, including the opaque
//! operation/result payloads.

mod registry;


pub use registry::PayloadRegistry;

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MalformedFrame;
use crate::message::Request;
use crate::message::Response;

const CONNECT_REQUEST: u8 = 0x01;
const REGISTER_REQUEST: u8 = 0x02;
const KEEP_ALIVE_REQUEST: u8 = 0x03;
const COMMAND_REQUEST: u8 = 0x04;
const QUERY_REQUEST: u8 = 0x05;
const CLOSE_REQUEST: u8 = 0x06;
const PUBLISH_REQUEST: u8 = 0x07;

const CONNECT_RESPONSE: u8 = 0x11;
const REGISTER_RESPONSE: u8 = 0x12;
const KEEP_ALIVE_RESPONSE: u8 = 0x13;
const COMMAND_RESPONSE: u8 = 0x14;
const QUERY_RESPONSE: u8 = 0x15;
const CLOSE_RESPONSE: u8 = 0x16;
const PUBLISH_RESPONSE: u8 = 0x17;

/// A decoded frame: either direction of the protocol.
///
/// Both directions share one tag space because a client connection carries
/// responses and server-pushed `Publish` requests interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

/// Encode a request into a complete wire frame.
pub fn encode_request(request: &Request) -> Result<Bytes, MalformedFrame> {
    match request {
        Request::Connect(r) => encode_frame(CONNECT_REQUEST, r),
        Request::Register(r) => encode_frame(REGISTER_REQUEST, r),
        Request::KeepAlive(r) => encode_frame(KEEP_ALIVE_REQUEST, r),
        Request::Command(r) => encode_frame(COMMAND_REQUEST, r),
        Request::Query(r) => encode_frame(QUERY_REQUEST, r),
        Request::Close(r) => encode_frame(CLOSE_REQUEST, r),
        Request::Publish(r) => encode_frame(PUBLISH_REQUEST, r),
    }
}

/// Encode a response into a complete wire frame.
pub fn encode_response(response: &Response) -> Result<Bytes, MalformedFrame> {
    match response {
        Response::Connect(r) => encode_frame(CONNECT_RESPONSE, r),
        Response::Register(r) => encode_frame(REGISTER_RESPONSE, r),
        Response::KeepAlive(r) => encode_frame(KEEP_ALIVE_RESPONSE, r),
        Response::Command(r) => encode_frame(COMMAND_RESPONSE, r),
        Response::Query(r) => encode_frame(QUERY_RESPONSE, r),
        Response::Close(r) => encode_frame(CLOSE_RESPONSE, r),
        Response::Publish(r) => encode_frame(PUBLISH_RESPONSE, r),
    }
}

/// Decode one complete frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, MalformedFrame> {
    let mut buf = bytes;
    if buf.remaining() < 5 {
        return Err(MalformedFrame::new(format!(
            "frame too short: {} bytes, need at least 5",
            buf.remaining()
        )));
    }
    let length = buf.get_u32() as usize;
    if length != buf.remaining() {
        return Err(MalformedFrame::new(format!(
            "length prefix {} does not match {} remaining bytes",
            length,
            buf.remaining()
        )));
    }
    let tag = buf.get_u8();
    let frame = match tag {
        CONNECT_REQUEST => Frame::Request(Request::Connect(decode_body(tag, buf)?)),
        REGISTER_REQUEST => Frame::Request(Request::Register(decode_body(tag, buf)?)),
        KEEP_ALIVE_REQUEST => Frame::Request(Request::KeepAlive(decode_body(tag, buf)?)),
        COMMAND_REQUEST => Frame::Request(Request::Command(decode_body(tag, buf)?)),
        QUERY_REQUEST => Frame::Request(Request::Query(decode_body(tag, buf)?)),
        CLOSE_REQUEST => Frame::Request(Request::Close(decode_body(tag, buf)?)),
        PUBLISH_REQUEST => Frame::Request(Request::Publish(decode_body(tag, buf)?)),
        CONNECT_RESPONSE => Frame::Response(Response::Connect(decode_body(tag, buf)?)),
        REGISTER_RESPONSE => Frame::Response(Response::Register(decode_body(tag, buf)?)),
        KEEP_ALIVE_RESPONSE => Frame::Response(Response::KeepAlive(decode_body(tag, buf)?)),
        COMMAND_RESPONSE => Frame::Response(Response::Command(decode_body(tag, buf)?)),
        QUERY_RESPONSE => Frame::Response(Response::Query(decode_body(tag, buf)?)),
        CLOSE_RESPONSE => Frame::Response(Response::Close(decode_body(tag, buf)?)),
        PUBLISH_RESPONSE => Frame::Response(Response::Publish(decode_body(tag, buf)?)),
        unknown => {
            return Err(MalformedFrame::new(format!("unknown message tag 0x{:02x}", unknown)));
        }
    };
    // Serde restores the fields verbatim; the construction invariants still
    // have to hold for the decoded value.
    let check = match &frame {
        Frame::Request(request) => request.validate(),
        Frame::Response(response) => response.validate(),
    };
    check.map_err(|e| {
        MalformedFrame::new(format!("tag 0x{:02x} violates a message invariant: {}", tag, e.reason))
    })?;
    Ok(frame)
}

/// Decode a frame that must be a request.
pub fn decode_request(bytes: &[u8]) -> Result<Request, MalformedFrame> {
    match decode_frame(bytes)? {
        Frame::Request(request) => Ok(request),
        Frame::Response(response) => Err(MalformedFrame::new(format!(
            "expected a request frame, decoded response {}",
            response
        ))),
    }
}

/// Decode a frame that must be a response.
pub fn decode_response(bytes: &[u8]) -> Result<Response, MalformedFrame> {
    match decode_frame(bytes)? {
        Frame::Response(response) => Ok(response),
        Frame::Request(request) => Err(MalformedFrame::new(format!(
            "expected a response frame, decoded request {}",
            request
        ))),
    }
}

fn encode_frame<T: Serialize>(tag: u8, body: &T) -> Result<Bytes, MalformedFrame> {
    let encoded = bincode::serialize(body)
        .map_err(|e| MalformedFrame::new(format!("encoding tag 0x{:02x}: {}", tag, e)))?;
    let length = frame_length(encoded.len())?;
    let mut buf = BytesMut::with_capacity(4 + 1 + encoded.len());
    buf.put_u32(length);
    buf.put_u8(tag);
    buf.put_slice(&encoded);
    Ok(buf.freeze())
}

/// The `u32` length prefix for a body of `body_len` bytes: the tag byte plus
/// the body. A body too large to represent cannot be framed.
fn frame_length(body_len: usize) -> Result<u32, MalformedFrame> {
    match body_len.checked_add(1) {
        Some(length) if length <= u32::MAX as usize => Ok(length as u32),
        _ => Err(MalformedFrame::new(format!(
            "body of {} bytes exceeds the frame length limit",
            body_len
        ))),
    }
}

fn decode_body<T: Serialize + DeserializeOwned>(tag: u8, body: &[u8]) -> Result<T, MalformedFrame> {
    // bincode tolerates trailing bytes; an exact-length check keeps the
    // frame boundary authoritative.
    let value: T = bincode::deserialize(body)
        .map_err(|e| MalformedFrame::new(format!("decoding tag 0x{:02x}: {}", tag, e)))?;
    let expect = bincode::serialized_size(&value)
        .map_err(|e| MalformedFrame::new(format!("sizing tag 0x{:02x}: {}", tag, e)))? as usize;
    if expect != body.len() {
        return Err(MalformedFrame::new(format!(
            "tag 0x{:02x}: {} trailing bytes after body",
            tag,
            body.len() - expect
        )));
    }
    Ok(value)
}
