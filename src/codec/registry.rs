use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::InvalidArgument;
use crate::error::MalformedFrame;
use crate::message::OperationPayload;

type DecodeFn = Box<dyn Fn(&[u8]) -> Result<Box<dyn Any>, MalformedFrame> + Send + Sync>;

/// Maps stable type tags to encode/decode functions for the opaque
/// command/query/result payloads carried inside protocol messages.
///
/// Payload types are registered once, at startup, by both ends of the
/// connection; decoding resolves the tag against the registry instead of
/// relying on any runtime type discovery. A payload whose tag was never
/// registered fails to decode with [`MalformedFrame`].
#[derive(Default)]
pub struct PayloadRegistry {
    by_tag: HashMap<String, DecodeFn>,
    by_type: HashMap<TypeId, String>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `tag`. Registering a tag or a type twice is an
    /// error: tags are a fixed, agreed-upon vocabulary.
    pub fn register<T>(&mut self, tag: &str) -> Result<(), InvalidArgument>
    where T: Serialize + DeserializeOwned + 'static {
        if tag.is_empty() {
            return Err(InvalidArgument::new("payload tag must not be empty"));
        }
        if self.by_tag.contains_key(tag) {
            return Err(InvalidArgument::new(format!("payload tag {:?} already registered", tag)));
        }
        if self.by_type.contains_key(&TypeId::of::<T>()) {
            return Err(InvalidArgument::new(format!(
                "type {} already registered",
                std::any::type_name::<T>()
            )));
        }
        let owned = tag.to_string();
        self.by_tag.insert(
            owned.clone(),
            Box::new(move |bytes| {
                let value: T = bincode::deserialize(bytes)
                    .map_err(|e| MalformedFrame::new(format!("payload {:?}: {}", owned, e)))?;
                Ok(Box::new(value))
            }),
        );
        self.by_type.insert(TypeId::of::<T>(), tag.to_string());
        Ok(())
    }

    /// Encode a registered value into a tagged payload.
    pub fn encode<T>(&self, value: &T) -> Result<OperationPayload, MalformedFrame>
    where T: Serialize + 'static {
        let tag = self.by_type.get(&TypeId::of::<T>()).ok_or_else(|| {
            MalformedFrame::new(format!("type {} is not registered", std::any::type_name::<T>()))
        })?;
        let data = bincode::serialize(value)
            .map_err(|e| MalformedFrame::new(format!("payload {:?}: {}", tag, e)))?;
        // Registered tags are non-empty, so this cannot fail.
        OperationPayload::new(tag, data).map_err(|e| MalformedFrame::new(e.reason))
    }

    /// Decode a payload to its original registered type, erased.
    ///
    /// The returned box downcasts to exactly the type registered under the
    /// payload's tag; this is the type-preserving round trip.
    pub fn decode(&self, payload: &OperationPayload) -> Result<Box<dyn Any>, MalformedFrame> {
        let decode = self
            .by_tag
            .get(&payload.tag)
            .ok_or_else(|| MalformedFrame::new(format!("unknown payload tag {:?}", payload.tag)))?;
        decode(&payload.data)
    }

    /// Decode a payload as a known `T`, checking the tag actually names `T`.
    pub fn decode_as<T>(&self, payload: &OperationPayload) -> Result<T, MalformedFrame>
    where T: DeserializeOwned + 'static {
        match self.by_type.get(&TypeId::of::<T>()) {
            Some(tag) if *tag == payload.tag => {}
            Some(tag) => {
                return Err(MalformedFrame::new(format!(
                    "payload tag {:?} does not match {:?} registered for {}",
                    payload.tag,
                    tag,
                    std::any::type_name::<T>()
                )));
            }
            None => {
                return Err(MalformedFrame::new(format!(
                    "type {} is not registered",
                    std::any::type_name::<T>()
                )));
            }
        }
        bincode::deserialize(&payload.data)
            .map_err(|e| MalformedFrame::new(format!("payload {:?}: {}", payload.tag, e)))
    }

    /// Whether `tag` has a registered payload type.
    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }
}
