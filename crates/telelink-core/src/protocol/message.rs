//! Domain messages handed to the link by its owner.
//!
//! Messages are immutable once built; the encoder derives an independent
//! `WireEnvelope` from them and never mutates the source.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{LinkError, Result};

/// Device-to-cloud telemetry message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    payload: Bytes,
    properties: BTreeMap<String, String>,
    message_id: Option<String>,
    correlation_id: Option<String>,
    content_type: Option<String>,
    content_encoding: Option<String>,
}

impl Telemetry {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Add an application property (copied verbatim onto the wire).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_content_type(mut self, v: impl Into<String>) -> Self {
        self.content_type = Some(v.into());
        self
    }

    pub fn with_content_encoding(mut self, v: impl Into<String>) -> Self {
        self.content_encoding = Some(v.into());
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }
}

/// Response to a direct method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodResponse {
    /// Correlation id of the method request being answered.
    pub request_id: String,
    /// Application status code (HTTP-like).
    pub status: i32,
    pub payload: Bytes,
}

impl MethodResponse {
    pub fn new(request_id: impl Into<String>, status: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            payload: payload.into(),
        }
    }
}

/// Request for the full twin document.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinGet {
    pub correlation_id: String,
}

/// Reported-properties patch.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinPatch {
    pub correlation_id: String,
    /// Reported-properties collection (serialized by the encoder).
    pub reported: serde_json::Value,
}

impl TwinPatch {
    /// Build a patch from any serializable property collection.
    pub fn from_serializable<T: Serialize>(correlation_id: impl Into<String>, reported: &T) -> Result<Self> {
        let reported = serde_json::to_value(reported)
            .map_err(|e| LinkError::Encoding(format!("reported properties: {e}")))?;
        Ok(Self {
            correlation_id: correlation_id.into(),
            reported,
        })
    }
}

/// Everything the link can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(Telemetry),
    MethodResponse(MethodResponse),
    TwinGet(TwinGet),
    TwinPatch(TwinPatch),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Telemetry(_) => MessageKind::Telemetry,
            Message::MethodResponse(_) => MessageKind::MethodResponse,
            Message::TwinGet(_) => MessageKind::TwinGet,
            Message::TwinPatch(_) => MessageKind::TwinPatch,
        }
    }
}

impl From<Telemetry> for Message {
    fn from(m: Telemetry) -> Self {
        Message::Telemetry(m)
    }
}

impl From<MethodResponse> for Message {
    fn from(m: MethodResponse) -> Self {
        Message::MethodResponse(m)
    }
}

impl From<TwinGet> for Message {
    fn from(m: TwinGet) -> Self {
        Message::TwinGet(m)
    }
}

impl From<TwinPatch> for Message {
    fn from(m: TwinPatch) -> Self {
        Message::TwinPatch(m)
    }
}

/// Send kind, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Telemetry,
    TelemetryBatch,
    MethodResponse,
    TwinGet,
    TwinPatch,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Telemetry => "telemetry",
            MessageKind::TelemetryBatch => "telemetry_batch",
            MessageKind::MethodResponse => "method_response",
            MessageKind::TwinGet => "twin_get",
            MessageKind::TwinPatch => "twin_patch",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use super::*;

    #[test]
    fn telemetry_builder_keeps_fields() {
        let t = Telemetry::new("x")
            .with_property("a", "1")
            .with_message_id("m-1")
            .with_content_type("application/json");
        assert_eq!(t.payload().as_ref(), b"x");
        assert_eq!(t.properties().get("a").map(String::as_str), Some("1"));
        assert_eq!(t.message_id(), Some("m-1"));
        assert_eq!(t.content_type(), Some("application/json"));
        assert!(t.correlation_id().is_none());
    }

    #[test]
    fn twin_patch_from_map() {
        let mut reported = HashMap::new();
        reported.insert("fw", "1.2");
        let p = TwinPatch::from_serializable("abc-123", &reported).unwrap();
        assert_eq!(p.reported["fw"], "1.2");
    }

    #[test]
    fn twin_patch_rejects_non_string_keys() {
        let mut reported = HashMap::new();
        reported.insert((1, 2), "v");
        let err = TwinPatch::from_serializable("abc", &reported).unwrap_err();
        assert_eq!(err.kind().as_str(), "ENCODING");
    }
}
