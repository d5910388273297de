//! Wire envelope and the message encoder.
//!
//! An envelope is a list of body sections plus metadata. Single-format
//! envelopes carry at most one section; batch-format envelopes carry two or
//! more, each the frame encoding of one telemetry envelope.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{LinkError, Result};
use crate::protocol::message::{Message, MethodResponse, Telemetry, TwinGet, TwinPatch};

/// Annotation key carrying the twin operation.
pub const ANNOTATION_OPERATION: &str = "operation";
/// Annotation key carrying the twin resource path.
pub const ANNOTATION_RESOURCE: &str = "resource";
/// Annotation key carrying the twin version (always null on send).
pub const ANNOTATION_VERSION: &str = "version";

pub const OPERATION_GET: &str = "GET";
pub const OPERATION_PATCH: &str = "PATCH";
pub const RESOURCE_REPORTED: &str = "/properties/reported";

/// Application property carrying a method response status.
pub const METHOD_STATUS_PROPERTY: &str = "IoThub-status";

/// Message-format code for a single message.
pub const SINGLE_MESSAGE_FORMAT: u32 = 0;
/// Message-format code for a batch of messages.
pub const BATCH_MESSAGE_FORMAT: u32 = 0x8001_3700;

/// Annotation / application-property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    String(String),
    Long(i64),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

/// Ordered key/value map (deterministic encoding).
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Single vs batch marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Single,
    Batch,
}

impl MessageFormat {
    pub fn code(self) -> u32 {
        match self {
            MessageFormat::Single => SINGLE_MESSAGE_FORMAT,
            MessageFormat::Batch => BATCH_MESSAGE_FORMAT,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            SINGLE_MESSAGE_FORMAT => Some(MessageFormat::Single),
            BATCH_MESSAGE_FORMAT => Some(MessageFormat::Batch),
            _ => None,
        }
    }
}

/// Encoded form of a message, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEnvelope {
    format: MessageFormat,
    sections: Vec<Bytes>,
    pub correlation_id: Option<String>,
    pub message_id: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub annotations: FieldMap,
    pub properties: FieldMap,
}

impl WireEnvelope {
    /// Single-format envelope with no body.
    pub fn empty() -> Self {
        Self {
            format: MessageFormat::Single,
            sections: Vec::new(),
            correlation_id: None,
            message_id: None,
            content_type: None,
            content_encoding: None,
            annotations: FieldMap::new(),
            properties: FieldMap::new(),
        }
    }

    /// Single-format envelope with one body section.
    pub fn single(body: impl Into<Bytes>) -> Self {
        let mut env = Self::empty();
        env.sections.push(body.into());
        env
    }

    /// Build from decoded parts, enforcing the format invariant.
    pub(crate) fn from_parts(format: MessageFormat, sections: Vec<Bytes>) -> Result<Self> {
        match format {
            MessageFormat::Single if sections.len() > 1 => {
                return Err(LinkError::Malformed(format!(
                    "single-format envelope with {} sections",
                    sections.len()
                )));
            }
            MessageFormat::Batch if sections.len() < 2 => {
                return Err(LinkError::Malformed(format!(
                    "batch-format envelope with {} sections",
                    sections.len()
                )));
            }
            _ => {}
        }
        let mut env = Self::empty();
        env.format = format;
        env.sections = sections;
        Ok(env)
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    pub fn is_batch(&self) -> bool {
        self.format == MessageFormat::Batch
    }

    pub fn sections(&self) -> &[Bytes] {
        &self.sections
    }

    /// Body of a single-format envelope (empty when it has no section).
    pub fn body(&self) -> Bytes {
        match (self.format, self.sections.first()) {
            (MessageFormat::Single, Some(b)) => b.clone(),
            _ => Bytes::new(),
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&FieldValue> {
        self.annotations.get(key)
    }

    pub fn property(&self, key: &str) -> Option<&FieldValue> {
        self.properties.get(key)
    }
}

/// Encode a domain message into its wire envelope.
pub fn encode(message: &Message) -> Result<WireEnvelope> {
    match message {
        Message::Telemetry(m) => Ok(encode_telemetry(m)),
        Message::MethodResponse(m) => encode_method_response(m),
        Message::TwinGet(m) => encode_twin_get(m),
        Message::TwinPatch(m) => encode_twin_patch(m),
    }
}

/// Telemetry never fails to encode.
pub fn encode_telemetry(m: &Telemetry) -> WireEnvelope {
    let mut env = WireEnvelope::single(m.payload().clone());
    env.message_id = m.message_id().map(str::to_owned);
    env.correlation_id = m.correlation_id().map(str::to_owned);
    env.content_type = m.content_type().map(str::to_owned);
    env.content_encoding = m.content_encoding().map(str::to_owned);
    env.properties = m
        .properties()
        .iter()
        .map(|(k, v)| (k.clone(), FieldValue::String(v.clone())))
        .collect();
    env
}

pub fn encode_method_response(m: &MethodResponse) -> Result<WireEnvelope> {
    require_id("method response request id", &m.request_id)?;
    let mut env = WireEnvelope::single(m.payload.clone());
    env.correlation_id = Some(m.request_id.clone());
    env.properties
        .insert(METHOD_STATUS_PROPERTY.into(), FieldValue::Long(i64::from(m.status)));
    Ok(env)
}

pub fn encode_twin_get(m: &TwinGet) -> Result<WireEnvelope> {
    require_id("twin get correlation id", &m.correlation_id)?;
    let mut env = WireEnvelope::empty();
    env.correlation_id = Some(m.correlation_id.clone());
    env.annotations
        .insert(ANNOTATION_OPERATION.into(), OPERATION_GET.into());
    Ok(env)
}

pub fn encode_twin_patch(m: &TwinPatch) -> Result<WireEnvelope> {
    require_id("twin patch correlation id", &m.correlation_id)?;
    let body = serde_json::to_vec(&m.reported)
        .map_err(|e| LinkError::Encoding(format!("reported properties: {e}")))?;

    let mut env = WireEnvelope::single(body);
    env.correlation_id = Some(m.correlation_id.clone());
    env.annotations
        .insert(ANNOTATION_OPERATION.into(), OPERATION_PATCH.into());
    env.annotations
        .insert(ANNOTATION_RESOURCE.into(), RESOURCE_REPORTED.into());
    env.annotations
        .insert(ANNOTATION_VERSION.into(), FieldValue::Null);
    Ok(env)
}

fn require_id(what: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(LinkError::Encoding(format!("{what} must not be empty")));
    }
    Ok(())
}
