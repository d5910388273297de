//! Binary frame codec for `WireEnvelope` (panic-free).
//!
//! Layout (little-endian):
//! ```text
//! u8   version (=1)
//! u32  message format (0 single, 0x80013700 batch)
//! u8   header flags, then each present header as str16
//! u16  annotation count, entries: str16 key, u8 tag, value
//! u16  application-property count, same entry encoding
//! u16  section count, sections: u32 len + bytes
//! ```
//!
//! Parsing rules:
//! - Never index; always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LinkError, Result};
use crate::protocol::envelope::{FieldMap, FieldValue, MessageFormat, WireEnvelope};

pub const FRAME_VERSION: u8 = 1;

pub const FLAG_CORRELATION_ID: u8 = 0x01;
pub const FLAG_MESSAGE_ID: u8 = 0x02;
pub const FLAG_CONTENT_TYPE: u8 = 0x04;
pub const FLAG_CONTENT_ENCODING: u8 = 0x08;
const KNOWN_FLAGS: u8 = FLAG_CORRELATION_ID | FLAG_MESSAGE_ID | FLAG_CONTENT_TYPE | FLAG_CONTENT_ENCODING;

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_LONG: u8 = 2;

/// Encode an envelope into a frame.
///
/// Fails with `Encoding` when a string, map, section list, or section does not
/// fit its length field; nothing is ever truncated.
pub fn encode_frame(env: &WireEnvelope) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64 + env.sections().iter().map(Bytes::len).sum::<usize>());

    buf.put_u8(FRAME_VERSION);
    buf.put_u32_le(env.format().code());

    let headers = [
        (FLAG_CORRELATION_ID, env.correlation_id.as_deref()),
        (FLAG_MESSAGE_ID, env.message_id.as_deref()),
        (FLAG_CONTENT_TYPE, env.content_type.as_deref()),
        (FLAG_CONTENT_ENCODING, env.content_encoding.as_deref()),
    ];
    let flags = headers
        .iter()
        .filter(|(_, v)| v.is_some())
        .fold(0u8, |acc, (f, _)| acc | f);
    buf.put_u8(flags);
    for (_, v) in headers {
        if let Some(s) = v {
            put_str16(&mut buf, s, "header")?;
        }
    }

    put_map(&mut buf, &env.annotations, "annotation")?;
    put_map(&mut buf, &env.properties, "property")?;

    let sections = env.sections();
    buf.put_u16_le(len16(sections.len(), "section count")?);
    for s in sections {
        let len = u32::try_from(s.len())
            .map_err(|_| LinkError::Encoding(format!("section of {} bytes exceeds frame limit", s.len())))?;
        buf.put_u32_le(len);
        buf.put_slice(s);
    }

    Ok(buf.freeze())
}

/// Decode a frame into an envelope.
pub fn decode_frame(mut buf: Bytes) -> Result<WireEnvelope> {
    // Minimum header: version, format, flags
    if buf.remaining() < 6 {
        return Err(LinkError::Malformed("frame too short".into()));
    }

    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(LinkError::UnsupportedVersion(version));
    }

    let code = buf.get_u32_le();
    let format = MessageFormat::from_code(code)
        .ok_or_else(|| LinkError::Malformed(format!("unknown message format {code:#x}")))?;

    let flags = buf.get_u8();
    if flags & !KNOWN_FLAGS != 0 {
        return Err(LinkError::Malformed(format!("unknown header flags {flags:#04x}")));
    }
    let correlation_id = get_opt_str16(&mut buf, flags, FLAG_CORRELATION_ID)?;
    let message_id = get_opt_str16(&mut buf, flags, FLAG_MESSAGE_ID)?;
    let content_type = get_opt_str16(&mut buf, flags, FLAG_CONTENT_TYPE)?;
    let content_encoding = get_opt_str16(&mut buf, flags, FLAG_CONTENT_ENCODING)?;

    let annotations = get_map(&mut buf, "annotation")?;
    let properties = get_map(&mut buf, "property")?;

    let count = get_u16(&mut buf, "section count")?;
    let mut sections = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let len = get_u32(&mut buf, "section length")? as usize;
        if buf.remaining() < len {
            return Err(LinkError::Malformed("section truncated".into()));
        }
        sections.push(buf.copy_to_bytes(len));
    }

    if buf.has_remaining() {
        return Err(LinkError::Malformed(format!(
            "{} trailing bytes after frame",
            buf.remaining()
        )));
    }

    let mut env = WireEnvelope::from_parts(format, sections)?;
    env.correlation_id = correlation_id;
    env.message_id = message_id;
    env.content_type = content_type;
    env.content_encoding = content_encoding;
    env.annotations = annotations;
    env.properties = properties;
    Ok(env)
}

fn len16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| LinkError::Encoding(format!("{what} of {len} exceeds frame limit {}", u16::MAX)))
}

fn put_str16(buf: &mut BytesMut, s: &str, what: &str) -> Result<()> {
    buf.put_u16_le(len16(s.len(), what)?);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_map(buf: &mut BytesMut, map: &FieldMap, what: &str) -> Result<()> {
    buf.put_u16_le(len16(map.len(), what)?);
    for (k, v) in map {
        put_str16(buf, k, what)?;
        match v {
            FieldValue::Null => buf.put_u8(TAG_NULL),
            FieldValue::String(s) => {
                buf.put_u8(TAG_STRING);
                put_str16(buf, s, what)?;
            }
            FieldValue::Long(n) => {
                buf.put_u8(TAG_LONG);
                buf.put_i64_le(*n);
            }
        }
    }
    Ok(())
}

fn get_u16(buf: &mut Bytes, what: &str) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(LinkError::Malformed(format!("{what} truncated")));
    }
    Ok(buf.get_u16_le())
}

fn get_u32(buf: &mut Bytes, what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(LinkError::Malformed(format!("{what} truncated")));
    }
    Ok(buf.get_u32_le())
}

fn get_str16(buf: &mut Bytes, what: &str) -> Result<String> {
    let len = usize::from(get_u16(buf, what)?);
    if buf.remaining() < len {
        return Err(LinkError::Malformed(format!("{what} truncated")));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| LinkError::Malformed(format!("{what} is not utf-8: {e}")))
}

fn get_opt_str16(buf: &mut Bytes, flags: u8, flag: u8) -> Result<Option<String>> {
    if flags & flag == 0 {
        return Ok(None);
    }
    get_str16(buf, "header").map(Some)
}

fn get_map(buf: &mut Bytes, what: &str) -> Result<FieldMap> {
    let count = get_u16(buf, what)?;
    let mut map = FieldMap::new();
    for _ in 0..count {
        let key = get_str16(buf, what)?;
        if buf.remaining() < 1 {
            return Err(LinkError::Malformed(format!("{what} value truncated")));
        }
        let value = match buf.get_u8() {
            TAG_NULL => FieldValue::Null,
            TAG_STRING => FieldValue::String(get_str16(buf, what)?),
            TAG_LONG => {
                if buf.remaining() < 8 {
                    return Err(LinkError::Malformed(format!("{what} value truncated")));
                }
                FieldValue::Long(buf.get_i64_le())
            }
            other => {
                return Err(LinkError::Malformed(format!("unknown {what} value tag {other}")));
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}
