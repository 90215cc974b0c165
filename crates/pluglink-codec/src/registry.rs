//! Typed codec registry.
//!
//! Encoding scans an ordered rule list and applies the first rule whose
//! predicate accepts the value, writing the rule's tag byte followed by its
//! payload. Decoding reads the tag byte and dispatches to the matching read
//! rule. Registration order is significant and must be identical on both
//! ends of a connection; it is the implicit schema.

use std::collections::HashMap;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{CodecError, Result};
use crate::transfer::{replacer, reviver, PlainValue};
use crate::value::{RemoteError, ResponseError, RpcValue};

/// Wire tags for typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueTag {
    Undefined = 0,
    Error = 1,
    ResponseError = 2,
    ByteArray = 3,
    Buffer = 4,
    ObjectArray = 5,
    Json = 6,
}

impl ValueTag {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ValueTag::Undefined),
            1 => Some(ValueTag::Error),
            2 => Some(ValueTag::ResponseError),
            3 => Some(ValueTag::ByteArray),
            4 => Some(ValueTag::Buffer),
            5 => Some(ValueTag::ObjectArray),
            6 => Some(ValueTag::Json),
            _ => None,
        }
    }
}

/// Predicate deciding whether an encoder rule accepts a value.
pub type Predicate = fn(&RpcValue) -> bool;
/// Payload writer for one rule; receives the encoder for nested values.
pub type WriteFn = fn(&ValueEncoder, &mut WriteBuffer, &RpcValue) -> Result<()>;
/// Payload reader for one tag; receives the decoder for nested values.
pub type ReadFn = fn(&ValueDecoder, &mut ReadBuffer) -> Result<RpcValue>;

struct EncoderRule {
    tag: ValueTag,
    is: Predicate,
    write: WriteFn,
}

/// Ordered encoder rule list.
pub struct ValueEncoder {
    rules: Vec<EncoderRule>,
}

impl ValueEncoder {
    /// An encoder with the standard rule set installed, in the normative
    /// order: undefined, error, response-error, byte-array, buffer,
    /// object-array, then the JSON catch-all.
    pub fn new() -> Self {
        let mut encoder = Self::empty();
        encoder.register_encoder(
            ValueTag::Undefined,
            |v| matches!(v, RpcValue::Undefined),
            |_, _, _| Ok(()),
        );
        encoder.register_encoder(
            ValueTag::Error,
            |v| matches!(v, RpcValue::Error(_)),
            write_error,
        );
        encoder.register_encoder(
            ValueTag::ResponseError,
            |v| matches!(v, RpcValue::ResponseError(_)),
            write_response_error,
        );
        encoder.register_encoder(
            ValueTag::ByteArray,
            |v| matches!(v, RpcValue::ByteArray(_)),
            write_byte_array,
        );
        encoder.register_encoder(
            ValueTag::Buffer,
            |v| matches!(v, RpcValue::Buffer(_)),
            write_buffer,
        );
        encoder.register_encoder(
            ValueTag::ObjectArray,
            |v| matches!(v, RpcValue::Array(_)),
            write_array,
        );
        encoder.register_encoder(ValueTag::Json, |v| matches!(v, RpcValue::Json(_)), write_json);
        encoder
    }

    /// An encoder with no rules. Callers take over the schema entirely.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. Later registrations are consulted after earlier ones.
    pub fn register_encoder(&mut self, tag: ValueTag, is: Predicate, write: WriteFn) {
        self.rules.push(EncoderRule { tag, is, write });
    }

    /// Write the tag and payload of the first rule accepting `value`.
    pub fn write_typed_value(&self, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
        for rule in &self.rules {
            if (rule.is)(value) {
                buf.write_u8(rule.tag as u8);
                return (rule.write)(self, buf, value);
            }
        }
        Err(CodecError::NoEncoderRule(value.kind()))
    }
}

impl Default for ValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag-indexed decoder rule table.
pub struct ValueDecoder {
    rules: HashMap<u8, ReadFn>,
}

impl ValueDecoder {
    /// A decoder matching [`ValueEncoder::new`].
    pub fn new() -> Self {
        let mut decoder = Self::empty();
        decoder.register_decoder(ValueTag::Undefined, |_, _| Ok(RpcValue::Undefined));
        decoder.register_decoder(ValueTag::Error, read_error);
        decoder.register_decoder(ValueTag::ResponseError, read_response_error);
        decoder.register_decoder(ValueTag::ByteArray, read_byte_array);
        decoder.register_decoder(ValueTag::Buffer, read_buffer);
        decoder.register_decoder(ValueTag::ObjectArray, read_array);
        decoder.register_decoder(ValueTag::Json, read_json);
        decoder
    }

    /// A decoder with no rules.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Install the read rule for a tag, replacing any previous one.
    pub fn register_decoder(&mut self, tag: ValueTag, read: ReadFn) {
        self.rules.insert(tag as u8, read);
    }

    /// Read a tag byte and dispatch to its rule.
    pub fn read_typed_value(&self, buf: &mut ReadBuffer) -> Result<RpcValue> {
        let tag = buf.read_u8()?;
        let read = self.rules.get(&tag).ok_or(CodecError::UnknownTag(tag))?;
        read(self, buf)
    }
}

impl Default for ValueDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// Array payloads carry a mode byte: the whole array as one nested JSON
// value when every element is plain JSON, otherwise a count followed by
// independently tagged elements so byte buffers and errors nested in an
// argument list still round-trip exactly.
const ARRAY_MODE_JSON: u8 = 0;
const ARRAY_MODE_MIXED: u8 = 1;

fn expect_kind(value: &RpcValue, kind: &'static str) -> CodecError {
    CodecError::Malformed(format!("expected {kind} payload, got {}", value.kind()))
}

fn write_error(_enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::Error(err) = value else {
        return Err(expect_kind(value, "error"));
    };
    buf.write_str(&serde_json::to_string(err)?);
    Ok(())
}

fn read_error(_dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    let err: RemoteError = serde_json::from_str(&buf.read_str()?)?;
    Ok(RpcValue::Error(err))
}

fn write_response_error(_enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::ResponseError(err) = value else {
        return Err(expect_kind(value, "response-error"));
    };
    buf.write_str(&serde_json::to_string(err)?);
    Ok(())
}

fn read_response_error(_dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    let err: ResponseError = serde_json::from_str(&buf.read_str()?)?;
    Ok(RpcValue::ResponseError(err))
}

fn write_byte_array(_enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::ByteArray(bytes) = value else {
        return Err(expect_kind(value, "byte-array"));
    };
    buf.write_bytes(bytes);
    Ok(())
}

fn read_byte_array(_dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    // A private copy: the decoded view must not alias the frame buffer.
    Ok(RpcValue::ByteArray(buf.read_bytes()?.to_vec()))
}

fn write_buffer(_enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::Buffer(bytes) = value else {
        return Err(expect_kind(value, "buffer"));
    };
    buf.write_bytes(bytes);
    Ok(())
}

fn read_buffer(_dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    Ok(RpcValue::Buffer(buf.read_bytes()?))
}

fn write_array(enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::Array(items) = value else {
        return Err(expect_kind(value, "array"));
    };
    let all_json = items.iter().all(|item| matches!(item, RpcValue::Json(_)));
    if all_json {
        buf.write_u8(ARRAY_MODE_JSON);
        let plain = PlainValue::Array(
            items
                .iter()
                .map(|item| match item {
                    RpcValue::Json(plain) => plain.clone(),
                    _ => unreachable!("all_json checked above"),
                })
                .collect(),
        );
        enc.write_typed_value(buf, &RpcValue::Json(plain))
    } else {
        buf.write_u8(ARRAY_MODE_MIXED);
        buf.write_u32(items.len() as u32);
        for item in items {
            enc.write_typed_value(buf, item)?;
        }
        Ok(())
    }
}

fn read_array(dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    match buf.read_u8()? {
        ARRAY_MODE_JSON => {
            let nested = dec.read_typed_value(buf)?;
            let RpcValue::Json(PlainValue::Array(items)) = nested else {
                return Err(CodecError::Malformed(
                    "json-mode array payload is not a json array".to_string(),
                ));
            };
            Ok(RpcValue::Array(items.into_iter().map(RpcValue::Json).collect()))
        }
        ARRAY_MODE_MIXED => {
            let count = buf.read_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(dec.read_typed_value(buf)?);
            }
            Ok(RpcValue::Array(items))
        }
        mode => Err(CodecError::Malformed(format!(
            "unknown array mode byte {mode}"
        ))),
    }
}

fn write_json(_enc: &ValueEncoder, buf: &mut WriteBuffer, value: &RpcValue) -> Result<()> {
    let RpcValue::Json(plain) = value else {
        return Err(expect_kind(value, "json"));
    };
    let replaced = replacer(plain)?;
    buf.write_str(&serde_json::to_string(&replaced)?);
    Ok(())
}

fn read_json(_dec: &ValueDecoder, buf: &mut ReadBuffer) -> Result<RpcValue> {
    let parsed: serde_json::Value = serde_json::from_str(&buf.read_str()?)?;
    Ok(RpcValue::Json(reviver(&parsed)?))
}
