//! RPC message framing.
//!
//! Each message on an RPC sub-channel starts with a kind byte, followed by
//! a correlation id for request/reply kinds, a method name for call kinds,
//! and finally typed values from the registered codec rules. Arguments
//! travel as a single typed array value so heterogeneous argument lists
//! share one wire shape.

use std::sync::Arc;

use bytes::Bytes;
use pluglink_codec::{ReadBuffer, RpcValue, ValueDecoder, ValueEncoder, WriteBuffer};

use crate::error::{Result, RpcError};

const KIND_REQUEST: u8 = 1;
const KIND_NOTIFICATION: u8 = 2;
const KIND_REPLY: u8 = 3;
const KIND_REPLY_ERR: u8 = 4;

/// A decoded RPC message.
#[derive(Debug)]
pub enum RpcMessage {
    /// A call that expects exactly one reply, correlated by `id`.
    Request {
        id: u32,
        method: String,
        args: Vec<RpcValue>,
    },
    /// A call with no reply.
    Notification { method: String, args: Vec<RpcValue> },
    /// The successful outcome of a request.
    Reply { id: u32, value: RpcValue },
    /// The failed outcome of a request.
    ReplyErr { id: u32, err: RpcValue },
}

pub fn encode_request(
    encoder: &Arc<ValueEncoder>,
    id: u32,
    method: &str,
    args: Vec<RpcValue>,
) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(KIND_REQUEST).write_u32(id).write_str(method);
    encoder.write_typed_value(&mut buf, &RpcValue::Array(args))?;
    Ok(buf.commit())
}

pub fn encode_notification(
    encoder: &Arc<ValueEncoder>,
    method: &str,
    args: Vec<RpcValue>,
) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(KIND_NOTIFICATION).write_str(method);
    encoder.write_typed_value(&mut buf, &RpcValue::Array(args))?;
    Ok(buf.commit())
}

pub fn encode_reply(encoder: &Arc<ValueEncoder>, id: u32, value: &RpcValue) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(KIND_REPLY).write_u32(id);
    encoder.write_typed_value(&mut buf, value)?;
    Ok(buf.commit())
}

pub fn encode_reply_err(encoder: &Arc<ValueEncoder>, id: u32, err: &RpcValue) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(KIND_REPLY_ERR).write_u32(id);
    encoder.write_typed_value(&mut buf, err)?;
    Ok(buf.commit())
}

pub fn decode_message(decoder: &Arc<ValueDecoder>, message: Bytes) -> Result<RpcMessage> {
    let mut buf = ReadBuffer::new(message);
    let kind = buf.read_u8()?;
    match kind {
        KIND_REQUEST => {
            let id = buf.read_u32()?;
            let method = buf.read_str()?;
            let args = decode_args(decoder, &mut buf)?;
            Ok(RpcMessage::Request { id, method, args })
        }
        KIND_NOTIFICATION => {
            let method = buf.read_str()?;
            let args = decode_args(decoder, &mut buf)?;
            Ok(RpcMessage::Notification { method, args })
        }
        KIND_REPLY => {
            let id = buf.read_u32()?;
            let value = decoder.read_typed_value(&mut buf)?;
            Ok(RpcMessage::Reply { id, value })
        }
        KIND_REPLY_ERR => {
            let id = buf.read_u32()?;
            let err = decoder.read_typed_value(&mut buf)?;
            Ok(RpcMessage::ReplyErr { id, err })
        }
        other => Err(RpcError::MalformedMessage(format!(
            "unknown message kind 0x{other:02x}"
        ))),
    }
}

fn decode_args(decoder: &Arc<ValueDecoder>, buf: &mut ReadBuffer) -> Result<Vec<RpcValue>> {
    match decoder.read_typed_value(buf)? {
        RpcValue::Array(args) => Ok(args),
        other => Err(RpcError::MalformedMessage(format!(
            "expected argument array, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluglink_codec::{PlainValue, ResponseError};

    fn registries() -> (Arc<ValueEncoder>, Arc<ValueDecoder>) {
        (Arc::new(ValueEncoder::new()), Arc::new(ValueDecoder::new()))
    }

    #[test]
    fn request_roundtrip() {
        let (enc, dec) = registries();
        let wire = encode_request(
            &enc,
            7,
            "add",
            vec![RpcValue::json(2i64), RpcValue::json(3i64)],
        )
        .unwrap();
        match decode_message(&dec, wire).unwrap() {
            RpcMessage::Request { id, method, args } => {
                assert_eq!(id, 7);
                assert_eq!(method, "add");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].as_i64(), Some(2));
                assert_eq!(args[1].as_i64(), Some(3));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn notification_roundtrip() {
        let (enc, dec) = registries();
        let wire =
            encode_notification(&enc, "onDidChange", vec![RpcValue::json("payload")]).unwrap();
        match decode_message(&dec, wire).unwrap() {
            RpcMessage::Notification { method, args } => {
                assert_eq!(method, "onDidChange");
                assert_eq!(
                    args[0].as_json(),
                    Some(&PlainValue::String("payload".into()))
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn reply_roundtrip() {
        let (enc, dec) = registries();
        let wire = encode_reply(&enc, 12, &RpcValue::json(5i64)).unwrap();
        match decode_message(&dec, wire).unwrap() {
            RpcMessage::Reply { id, value } => {
                assert_eq!(id, 12);
                assert_eq!(value.as_i64(), Some(5));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn reply_err_carries_structured_error() {
        let (enc, dec) = registries();
        let err = RpcValue::ResponseError(ResponseError::new(7, "busy"));
        let wire = encode_reply_err(&enc, 3, &err).unwrap();
        match decode_message(&dec, wire).unwrap() {
            RpcMessage::ReplyErr {
                id,
                err: RpcValue::ResponseError(err),
            } => {
                assert_eq!(id, 3);
                assert_eq!(err.code, 7);
                assert_eq!(err.message, "busy");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let (_, dec) = registries();
        let err = decode_message(&dec, Bytes::from_static(&[0x99])).unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage(_)));
    }

    #[test]
    fn empty_argument_list_roundtrips() {
        let (enc, dec) = registries();
        let wire = encode_request(&enc, 1, "ping", Vec::new()).unwrap();
        match decode_message(&dec, wire).unwrap() {
            RpcMessage::Request { args, .. } => assert!(args.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
