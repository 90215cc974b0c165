//! Batch codec for the queuing layer.
//!
//! One physical write carries every logical message committed within the
//! same scheduler turn: a u32 message count, then each message
//! length-prefixed. The receive side splits the batch back into
//! independent messages, in packed order.

use bytes::Bytes;
use pluglink_codec::{ReadBuffer, WriteBuffer};

use crate::error::{MuxError, Result};

/// Serialize a batch of logical messages into one physical message.
pub fn encode_batch(messages: &[Bytes]) -> Bytes {
    let mut buf = WriteBuffer::new();
    buf.write_u32(messages.len() as u32);
    for message in messages {
        buf.write_bytes(message);
    }
    buf.commit()
}

/// Split one physical message back into its logical messages.
pub fn decode_batch(batch: Bytes, max_message_size: usize) -> Result<Vec<Bytes>> {
    let mut buf = ReadBuffer::new(batch);
    let count = buf.read_u32()? as usize;
    let mut messages = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let message = buf.read_bytes()?;
        if message.len() > max_message_size {
            return Err(MuxError::MessageTooLarge {
                size: message.len(),
                max: max_message_size,
            });
        }
        messages.push(message);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DEFAULT_MAX_MESSAGE;

    #[test]
    fn batch_roundtrip_preserves_order() {
        let messages = vec![
            Bytes::from_static(b"first"),
            Bytes::from_static(b""),
            Bytes::from_static(b"third"),
        ];
        let wire = encode_batch(&messages);
        let decoded = decode_batch(wire, DEFAULT_MAX_MESSAGE).unwrap();
        assert_eq!(decoded, messages);
    }

    #[test]
    fn empty_batch_roundtrip() {
        let decoded = decode_batch(encode_batch(&[]), DEFAULT_MAX_MESSAGE).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn truncated_batch_rejected() {
        let wire = encode_batch(&[Bytes::from_static(b"whole")]);
        let truncated = wire.slice(0..wire.len() - 2);
        assert!(decode_batch(truncated, DEFAULT_MAX_MESSAGE).is_err());
    }

    #[test]
    fn oversized_message_rejected() {
        let wire = encode_batch(&[Bytes::from(vec![0u8; 64])]);
        assert!(matches!(
            decode_batch(wire, 16).unwrap_err(),
            MuxError::MessageTooLarge { size: 64, max: 16 }
        ));
    }
}
