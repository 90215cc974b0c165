//! Sub-channel frame codec.
//!
//! Every message multiplexed over the physical channel is framed as:
//! a kind byte, the length-prefixed sub-channel id, then the payload
//! (the remainder of the message).

use bytes::Bytes;
use pluglink_codec::{ReadBuffer, WriteBuffer};

use crate::error::{MuxError, Result};

/// Default maximum size of one logical message: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// What a sub-channel frame means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Request to open the named sub-channel.
    Open = 1,
    /// Acknowledge an open request; the sub-channel is usable once seen.
    AckOpen = 2,
    /// The named sub-channel was closed by the peer.
    Close = 3,
    /// Application payload for the named sub-channel.
    Data = 4,
}

impl FrameKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameKind::Open),
            2 => Some(FrameKind::AckOpen),
            3 => Some(FrameKind::Close),
            4 => Some(FrameKind::Data),
            _ => None,
        }
    }
}

/// A decoded sub-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub channel: String,
    pub payload: Bytes,
}

/// Encode a sub-channel frame into one logical message.
pub fn encode_frame(kind: FrameKind, channel: &str, payload: &[u8]) -> Bytes {
    let mut buf = WriteBuffer::new();
    buf.write_u8(kind as u8).write_str(channel).write_raw(payload);
    buf.commit()
}

/// Decode one logical message into a sub-channel frame.
pub fn decode_frame(message: Bytes) -> Result<Frame> {
    let mut buf = ReadBuffer::new(message);
    let kind_byte = buf.read_u8()?;
    let kind = FrameKind::from_u8(kind_byte).ok_or(MuxError::UnknownFrameKind(kind_byte))?;
    let channel = buf.read_str()?;
    let payload = buf.read_to_end();
    Ok(Frame {
        kind,
        channel,
        payload,
    })
}

/// Configuration for the multiplexer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Maximum size of one logical message in bytes.
    pub max_message_size: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_roundtrip() {
        let wire = encode_frame(FrameKind::Data, "svc", b"payload");
        let frame = decode_frame(wire).unwrap();
        assert_eq!(frame.kind, FrameKind::Data);
        assert_eq!(frame.channel, "svc");
        assert_eq!(frame.payload.as_ref(), b"payload");
    }

    #[test]
    fn control_frames_carry_empty_payloads() {
        for kind in [FrameKind::Open, FrameKind::AckOpen, FrameKind::Close] {
            let frame = decode_frame(encode_frame(kind, "a-channel", b"")).unwrap();
            assert_eq!(frame.kind, kind);
            assert_eq!(frame.channel, "a-channel");
            assert!(frame.payload.is_empty());
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut buf = pluglink_codec::WriteBuffer::new();
        buf.write_u8(0x7A).write_str("svc");
        assert!(matches!(
            decode_frame(buf.commit()).unwrap_err(),
            MuxError::UnknownFrameKind(0x7A)
        ));
    }

    #[test]
    fn truncated_frame_rejected() {
        let wire = encode_frame(FrameKind::Data, "svc", b"payload");
        let truncated = wire.slice(0..3);
        assert!(decode_frame(truncated).is_err());
    }

    #[test]
    fn channel_ids_may_be_unicode() {
        let frame = decode_frame(encode_frame(FrameKind::Open, "svc-π", b"")).unwrap();
        assert_eq!(frame.channel, "svc-π");
    }
}
