//! Byte-stream reassembly for stream-oriented transports.
//!
//! A raw pipe or socket delivers arbitrary chunks; chunk boundaries never
//! align with message boundaries. Each message on the stream is
//! `[u32 length][length bytes]`; the assembler buffers partial reads and
//! emits whole message payloads. The loop is iterative on purpose: a chunk
//! holding many small messages must not recurse per message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MuxError, Result};
use crate::frame::DEFAULT_MAX_MESSAGE;

const LENGTH_PREFIX: usize = 4;
const INITIAL_CAPACITY: usize = 8 * 1024;

/// The `[u32 length]` prefix a transport writes ahead of a message body.
pub fn encode_message_start(len: usize) -> [u8; LENGTH_PREFIX] {
    (len as u32).to_le_bytes()
}

/// Turns arbitrary transport chunks into whole message payloads.
///
/// A length prefix exceeding the configured maximum is rejected before any
/// body bytes accumulate; the stream is desynchronized at that point and
/// must be torn down.
#[derive(Debug)]
pub struct ChunkAssembler {
    buf: BytesMut,
    max_message_size: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE)
    }

    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_message_size,
        }
    }

    /// Feed one transport chunk; returns every message completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buf.put_slice(chunk);

        let mut messages = Vec::new();
        loop {
            if self.buf.len() < LENGTH_PREFIX {
                break;
            }
            let len = (&self.buf[..LENGTH_PREFIX]).get_u32_le() as usize;
            if len > self.max_message_size {
                return Err(MuxError::MessageTooLarge {
                    size: len,
                    max: self.max_message_size,
                });
            }
            if self.buf.len() < LENGTH_PREFIX + len {
                break;
            }
            self.buf.advance(LENGTH_PREFIX);
            messages.push(self.buf.split_to(len).freeze());
        }
        Ok(messages)
    }

    /// Bytes buffered while waiting for the rest of a message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}
