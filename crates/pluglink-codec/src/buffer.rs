use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

const INITIAL_CAPACITY: usize = 256;

/// Append-only builder for one outgoing message payload.
///
/// All integers are little-endian; byte slices and strings are
/// length-prefixed with a u32.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: BytesMut,
}

impl WriteBuffer {
    /// Create an empty write buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append a length-prefixed byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_u32_le(bytes.len() as u32);
        self.buf.put_slice(bytes);
        self
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes())
    }

    /// Append bytes without a length prefix. Used for trailing payloads
    /// whose extent is the rest of the message.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the message and take the accumulated bytes.
    pub fn commit(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over one complete inbound message payload.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: Bytes,
}

impl ReadBuffer {
    /// Wrap a complete message payload.
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Underflow {
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read a length-prefixed byte slice.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let len = self.read_u32()? as usize;
        self.ensure(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Take every byte not yet consumed.
    pub fn read_to_end(&mut self) -> Bytes {
        let len = self.buf.remaining();
        self.buf.copy_to_bytes(len)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut w = WriteBuffer::new();
        w.write_u8(0x7f).write_u32(0xDEAD_BEEF);

        let mut r = ReadBuffer::new(w.commit());
        assert_eq!(r.read_u8().unwrap(), 0x7f);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn bytes_and_string_roundtrip() {
        let mut w = WriteBuffer::new();
        w.write_bytes(&[0, 1, 2, 255]).write_str("héllo");

        let mut r = ReadBuffer::new(w.commit());
        assert_eq!(r.read_bytes().unwrap().as_ref(), &[0, 1, 2, 255]);
        assert_eq!(r.read_str().unwrap(), "héllo");
    }

    #[test]
    fn empty_payloads() {
        let mut w = WriteBuffer::new();
        w.write_bytes(&[]).write_str("");

        let mut r = ReadBuffer::new(w.commit());
        assert!(r.read_bytes().unwrap().is_empty());
        assert_eq!(r.read_str().unwrap(), "");
    }

    #[test]
    fn underflow_is_reported() {
        let mut r = ReadBuffer::new(Bytes::from_static(&[1, 2]));
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            CodecError::Underflow {
                needed: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn truncated_length_prefix_is_underflow() {
        let mut w = WriteBuffer::new();
        w.write_u32(16); // claims 16 payload bytes, none follow

        let mut r = ReadBuffer::new(w.commit());
        assert!(matches!(
            r.read_bytes().unwrap_err(),
            CodecError::Underflow { .. }
        ));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut w = WriteBuffer::new();
        w.write_bytes(&[0xff, 0xfe]);

        let mut r = ReadBuffer::new(w.commit());
        assert!(matches!(
            r.read_str().unwrap_err(),
            CodecError::InvalidUtf8(_)
        ));
    }
}
