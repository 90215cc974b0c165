/// Errors that can occur in channel multiplexing.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The endpoint or its underlying channel is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame carries an unknown kind byte.
    #[error("unknown frame kind 0x{0:02x}")]
    UnknownFrameKind(u8),

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A sub-channel open is already in flight for this id.
    #[error("sub-channel `{0}` already has an open in flight")]
    OpenPending(String),

    /// The sub-channel exists but its handle is already claimed.
    #[error("sub-channel `{0}` is already claimed on this endpoint")]
    ChannelInUse(String),

    /// Frame or batch payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] pluglink_codec::CodecError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
