/// Errors that can occur while encoding or decoding typed values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A read ran past the end of the payload.
    #[error("buffer underflow (needed {needed} bytes, {available} available)")]
    Underflow { needed: usize, available: usize },

    /// A string payload is not valid UTF-8.
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The tag byte matches no registered decoder rule.
    ///
    /// This is a protocol desynchronization fault; the frame must be
    /// abandoned rather than decoded misaligned.
    #[error("unknown value tag 0x{0:02x}")]
    UnknownTag(u8),

    /// No registered encoder rule accepts the value.
    #[error("no encoder rule accepts value of kind `{0}`")]
    NoEncoderRule(&'static str),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload structure does not match what the tag promises.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
