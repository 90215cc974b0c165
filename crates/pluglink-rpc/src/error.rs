use pluglink_codec::{CodecError, RemoteError, ResponseError};
use pluglink_mux::MuxError;

/// Errors surfaced to RPC callers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The connection closed before a reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// A message or value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The remote handler failed with a general error.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// The remote handler rejected the request with a structured error.
    #[error("response error {}: {}", .0.code, .0.message)]
    Response(ResponseError),

    /// The message header could not be interpreted.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A multiplexer-level failure other than a clean close.
    #[error("transport error: {0}")]
    Transport(MuxError),
}

impl From<MuxError> for RpcError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::ConnectionClosed => RpcError::ConnectionClosed,
            MuxError::Codec(err) => RpcError::Codec(err),
            other => RpcError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
