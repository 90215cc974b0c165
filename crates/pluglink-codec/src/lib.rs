//! Typed value codec for pluglink RPC.
//!
//! Every value crossing a channel is written as a tag byte followed by a
//! tag-specific payload. The tag is chosen by scanning an ordered encoder
//! rule list; the same registration order on both endpoints is the implicit
//! schema. JSON-compatible values route through the object transfer layer
//! so that URIs, ranges and binary blobs survive the round trip.

pub mod buffer;
pub mod error;
pub mod registry;
pub mod transfer;
pub mod value;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use error::{CodecError, Result};
pub use registry::{ValueDecoder, ValueEncoder, ValueTag};
pub use transfer::{replacer, reviver, Blob, ExtUri, PlainValue, Position, Range, Uri};
pub use value::{RemoteError, ResponseError, RpcValue};
