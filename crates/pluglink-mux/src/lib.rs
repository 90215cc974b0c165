//! Logical channel multiplexing over a single message channel.
//!
//! A [`ChannelMultiplexer`] carves any number of named [`SubChannel`]s out
//! of one physical [`Channel`]. Writes from all sub-channels are coalesced
//! into one physical frame per scheduler turn, and incoming frames are
//! demultiplexed back to their sub-channels in order. [`ChunkAssembler`]
//! reassembles length-prefixed messages from an arbitrarily-chunked byte
//! stream for transports that do not preserve message boundaries.

pub mod batch;
pub mod channel;
pub mod error;
pub mod frame;
pub mod mux;
pub mod stream;

pub use batch::{decode_batch, encode_batch};
pub use channel::Channel;
pub use error::{MuxError, Result};
pub use frame::{decode_frame, encode_frame, Frame, FrameKind, MuxConfig, DEFAULT_MAX_MESSAGE};
pub use mux::{ChannelMultiplexer, SubChannel, SubChannelWriter};
pub use stream::{encode_message_start, ChunkAssembler};
