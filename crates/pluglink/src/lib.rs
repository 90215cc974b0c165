//! Typed point-to-point RPC between a host and its plugin processes.
//!
//! pluglink carries method calls, notifications and typed values over a
//! single message channel shared by any number of logical sub-channels.
//!
//! # Crate Structure
//!
//! - [`codec`] — Typed value encoding with ordered codec rules and the
//!   transferable composite types (URIs, ranges, binary blobs)
//! - [`mux`] — Channel multiplexing with per-tick write batching
//! - [`rpc`] — Proxies, local service dispatch and the protocol facade
//!   (behind the `rpc` feature)

/// Re-export codec types.
pub mod codec {
    pub use pluglink_codec::*;
}

/// Re-export multiplexing types.
pub mod mux {
    pub use pluglink_mux::*;
}

/// Re-export rpc types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use pluglink_rpc::*;
}

#[cfg(feature = "rpc")]
pub use pluglink_rpc::{RpcProtocol, RpcProxy, RpcService};

pub use pluglink_codec::{RpcValue, ValueDecoder, ValueEncoder};
pub use pluglink_mux::{Channel, ChannelMultiplexer};
