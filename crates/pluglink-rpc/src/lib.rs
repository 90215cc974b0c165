//! Symmetric request/reply RPC between two endpoints.
//!
//! Built on `pluglink-mux` sub-channels: each remote service gets its own
//! lazily-opened sub-channel carrying request, notification and reply
//! messages encoded with the `pluglink-codec` typed-value rules.
//! [`RpcProtocol`] is the entry point; it hands out [`RpcProxy`] handles
//! for peer services and binds local [`RpcService`] implementations for
//! the peer to call.

pub mod connection;
pub mod error;
pub mod invocation;
pub mod message;
pub mod protocol;
pub mod proxy;

pub use connection::RpcConnection;
pub use error::{Result, RpcError};
pub use invocation::{method_not_found, RpcService, METHOD_NOT_FOUND};
pub use message::RpcMessage;
pub use protocol::RpcProtocol;
pub use proxy::{is_notification, RpcProxy};
