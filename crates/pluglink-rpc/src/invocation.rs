//! Local service dispatch.

use async_trait::async_trait;
use pluglink_codec::{ResponseError, RpcValue};

/// Error code used when a method name has no handler.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// A locally-exposed RPC target.
///
/// `invoke` handles requests; its `Err` travels back to the caller as a
/// structured response error. `notify` handles fire-and-forget calls and
/// has no channel to report failure, so implementations log instead.
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn invoke(
        &self,
        method: &str,
        args: Vec<RpcValue>,
    ) -> std::result::Result<RpcValue, ResponseError>;

    fn notify(&self, method: &str, args: Vec<RpcValue>) {
        let _ = args;
        tracing::debug!(method, "unhandled notification");
    }

    /// Called once when the owning protocol is disposed.
    fn dispose(&self) {}
}

impl std::fmt::Debug for dyn RpcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RpcService")
    }
}

/// The standard rejection for an unrecognized method.
pub fn method_not_found(method: &str) -> ResponseError {
    ResponseError::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
}
