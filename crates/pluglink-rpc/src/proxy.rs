//! Remote service proxies.
//!
//! A proxy stands in for a service living on the other endpoint. The
//! underlying sub-channel is opened lazily on first use, so creating a
//! proxy costs nothing until a call is actually made. Method names
//! starting with `notify` or `on` are fire-and-forget; everything else is
//! a request that waits for a reply.

use std::sync::Arc;

use pluglink_codec::{RpcValue, ValueDecoder, ValueEncoder};
use pluglink_mux::ChannelMultiplexer;
use tokio::sync::OnceCell;

use crate::connection::RpcConnection;
use crate::error::Result;

/// Whether a method name denotes a fire-and-forget call.
pub fn is_notification(method: &str) -> bool {
    method.starts_with("notify") || method.starts_with("on")
}

struct ProxyInner {
    id: String,
    mux: ChannelMultiplexer,
    encoder: Arc<ValueEncoder>,
    decoder: Arc<ValueDecoder>,
    connection: OnceCell<RpcConnection>,
}

/// Handle to a service on the peer endpoint. Cheap to clone; all clones
/// share one lazily-opened connection.
#[derive(Clone)]
pub struct RpcProxy {
    inner: Arc<ProxyInner>,
}

impl std::fmt::Debug for RpcProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcProxy")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl RpcProxy {
    pub(crate) fn new(
        id: impl Into<String>,
        mux: ChannelMultiplexer,
        encoder: Arc<ValueEncoder>,
        decoder: Arc<ValueDecoder>,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                id: id.into(),
                mux,
                encoder,
                decoder,
                connection: OnceCell::new(),
            }),
        }
    }

    /// The proxied service id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Call a method, classifying it by name: notification names return
    /// immediately with an undefined value, everything else awaits the
    /// peer's reply.
    pub async fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue> {
        if is_notification(method) {
            self.notify(method, args).await?;
            Ok(RpcValue::Undefined)
        } else {
            self.request(method, args).await
        }
    }

    /// Issue a request and await the reply.
    pub async fn request(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue> {
        let connection = self.connection().await?;
        connection.send_request(method, args).await
    }

    /// Issue a fire-and-forget call.
    pub async fn notify(&self, method: &str, args: Vec<RpcValue>) -> Result<()> {
        let connection = self.connection().await?;
        connection.send_notification(method, args)
    }

    /// Close the underlying connection if it was ever opened.
    pub(crate) fn close(&self) {
        if let Some(connection) = self.inner.connection.get() {
            connection.close();
        }
    }

    async fn connection(&self) -> Result<&RpcConnection> {
        self.inner
            .connection
            .get_or_try_init(|| async {
                tracing::debug!(id = %self.inner.id, "opening proxy sub-channel");
                let channel = self.inner.mux.open(&self.inner.id).await?;
                Ok(RpcConnection::new(
                    channel,
                    Arc::clone(&self.inner.encoder),
                    Arc::clone(&self.inner.decoder),
                    None,
                ))
            })
            .await
    }
}
