//! Protocol facade tying proxies, local services and the multiplexer
//! together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pluglink_codec::{ValueDecoder, ValueEncoder};
use pluglink_mux::{Channel, ChannelMultiplexer, MuxConfig, SubChannel};

use crate::connection::RpcConnection;
use crate::error::{Result, RpcError};
use crate::invocation::RpcService;
use crate::proxy::RpcProxy;

struct ProtocolInner {
    mux: ChannelMultiplexer,
    encoder: Arc<ValueEncoder>,
    decoder: Arc<ValueDecoder>,
    proxies: Mutex<HashMap<String, RpcProxy>>,
    locals: Mutex<HashMap<String, Arc<dyn RpcService>>>,
    /// Sub-channels the peer opened before a local service was bound.
    pending_channels: Mutex<HashMap<String, SubChannel>>,
    /// Passive connections accepted from the peer, closed on dispose.
    connections: Mutex<Vec<RpcConnection>>,
    disposed: AtomicBool,
}

/// One endpoint of the plugin protocol.
///
/// Symmetric: either side can expose local services with
/// [`RpcProtocol::set`] and reach the peer's services through
/// [`RpcProtocol::proxy`].
#[derive(Clone)]
pub struct RpcProtocol {
    inner: Arc<ProtocolInner>,
}

impl RpcProtocol {
    /// Build an endpoint over a physical channel with the default codec
    /// rules and configuration.
    pub fn new(channel: Channel) -> Self {
        Self::with_config(channel, MuxConfig::default())
    }

    pub fn with_config(channel: Channel, config: MuxConfig) -> Self {
        let mux = ChannelMultiplexer::with_config(channel, config);
        let inner = Arc::new(ProtocolInner {
            encoder: Arc::new(ValueEncoder::new()),
            decoder: Arc::new(ValueDecoder::new()),
            proxies: Mutex::new(HashMap::new()),
            locals: Mutex::new(HashMap::new()),
            pending_channels: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            mux,
        });

        let mut events = inner.mux.channel_open_events();
        tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                while let Some(id) = events.recv().await {
                    accept_channel(&inner, &id);
                }
            }
        });

        Self { inner }
    }

    /// Get (or create) the proxy for a service on the peer. The
    /// sub-channel opens on the proxy's first call, not here. Fails with
    /// a connection-closed error once the endpoint is disposed.
    pub fn get_proxy(&self, id: &str) -> Result<RpcProxy> {
        if self.is_disposed() {
            return Err(RpcError::ConnectionClosed);
        }
        let mut proxies = lock(&self.inner.proxies);
        Ok(proxies
            .entry(id.to_string())
            .or_insert_with(|| {
                RpcProxy::new(
                    id,
                    self.inner.mux.clone(),
                    Arc::clone(&self.inner.encoder),
                    Arc::clone(&self.inner.decoder),
                )
            })
            .clone())
    }

    /// Expose a local service under an id. The first binding wins: a
    /// second call for the same id changes nothing and returns the
    /// already-bound service. Fails with a connection-closed error once
    /// the endpoint is disposed.
    pub fn set(
        &self,
        id: &str,
        service: Arc<dyn RpcService>,
    ) -> Result<Arc<dyn RpcService>> {
        if self.is_disposed() {
            return Err(RpcError::ConnectionClosed);
        }
        {
            let mut locals = lock(&self.inner.locals);
            if let Some(existing) = locals.get(id) {
                tracing::warn!(id, "service already bound, keeping the existing one");
                return Ok(Arc::clone(existing));
            }
            locals.insert(id.to_string(), Arc::clone(&service));
        }
        // The peer may have opened the channel before we had a service.
        if let Some(channel) = lock(&self.inner.pending_channels).remove(id) {
            bind_connection(&self.inner, channel, Arc::clone(&service));
        }
        Ok(service)
    }

    /// Whether a local service is bound under this id.
    pub fn has_local(&self, id: &str) -> bool {
        lock(&self.inner.locals).contains_key(id)
    }

    /// Tear the endpoint down: dispose local services, close every
    /// connection and the multiplexer. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("disposing protocol endpoint");
        for (_, service) in lock(&self.inner.locals).drain() {
            service.dispose();
        }
        for connection in lock(&self.inner.connections).drain(..) {
            connection.close();
        }
        for (_, proxy) in lock(&self.inner.proxies).drain() {
            proxy.close();
        }
        lock(&self.inner.pending_channels).clear();
        self.inner.mux.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn accept_channel(inner: &Arc<ProtocolInner>, id: &str) {
    let Some(channel) = inner.mux.take_open_channel(id) else {
        return;
    };
    let service = lock(&inner.locals).get(id).cloned();
    match service {
        Some(service) => bind_connection(inner, channel, service),
        None => {
            tracing::debug!(id, "peer opened channel before a service was bound");
            lock(&inner.pending_channels).insert(id.to_string(), channel);
        }
    }
}

fn bind_connection(inner: &Arc<ProtocolInner>, channel: SubChannel, service: Arc<dyn RpcService>) {
    let connection = RpcConnection::new(
        channel,
        Arc::clone(&inner.encoder),
        Arc::clone(&inner.decoder),
        Some(service),
    );
    lock(&inner.connections).push(connection);
}
