//! Request/reply plumbing over one sub-channel.
//!
//! Both endpoints are peers: each side can issue requests and each side
//! can expose a local [`RpcService`]. Requests carry a locally-unique u32
//! correlation id; the matching reply completes a oneshot parked in the
//! pending map. When the sub-channel ends, every in-flight request fails
//! with a connection-closed error instead of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use pluglink_codec::{RpcValue, ValueDecoder, ValueEncoder};
use pluglink_mux::{SubChannel, SubChannelWriter};
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};
use crate::invocation::{method_not_found, RpcService};
use crate::message::{
    decode_message, encode_notification, encode_reply, encode_reply_err, encode_request,
    RpcMessage,
};

type PendingMap = HashMap<u32, oneshot::Sender<Result<RpcValue>>>;

struct ConnectionShared {
    /// `None` once the connection is closed; no new requests register.
    pending: Mutex<Option<PendingMap>>,
    next_id: AtomicU32,
}

impl ConnectionShared {
    fn register(&self, id: u32, tx: oneshot::Sender<Result<RpcValue>>) -> Result<()> {
        match lock(&self.pending).as_mut() {
            Some(pending) => {
                pending.insert(id, tx);
                Ok(())
            }
            None => Err(RpcError::ConnectionClosed),
        }
    }

    fn complete(&self, id: u32, result: Result<RpcValue>) {
        let waiter = lock(&self.pending).as_mut().and_then(|p| p.remove(&id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => tracing::warn!(id, "reply for unknown request id"),
        }
    }

    /// Fail every in-flight request and refuse new ones.
    fn drain(&self) {
        let pending = lock(&self.pending).take();
        if let Some(pending) = pending {
            for (_, tx) in pending {
                let _ = tx.send(Err(RpcError::ConnectionClosed));
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One symmetric RPC endpoint bound to a sub-channel.
#[derive(Clone)]
pub struct RpcConnection {
    writer: SubChannelWriter,
    encoder: Arc<ValueEncoder>,
    shared: Arc<ConnectionShared>,
}

impl RpcConnection {
    /// Bind a connection to a sub-channel. `service` handles incoming
    /// requests and notifications; without one, incoming requests are
    /// rejected and notifications are logged.
    pub fn new(
        channel: SubChannel,
        encoder: Arc<ValueEncoder>,
        decoder: Arc<ValueDecoder>,
        service: Option<Arc<dyn RpcService>>,
    ) -> Self {
        let (writer, inbox) = channel.split();
        let shared = Arc::new(ConnectionShared {
            pending: Mutex::new(Some(HashMap::new())),
            next_id: AtomicU32::new(1),
        });

        tokio::spawn(read_loop(
            inbox,
            writer.clone(),
            encoder.clone(),
            decoder,
            Arc::clone(&shared),
            service,
        ));

        Self {
            writer,
            encoder,
            shared,
        }
    }

    /// Issue a request and wait for the peer's reply.
    pub async fn send_request(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.register(id, tx)?;

        let wire = encode_request(&self.encoder, id, method, args)?;
        if let Err(err) = self.writer.send(wire) {
            self.shared.complete(id, Err(err.into()));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Issue a fire-and-forget call.
    pub fn send_notification(&self, method: &str, args: Vec<RpcValue>) -> Result<()> {
        if lock(&self.shared.pending).is_none() {
            return Err(RpcError::ConnectionClosed);
        }
        let wire = encode_notification(&self.encoder, method, args)?;
        self.writer.send(wire)?;
        Ok(())
    }

    /// Close the sub-channel and fail every in-flight request.
    pub fn close(&self) {
        self.shared.drain();
        self.writer.close();
    }
}

async fn read_loop(
    mut inbox: tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>,
    writer: SubChannelWriter,
    encoder: Arc<ValueEncoder>,
    decoder: Arc<ValueDecoder>,
    shared: Arc<ConnectionShared>,
    service: Option<Arc<dyn RpcService>>,
) {
    while let Some(message) = inbox.recv().await {
        let message = match decode_message(&decoder, message) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "abandoning undecodable rpc message");
                continue;
            }
        };
        match message {
            RpcMessage::Request { id, method, args } => {
                handle_request(&writer, &encoder, &service, id, method, args);
            }
            RpcMessage::Notification { method, args } => match &service {
                Some(service) => service.notify(&method, args),
                None => tracing::debug!(method, "notification with no service bound"),
            },
            RpcMessage::Reply { id, value } => shared.complete(id, Ok(value)),
            RpcMessage::ReplyErr { id, err } => shared.complete(id, Err(remote_failure(err))),
        }
    }
    // Sub-channel gone: unblock every caller still waiting.
    shared.drain();
}

fn handle_request(
    writer: &SubChannelWriter,
    encoder: &Arc<ValueEncoder>,
    service: &Option<Arc<dyn RpcService>>,
    id: u32,
    method: String,
    args: Vec<RpcValue>,
) {
    let Some(service) = service.clone() else {
        let err = RpcValue::ResponseError(method_not_found(&method));
        send_reply(writer, encode_reply_err(encoder, id, &err));
        return;
    };
    let writer = writer.clone();
    let encoder = Arc::clone(encoder);
    // Handlers run concurrently; the correlation id pairs each reply with
    // its request regardless of completion order.
    tokio::spawn(async move {
        let wire = match service.invoke(&method, args).await {
            Ok(value) => encode_reply(&encoder, id, &value),
            Err(err) => encode_reply_err(&encoder, id, &RpcValue::ResponseError(err)),
        };
        send_reply(&writer, wire);
    });
}

fn send_reply(writer: &SubChannelWriter, wire: Result<bytes::Bytes>) {
    match wire {
        Ok(wire) => {
            if writer.send(wire).is_err() {
                tracing::debug!("reply dropped, sub-channel closed");
            }
        }
        Err(err) => tracing::error!(error = %err, "failed to encode reply"),
    }
}

fn remote_failure(err: RpcValue) -> RpcError {
    match err {
        RpcValue::ResponseError(err) => RpcError::Response(err),
        RpcValue::Error(err) => RpcError::Remote(err),
        other => RpcError::MalformedMessage(format!(
            "error reply carried a {} value",
            other.kind()
        )),
    }
}
