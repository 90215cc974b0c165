//! Channel multiplexer with per-tick write batching.
//!
//! Many named sub-channels share one physical [`Channel`]. Every write
//! committed on any sub-channel lands on a single pending-batch queue; a
//! flush task wakes on the first queued message and drains everything
//! queued before it got to run, committing exactly one physical write per
//! wakeup. The receive side splits each physical batch and routes the
//! contained frames to their sub-channels in packed order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use crate::batch::{decode_batch, encode_batch};
use crate::channel::Channel;
use crate::error::{MuxError, Result};
use crate::frame::{decode_frame, encode_frame, Frame, FrameKind, MuxConfig};

/// Write half of a sub-channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SubChannelWriter {
    id: Arc<str>,
    outbox: mpsc::UnboundedSender<Bytes>,
    disposed: Arc<AtomicBool>,
    max_message_size: usize,
}

impl SubChannelWriter {
    /// The sub-channel id this writer commits to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Commit one logical message. It joins the current pending batch and
    /// reaches the peer with the next flush.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(MuxError::ConnectionClosed);
        }
        if payload.len() > self.max_message_size {
            return Err(MuxError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        self.outbox
            .send(encode_frame(FrameKind::Data, &self.id, &payload))
            .map_err(|_| MuxError::ConnectionClosed)
    }

    /// Tell the peer this sub-channel is closed.
    pub fn close(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outbox.send(encode_frame(FrameKind::Close, &self.id, &[]));
    }
}

/// A logical duplex carved out of the physical channel.
#[derive(Debug)]
pub struct SubChannel {
    writer: SubChannelWriter,
    inbox: mpsc::UnboundedReceiver<Bytes>,
}

impl SubChannel {
    pub fn id(&self) -> &str {
        self.writer.id()
    }

    /// Clone the write half.
    pub fn writer(&self) -> SubChannelWriter {
        self.writer.clone()
    }

    /// Commit one logical message on this sub-channel.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        self.writer.send(payload)
    }

    /// Receive the next logical message. `None` once the sub-channel or
    /// the physical channel is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbox.recv().await
    }

    /// Split into independent write and read halves.
    pub fn split(self) -> (SubChannelWriter, mpsc::UnboundedReceiver<Bytes>) {
        (self.writer, self.inbox)
    }
}

struct ChannelEntry {
    inbox_tx: mpsc::UnboundedSender<Bytes>,
    /// The endpoint-local handle, held here until claimed by `open`,
    /// `take_open_channel`, or an event subscriber.
    parked: Option<SubChannel>,
}

struct MuxState {
    outbox: mpsc::UnboundedSender<Bytes>,
    entries: Mutex<HashMap<String, ChannelEntry>>,
    pending_opens: Mutex<HashMap<String, oneshot::Sender<Result<SubChannel>>>>,
    open_listeners: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    disposed: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    config: MuxConfig,
}

/// Multiplexes named sub-channels over one physical channel.
#[derive(Clone)]
pub struct ChannelMultiplexer {
    state: Arc<MuxState>,
}

impl ChannelMultiplexer {
    /// Take ownership of a physical channel with default configuration.
    pub fn new(channel: Channel) -> Self {
        Self::with_config(channel, MuxConfig::default())
    }

    /// Take ownership of a physical channel with explicit configuration.
    pub fn with_config(channel: Channel, config: MuxConfig) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (phys_tx, phys_rx) = channel.into_parts();

        let state = Arc::new(MuxState {
            outbox: outbox_tx,
            entries: Mutex::new(HashMap::new()),
            pending_opens: Mutex::new(HashMap::new()),
            open_listeners: Mutex::new(Vec::new()),
            disposed: Arc::new(AtomicBool::new(false)),
            shutdown: shutdown_tx,
            config,
        });

        tokio::spawn(flush_loop(
            outbox_rx,
            phys_tx,
            shutdown_rx.clone(),
            Arc::clone(&state.disposed),
        ));
        tokio::spawn(read_loop(phys_rx, Arc::clone(&state), shutdown_rx));

        Self { state }
    }

    /// Request a sub-channel from the peer and wait for its acknowledgment.
    pub async fn open(&self, id: &str) -> Result<SubChannel> {
        if self.is_disposed() {
            return Err(MuxError::ConnectionClosed);
        }
        if let Some(sub) = self.take_open_channel(id) {
            return Ok(sub);
        }
        if self.is_open(id) {
            return Err(MuxError::ChannelInUse(id.to_string()));
        }

        let waiter = {
            let mut pending = lock(&self.state.pending_opens);
            if pending.contains_key(id) {
                return Err(MuxError::OpenPending(id.to_string()));
            }
            let (tx, rx) = oneshot::channel();
            pending.insert(id.to_string(), tx);
            rx
        };

        self.state
            .outbox
            .send(encode_frame(FrameKind::Open, id, &[]))
            .map_err(|_| MuxError::ConnectionClosed)?;

        match waiter.await {
            Ok(result) => result,
            Err(_) => Err(MuxError::ConnectionClosed),
        }
    }

    /// Claim a sub-channel the peer already opened towards us. Transfers
    /// ownership; a second call for the same id returns `None`.
    pub fn take_open_channel(&self, id: &str) -> Option<SubChannel> {
        lock(&self.state.entries)
            .get_mut(id)
            .and_then(|entry| entry.parked.take())
    }

    /// Whether a sub-channel with this id exists on this endpoint.
    pub fn is_open(&self, id: &str) -> bool {
        lock(&self.state.entries).contains_key(id)
    }

    /// Subscribe to passively-opened sub-channels. Each event carries the
    /// sub-channel id; the channel itself is claimed via
    /// [`ChannelMultiplexer::take_open_channel`].
    pub fn channel_open_events(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state.open_listeners).push(tx);
        rx
    }

    /// Drop the pending batch, close every sub-channel and the physical
    /// channel. Idempotent; any later write fails with a connection-closed
    /// error.
    pub fn dispose(&self) {
        shutdown_state(&self.state);
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Registry mutexes are only held for map operations; a poisoned lock
    // means a panic mid-operation and there is nothing useful to recover.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn shutdown_state(state: &MuxState) {
    if state.disposed.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = state.shutdown.send(true);
    lock(&state.entries).clear();
    let waiters: Vec<_> = lock(&state.pending_opens).drain().collect();
    for (_, waiter) in waiters {
        let _ = waiter.send(Err(MuxError::ConnectionClosed));
    }
    lock(&state.open_listeners).clear();
    tracing::debug!("multiplexer disposed");
}

/// Create the endpoint-local state for a sub-channel if it does not exist.
fn ensure_entry(state: &Arc<MuxState>, id: &str) {
    let mut entries = lock(&state.entries);
    if entries.contains_key(id) {
        return;
    }
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let writer = SubChannelWriter {
        id: Arc::from(id),
        outbox: state.outbox.clone(),
        disposed: Arc::clone(&state.disposed),
        max_message_size: state.config.max_message_size,
    };
    entries.insert(
        id.to_string(),
        ChannelEntry {
            inbox_tx,
            parked: Some(SubChannel {
                writer,
                inbox: inbox_rx,
            }),
        },
    );
}

fn handle_frame(state: &Arc<MuxState>, frame: Frame) {
    match frame.kind {
        FrameKind::Open => {
            tracing::debug!(channel = %frame.channel, "peer opened sub-channel");
            ensure_entry(state, &frame.channel);
            let _ = state
                .outbox
                .send(encode_frame(FrameKind::AckOpen, &frame.channel, &[]));
            lock(&state.open_listeners)
                .retain(|listener| listener.send(frame.channel.clone()).is_ok());
        }
        FrameKind::AckOpen => {
            ensure_entry(state, &frame.channel);
            if let Some(waiter) = lock(&state.pending_opens).remove(&frame.channel) {
                let claimed = lock(&state.entries)
                    .get_mut(&frame.channel)
                    .and_then(|entry| entry.parked.take());
                let result = match claimed {
                    Some(sub) => Ok(sub),
                    None => Err(MuxError::ChannelInUse(frame.channel.clone())),
                };
                let _ = waiter.send(result);
            }
        }
        FrameKind::Close => {
            tracing::debug!(channel = %frame.channel, "peer closed sub-channel");
            lock(&state.entries).remove(&frame.channel);
        }
        FrameKind::Data => {
            let delivered = match lock(&state.entries).get(&frame.channel) {
                Some(entry) => entry.inbox_tx.send(frame.payload).is_ok(),
                None => false,
            };
            if !delivered {
                tracing::warn!(channel = %frame.channel, "dropping data for unknown sub-channel");
            }
        }
    }
}

/// Drains the pending batch into one physical write per wakeup.
async fn flush_loop(
    mut outbox: mpsc::UnboundedReceiver<Bytes>,
    phys: Option<mpsc::UnboundedSender<Bytes>>,
    mut shutdown: watch::Receiver<bool>,
    disposed: Arc<AtomicBool>,
) {
    let Some(phys) = phys else { return };
    loop {
        let first = tokio::select! {
            _ = shutdown.changed() => break,
            message = outbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // Everything committed before this task got to run joins the same
        // physical frame, in commit order.
        let mut batch = vec![first];
        while let Ok(message) = outbox.try_recv() {
            batch.push(message);
        }

        if disposed.load(Ordering::SeqCst) {
            break;
        }
        if phys.send(encode_batch(&batch)).is_err() {
            break;
        }
        tracing::trace!(messages = batch.len(), "flushed batch");
    }
    // Dropping the physical sender closes the channel towards the peer.
}

async fn read_loop(
    mut phys: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<MuxState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let batch = tokio::select! {
            _ = shutdown.changed() => break,
            message = phys.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let messages = match decode_batch(batch, state.config.max_message_size) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::error!(error = %err, "abandoning undecodable batch");
                continue;
            }
        };
        for message in messages {
            match decode_frame(message) {
                Ok(frame) => handle_frame(&state, frame),
                Err(err) => tracing::error!(error = %err, "abandoning undecodable frame"),
            }
        }
    }
    // Transport gone: every sub-channel observes connection-closed.
    shutdown_state(&state);
}
