//! The physical channel contract.
//!
//! A [`Channel`] endpoint delivers whole messages in both directions; the
//! protocol core never sees transport specifics. Transports adapt
//! themselves with [`Channel::from_parts`]; tests and in-process setups use
//! the loopback [`Channel::pipe`].

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{MuxError, Result};

/// One endpoint of a message-oriented duplex.
#[derive(Debug)]
pub struct Channel {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Channel {
    /// Build an endpoint from raw transport halves.
    pub fn from_parts(tx: mpsc::UnboundedSender<Bytes>, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { tx: Some(tx), rx }
    }

    /// An in-memory loopback pair: whatever one endpoint sends, the other
    /// receives.
    pub fn pipe() -> (Channel, Channel) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            Channel::from_parts(left_tx, right_rx),
            Channel::from_parts(right_tx, left_rx),
        )
    }

    /// Commit one whole message to the peer.
    pub fn send(&self, message: Bytes) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(message).map_err(|_| MuxError::ConnectionClosed),
            None => Err(MuxError::ConnectionClosed),
        }
    }

    /// Receive the next whole message. `None` once the peer has closed and
    /// every delivered message was consumed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Close this endpoint. The peer observes end-of-channel after
    /// draining in-flight messages.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Split into send and receive halves.
    pub(crate) fn into_parts(self) -> (Option<mpsc::UnboundedSender<Bytes>>, mpsc::UnboundedReceiver<Bytes>) {
        (self.tx, self.rx)
    }
}
