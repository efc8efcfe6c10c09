//! Inbound sample producers: the live WebSocket feed and the synthetic generator

pub mod synthetic;
pub mod websocket;

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub use synthetic::SyntheticConnector;
pub use websocket::WsConnector;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    /// Payload was not a valid reading
    #[error("malformed payload: {0}")]
    Parse(String),

    /// `created_at` could not be interpreted as a timestamp
    #[error("invalid created_at: {0}")]
    Timestamp(String),

    /// Tried to send with no open transport
    #[error("feed not connected")]
    NotConnected,

    /// Transport refused an outbound message
    #[error("send failed: {0}")]
    Send(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Lifecycle and data events raised by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed,
    Error(String),
}

/// A transport event tagged with the epoch of the transport that raised it.
/// Events from a transport that has since been replaced carry a stale epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub epoch: u64,
    pub kind: TransportEvent,
}

/// Reports transport events back to the event loop
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: UnboundedSender<FeedEvent>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: UnboundedSender<FeedEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Returns false once the event loop has gone away
    pub fn emit(&self, kind: TransportEvent) -> bool {
        self.tx
            .send(FeedEvent {
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}

/// An open (or opening) duplex connection. Sends are fire-and-forget.
/// Dropping the handle must close the underlying connection.
pub trait Transport {
    fn send(&mut self, text: String) -> Result<(), FeedError>;
    fn close(&mut self);
}

/// Opens transports. Each transport reports its lifecycle asynchronously as
/// `FeedEvent`s stamped with the epoch it was opened under.
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self, epoch: u64) -> Self::Transport;
}

/// Wait for the transport opened under `epoch` to report its final
/// `Closed` (or `Error`). Other events are discarded. Returns false if
/// `grace` runs out or the channel closes first.
pub async fn wait_closed(
    events: &mut UnboundedReceiver<FeedEvent>,
    epoch: u64,
    grace: Duration,
) -> bool {
    let finished = async {
        while let Some(event) = events.recv().await {
            if event.epoch != epoch {
                continue;
            }
            if matches!(event.kind, TransportEvent::Closed | TransportEvent::Error(_)) {
                return true;
            }
        }
        false
    };

    tokio::time::timeout(grace, finished).await.unwrap_or(false)
}
