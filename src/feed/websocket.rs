/// Live telemetry feed over WebSocket
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::feed::{Connector, EventSink, FeedError, FeedEvent, Transport, TransportEvent};

/// Opens WebSocket connections to the configured feed endpoint
pub struct WsConnector {
    url: Url,
    events: UnboundedSender<FeedEvent>,
}

impl WsConnector {
    pub fn new(url: Url, events: UnboundedSender<FeedEvent>) -> Self {
        Self { url, events }
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn open(&mut self, epoch: u64) -> WsTransport {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(epoch, self.events.clone());

        info!("Opening feed connection #{} to {}", epoch, self.url);
        tokio::spawn(run_connection(self.url.to_string(), outbound_rx, sink));

        WsTransport {
            outbound: Some(outbound_tx),
        }
    }
}

/// Handle to one WebSocket connection. Closing or dropping the handle
/// makes the connection task send a close frame and exit.
pub struct WsTransport {
    outbound: Option<UnboundedSender<String>>,
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), FeedError> {
        let outbound = self.outbound.as_ref().ok_or(FeedError::NotConnected)?;
        outbound
            .send(text)
            .map_err(|e| FeedError::Send(format!("connection task gone ({})", e)))
    }

    fn close(&mut self) {
        self.outbound.take();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drive one connection until either side closes it
async fn run_connection(url: String, mut outbound: UnboundedReceiver<String>, sink: EventSink) {
    let (stream, _) = match connect_async(url.as_str()).await {
        Ok(connection) => connection,
        Err(e) => {
            sink.emit(TransportEvent::Error(format!(
                "connection to {} failed: {}",
                url, e
            )));
            return;
        }
    };

    if !sink.emit(TransportEvent::Opened) {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        sink.emit(TransportEvent::Error(format!("write failed: {}", e)));
                        return;
                    }
                }
                None => {
                    debug!("Feed handle released, closing {}", url);
                    let _ = write.send(Message::Close(None)).await;
                    sink.emit(TransportEvent::Closed);
                    return;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(TransportEvent::Message(text.to_string())) {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    sink.emit(TransportEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.emit(TransportEvent::Error(format!("read failed: {}", e)));
                    return;
                }
            },
        }
    }
}
