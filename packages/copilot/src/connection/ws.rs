//! WebSocket transport over tokio-tungstenite.
//!
//! Each handle is backed by one spawned task that owns the socket. The task
//! forwards inbound frames as [`TransportEvent`]s until the handle is
//! detached, and writes whatever the handle queues on its outbound channel.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::transport::{
    ConnectionId, Transport, TransportError, TransportEvent, TransportEvents, TransportHandle,
};

enum Outbound {
    Text(String),
    Close,
}

/// Opens one tokio-tungstenite connection per handle.
#[derive(Clone)]
pub struct WsTransport {
    events: TransportEvents,
}

impl WsTransport {
    pub fn new(events: TransportEvents) -> Self {
        Self { events }
    }
}

impl Transport for WsTransport {
    type Handle = WsHandle;

    fn open(&mut self, id: ConnectionId, url: &str) -> WsHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let listener = CancellationToken::new();
        let forwarder = Forwarder {
            id,
            events: self.events.clone(),
            listener: listener.clone(),
        };
        tokio::spawn(run_connection(url.to_string(), forwarder, outbound_rx));
        WsHandle {
            outbound: outbound_tx,
            listener,
        }
    }
}

pub struct WsHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    listener: CancellationToken,
}

impl TransportHandle for WsHandle {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn detach(&mut self) {
        self.listener.cancel();
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Close)
            .map_err(|_| TransportError::Closed)
    }
}

/// Delivers events for one handle while it is still attached.
struct Forwarder {
    id: ConnectionId,
    events: TransportEvents,
    listener: CancellationToken,
}

impl Forwarder {
    fn emit(&self, event: TransportEvent) {
        if self.listener.is_cancelled() {
            trace!(id = %self.id, ?event, "detached, event not delivered");
            return;
        }
        // Receiver gone means the panel has shut down
        let _ = self.events.send((self.id, event));
    }
}

async fn run_connection(
    url: String,
    forwarder: Forwarder,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let id = forwarder.id;
    debug!(%id, %url, "opening websocket");

    let ws_stream = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(%id, %url, error = %e, "websocket connect failed");
                forwarder.emit(TransportEvent::Error(e.to_string()));
                return;
            }
        },
        () = closed_before_open(&mut outbound) => {
            debug!(%id, "handle closed before the handshake completed");
            return;
        }
    };

    forwarder.emit(TransportEvent::Open);
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        forwarder.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = ws_write.send(Message::Close(None)).await {
                        debug!(%id, error = %e, "close frame not sent");
                    }
                    break;
                }
            },

            frame = ws_read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    forwarder.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    forwarder.emit(TransportEvent::Message(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%id, ?frame, "server closed the connection");
                    forwarder.emit(TransportEvent::Close);
                    break;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    forwarder.emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    forwarder.emit(TransportEvent::Close);
                    break;
                }
            },
        }
    }

    debug!(%id, "websocket task finished");
}

/// Resolves once the owner closes or drops the handle. Text queued before the
/// socket is open has nowhere to go and is discarded.
async fn closed_before_open(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Some(cmd) = outbound.recv().await {
        match cmd {
            Outbound::Close => return,
            Outbound::Text(_) => warn!("dropping text queued before the connection opened"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn refused_connection_reports_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport::new(tx);
        let _handle = transport.open(ConnectionId(1), &format!("ws://127.0.0.1:{port}"));

        let (id, event) = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(id, ConnectionId(1));
        assert!(matches!(event, TransportEvent::Error(_)));
    }

    #[tokio::test]
    async fn detached_handle_delivers_nothing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport::new(tx);
        let mut handle = transport.open(ConnectionId(7), &format!("ws://127.0.0.1:{port}"));
        handle.detach();

        let got = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(got.is_err(), "expected no event after detach, got {got:?}");
    }

    #[tokio::test]
    async fn close_after_task_exit_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport::new(tx);
        let mut handle = transport.open(ConnectionId(1), &format!("ws://127.0.0.1:{port}"));

        // The connect error ends the task, dropping the outbound receiver
        timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        tokio::task::yield_now().await;
        let mut result = handle.close();
        for _ in 0..50 {
            if result.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            result = handle.close();
        }
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
