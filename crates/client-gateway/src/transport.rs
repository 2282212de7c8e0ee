//! Transport adapter over a single WebSocket connection.
//!
//! Wraps one `tokio-tungstenite` socket behind open/send/close plus a
//! signal stream. Sends are best-effort: while the socket is not open a
//! frame is dropped silently, with no buffering and no error, matching the
//! fire-and-forget wire contract.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use client_core::{ClientError, ErrorCategory, FrameSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signals raised by the transport toward the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The socket is open and ready to carry frames.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// The socket failed; a `Closed` signal follows.
    Error(String),
    /// The socket is gone. Emitted exactly once per connection.
    Closed,
}

/// Cheap clone of the transport's send side.
///
/// Implements [`FrameSink`] so the dispatcher's publish path can feed it
/// directly.
#[derive(Clone)]
pub struct TransportHandle {
    outbound_tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

impl FrameSink for TransportHandle {
    fn send_frame(&self, raw: String) {
        if !self.is_open() {
            trace!("dropping outbound frame: transport not open");
            return;
        }
        if self.outbound_tx.send(raw).is_err() {
            trace!("dropping outbound frame: transport task gone");
        }
    }
}

/// One live WebSocket connection.
pub struct Transport {
    handle: TransportHandle,
    stop: CancellationToken,
    _task: JoinHandle<()>,
}

impl Transport {
    /// Connect to `endpoint` and start the socket task.
    ///
    /// Emits `Opened` on `signal_tx` once connected, then `Frame` per
    /// inbound text frame and finally exactly one `Closed`. A connect
    /// failure is returned directly; no signals are emitted for it.
    pub async fn open(
        endpoint: &str,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
    ) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(endpoint).await.map_err(|err| {
            ClientError::new(
                ErrorCategory::Transport,
                "connect_failed",
                format!("failed connecting to {endpoint}: {err}"),
            )
        })?;
        debug!(%endpoint, "transport connected");

        let open = Arc::new(AtomicBool::new(true));
        let stop = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let _ = signal_tx.send(TransportSignal::Opened);
        let task = tokio::spawn(socket_loop(
            ws,
            outbound_rx,
            signal_tx,
            stop.child_token(),
            Arc::clone(&open),
        ));

        Ok(Self {
            handle: TransportHandle { outbound_tx, open },
            stop,
            _task: task,
        })
    }

    /// Send side of this connection.
    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Whether the socket currently reports open.
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Best-effort send of one raw frame.
    pub fn send(&self, raw: String) {
        self.handle.send_frame(raw);
    }

    /// Ask the socket task to shut down. The `Closed` signal follows.
    pub fn close(&self) {
        self.stop.cancel();
    }
}

async fn socket_loop(
    mut ws: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    stop: CancellationToken,
    open: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                let _ = ws.close(None).await;
                break;
            }
            maybe_raw = outbound_rx.recv() => {
                let Some(raw) = maybe_raw else { break };
                if let Err(err) = ws.send(WsMessage::Text(raw.into())).await {
                    warn!(error = %err, "socket write failed");
                    let _ = signal_tx.send(TransportSignal::Error(err.to_string()));
                    break;
                }
            }
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = signal_tx.send(TransportSignal::Frame(text.to_string()));
                    }
                    // Control and binary frames carry no protocol data.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) | WsMessage::Frame(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("socket closed by peer");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "socket read failed");
                        let _ = signal_tx.send(TransportSignal::Error(err.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    open.store(false, Ordering::Relaxed);
    let _ = signal_tx.send(TransportSignal::Closed);
}
