//! Streaming connection to the queue server
//!
//! [`Transport`] is the seam the managers emit through. [`WsTransport`] is the
//! websocket implementation: a background task owns the socket, reconnects
//! with exponential backoff, and forwards lifecycle signals and parsed events
//! into the session's input channel.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::{Result, SyncError};
use crate::protocol::{ClientMessage, InboundEvent};
use crate::session::Input;

/// Outbound side of the streaming connection
pub trait Transport: Send + Sync {
    /// Whether the connection is currently established
    fn is_connected(&self) -> bool;

    /// Queue a signal for the server; fails if the connection is down
    fn emit(&self, message: ClientMessage) -> Result<()>;
}

/// Delay bounds between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// WebSocket transport with automatic reconnect
pub struct WsTransport {
    connected: Arc<AtomicBool>,
    outgoing: mpsc::Sender<ClientMessage>,
    handle: tokio::task::JoinHandle<()>,
}

impl WsTransport {
    /// Start connecting to `url`; events are delivered to `inputs`
    pub fn spawn(url: impl Into<String>, policy: ReconnectPolicy, inputs: mpsc::Sender<Input>) -> Self {
        let url = url.into();
        let connected = Arc::new(AtomicBool::new(false));
        let (out_tx, out_rx) = mpsc::channel::<ClientMessage>(64);

        let handle = tokio::spawn(run_connection(
            url,
            policy,
            connected.clone(),
            out_rx,
            inputs,
        ));

        Self {
            connected,
            outgoing: out_tx,
            handle,
        }
    }
}

impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SyncError::TransportUnavailable("not connected".into()));
        }
        self.outgoing
            .try_send(message)
            .map_err(|e| SyncError::TransportUnavailable(e.to_string()))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_connection(
    url: String,
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    mut out_rx: mpsc::Receiver<ClientMessage>,
    inputs: mpsc::Sender<Input>,
) {
    let mut delay = policy.initial;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                delay = policy.initial;
                // Signals queued for the previous socket are stale; rejoins follow Connected
                while out_rx.try_recv().is_ok() {}
                connected.store(true, Ordering::SeqCst);
                tracing::info!("Connected to {}", url);

                if inputs.send(Input::Event(InboundEvent::Connected)).await.is_err() {
                    break;
                }

                let keep_going = pump(stream, &mut out_rx, &inputs).await;
                connected.store(false, Ordering::SeqCst);
                tracing::info!("Disconnected from {}", url);

                if inputs
                    .send(Input::Event(InboundEvent::Disconnected))
                    .await
                    .is_err()
                    || !keep_going
                {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", url, e);
            }
        }

        if inputs.is_closed() {
            break;
        }
        tracing::debug!(?delay, "Reconnecting");
        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}

/// Shuttle frames until the socket closes. Returns false when the session or
/// the transport handle is gone and the connection loop should stop.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    out_rx: &mut mpsc::Receiver<ClientMessage>,
    inputs: &mpsc::Sender<Input>,
) -> bool {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("Failed to encode outbound message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        tracing::error!("WebSocket send failed: {}", e);
                        return true;
                    }
                }
                None => {
                    let _ = write.close().await;
                    return false;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => match InboundEvent::from_frame(&text) {
                    Ok(event) => {
                        if inputs.send(Input::Event(event)).await.is_err() {
                            return false;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Dropping inbound frame: {} - {}", e, text);
                    }
                },
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {}", e);
                    return true;
                }
            },
        }
    }
}
