//! WebSocket transport.
//!
//! Text frames are sent and forwarded verbatim. The connection is driven by
//! one background task per link; `ready` resolves once the socket is open and
//! `stop` closes it.

use std::sync::Arc;

use async_trait::async_trait;
use chainge_interact_core::TransportDescriptor;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::WebSocketStream;

use crate::config::endpoint_url;
use crate::error::{Result, TransportError};
use crate::traits::{InboundSink, TransportApi, TransportHandler, TransportLink};

/// Transport type name of the WebSocket transport.
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SocketState {
    Connecting,
    Open,
    Closed(Option<String>),
}

/// Handler for `websocket` descriptors (client side).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Wrap an accepted server-side connection in a link.
    pub async fn accept<S>(stream: S, on_message: InboundSink) -> Result<TransportApi>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let socket = tokio_tungstenite::accept_async(stream).await?;
        let (link, outgoing, state) = WebSocketLink::new();
        tokio::spawn(drive(socket, outgoing, on_message, state));
        Ok(TransportApi::new(
            TransportDescriptor::new(WEBSOCKET_TRANSPORT, Value::Null),
            Arc::new(link),
        ))
    }
}

#[async_trait]
impl TransportHandler for WebSocketTransport {
    fn transport_type(&self) -> &str {
        WEBSOCKET_TRANSPORT
    }

    async fn start(
        &self,
        desc: &TransportDescriptor,
        on_message: InboundSink,
    ) -> Result<Arc<dyn TransportLink>> {
        let url = endpoint_url(&desc.config)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidConfig(format!(
                "websocket url must be ws:// or wss://, got {url}"
            )));
        }

        let (link, outgoing, state) = WebSocketLink::new();
        tokio::spawn(async move {
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((socket, _)) => drive(socket, outgoing, on_message, state).await,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "websocket connect failed");
                    state.send_replace(SocketState::Closed(Some(e.to_string())));
                }
            }
        });
        Ok(Arc::new(link))
    }
}

struct WebSocketLink {
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    state: watch::Receiver<SocketState>,
}

impl WebSocketLink {
    fn new() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        watch::Sender<SocketState>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SocketState::Connecting);
        let link = Self {
            outgoing: Mutex::new(Some(out_tx)),
            state: state_rx,
        };
        (link, out_rx, state_tx)
    }
}

#[async_trait]
impl TransportLink for WebSocketLink {
    async fn send(&self, token: &str) -> Result<()> {
        if matches!(*self.state.borrow(), SocketState::Closed(_)) {
            return Err(TransportError::Closed);
        }
        let outgoing = self.outgoing.lock().await;
        let sender = outgoing.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(token.to_owned())
            .map_err(|_| TransportError::Closed)
    }

    async fn ready(&self) -> Result<()> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                SocketState::Open => return Ok(()),
                SocketState::Closed(reason) => {
                    return Err(reason.map_or(TransportError::Closed, TransportError::ConnectionFailed))
                }
                SocketState::Connecting => {}
            }
            state.changed().await.map_err(|_| TransportError::Closed)?;
        }
    }

    async fn stop(&self) -> Result<()> {
        // dropping the sender lets the driver close the socket
        self.outgoing.lock().await.take();
        Ok(())
    }
}

/// Pump frames both ways until either side closes.
async fn drive<S>(
    socket: WebSocketStream<S>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    on_message: InboundSink,
    state: watch::Sender<SocketState>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    state.send_replace(SocketState::Open);

    let reason = loop {
        tokio::select! {
            next = outgoing.recv() => match next {
                Some(token) => {
                    if let Err(e) = sink.send(Frame::Text(token)).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break None;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    if on_message.send(text).is_err() {
                        let _ = sink.close().await;
                        break None;
                    }
                }
                Some(Ok(Frame::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        if on_message.send(text).is_err() {
                            let _ = sink.close().await;
                            break None;
                        }
                    }
                    Err(_) => tracing::warn!("dropping non-utf8 websocket frame"),
                },
                Some(Ok(Frame::Close(_))) | None => break None,
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
            },
        }
    };

    tracing::debug!(reason = ?reason, "websocket closed");
    state.send_replace(SocketState::Closed(reason));
}
