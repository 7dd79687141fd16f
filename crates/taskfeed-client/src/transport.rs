//! Transport seam for progress channels.
//!
//! The manager only sees [`Connector`] and [`Channel`]; the production
//! implementation is a thin client over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::trace;

/// WebSocket close code for a clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Something that happened on an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    /// Peer closed the channel. `None` when no status code was supplied.
    Closed { code: Option<u16> },
    /// Socket-level failure; the channel is unusable afterwards.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// One open connection. `recv` returns `None` once the stream has ended.
#[async_trait]
pub trait Channel: Send {
    async fn recv(&mut self) -> Option<ChannelEvent>;
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections.
#[derive(Clone, Debug)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WsConnector {
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsChannel { ws, failed: false }))
    }
}

struct WsChannel {
    ws: WsStream,
    failed: bool,
}

#[async_trait]
impl Channel for WsChannel {
    async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.failed {
            return None;
        }
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(ChannelEvent::Text(text.to_string())),
                Ok(Message::Close(frame)) => {
                    return Some(ChannelEvent::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    });
                }
                Ok(Message::Binary(data)) => {
                    trace!(len = data.len(), "binary frame ignored");
                }
                // Ping/pong are answered by tungstenite.
                Ok(_) => {}
                Err(e) => {
                    self.failed = true;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            trace!(error = %e, "close handshake failed");
        }
    }
}
