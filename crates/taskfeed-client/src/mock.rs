//! In-memory transport for driving a [`ConnectionManager`](crate::ConnectionManager)
//! without a network.
//!
//! Every successful `connect` hands the test a [`MockPeer`] playing the
//! server side of that one connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use taskfeed_core::ServerMessage;

use crate::transport::{Channel, ChannelEvent, Connector, TransportError};

pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    connects: AtomicUsize,
    refusals: AtomicUsize,
}

impl MockConnector {
    /// Create a connector and the receiver on which new peers show up.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            connects: AtomicUsize::new(0),
            refusals: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Number of connect attempts, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect attempts fail.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let peer = MockPeer {
            url: url.to_string(),
            tx,
            closed: closed.clone(),
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("mock peer receiver dropped".into()))?;
        Ok(Box::new(MockChannel { rx, closed }))
    }
}

/// Server end of one mock connection. Dropping it ends the stream, which the
/// client sees as an abnormal close.
pub struct MockPeer {
    url: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closed: CancellationToken,
}

impl MockPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(ChannelEvent::Text(text.into())).is_ok()
    }

    pub fn send(&self, message: &ServerMessage) -> bool {
        self.send_text(message.encode())
    }

    pub fn close(&self, code: u16) -> bool {
        self.tx.send(ChannelEvent::Closed { code: Some(code) }).is_ok()
    }

    pub fn socket_error(&self, reason: &str) -> bool {
        self.tx.send(ChannelEvent::Error(reason.to_string())).is_ok()
    }

    /// Whether the client side has closed or dropped the channel.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

struct MockChannel {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: CancellationToken,
}

#[async_trait]
impl Channel for MockChannel {
    async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_frames_reach_channel() {
        let (connector, mut peers) = MockConnector::new();
        let mut channel = connector.connect("ws://h/ws/data/t").await.unwrap();
        let peer = peers.recv().await.unwrap();
        assert_eq!(peer.url(), "ws://h/ws/data/t");

        assert!(peer.send(&ServerMessage::Connected));
        assert!(peer.close(1006));
        assert_eq!(
            channel.recv().await,
            Some(ChannelEvent::Text(r#"{"type":"connected"}"#.into()))
        );
        assert_eq!(
            channel.recv().await,
            Some(ChannelEvent::Closed { code: Some(1006) })
        );
    }

    #[tokio::test]
    async fn client_close_is_visible_to_peer() {
        let (connector, mut peers) = MockConnector::new();
        let mut channel = connector.connect("ws://h").await.unwrap();
        let peer = peers.recv().await.unwrap();
        assert!(!peer.is_closed());
        channel.close().await;
        assert!(peer.is_closed());
        assert!(!peer.send_text("late"));
    }

    #[tokio::test]
    async fn refusals_are_counted() {
        let (connector, _peers) = MockConnector::new();
        connector.refuse_next(2);
        assert!(connector.connect("ws://h").await.is_err());
        assert!(connector.connect("ws://h").await.is_err());
        assert!(connector.connect("ws://h").await.is_ok());
        assert_eq!(connector.connect_count(), 3);
    }

    #[tokio::test]
    async fn dropped_peer_ends_stream() {
        let (connector, mut peers) = MockConnector::new();
        let mut channel = connector.connect("ws://h").await.unwrap();
        drop(peers.recv().await.unwrap());
        assert_eq!(channel.recv().await, None);
    }
}
