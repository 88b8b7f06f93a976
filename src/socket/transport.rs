//! Duplex transport the socket client drives.
//!
//! A connection is a pair of channels: frames pushed into `outgoing` are
//! written to the peer while the transport is sendable, and everything the
//! peer does arrives on `incoming` as a [`TransportEvent`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::debug;

use crate::error::TransportError;

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame from the peer
    Message(String),
    /// Transport-level failure; the connection is unusable afterwards
    Error(String),
    /// Clean close from either side
    Closed,
}

/// An established connection.
#[derive(Debug)]
pub struct TransportConnection {
    /// Sendable while not closed
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection to `url`. Resolves once the peer is ready.
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError>;
}

// == WebSocket Transport ==
/// Transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: ends when every sender is dropped, then closes the socket
        let writer_events = in_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer finished");
        });

        // Reader
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => {
                        TransportEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if in_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(TransportEvent::Closed);
        });

        Ok(TransportConnection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = WebSocketTransport
            .connect(&format!("ws://127.0.0.1:{}/ws", port))
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        let result = WebSocketTransport.connect("not a url").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
