//! Scriptable in-process transport for client tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::socket::transport::{Transport, TransportConnection, TransportEvent};

#[derive(Default)]
struct MockState {
    attempts: Vec<(String, Instant)>,
    failures_left: usize,
    unsendable_left: usize,
    connect_delay: Duration,
}

/// Records every connect, optionally fails the next N, and hands the peer
/// side of each successful connection to the test.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// Server side of one mock connection.
pub struct MockPeer {
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MockState::default())),
            peers,
        };
        (transport, rx)
    }

    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    /// The next `count` successful connections refuse every outbound frame.
    pub fn reject_sends_next(&self, count: usize) {
        self.state.lock().unwrap().unsendable_left = count;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().unwrap().connect_delay = delay;
    }

    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.iter().map(|(_, t)| *t).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().attempts.iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push((url.to_string(), Instant::now()));
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let unsendable = {
            let mut state = self.state.lock().unwrap();
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            if state.unsendable_left > 0 {
                state.unsendable_left -= 1;
                true
            } else {
                false
            }
        };

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        if unsendable {
            out_rx.close();
        }
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(MockPeer {
            sent: out_rx,
            events: in_tx,
        });

        Ok(TransportConnection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

impl MockPeer {
    /// Next frame the client wrote; `None` once the client dropped the transport.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Stops accepting frames; later client writes fail as on a dead socket.
    pub fn stop_receiving(&mut self) {
        self.sent.close();
    }

    pub fn push(&self, frame: &str) {
        let _ = self.events.send(TransportEvent::Message(frame.to_string()));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Error(reason.to_string()));
    }

    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}
