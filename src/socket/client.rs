//! Socket Client Module
//!
//! Long-lived channel connection with automatic reconnect, exponential
//! backoff, outbound queuing while disconnected, and typed dispatch of
//! inbound envelopes.
//!
//! # Lifecycle
//! - `connect()` moves `Idle`/`Closed` to `Connecting`; it is a no-op while
//!   `Connecting` or `Open`.
//! - On open the attempt counter resets, connect handlers run, then the
//!   outbound queue is flushed in FIFO order.
//! - On close or error the disconnect handlers run and a reconnect is
//!   scheduled after `base * 2^(n-1)`, until `max_attempts` is reached. At
//!   the cap the reconnect-exhausted handlers run and the client stays
//!   `Closed`.
//! - `disconnect()` returns any state to `Idle`, clears the queue and
//!   cancels a pending reconnect.
//!
//! Methods are synchronous and spawn Tokio tasks, so they must be called
//! from within a Tokio runtime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::socket::envelope::Envelope;
use crate::socket::handlers::{HandlerRegistry, Subscription};
use crate::socket::state::{ConnectionState, ReconnectPolicy};
use crate::socket::token::{connection_url, TokenSource};
use crate::socket::transport::{Transport, TransportEvent};

// == Client State ==
struct ClientState {
    state: ConnectionState,
    queue: VecDeque<String>,
    attempts: u32,
    /// Bumped on every connection attempt and on disconnect; events carrying
    /// an older epoch come from a dropped transport and are ignored.
    epoch: u64,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    connection_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl ClientState {
    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

struct ClientInner {
    name: String,
    base_url: String,
    transport: Arc<dyn Transport>,
    token: Arc<dyn TokenSource>,
    policy: ReconnectPolicy,
    state: Mutex<ClientState>,
    handlers: Arc<HandlerRegistry>,
}

impl ClientInner {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Channel Status ==
/// Point-in-time view of a client, for the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub state: ConnectionState,
    pub queued: usize,
    pub reconnect_attempts: u32,
    pub reconnect_pending: bool,
}

// == Socket Client ==
/// Cheap-to-clone handle to one resilient channel connection. Separate
/// clients share nothing.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

impl SocketClient {
    // == Constructor ==
    /// Creates an idle client for `base_url`. Nothing connects until
    /// `connect()` or `send()` is called.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        transport: impl Transport,
        token: impl TokenSource,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                base_url: base_url.into(),
                transport: Arc::new(transport),
                token: Arc::new(token),
                policy,
                state: Mutex::new(ClientState {
                    state: ConnectionState::Idle,
                    queue: VecDeque::new(),
                    attempts: 0,
                    epoch: 0,
                    outgoing: None,
                    connection_task: None,
                    reconnect_timer: None,
                }),
                handlers: Arc::new(HandlerRegistry::default()),
            }),
        }
    }

    fn from_weak(weak: &Weak<ClientInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // == Connect ==
    /// Starts a connection attempt unless one is in flight or already open.
    /// Supersedes a pending automatic reconnect.
    pub fn connect(&self) {
        let mut st = self.inner.lock();
        self.connect_locked(&mut st);
    }

    fn connect_locked(&self, st: &mut ClientState) {
        if matches!(st.state, ConnectionState::Connecting | ConnectionState::Open) {
            debug!("[{}] connect ignored while {}", self.inner.name, st.state);
            return;
        }
        if let Some(timer) = st.reconnect_timer.take() {
            timer.abort();
        }
        self.begin_attempt(st);
    }

    fn begin_attempt(&self, st: &mut ClientState) {
        st.epoch += 1;
        let epoch = st.epoch;
        st.transition(ConnectionState::Connecting);
        info!(
            "[{}] connecting to {} (reconnect attempt {})",
            self.inner.name, self.inner.base_url, st.attempts
        );

        let weak = Arc::downgrade(&self.inner);
        let transport = Arc::clone(&self.inner.transport);
        st.connection_task = Some(tokio::spawn(run_connection(weak, transport, epoch)));
    }

    // == Disconnect ==
    /// Closes the transport, drops queued messages, resets the attempt counter
    /// and cancels any scheduled reconnect. Safe to call from any state.
    pub fn disconnect(&self) {
        let (was_open, dropped) = {
            let mut st = self.inner.lock();
            st.epoch += 1;
            if let Some(timer) = st.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(task) = st.connection_task.take() {
                task.abort();
            }
            st.outgoing = None;
            let dropped = st.queue.len();
            st.queue.clear();
            st.attempts = 0;
            let was_open = st.state == ConnectionState::Open;
            st.transition(ConnectionState::Idle);
            (was_open, dropped)
        };

        info!(
            "[{}] disconnected ({} queued message(s) dropped)",
            self.inner.name, dropped
        );
        if was_open {
            self.inner.handlers.notify_disconnect();
        }
    }

    // == Send ==
    /// Sends `{type, payload}` now if the channel is open and nothing is queued
    /// ahead of it, otherwise queues it and starts connecting if needed. Never fails; unserializable payloads are logged
    /// and dropped.
    pub fn send<P: Serialize>(&self, kind: &str, payload: P) {
        let frame = match Envelope::new(kind, payload).and_then(|e| e.to_frame()) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[{}] dropping unserializable '{}' message: {}", self.inner.name, kind, e);
                return;
            }
        };

        let mut st = self.inner.lock();
        // Only bypass the queue when it is empty, or this frame would overtake
        // frames still waiting for the flush that follows the connect handlers.
        let frame = match (&st.state, &st.outgoing) {
            (ConnectionState::Open, Some(outgoing)) if st.queue.is_empty() => {
                match outgoing.send(frame) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(frame)) => frame,
                }
            }
            _ => frame,
        };

        st.queue.push_back(frame);
        debug!(
            "[{}] queued '{}' message ({} pending)",
            self.inner.name,
            kind,
            st.queue.len()
        );
        if matches!(st.state, ConnectionState::Idle | ConnectionState::Closed) {
            self.connect_locked(&mut st);
        }
    }

    // == Handler Registration ==
    /// Registers `handler` for inbound envelopes of type `kind`.
    pub fn on<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.handlers.add_message(kind, Arc::new(handler))
    }

    /// Runs on every transition to `Open`.
    pub fn on_connect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers.add_connect(Arc::new(handler))
    }

    /// Runs on every transition to `Closed`, failed connection attempts
    /// included, and on `disconnect()` from `Open`.
    pub fn on_disconnect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers.add_disconnect(Arc::new(handler))
    }

    /// Runs when a close happens with the reconnect cap already reached.
    pub fn on_reconnect_exhausted<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers.add_exhausted(Arc::new(handler))
    }

    // == Introspection ==
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock().reconnect_timer.is_some()
    }

    pub fn status(&self) -> ChannelStatus {
        let st = self.inner.lock();
        ChannelStatus {
            name: self.inner.name.clone(),
            state: st.state,
            queued: st.queue.len(),
            reconnect_attempts: st.attempts,
            reconnect_pending: st.reconnect_timer.is_some(),
        }
    }

    // == Transport Events ==
    /// Returns false when the attempt was superseded and the connection
    /// should be dropped.
    fn handle_open(&self, epoch: u64, outgoing: mpsc::UnboundedSender<String>) -> bool {
        {
            let mut st = self.inner.lock();
            if st.epoch != epoch || st.state != ConnectionState::Connecting {
                return false;
            }
            st.transition(ConnectionState::Open);
            st.attempts = 0;
            st.outgoing = Some(outgoing);
        }

        info!("[{}] connected", self.inner.name);
        self.inner.handlers.notify_connect();
        self.flush_queue(epoch);
        true
    }

    fn flush_queue(&self, epoch: u64) {
        let mut st = self.inner.lock();
        if st.epoch != epoch || st.state != ConnectionState::Open {
            return;
        }
        let Some(outgoing) = st.outgoing.clone() else {
            return;
        };

        let mut flushed = 0;
        while let Some(frame) = st.queue.pop_front() {
            if let Err(mpsc::error::SendError(frame)) = outgoing.send(frame) {
                st.queue.push_front(frame);
                break;
            }
            flushed += 1;
        }
        if flushed > 0 || !st.queue.is_empty() {
            debug!(
                "[{}] flushed {} queued message(s), {} left",
                self.inner.name,
                flushed,
                st.queue.len()
            );
        }
    }

    fn dispatch_frame(&self, frame: &str) {
        match Envelope::parse(frame) {
            Ok(envelope) => {
                let handled = self.inner.handlers.dispatch(&envelope.kind, &envelope.payload);
                if handled == 0 {
                    debug!("[{}] no handler for '{}'", self.inner.name, envelope.kind);
                }
            }
            Err(e) => warn!("[{}] dropping malformed frame: {}", self.inner.name, e),
        }
    }

    fn handle_close(&self, epoch: u64) {
        let exhausted = {
            let mut st = self.inner.lock();
            if st.epoch != epoch {
                return;
            }
            st.transition(ConnectionState::Closed);
            st.outgoing = None;
            st.connection_task = None;

            if st.reconnect_timer.is_some() {
                false
            } else if let Some(delay) = self.inner.policy.delay_for(st.attempts + 1) {
                st.attempts += 1;
                info!(
                    "[{}] reconnecting in {:?} (attempt {}/{})",
                    self.inner.name, delay, st.attempts, self.inner.policy.max_attempts
                );
                let weak = Arc::downgrade(&self.inner);
                st.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(client) = SocketClient::from_weak(&weak) {
                        client.fire_reconnect(epoch);
                    }
                }));
                false
            } else {
                true
            }
        };

        self.inner.handlers.notify_disconnect();
        if exhausted {
            warn!(
                "[{}] giving up after {} reconnect attempts",
                self.inner.name, self.inner.policy.max_attempts
            );
            self.inner.handlers.notify_exhausted();
        }
    }

    fn fire_reconnect(&self, epoch: u64) {
        let mut st = self.inner.lock();
        if st.epoch != epoch {
            return;
        }
        st.reconnect_timer = None;
        if st.state == ConnectionState::Closed {
            self.begin_attempt(&mut st);
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("name", &self.inner.name)
            .field("base_url", &self.inner.base_url)
            .field("status", &self.status())
            .finish()
    }
}

/// Drives one connection attempt and, if it opens, its inbound frames.
/// Holds only a weak handle between events so dropping every client handle
/// lets the task wind down.
async fn run_connection(weak: Weak<ClientInner>, transport: Arc<dyn Transport>, epoch: u64) {
    // Read per attempt and outside the state lock; sources may do file I/O
    let url = {
        let Some(client) = SocketClient::from_weak(&weak) else {
            return;
        };
        let token = client.inner.token.access_token();
        connection_url(&client.inner.base_url, token.as_deref())
    };

    let result = transport.connect(&url).await;

    let mut incoming = {
        let Some(client) = SocketClient::from_weak(&weak) else {
            return;
        };
        match result {
            Ok(connection) => {
                if !client.handle_open(epoch, connection.outgoing) {
                    return;
                }
                connection.incoming
            }
            Err(e) => {
                warn!("[{}] connection failed: {}", client.inner.name, e);
                client.handle_close(epoch);
                return;
            }
        }
    };

    while let Some(event) = incoming.recv().await {
        let Some(client) = SocketClient::from_weak(&weak) else {
            return;
        };
        if !client.is_current(epoch) {
            return;
        }
        match event {
            TransportEvent::Message(frame) => client.dispatch_frame(&frame),
            TransportEvent::Error(e) => {
                warn!("[{}] transport error: {}", client.inner.name, e);
                client.handle_close(epoch);
                return;
            }
            TransportEvent::Closed => {
                info!("[{}] connection closed", client.inner.name);
                client.handle_close(epoch);
                return;
            }
        }
    }

    if let Some(client) = SocketClient::from_weak(&weak) {
        client.handle_close(epoch);
    }
}
