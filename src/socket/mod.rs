//! Socket Module
//!
//! Resilient channel client: reconnect with exponential backoff, outbound
//! queuing while disconnected, and typed publish/subscribe over `{type, payload}`
//! envelopes.

mod client;
mod envelope;
mod handlers;
mod state;
mod token;
mod transport;

#[cfg(test)]
mod mock;

// Re-export public types
pub use client::{ChannelStatus, SocketClient};
pub use envelope::Envelope;
pub use handlers::{EventHandler, MessageHandler, Subscription};
pub use state::{ConnectionState, ReconnectPolicy};
pub use token::{connection_url, FileToken, SharedToken, StaticToken, TokenSource};
pub use transport::{Transport, TransportConnection, TransportEvent, WebSocketTransport};
