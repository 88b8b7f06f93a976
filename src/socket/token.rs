//! Access-token sources read on every connect.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Supplies the current access token. Called on each connection attempt so a
/// refreshed token is picked up on reconnect.
pub trait TokenSource: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

/// A token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// In-process token slot that login/refresh code updates. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        match self.slot.write() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

impl TokenSource for SharedToken {
    fn access_token(&self) -> Option<String> {
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Token persisted in a file by the login flow; re-read on every call.
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl TokenSource for FileToken {
    fn access_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) => {
                debug!("No access token at {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl TokenSource for Box<dyn TokenSource> {
    fn access_token(&self) -> Option<String> {
        (**self).access_token()
    }
}

/// `base_url` with the token appended as the `token` query parameter.
/// A missing token is sent as an empty value.
pub fn connection_url(base_url: &str, token: Option<&str>) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}token={}",
        base_url,
        separator,
        urlencoding::encode(token.unwrap_or(""))
    )
}
