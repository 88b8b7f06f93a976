//! Handler registry with per-handler unsubscribe.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::error;

pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandlerSlot {
    Message(String),
    Connect,
    Disconnect,
    ReconnectExhausted,
}

#[derive(Default)]
struct HandlerLists {
    messages: HashMap<String, Vec<(u64, MessageHandler)>>,
    connect: Vec<(u64, EventHandler)>,
    disconnect: Vec<(u64, EventHandler)>,
    exhausted: Vec<(u64, EventHandler)>,
}

/// Ordered handler lists for one client. Invocation order is registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    lists: Mutex<HandlerLists>,
}

impl HandlerRegistry {
    fn lock(&self) -> MutexGuard<'_, HandlerLists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_message(self: &Arc<Self>, kind: &str, handler: MessageHandler) -> Subscription {
        let id = self.next_id();
        self.lock()
            .messages
            .entry(kind.to_string())
            .or_default()
            .push((id, handler));
        self.subscription(HandlerSlot::Message(kind.to_string()), id)
    }

    pub fn add_connect(self: &Arc<Self>, handler: EventHandler) -> Subscription {
        let id = self.next_id();
        self.lock().connect.push((id, handler));
        self.subscription(HandlerSlot::Connect, id)
    }

    pub fn add_disconnect(self: &Arc<Self>, handler: EventHandler) -> Subscription {
        let id = self.next_id();
        self.lock().disconnect.push((id, handler));
        self.subscription(HandlerSlot::Disconnect, id)
    }

    pub fn add_exhausted(self: &Arc<Self>, handler: EventHandler) -> Subscription {
        let id = self.next_id();
        self.lock().exhausted.push((id, handler));
        self.subscription(HandlerSlot::ReconnectExhausted, id)
    }

    fn subscription(self: &Arc<Self>, slot: HandlerSlot, id: u64) -> Subscription {
        Subscription {
            registry: Arc::downgrade(self),
            slot,
            id,
        }
    }

    fn remove(&self, slot: &HandlerSlot, id: u64) {
        let mut lists = self.lock();
        match slot {
            HandlerSlot::Message(kind) => {
                if let Some(handlers) = lists.messages.get_mut(kind) {
                    handlers.retain(|(hid, _)| *hid != id);
                    if handlers.is_empty() {
                        lists.messages.remove(kind);
                    }
                }
            }
            HandlerSlot::Connect => lists.connect.retain(|(hid, _)| *hid != id),
            HandlerSlot::Disconnect => lists.disconnect.retain(|(hid, _)| *hid != id),
            HandlerSlot::ReconnectExhausted => lists.exhausted.retain(|(hid, _)| *hid != id),
        }
    }

    /// Calls every handler for `kind`. Returns how many were registered.
    pub fn dispatch(&self, kind: &str, payload: &Value) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<MessageHandler> = self
            .lock()
            .messages
            .get(kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                error!("Handler for message type '{}' panicked", kind);
            }
        }
        handlers.len()
    }

    pub fn notify_connect(&self) {
        let handlers = snapshot(&self.lock().connect);
        invoke_all(&handlers, "connect");
    }

    pub fn notify_disconnect(&self) {
        let handlers = snapshot(&self.lock().disconnect);
        invoke_all(&handlers, "disconnect");
    }

    pub fn notify_exhausted(&self) {
        let handlers = snapshot(&self.lock().exhausted);
        invoke_all(&handlers, "reconnect-exhausted");
    }
}

fn snapshot(list: &[(u64, EventHandler)]) -> Vec<EventHandler> {
    list.iter().map(|(_, h)| Arc::clone(h)).collect()
}

fn invoke_all(handlers: &[EventHandler], what: &str) {
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
            error!("{} handler panicked", what);
        }
    }
}

// == Subscription ==
/// Handle returned by every registration. `unsubscribe` removes exactly the
/// handler it was returned for; calling it again does nothing. Dropping the
/// handle leaves the handler registered.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    slot: HandlerSlot,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.slot, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> MessageHandler {
        let log = Arc::clone(log);
        Arc::new(move |_: &Value| log.lock().unwrap().push(tag))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = Arc::new(HandlerRegistry::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add_message("chat", recorder(&log, "first"));
        registry.add_message("chat", recorder(&log, "second"));
        registry.add_message("other", recorder(&log, "other"));

        assert_eq!(registry.dispatch("chat", &json!({})), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let registry = Arc::new(HandlerRegistry::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = registry.add_message("chat", recorder(&log, "first"));
        registry.add_message("chat", recorder(&log, "second"));

        first.unsubscribe();
        first.unsubscribe();
        registry.dispatch("chat", &json!(null));

        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_same_closure_registered_twice_removed_once() {
        let registry = Arc::new(HandlerRegistry::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: MessageHandler = Arc::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = registry.add_message("n", Arc::clone(&handler));
        registry.add_message("n", handler);
        a.unsubscribe();
        registry.dispatch("n", &json!(1));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let registry = Arc::new(HandlerRegistry::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add_message("chat", Arc::new(|_: &Value| panic!("boom")));
        registry.add_message("chat", recorder(&log, "after"));
        registry.dispatch("chat", &json!({}));

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_event_handlers_and_unsubscribe() {
        let registry = Arc::new(HandlerRegistry::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = registry.add_connect(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.add_disconnect(Arc::new(|| panic!("boom")));

        registry.notify_connect();
        registry.notify_disconnect();
        sub.unsubscribe();
        registry.notify_connect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped_is_noop() {
        let registry = Arc::new(HandlerRegistry::default());
        let sub = registry.add_exhausted(Arc::new(|| {}));
        drop(registry);
        sub.unsubscribe();
    }
}
