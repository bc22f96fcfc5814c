use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use conduit_core::Event;
use parking_lot::Mutex;

pub(crate) type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: u64,
    once: bool,
    fired: AtomicBool,
    listener: Listener,
}

/// Event listeners keyed by event type, in subscription order.
#[derive(Default)]
pub(crate) struct Subscriptions {
    next_id: AtomicU64,
    by_type: Mutex<HashMap<String, Vec<Arc<Entry>>>>,
}

impl Subscriptions {
    pub(crate) fn add(self: &Arc<Self>, event_type: String, listener: Listener, once: bool) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            id,
            once,
            fired: AtomicBool::new(false),
            listener,
        });
        self.by_type
            .lock()
            .entry(event_type.clone())
            .or_default()
            .push(entry);
        Subscription {
            event_type,
            id,
            owner: Arc::downgrade(self),
        }
    }

    fn remove(&self, event_type: &str, id: u64) -> bool {
        let mut by_type = self.by_type.lock();
        let Some(entries) = by_type.get_mut(event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            by_type.remove(event_type);
        }
        removed
    }

    /// Invoke every listener subscribed to `event.event_type` when delivery
    /// starts. Returns how many ran.
    ///
    /// Listeners run with no lock held. A `once` listener is claimed and
    /// removed before it runs, so re-entrant delivery cannot run it twice.
    pub(crate) fn deliver(&self, event: &Event) -> usize {
        let snapshot: Vec<Arc<Entry>> = self
            .by_type
            .lock()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for entry in snapshot {
            if entry.once {
                if entry.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.remove(&event.event_type, entry.id);
            }
            (entry.listener)(event);
            delivered += 1;
        }
        delivered
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        self.by_type.lock().get(event_type).map_or(0, Vec::len)
    }
}

/// Handle to one listener registration.
///
/// Dropping the handle leaves the listener in place; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    event_type: String,
    id: u64,
    owner: Weak<Subscriptions>,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the listener. Returns `false` if it was already gone (a fired
    /// `once` listener, or a client that no longer exists).
    pub fn unsubscribe(self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|subs| subs.remove(&self.event_type, self.id))
    }
}
