//! Local re-emission of portal shortcut activations.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Identifies a listener added with [`ShortcutEvents::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// `ShortcutActivated` observers. Each listener receives the shortcut id.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ShortcutEvents {
    registry: Arc<Mutex<Registry>>,
}

impl ShortcutEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    /// Returns false if the listener was already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.registry.lock().listeners.remove(&id.0).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Call every listener with `shortcut_id`, in the order they were added.
    pub fn emit(&self, shortcut_id: &str) {
        // Listeners may add or remove listeners, so call them unlocked
        let listeners: Vec<Listener> = self.registry.lock().listeners.values().cloned().collect();
        trace!(
            "ShortcutActivated {} -> {} listener(s)",
            shortcut_id,
            listeners.len()
        );
        for listener in listeners {
            listener(shortcut_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_listeners_until_removed() {
        let events = ShortcutEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let first = events.add_listener(move |id| s.lock().push(format!("a:{id}")));
        let s = seen.clone();
        events.add_listener(move |id| s.lock().push(format!("b:{id}")));

        events.emit("toggle");
        assert!(events.remove_listener(first));
        assert!(!events.remove_listener(first));
        events.emit("again");

        assert_eq!(*seen.lock(), vec!["a:toggle", "b:toggle", "b:again"]);
        assert_eq!(events.listener_count(), 1);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let events = ShortcutEvents::new();
        let slot = Arc::new(Mutex::new(None::<ListenerId>));

        let handle = events.clone();
        let own = slot.clone();
        let id = events.add_listener(move |_| {
            if let Some(id) = own.lock().take() {
                handle.remove_listener(id);
            }
        });
        *slot.lock() = Some(id);

        events.emit("x");
        assert_eq!(events.listener_count(), 0);
    }
}
