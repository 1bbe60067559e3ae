//! Callback registries for playhead and meter updates

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<Mutex<dyn FnMut(&T) + Send>>;

struct Registry<T> {
    next_id: u64,
    listeners: BTreeMap<u64, Listener<T>>,
}

/// A set of callbacks that all receive every emitted value
pub struct Subscribers<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Register a callback; dropping the returned handle does not unsubscribe
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut id = 0;
        if let Ok(mut registry) = self.registry.lock() {
            id = registry.next_id;
            registry.next_id += 1;
            registry
                .listeners
                .insert(id, Arc::new(Mutex::new(callback)));
        }

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    if let Ok(mut registry) = registry.lock() {
                        registry.listeners.remove(&id);
                    }
                }
            })),
        }
    }

    /// Call every listener with `value`, in subscription order
    ///
    /// The listener list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = match self.registry.lock() {
            Ok(registry) => registry.listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            if let Ok(mut callback) = listener.lock() {
                callback(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .map(|registry| registry.listeners.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener
    pub fn clear(&self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.listeners.clear();
        }
    }
}

/// Handle returned by a subscribe call
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Stop receiving updates
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all() {
        let subs = Subscribers::<f64>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            subs.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        subs.emit(&1.0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let subs = Subscribers::<f64>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = subs.subscribe(move |v| sink.lock().unwrap().push(*v));

        subs.emit(&1.0);
        sub.unsubscribe();
        subs.emit(&2.0);

        assert_eq!(*seen.lock().unwrap(), vec![1.0]);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let subs = Subscribers::<u32>::new();
        let sub = subs.subscribe(|_| {});
        drop(subs);
        sub.unsubscribe();
    }

    #[test]
    fn test_clear() {
        let subs = Subscribers::<u32>::new();
        subs.subscribe(|_| {});
        subs.subscribe(|_| {});
        assert_eq!(subs.len(), 2);
        subs.clear();
        assert!(subs.is_empty());
    }
}
