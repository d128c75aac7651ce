//! Connectivity monitor: online/offline state and pending-queue visibility.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::info;

type OnlineListener = Arc<dyn Fn(bool) + Send + Sync>;
type CountListener = Arc<dyn Fn(usize) + Send + Sync>;
type SyncTrigger = Arc<dyn Fn() + Send + Sync>;

type Registry<T> = Arc<Mutex<HashMap<u64, T>>>;

/// RAII registration handle; dropping it unsubscribes the listener.
pub struct Subscription {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new<T: Send + 'static>(registry: &Registry<T>, token: u64) -> Self {
        let registry = Arc::downgrade(registry);
        Self {
            unregister: Some(Box::new(move || {
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry.lock().unwrap().remove(&token);
                }
            })),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

/// Single source of truth for online/offline state and queue backpressure.
///
/// The host platform feeds transitions through [`set_online`]; duplicate
/// events for an unchanged state are dropped, so listeners observe exactly
/// one callback per transition. An offline→online transition additionally
/// fires the registered sync trigger exactly once, independent of how many
/// listeners are subscribed.
///
/// [`set_online`]: ConnectivityMonitor::set_online
pub struct ConnectivityMonitor {
    online: AtomicBool,
    pending_count: AtomicUsize,
    next_token: AtomicU64,
    online_listeners: Registry<OnlineListener>,
    count_listeners: Registry<CountListener>,
    sync_trigger: Mutex<Option<SyncTrigger>>,
}

impl ConnectivityMonitor {
    /// `initial_online` is the platform's network-state signal sampled at
    /// construction.
    pub fn new(initial_online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(initial_online),
            pending_count: AtomicUsize::new(0),
            next_token: AtomicU64::new(0),
            online_listeners: Arc::new(Mutex::new(HashMap::new())),
            count_listeners: Arc::new(Mutex::new(HashMap::new())),
            sync_trigger: Mutex::new(None),
        })
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count.load(Ordering::SeqCst)
    }

    /// Feed a platform transition event. Returns whether the state actually
    /// changed; repeated identical events are ignored.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }
        info!("network {}", if online { "online" } else { "offline" });

        let listeners: Vec<OnlineListener> = self
            .online_listeners
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(online);
        }

        if online {
            let trigger = self.sync_trigger.lock().unwrap().clone();
            if let Some(trigger) = trigger {
                trigger();
            }
        }
        true
    }

    /// Subscribe to online/offline transitions.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.online_listeners
            .lock()
            .unwrap()
            .insert(token, Arc::new(listener));
        Subscription::new(&self.online_listeners, token)
    }

    /// Subscribe to pending-mutation count changes. The listener is invoked
    /// immediately with the current count, then on every change.
    pub fn subscribe_pending_count(
        &self,
        listener: impl Fn(usize) + Send + Sync + 'static,
    ) -> Subscription {
        listener(self.pending_count());
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.count_listeners
            .lock()
            .unwrap()
            .insert(token, Arc::new(listener));
        Subscription::new(&self.count_listeners, token)
    }

    /// Register the single sync pass fired on each offline→online
    /// transition. The composition root wires this to the engine's drain.
    pub fn set_sync_trigger(&self, trigger: impl Fn() + Send + Sync + 'static) {
        *self.sync_trigger.lock().unwrap() = Some(Arc::new(trigger));
    }

    /// Publish a new pending-mutation count; listeners fire only on change.
    pub fn publish_pending_count(&self, count: usize) {
        let previous = self.pending_count.swap(count, Ordering::SeqCst);
        if previous == count {
            return;
        }
        let listeners: Vec<CountListener> = self
            .count_listeners
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(count);
        }
    }
}
