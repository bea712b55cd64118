use crate::api::ApiError;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("operation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl StoreError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Api(err) => err.is_cancelled(),
        }
    }
}

/// State container that hands out snapshots and notifies subscribers after
/// every committed change.
///
/// Listeners run synchronously on the mutating task, in registration order,
/// after the state lock has been released. A listener may therefore read the
/// snapshot or drop its own subscription while being notified.
pub struct ObservableStore<S> {
    state: RwLock<S>,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl<S: Clone> ObservableStore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: RwLock::new(initial),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> S {
        self.state.read().clone()
    }

    /// Read a projection of the state without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read())
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn set(&self, next: S) {
        *self.state.write() = next;
        self.notify();
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = {
            let mut state = self.state.write();
            f(&mut state)
        };
        self.notify();
        result
    }

    /// Like [`update`](Self::update), but only notifies when `f` reports a change.
    pub(crate) fn update_if(&self, f: impl FnOnce(&mut S) -> bool) -> bool {
        let changed = {
            let mut state = self.state.write();
            f(&mut state)
        };
        if changed {
            self.notify();
        }
        changed
    }

    pub(crate) fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl<S: Clone + Default> Default for ObservableStore<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

/// Handle for one listener registration.
///
/// Dropping the handle keeps the listener registered; only
/// [`Subscription::unsubscribe`] removes it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, Listener)>>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
