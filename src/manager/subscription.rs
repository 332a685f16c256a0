//! Live subscriptions, at most one per collection

use std::collections::HashMap;
use std::sync::{Mutex, Weak};

use tokio::task::JoinHandle;

struct LiveSubscription {
    token: u64,
    task: JoinHandle<()>,
    closer: Box<dyn FnOnce() + Send + Sync>,
}

impl LiveSubscription {
    fn close(self) {
        (self.closer)();
        self.task.abort();
    }
}

/// The live subscriptions of a data manager, by collection
#[derive(Default)]
pub(crate) struct Registry {
    next_token: u64,
    live: HashMap<String, LiveSubscription>,
}

impl Registry {
    /// Register the listener of `collection`. A listener that was already registered for it is closed first
    pub(crate) fn replace(&mut self, collection: &str, task: JoinHandle<()>, closer: Box<dyn FnOnce() + Send + Sync>) -> u64 {
        let token = self.next_token;
        self.next_token += 1;

        if let Some(previous) = self.live.remove(collection) {
            log::debug!("Replacing the live subscription on {}", collection);
            previous.close();
        }
        self.live.insert(collection.to_string(), LiveSubscription { token, task, closer });
        token
    }

    /// Close the listener of `collection`, unless it has been replaced since `token` was handed out
    pub(crate) fn remove(&mut self, collection: &str, token: u64) -> bool {
        match self.live.get(collection) {
            Some(sub) if sub.token == token => {},
            _ => return false,
        }
        match self.live.remove(collection) {
            Some(sub) => {
                sub.close();
                true
            },
            None => false,
        }
    }

    pub(crate) fn is_live(&self, collection: &str, token: u64) -> bool {
        self.live.get(collection).map(|sub| sub.token == token).unwrap_or(false)
    }

    pub(crate) fn close_all(&mut self) -> usize {
        let n = self.live.len();
        for (_, sub) in self.live.drain() {
            sub.close();
        }
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }
}


/// The handle returned by [`DataManager::subscribe`](crate::DataManager::subscribe)
///
/// Dropping it does not close the subscription, call [`Subscription::unsubscribe`] for that.
#[derive(Debug)]
pub struct Subscription {
    collection: String,
    /// `None` for inert subscriptions (nothing to close)
    live: Option<(u64, Weak<Mutex<Registry>>)>,
}

impl Subscription {
    pub(crate) fn live(collection: &str, token: u64, registry: Weak<Mutex<Registry>>) -> Self {
        Self { collection: collection.to_string(), live: Some((token, registry)) }
    }

    /// A subscription that never delivers anything
    pub(crate) fn inert(collection: &str) -> Self {
        Self { collection: collection.to_string(), live: None }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether this subscription still delivers changes (it has not been closed, nor replaced by a newer one)
    pub fn is_active(&self) -> bool {
        match &self.live {
            None => false,
            Some((token, registry)) => match registry.upgrade() {
                None => false,
                Some(registry) => registry.lock().unwrap().is_live(&self.collection, *token),
            },
        }
    }

    /// Stop listening. This is a no-op for inert or superseded subscriptions
    pub fn unsubscribe(self) {
        if let Some((token, registry)) = self.live {
            if let Some(registry) = registry.upgrade() {
                if registry.lock().unwrap().remove(&self.collection, token) {
                    log::debug!("Closed the live subscription on {}", self.collection);
                }
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("live", &self.live.keys().collect::<Vec<_>>()).finish()
    }
}
