//! This module merges the remote store and the local cache into a single data source
//!
//! A [`DataManager`] decides, for every call, whether the remote store or the local cache answers it.
//! The remote store is the source of truth once it has been confirmed ready at startup; the local cache is used
//! before that, when no remote store is configured, and for the rest of the session after a failed remote read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::Cache;
use crate::config::ReadinessPolicy;
use crate::error::StoreError;
use crate::record::{now_timestamp, stamp_created, stamp_updated, strip_id, Document, Fields, Record, RecordId};
use crate::traits::{ChangeBatch, RemoteStore};

pub mod migration;
pub mod notification;
pub mod subscription;

use notification::{notification_channel, notify, Notification, NotificationReceiver, NotificationSender};
use subscription::{Registry, Subscription};


/// Which data source is the source of truth
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// The remote document store
    Remote,
    /// The local cache
    Local,
}


/// The single access point to doctors, shifts and any other collection.
///
/// It is built once by the application and handed to every view (wrap it in an `Arc` to share it).
pub struct DataManager<R: RemoteStore> {
    /// The remote store, if one is configured
    remote: Option<R>,
    /// The local cache
    local: Mutex<Cache>,

    readiness: ReadinessPolicy,
    backend: Mutex<Backend>,
    started: AtomicBool,
    /// Whether the remote store answered the startup readiness poll
    remote_confirmed: AtomicBool,
    /// Set on the first permission error, cleared by the next successful remote read
    permission_error_raised: AtomicBool,

    subscriptions: Arc<Mutex<Registry>>,
    notifications: NotificationSender,
}

impl<R: RemoteStore> DataManager<R> {
    /// Create a data manager. Call [`Self::start`] to find out whether `remote` can be used
    pub fn new(remote: R, local: Cache, readiness: ReadinessPolicy) -> Self {
        Self::build(Some(remote), local, readiness)
    }

    /// Create a data manager that only ever uses the local cache
    pub fn local_only(local: Cache) -> Self {
        Self::build(None, local, ReadinessPolicy::never())
    }

    /// Create a data manager from an optional remote store (e.g. from [`HttpRemote::from_settings`](crate::remote::HttpRemote::from_settings))
    pub fn with_optional_remote(remote: Option<R>, local: Cache, readiness: ReadinessPolicy) -> Self {
        Self::build(remote, local, readiness)
    }

    fn build(remote: Option<R>, local: Cache, readiness: ReadinessPolicy) -> Self {
        let (notifications, _) = notification_channel();
        Self {
            remote,
            local: Mutex::new(local),
            readiness,
            backend: Mutex::new(Backend::Local),
            started: AtomicBool::new(false),
            remote_confirmed: AtomicBool::new(false),
            permission_error_raised: AtomicBool::new(false),
            subscriptions: Arc::new(Mutex::new(Registry::default())),
            notifications,
        }
    }

    /// Wait (a bounded time) for the remote store, and select the data source for this session.
    ///
    /// When the remote store is ready, [`Notification::BackendOnline`] is sent and the one-time migration sweep runs.
    /// Otherwise, the local cache is used until the end of the session: the remote store is not polled again.
    /// Calling this more than once has no effect.
    pub async fn start(&self) -> Backend {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.backend();
        }

        let remote = match &self.remote {
            None => {
                log::info!("No remote store configured, using the local cache");
                return Backend::Local;
            },
            Some(remote) => remote,
        };

        if wait_until_ready(remote, self.readiness).await == false {
            log::warn!("Remote store not ready after {} attempt(s), using the local cache for this session", self.readiness.max_attempts);
            return Backend::Local;
        }

        log::info!("Remote store is ready");
        self.remote_confirmed.store(true, Ordering::SeqCst);
        *self.backend.lock().unwrap() = Backend::Remote;
        notify(&self.notifications, Notification::BackendOnline);

        self.migrate_local_records().await;
        self.backend()
    }

    /// The current source of truth
    pub fn backend(&self) -> Backend {
        *self.backend.lock().unwrap()
    }

    /// Receive every notification sent from now on
    pub fn notifications(&self) -> NotificationReceiver {
        self.notifications.subscribe()
    }

    /// Returns the remote store, if any.
    ///
    /// Apart from tests, there are very few (if any) reasons to access it directly.
    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    /// Run `f` on the local cache
    pub fn with_local<T, F: FnOnce(&Cache) -> T>(&self, f: F) -> T {
        f(&self.local.lock().unwrap())
    }

    /// The remote store, if it is the current source of truth
    fn active_remote(&self) -> Option<&R> {
        match self.backend() {
            Backend::Remote => self.remote.as_ref(),
            Backend::Local => None,
        }
    }

    /// The remote store, if it has been confirmed ready this session (even if it is not the source of truth anymore)
    fn confirmed_remote(&self) -> Option<&R> {
        if self.remote_confirmed.load(Ordering::SeqCst) {
            self.remote.as_ref()
        } else {
            None
        }
    }

    fn fall_back_to_local(&self) {
        let mut backend = self.backend.lock().unwrap();
        if *backend == Backend::Remote {
            log::warn!("Falling back to the local cache for the rest of this session");
            *backend = Backend::Local;
        }
    }

    fn raise_permission_error(&self, collection: &str) {
        if self.permission_error_raised.swap(true, Ordering::SeqCst) == false {
            notify(&self.notifications, Notification::PermissionDenied { collection: collection.to_string() });
        }
    }

    fn remote_read_succeeded(&self) {
        self.permission_error_raised.store(false, Ordering::SeqCst);
    }

    fn collection_changed(&self, collection: &str) {
        notify(&self.notifications, Notification::CollectionChanged { collection: collection.to_string() });
    }

    fn write_failed(&self, collection: &str, err: &StoreError) {
        if err.is_permission() {
            self.raise_permission_error(collection);
        }
        notify(&self.notifications, Notification::WriteFailed { collection: collection.to_string(), reason: err.to_string() });
    }


    /// Every valid record of a collection.
    ///
    /// A failed remote read is not an error: it makes the local cache the source of truth for the rest of the
    /// session, and the local cache answers.
    pub async fn get_all(&self, collection: &str) -> Vec<Record> {
        if let Some(remote) = self.active_remote() {
            match remote.list(collection).await {
                Ok(records) => {
                    self.remote_read_succeeded();
                    return records;
                },
                Err(err) => {
                    log::warn!("Unable to list remote {}: {}", collection, err);
                    self.fall_back_to_local();
                    if err.is_permission() {
                        self.raise_permission_error(collection);
                    }
                },
            }
        }

        self.get_all_local(collection)
    }

    fn get_all_local(&self, collection: &str) -> Vec<Record> {
        let purged = self.local.lock().unwrap().purge_invalid(collection);
        match purged {
            Ok((records, n_dropped)) => {
                if n_dropped > 0 {
                    self.collection_changed(collection);
                }
                records
            },
            Err(err) => {
                log::error!("Unable to read the cached {}: {}", collection, err);
                Vec::new()
            },
        }
    }

    /// A single record, or `None` if there is no such record.
    ///
    /// Empty and placeholder identifiers are rejected without asking any data source.
    /// A failed remote lookup is answered by the local cache, but does not change the source of truth.
    pub async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let id = RecordId::parse(id).ok_or_else(|| StoreError::InvalidId(id.to_string()))?;

        if let Some(remote) = self.active_remote() {
            match remote.get(collection, &id).await {
                Ok(found) => {
                    self.remote_read_succeeded();
                    return Ok(found);
                },
                Err(err) => {
                    log::warn!("Unable to get remote {} {}: {}", collection, id, err);
                    if err.is_permission() {
                        self.raise_permission_error(collection);
                    }
                },
            }
        }

        let found = self.local.lock().unwrap().find_record(collection, &id);
        match found {
            Ok(found) => Ok(found),
            Err(err) => {
                log::error!("Unable to read the cached {}: {}", collection, err);
                Ok(None)
            },
        }
    }

    /// Create (`id` is `None`, empty or a placeholder) or update a record, and return its identifier.
    ///
    /// Updates are merged: fields that `data` does not mention are kept.
    /// Any `id` member of `data` is ignored. `updatedAt` is always set, `createdAt` only on creation.
    ///
    /// A rejected remote write is returned as an error: it is never silently written to the local cache instead.
    pub async fn save(&self, collection: &str, data: Fields, id: Option<&str>) -> Result<RecordId, StoreError> {
        let id = id.and_then(RecordId::parse);

        let mut fields = data;
        strip_id(&mut fields);
        let now = now_timestamp();
        match &id {
            None => stamp_created(&mut fields, &now),
            Some(_) => stamp_updated(&mut fields, &now),
        }

        if let Some(remote) = self.active_remote() {
            let result = match &id {
                None => remote.create(collection, fields).await,
                Some(id) => remote.merge(collection, id, fields).await.map(|()| id.clone()),
            };
            return match result {
                Ok(saved_id) => {
                    log::debug!("Saved remote {} {}", collection, saved_id);
                    Ok(saved_id)
                },
                Err(err) => {
                    log::error!("Unable to save to remote {}: {}", collection, err);
                    self.write_failed(collection, &err);
                    Err(err)
                },
            };
        }

        self.save_local(collection, fields, id)
    }

    fn save_local(&self, collection: &str, fields: Fields, id: Option<RecordId>) -> Result<RecordId, StoreError> {
        let result = {
            let mut local = self.local.lock().unwrap();
            match id {
                None => {
                    let new_id = RecordId::random();
                    local.insert_record(collection, Record::new(new_id.clone(), fields))
                        .map(|()| new_id)
                },
                Some(id) => local.merge_record(collection, &id, &fields)
                    .map(|_| id),
            }
        };

        match result {
            Ok(saved_id) => {
                log::debug!("Saved cached {} {}", collection, saved_id);
                self.collection_changed(collection);
                Ok(saved_id)
            },
            Err(err) => {
                log::error!("Unable to save to the cached {}: {}", collection, err);
                self.write_failed(collection, &err);
                Err(err)
            },
        }
    }

    /// Remove a record from both data sources, whichever is the source of truth, so that no stale copy survives.
    ///
    /// Returns whether a data source removed it. Errors are logged, never returned.
    pub async fn delete(&self, collection: &str, id: &str) -> bool {
        let id = match RecordId::parse(id) {
            None => {
                log::warn!("Refusing to delete {} with invalid identifier {:?}", collection, id);
                return false;
            },
            Some(id) => id,
        };

        let mut removed = false;
        if let Some(remote) = self.confirmed_remote() {
            match remote.delete(collection, &id).await {
                Ok(()) => removed = true,
                Err(err) => {
                    log::warn!("Unable to delete remote {} {}: {}", collection, id, err);
                    if err.is_permission() {
                        self.raise_permission_error(collection);
                    }
                },
            }
        }

        let local_result = self.local.lock().unwrap().remove_record(collection, &id);
        match local_result {
            Ok(true) => {
                removed = true;
                self.collection_changed(collection);
            },
            Ok(false) => {},
            Err(err) => log::warn!("Unable to delete cached {} {}: {}", collection, id, err),
        }

        removed
    }

    /// Call `on_change` with every non-empty batch of changes of a collection.
    ///
    /// This only works while the remote store is the source of truth; otherwise the returned subscription is inert.
    /// There is at most one live subscription per collection: subscribing again closes the previous one.
    pub async fn subscribe<F>(&self, collection: &str, on_change: F) -> Subscription
    where
        F: Fn(ChangeBatch) + Send + Sync + 'static,
    {
        let remote = match self.active_remote() {
            None => {
                log::debug!("No live subscription on {}: the local cache is the source of truth", collection);
                return Subscription::inert(collection);
            },
            Some(remote) => remote,
        };

        let feed = match remote.subscribe(collection).await {
            Ok(feed) => feed,
            Err(err) => {
                log::warn!("Unable to subscribe to remote {}: {}", collection, err);
                if err.is_permission() {
                    self.raise_permission_error(collection);
                }
                return Subscription::inert(collection);
            },
        };

        let (mut receiver, closer) = feed.into_parts();
        let notifications = self.notifications.clone();
        let name = collection.to_string();
        let task = tokio::spawn(async move {
            while let Some(batch) = receiver.recv().await {
                if batch.is_empty() {
                    log::trace!("Ignoring an empty change batch on {}", name);
                    continue;
                }
                log::debug!("{} change(s) on {}", batch.len(), name);
                on_change(batch);
                notify(&notifications, Notification::CollectionChanged { collection: name.clone() });
            }
        });

        let token = self.subscriptions.lock().unwrap().replace(collection, task, closer);
        Subscription::live(collection, token, Arc::downgrade(&self.subscriptions))
    }

    /// Close every live subscription. Returns how many were closed
    pub fn unsubscribe_all(&self) -> usize {
        self.subscriptions.lock().unwrap().close_all()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }


    /// Every record of a collection that parses as a `D`
    pub async fn get_all_documents<D: Document>(&self) -> Vec<D> {
        self.get_all(D::COLLECTION).await
            .iter()
            .filter_map(|record| match D::from_record(record) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    log::warn!("Ignoring malformed {} {}: {}", D::COLLECTION, record.id(), err);
                    None
                },
            })
            .collect()
    }

    /// A single document, parsed as a `D`
    pub async fn get_document<D: Document>(&self, id: &str) -> Result<Option<D>, StoreError> {
        match self.get_by_id(D::COLLECTION, id).await? {
            None => Ok(None),
            Some(record) => Ok(Some(D::from_record(&record)?)),
        }
    }

    /// Save a document. Its own identifier (if any) selects an update rather than a creation
    pub async fn save_document<D: Document>(&self, doc: &D) -> Result<RecordId, StoreError> {
        let id = doc.id().map(|id| id.to_string());
        self.save(D::COLLECTION, doc.to_fields()?, id.as_deref()).await
    }
}

impl<R: RemoteStore> Drop for DataManager<R> {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.subscriptions.lock() {
            registry.close_all();
        }
    }
}

/// Poll the remote store until it is ready, at most `policy.max_attempts` times
async fn wait_until_ready<R: RemoteStore>(remote: &R, policy: ReadinessPolicy) -> bool {
    let poll = async {
        for attempt in 1..=policy.max_attempts {
            match remote.is_ready().await {
                Ok(true) => return true,
                Ok(false) => log::debug!("Remote store not ready yet (attempt {}/{})", attempt, policy.max_attempts),
                Err(err) => log::debug!("Remote store readiness check failed (attempt {}/{}): {}", attempt, policy.max_attempts, err),
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        false
    };

    match tokio::time::timeout(policy.timeout(), poll).await {
        Ok(ready) => ready,
        Err(_) => {
            log::warn!("Remote store readiness poll timed out after {:?}", policy.timeout());
            false
        },
    }
}
