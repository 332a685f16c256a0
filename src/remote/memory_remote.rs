use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::mock_behaviour::MockBehaviour;
use crate::record::{Fields, Record, RecordId};
use crate::traits::{Change, ChangeBatch, ChangeFeed, ChangeKind, RemoteStore};


#[derive(Clone, Copy, Debug, PartialEq)]
enum Readiness {
    Ready,
    /// Ready once this many checks have been refused
    After(u32),
    Never,
}

struct Listener {
    id: u64,
    sender: mpsc::UnboundedSender<ChangeBatch>,
}

struct Inner {
    collections: HashMap<String, BTreeMap<RecordId, Fields>>,
    listeners: HashMap<String, Vec<Listener>>,
    next_listener_id: u64,
    readiness: Readiness,
    behaviour: MockBehaviour,
}

/// A document store that lives in memory.
///
/// Clones share the same documents, so that a test can keep a handle on a store it gave away
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// An empty store, ready at once
    pub fn new() -> Self {
        Self::with_readiness(Readiness::Ready)
    }

    /// A store that never becomes ready
    pub fn unavailable() -> Self {
        Self::with_readiness(Readiness::Never)
    }

    /// A store that refuses `n_checks` readiness checks before answering it is ready
    pub fn ready_after(n_checks: u32) -> Self {
        Self::with_readiness(Readiness::After(n_checks))
    }

    fn with_readiness(readiness: Readiness) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections: HashMap::new(),
                listeners: HashMap::new(),
                next_listener_id: 0,
                readiness,
                behaviour: MockBehaviour::default(),
            })),
        }
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.inner.lock().unwrap().behaviour = behaviour;
    }

    pub fn set_ready(&self, ready: bool) {
        self.inner.lock().unwrap().readiness = if ready { Readiness::Ready } else { Readiness::Never };
    }

    /// Store a document without notifying anyone (used to seed tests)
    pub fn insert(&self, collection: &str, record: Record) {
        let (id, fields) = record.into_parts();
        self.inner.lock().unwrap()
            .collections.entry(collection.to_string()).or_default()
            .insert(id, fields);
    }

    /// The current documents of a collection, sorted by identifier
    pub fn records(&self, collection: &str) -> Vec<Record> {
        let inner = self.inner.lock().unwrap();
        match inner.collections.get(collection) {
            None => Vec::new(),
            Some(docs) => docs.iter().map(|(id, fields)| Record::new(id.clone(), fields.clone())).collect(),
        }
    }

    /// Number of listeners currently open on a collection
    pub fn listener_count(&self, collection: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match inner.listeners.get_mut(collection) {
            None => 0,
            Some(listeners) => {
                listeners.retain(|l| l.sender.is_closed() == false);
                listeners.len()
            },
        }
    }

    /// Deliver a batch to every listener of a collection, as is (even if it is empty)
    pub fn emit(&self, collection: &str, batch: ChangeBatch) {
        let mut inner = self.inner.lock().unwrap();
        Self::broadcast(&mut inner, collection, batch);
    }

    fn broadcast(inner: &mut Inner, collection: &str, batch: ChangeBatch) {
        if let Some(listeners) = inner.listeners.get_mut(collection) {
            listeners.retain(|listener| listener.sender.send(batch.clone()).is_ok());
        }
    }

    fn new_document_id() -> RecordId {
        let raw = uuid::Uuid::new_v4().to_simple().to_string();
        RecordId::parse(&raw[..20]).unwrap_or_else(RecordId::random)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn is_ready(&self) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_check_ready("")?;
        match inner.readiness {
            Readiness::Ready => Ok(true),
            Readiness::Never => Ok(false),
            Readiness::After(0) => {
                inner.readiness = Readiness::Ready;
                Ok(true)
            },
            Readiness::After(n) => {
                inner.readiness = Readiness::After(n - 1);
                Ok(false)
            },
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.lock().unwrap().behaviour.can_list(collection)?;
        Ok(self.records(collection))
    }

    async fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_get(collection)?;
        Ok(inner.collections.get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Record::new(id.clone(), fields.clone())))
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_create(collection)?;

        let id = Self::new_document_id();
        let record = Record::new(id.clone(), fields);
        inner.collections.entry(collection.to_string()).or_default()
            .insert(id.clone(), record.fields().clone());
        Self::broadcast(&mut inner, collection, vec![Change { kind: ChangeKind::Added, id: id.clone(), record: Some(record) }]);
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_merge(collection)?;

        let docs = inner.collections.entry(collection.to_string()).or_default();
        let (kind, record) = match docs.get_mut(id) {
            Some(existing) => {
                let mut record = Record::new(id.clone(), existing.clone());
                record.merge(&fields);
                *existing = record.fields().clone();
                (ChangeKind::Modified, record)
            },
            None => {
                let record = Record::new(id.clone(), fields);
                docs.insert(id.clone(), record.fields().clone());
                (ChangeKind::Added, record)
            },
        };
        Self::broadcast(&mut inner, collection, vec![Change { kind, id: id.clone(), record: Some(record) }]);
        Ok(())
    }

    async fn create_if_absent(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_create_if_absent(collection)?;

        let docs = inner.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        let record = Record::new(id.clone(), fields);
        docs.insert(id.clone(), record.fields().clone());
        Self::broadcast(&mut inner, collection, vec![Change { kind: ChangeKind::Added, id: id.clone(), record: Some(record) }]);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_delete(collection)?;

        let removed = inner.collections.get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            Self::broadcast(&mut inner, collection, vec![Change { kind: ChangeKind::Removed, id: id.clone(), record: None }]);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.behaviour.can_subscribe(collection)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let listener_id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.entry(collection.to_string()).or_default()
            .push(Listener { id: listener_id, sender });

        let weak = Arc::downgrade(&self.inner);
        let collection = collection.to_string();
        Ok(ChangeFeed::new(receiver, move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(listeners) = inner.lock().unwrap().listeners.get_mut(&collection) {
                    listeners.retain(|l| l.id != listener_id);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::record::fields_from;

    #[tokio::test]
    async fn readiness_after_some_checks() {
        let remote = MemoryRemote::ready_after(2);
        assert_eq!(remote.is_ready().await.unwrap(), false);
        assert_eq!(remote.is_ready().await.unwrap(), false);
        assert_eq!(remote.is_ready().await.unwrap(), true);
        assert_eq!(remote.is_ready().await.unwrap(), true);
        assert_eq!(MemoryRemote::unavailable().is_ready().await.unwrap(), false);
    }

    #[tokio::test]
    async fn create_if_absent_never_overwrites() {
        let remote = MemoryRemote::new();
        let id = RecordId::parse("42").unwrap();
        assert!(remote.create_if_absent("doctors", &id, fields_from(json!({"name": "A"}))).await.unwrap());
        assert!(remote.create_if_absent("doctors", &id, fields_from(json!({"name": "B"}))).await.unwrap() == false);
        let doc = remote.get("doctors", &id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("name"), Some("A"));
    }

    #[tokio::test]
    async fn listeners_receive_writes_until_closed() {
        let remote = MemoryRemote::new();
        let feed = remote.subscribe("shifts").await.unwrap();
        let (mut receiver, closer) = feed.into_parts();
        assert_eq!(remote.listener_count("shifts"), 1);

        let id = remote.create("shifts", fields_from(json!({"type": "guardia"}))).await.unwrap();
        let batch = receiver.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeKind::Added);
        assert_eq!(batch[0].id, id);

        remote.delete("shifts", &id).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap()[0].kind, ChangeKind::Removed);

        closer();
        assert_eq!(remote.listener_count("shifts"), 0);
    }
}
