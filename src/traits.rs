//! Traits and types shared by every remote document store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::record::{Fields, Record, RecordId};

/// What happened to a remote document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single change, as delivered by a live listener
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub id: RecordId,
    /// The new state of the record (`None` for removals)
    #[serde(default)]
    pub record: Option<Record>,
}

/// Changes that the remote store delivers together
pub type ChangeBatch = Vec<Change>;


/// A live change listener, opened by [`RemoteStore::subscribe`]
pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<ChangeBatch>,
    closer: Box<dyn FnOnce() + Send + Sync>,
}

impl ChangeFeed {
    /// `closer` is called once, when the listener is no longer needed
    pub fn new<F>(receiver: mpsc::UnboundedReceiver<ChangeBatch>, closer: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self { receiver, closer: Box::new(closer) }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<ChangeBatch>, Box<dyn FnOnce() + Send + Sync>) {
        (self.receiver, self.closer)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed").finish_non_exhaustive()
    }
}


/// A remote document database, organized in named collections.
///
/// Its availability is never guaranteed: every call may fail
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the store currently answers requests
    async fn is_ready(&self) -> Result<bool, StoreError>;

    /// Every document of a collection
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// A single document, or `None` if it does not exist
    async fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Create a document. The store picks its identifier
    async fn create(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError>;

    /// Merge `fields` into a document, keeping the fields they do not mention.
    /// A missing document is created with this identifier
    async fn merge(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<(), StoreError>;

    /// Create a document under a caller-chosen identifier, unless it already exists.
    ///
    /// Returns `false` (and changes nothing) when a document already has this identifier
    async fn create_if_absent(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<bool, StoreError>;

    /// Delete a document. Deleting a missing document is not an error
    async fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError>;

    /// Open a live listener on a collection
    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError>;
}
