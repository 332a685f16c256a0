//! A document store reached over HTTP
//!
//! Routes are relative to a base URL:
//! * `GET health` answers 2xx when the store is ready
//! * `collections/{collection}/documents` (`GET` lists, `POST` creates)
//! * `collections/{collection}/documents/{id}` (`GET`, `PATCH` merges, `PUT` + `If-None-Match: *` creates under a given id, `DELETE`)
//! * `collections/{collection}/changes?since={cursor}` is a long-poll change feed

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::config::Settings;
use crate::error::StoreError;
use crate::record::{Fields, Record, RecordId};
use crate::traits::{Change, ChangeBatch, ChangeFeed, RemoteStore};

/// Pause between two long-polls of the change feed, and after a failed one
const CHANGES_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChangesPage {
    cursor: String,
    #[serde(default)]
    changes: Vec<Change>,
}


/// A remote document store, reached over HTTP.
/// Clone is cheap, clones share the connection pool.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
    poll_interval: Duration,
}

impl HttpRemote {
    /// Create a client. This does not start a connection
    pub fn new(base: Url, token: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!("{} cannot be used as a base URL", base)));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base,
            token,
            poll_interval: Duration::from_millis(CHANGES_POLL_INTERVAL_MS),
        })
    }

    /// The remote store described by `settings`, if any
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, StoreError> {
        match &settings.remote_url {
            None => Ok(None),
            Some(url) => Ok(Some(Self::new(url.clone(), settings.auth_token.clone(), settings.request_timeout)?)),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("{} cannot be used as a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn documents_url(&self, collection: &str) -> Result<Url, StoreError> {
        self.url(&["collections", collection, "documents"])
    }

    fn document_url(&self, collection: &str, id: &RecordId) -> Result<Url, StoreError> {
        self.url(&["collections", collection, "documents", id.as_str()])
    }

    fn changes_url(&self, collection: &str, cursor: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.url(&["collections", collection, "changes"])?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("since", cursor);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let user_agent = crate::config::USER_AGENT.lock().unwrap().clone();
        let builder = self.client
            .request(method, url)
            .header(USER_AGENT, user_agent);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn non-success statuses into errors
    async fn check_response(response: Response, collection: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_status(status, &body, collection))
    }

    async fn fetch_changes(&self, collection: &str, cursor: Option<&str>) -> Result<ChangesPage, StoreError> {
        let url = self.changes_url(collection, cursor)?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    /// Merge `fields` into an existing document. Returns `false` if there is no such document
    async fn patch(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<bool, StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::PATCH, url)
            .header(CONTENT_TYPE, "application/json")
            .json(fields)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check_response(response, collection).await?;
        Ok(true)
    }

    /// Long-poll the change feed until the receiver goes away or access is refused.
    ///
    /// Transient errors are retried forever, `poll_interval` apart (no backoff): the feed is closed by its owner,
    /// not by the network.
    async fn run_change_feed(self, collection: String, sender: mpsc::UnboundedSender<ChangeBatch>) {
        let mut cursor: Option<String> = None;
        loop {
            match self.fetch_changes(&collection, cursor.as_deref()).await {
                Ok(page) => {
                    if sender.send(page.changes).is_err() {
                        log::debug!("Change feed of {} has no receiver anymore", collection);
                        break;
                    }
                    cursor = Some(page.cursor);
                },
                Err(err) if err.is_permission() => {
                    log::warn!("Change feed of {} refused: {}. Closing it", collection, err);
                    break;
                },
                Err(err) => {
                    log::warn!("Unable to poll the change feed of {}: {}", collection, err);
                },
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn is_ready(&self) -> Result<bool, StoreError> {
        let url = self.url(&["health"])?;
        let response = self.request(Method::GET, url).send().await?;
        Ok(response.status().is_success())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let url = self.documents_url(collection)?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check_response(response, collection).await?;

        let documents: Vec<Value> = response.json().await?;
        let n_documents = documents.len();
        let records: Vec<Record> = documents.into_iter().filter_map(Record::from_value).collect();
        if records.len() != n_documents {
            log::warn!("{} remote document(s) of {} have no valid identifier, ignoring them", n_documents - records.len(), collection);
        }
        Ok(records)
    }

    async fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_response(response, collection).await?;

        let document: Value = response.json().await?;
        match Record::from_value(document) {
            None => Err(StoreError::InvalidResponse(format!("document {} of {} has no valid identifier", id, collection))),
            Some(record) if record.id() != id => Err(StoreError::InvalidResponse(
                format!("asked for document {} of {}, got {}", id, collection, record.id()))),
            Some(record) => Ok(Some(record)),
        }
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let url = self.documents_url(collection)?;
        let response = self.request(Method::POST, url)
            .header(CONTENT_TYPE, "application/json")
            .json(&fields)
            .send()
            .await?;
        let response = Self::check_response(response, collection).await?;

        let created: CreatedResponse = response.json().await?;
        RecordId::parse(&created.id)
            .ok_or_else(|| StoreError::InvalidResponse(format!("the store assigned an invalid identifier {:?}", created.id)))
    }

    async fn merge(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<(), StoreError> {
        if self.patch(collection, id, &fields).await? {
            return Ok(());
        }

        log::debug!("{} {} does not exist remotely, creating it", collection, id);
        if self.create_if_absent(collection, id, fields.clone()).await? {
            return Ok(());
        }

        // Created by someone else in the meantime
        if self.patch(collection, id, &fields).await? {
            return Ok(());
        }
        Err(StoreError::Conflict(format!("{} {} keeps appearing and disappearing", collection, id)))
    }

    async fn create_if_absent(&self, collection: &str, id: &RecordId, fields: Fields) -> Result<bool, StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::PUT, url)
            .header("If-None-Match", "*")
            .header(CONTENT_TYPE, "application/json")
            .json(&fields)
            .send()
            .await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(false);
        }
        Self::check_response(response, collection).await?;
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_response(response, collection).await?;
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError> {
        // Fail early on an unusable URL, rather than in the background task
        self.changes_url(collection, None)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run_change_feed(collection.to_string(), sender));
        Ok(ChangeFeed::new(receiver, move || task.abort()))
    }
}
