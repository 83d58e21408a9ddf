//! Asynchronous glue between a JSON-API backend and the payload engine
//!
//! [`Transport`] is the seam to the HTTP layer; connection handling, retries
//! and authentication live behind it. [`Source`] binds one resource name to a
//! transport and runs the payload engine before and after each request.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Mutex;
use thiserror::Error;

use crate::error::PayloadError;
use crate::model::{Collection, Entity, Resource};
use crate::payload::Payload;
use crate::query::Query;
use crate::types::{ErrorObject, PayloadConfig};

#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status; `body` is its decoded
    /// response, `Value::Null` when there was none.
    #[error("server responded with status {status}")]
    Status { status: u16, body: Value },

    #[error("network error: {0}")]
    Network(String),
}

/// Request/response seam to a JSON-API server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: &Map<String, Value>) -> Result<Value, TransportError>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError>;

    async fn patch(&self, path: &str, body: &Value) -> Result<Value, TransportError>;

    async fn delete(&self, path: &str, body: &Value) -> Result<Value, TransportError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The response document carried `errors` instead of data.
    #[error("server returned {} error(s)", .0.len())]
    Rejected(Vec<ErrorObject>),
}

/// Rows exported from a fetched document, with its `meta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub rows: Vec<Map<String, Value>>,
    pub meta: Map<String, Value>,
}

/// Entities sent in one bulk request.
struct Batch<'a>(&'a [&'a dyn Entity]);

impl Collection for Batch<'_> {
    fn members(&self) -> Vec<Resource<'_>> {
        self.0.iter().map(|entity| Resource::Entity(*entity)).collect()
    }

    fn meta(&self) -> Map<String, Value> {
        Map::new()
    }
}

pub struct Source<T: Transport> {
    name: String,
    transport: T,
    config: PayloadConfig,
    last_insert: Mutex<Option<Map<String, Value>>>,
}

impl<T: Transport> Source<T> {
    /// `name` is the resource source name; requests go to `/<name>`.
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Source {
            name: name.into(),
            transport,
            config: PayloadConfig::default(),
            last_insert: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: PayloadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn key(&self) -> &str {
        self.config.key_for(&self.name)
    }

    fn endpoint(&self) -> String {
        format!("/{}", self.name)
    }

    /// A query on this source's endpoint.
    pub fn query(&self) -> Query {
        Query::new(self.endpoint(), self.key())
    }

    pub async fn fetch(&self, query: &Query) -> Result<Fetched, SourceError> {
        let body = self.transport.get(&query.path(), &query.query_string()).await?;
        let payload = Payload::parse_with(body, self.config.clone())?;

        let errors = payload.errors();
        if !errors.is_empty() {
            return Err(SourceError::Rejected(errors));
        }
        Ok(Fetched {
            rows: payload.export(None)?,
            meta: payload.meta().clone(),
        })
    }

    pub async fn first(&self, query: &Query) -> Result<Option<Map<String, Value>>, SourceError> {
        Ok(self.fetch(query).await?.rows.into_iter().next())
    }

    /// POSTs `entities` as one collection document. Nothing is sent when the
    /// slice is empty.
    pub async fn bulk_insert(&self, entities: &[&dyn Entity]) -> Result<(), SourceError> {
        if entities.is_empty() {
            return Ok(());
        }
        let body = self.batch_document(entities)?;

        match self.transport.post(&self.endpoint(), &body).await {
            Ok(response) => {
                let inserted = Payload::parse_with(response, self.config.clone())?;
                let row = if inserted.is_collection() {
                    None
                } else {
                    inserted.export(None)?.into_iter().next()
                };
                if let Ok(mut last) = self.last_insert.lock() {
                    *last = row;
                }
                tracing::debug!(source = %self.name, count = entities.len(), "bulk insert");
                Ok(())
            }
            Err(err) => {
                log_rejections(entities, &err);
                Err(err.into())
            }
        }
    }

    /// PATCHes `entities` as one collection document. Nothing is sent when
    /// the slice is empty.
    pub async fn bulk_update(&self, entities: &[&dyn Entity]) -> Result<(), SourceError> {
        if entities.is_empty() {
            return Ok(());
        }
        let body = self.batch_document(entities)?;

        match self.transport.patch(&self.endpoint(), &body).await {
            Ok(_) => {
                tracing::debug!(source = %self.name, count = entities.len(), "bulk update");
                Ok(())
            }
            Err(err) => {
                log_rejections(entities, &err);
                Err(err.into())
            }
        }
    }

    /// Sends a delete-by-identity document. Returns `false` when the
    /// transport reports a failure.
    pub async fn delete<'r>(&self, resource: impl Into<Resource<'r>>) -> Result<bool, SourceError> {
        let mut payload = Payload::with_config(self.config.clone());
        payload.delete(resource);
        let body = payload.to_json()?;

        match self.transport.delete(&self.endpoint(), &body).await {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::warn!(source = %self.name, error = %err, "delete failed");
                Ok(false)
            }
        }
    }

    /// Primary key of the resource returned by the last insert; `None` when
    /// that response held a collection.
    pub fn last_insert_id(&self) -> Option<Value> {
        let last = self.last_insert.lock().ok()?;
        let row = last.as_ref()?;
        row.get(self.key()).cloned()
    }

    fn batch_document(&self, entities: &[&dyn Entity]) -> Result<Value, SourceError> {
        let batch = Batch(entities);
        let mut payload = Payload::with_config(self.config.clone());
        payload.set(Resource::Collection(&batch));
        Ok(payload.to_json()?)
    }
}

/// Pairs each server-side error with the entity sent at the same index.
fn log_rejections(entities: &[&dyn Entity], err: &TransportError) {
    let TransportError::Status { status, body } = err else {
        tracing::error!(error = %err, "request failed");
        return;
    };
    let errors = body.get("errors").and_then(Value::as_array);
    for (index, error) in errors.into_iter().flatten().enumerate() {
        let entity = entities.get(index);
        tracing::error!(
            status,
            index,
            resource_type = entity.map(|e| e.source_name()).unwrap_or("unknown"),
            id = ?entity.and_then(|e| e.id()),
            error = %error,
            "entity rejected"
        );
    }
}
