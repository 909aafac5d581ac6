//! MongoDB implementation of [`LogStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::connector::ConnectionHandle;
use super::error::{PersistenceError, Result};
use super::traits::{FindQuery, LogRecord, LogStore, NewLogEntry};

const LOG_COLLECTION: &str = "logs";

/// On-disk shape of a log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    data: String,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl From<LogDocument> for LogRecord {
    fn from(doc: LogDocument) -> Self {
        Self {
            id: doc.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            name: doc.name,
            data: doc.data,
            created_at: to_chrono(doc.created_at),
            updated_at: to_chrono(doc.updated_at),
        }
    }
}

fn to_chrono(dt: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

fn backend(err: mongodb::error::Error) -> PersistenceError {
    PersistenceError::Backend(err.to_string())
}

/// Persistence facade over the shared store connection.
pub struct Models {
    handle: Arc<ConnectionHandle>,
    logs: Collection<LogDocument>,
}

impl Models {
    pub fn new(handle: Arc<ConnectionHandle>) -> Self {
        let logs = handle.database().collection(LOG_COLLECTION);
        Self { handle, logs }
    }
}

#[async_trait]
impl LogStore for Models {
    async fn insert(&self, entry: NewLogEntry) -> Result<String> {
        entry.check()?;

        let now = bson::DateTime::now();
        let doc = LogDocument {
            id: None,
            name: entry.name,
            data: entry.data,
            created_at: now,
            updated_at: now,
        };

        let result = self.logs.insert_one(doc).await.map_err(backend)?;
        let id = result
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .ok_or_else(|| PersistenceError::Backend("store assigned a non-ObjectId id".into()))?;

        debug!(endpoint = %self.handle.endpoint(), id = %id, "Inserted log entry");
        Ok(id)
    }

    async fn find(&self, query: FindQuery) -> Result<Vec<LogRecord>> {
        let cursor = self
            .logs
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .limit(query.effective_limit() as i64)
            .await
            .map_err(backend)?;

        let docs: Vec<LogDocument> = cursor.try_collect().await.map_err(backend)?;
        Ok(docs.into_iter().map(Into::into).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LogRecord>> {
        let oid = ObjectId::parse_str(id)
            .map_err(|_| PersistenceError::InvalidArgument(format!("malformed id: {}", id)))?;

        let doc = self
            .logs
            .find_one(doc! { "_id": oid })
            .await
            .map_err(backend)?;
        Ok(doc.map(Into::into))
    }
}
