//! LogStore trait definitions.
//!
//! Both transports talk to storage through [`LogStore`]; nothing above this
//! layer sees driver types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;

/// Default number of records returned by [`LogStore::find`].
pub const DEFAULT_FIND_LIMIT: u32 = 100;
/// Upper bound on records returned by a single [`LogStore::find`].
pub const MAX_FIND_LIMIT: u32 = 1000;

/// A persisted log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub name: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to persist a new log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub name: String,
    pub data: String,
}

impl NewLogEntry {
    pub(crate) fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(super::PersistenceError::InvalidArgument(
                "log entry name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for listing recent records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FindQuery {
    pub limit: Option<u32>,
}

impl FindQuery {
    /// Limit after applying the default and the upper bound.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_FIND_LIMIT as usize,
            Some(n) => n.min(MAX_FIND_LIMIT) as usize,
        }
    }
}

/// Persistence facade shared by the HTTP and RPC transports.
///
/// Implementations must be safe to call concurrently; they rely on the
/// backing driver for synchronization rather than adding their own locks
/// around network calls.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist an entry and return the id assigned by the store.
    async fn insert(&self, entry: NewLogEntry) -> Result<String>;

    /// List records, most recent first.
    async fn find(&self, query: FindQuery) -> Result<Vec<LogRecord>>;

    /// Get a record by id.
    async fn get(&self, id: &str) -> Result<Option<LogRecord>>;
}
