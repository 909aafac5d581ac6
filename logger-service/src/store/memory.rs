//! In-memory [`LogStore`] for development mode and tests.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::Result;
use super::traits::{FindQuery, LogRecord, LogStore, NewLogEntry};

/// Process-local log storage. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryLogStore {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, entry: NewLogEntry) -> Result<String> {
        entry.check()?;

        let now = Utc::now();
        let record = LogRecord {
            id: Uuid::new_v4().to_string(),
            name: entry.name,
            data: entry.data,
            created_at: now,
            updated_at: now,
        };
        let id = record.id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn find(&self, query: FindQuery) -> Result<Vec<LogRecord>> {
        let records = self.records.read().await;
        // Insertion order is creation order.
        Ok(records
            .iter()
            .rev()
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LogRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}
