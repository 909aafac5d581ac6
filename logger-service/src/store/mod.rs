//! Storage layer for log records.
//!
//! ```text
//! rest handlers ─┐
//!                ├─→ Arc<dyn LogStore> ─→ Models ─→ ConnectionHandle (one per process)
//! rpc sessions ──┘                    └─→ MemoryLogStore (--dev)
//! ```
//!
//! Transports only see [`LogStore`], [`LogRecord`] and [`PersistenceError`];
//! driver types stay inside this module.

pub mod connector;
mod error;
mod memory;
mod mongo;
mod traits;

pub use connector::{ConnectionHandle, ReleaseOutcome, connect};
pub use error::{ConnectionError, PersistenceError, Result};
pub use memory::MemoryLogStore;
pub use mongo::Models;
pub use traits::{
    DEFAULT_FIND_LIMIT, FindQuery, LogRecord, LogStore, MAX_FIND_LIMIT, NewLogEntry,
};
