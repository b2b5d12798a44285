//! Embedded ordered key-value storage
//!
//! Backends expose a sorted string keyspace with atomic write batches.
//! [`SqliteStore`] is the durable backend, [`MemoryStore`] keeps everything
//! in a `BTreeMap`.

mod batch;
mod error;
mod memory;
mod sqlite;

pub use batch::{BatchOp, WriteBatch};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A sorted key-value store.
pub trait OrderedStore: Send + Sync {
    /// Apply every operation of the batch, or none of them.
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// All pairs in ascending key order
    fn scan(&self) -> Result<Vec<(String, String)>>;

    /// Pairs whose key starts with `prefix`, in ascending key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}
