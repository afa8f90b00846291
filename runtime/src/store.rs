//! Ticket store abstraction and the in-memory implementation.
//!
//! The store is a key-value mapping from ticket context id to [`TicketRecord`], plus the
//! global counters and lists. Absence of a key is a normal answer; an unreachable backend is
//! a [`StoreError`] that aborts the in-flight transition before anything user-visible happens.
//!
//! Records are written with optimistic concurrency: every committed write bumps the record's
//! `version`, and [`TicketStore::compare_and_set`] refuses to overwrite a record whose version
//! moved since it was read. Counters and lists are plain read-modify-write.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use ticketdesk_core::ids::TicketId;
use ticketdesk_core::record::{Counter, ListName, TicketRecord};
use tokio::sync::RwLock;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed mid-operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic concurrency conflict: the record changed since it was read.
    #[error("Version conflict on {id}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        /// Record that changed.
        id: TicketId,
        /// Version the writer read (`None` = expected absent).
        expected: Option<u64>,
        /// Version actually stored (`None` = absent).
        actual: Option<u64>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable ticket state.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn TicketStore>` between the router, the runtime and
/// deferred purge tasks.
pub trait TicketStore: Send + Sync {
    /// Whether a record exists for `id`.
    fn has(&self, id: TicketId) -> StoreFuture<'_, bool>;

    /// The record for `id`, if any.
    fn get(&self, id: TicketId) -> StoreFuture<'_, Option<TicketRecord>>;

    /// Write `record` unconditionally, keeping its version as given.
    fn set(&self, id: TicketId, record: TicketRecord) -> StoreFuture<'_, ()>;

    /// Replace the record for `id` if its version still equals `expected`.
    ///
    /// - `expected = None` asserts the record is absent (creation).
    /// - `next = None` deletes the record.
    ///
    /// On success the written record carries `expected + 1` (or `1` for a new record) and
    /// that version is returned; a deletion returns the version that was removed.
    ///
    /// # Errors
    ///
    /// - `VersionConflict`: the stored version differs from `expected`
    /// - `Unavailable`: backend failure
    fn compare_and_set(
        &self,
        id: TicketId,
        expected: Option<u64>,
        next: Option<TicketRecord>,
    ) -> StoreFuture<'_, u64>;

    /// Remove the record for `id` unconditionally.
    fn delete(&self, id: TicketId) -> StoreFuture<'_, ()>;

    /// Every known ticket id.
    fn ids(&self) -> StoreFuture<'_, Vec<TicketId>>;

    /// Append `value` to a global list.
    fn push(&self, list: ListName, value: String) -> StoreFuture<'_, ()>;

    /// Remove every occurrence of `value` from a global list.
    fn pull(&self, list: ListName, value: String) -> StoreFuture<'_, ()>;

    /// Contents of a global list (empty if never written).
    fn list(&self, list: ListName) -> StoreFuture<'_, Vec<String>>;

    /// Current value of a counter, `None` if never written.
    fn counter(&self, counter: Counter) -> StoreFuture<'_, Option<u64>>;

    /// Overwrite a counter.
    fn set_counter(&self, counter: Counter, value: u64) -> StoreFuture<'_, ()>;
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<TicketId, TicketRecord>,
    lists: HashMap<ListName, Vec<String>>,
    counters: HashMap<Counter, u64>,
}

/// Process-local store backed by a `RwLock`ed set of hash maps.
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tables: RwLock<Tables>,
}

impl InMemoryTicketStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON snapshot of everything in the store, keyed the way the records are persisted.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if a record cannot be encoded.
    pub async fn export(&self) -> Result<serde_json::Value, StoreError> {
        let tables = self.tables.read().await;
        let mut root = serde_json::Map::new();
        for (id, record) in &tables.records {
            let value = serde_json::to_value(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            root.insert(id.to_string(), value);
        }
        for (list, values) in &tables.lists {
            root.insert(list.key().to_owned(), serde_json::json!(values));
        }
        for (counter, value) in &tables.counters {
            root.insert(counter.key().to_owned(), serde_json::json!(value));
        }
        Ok(serde_json::Value::Object(root))
    }
}

impl TicketStore for InMemoryTicketStore {
    fn has(&self, id: TicketId) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(self.tables.read().await.records.contains_key(&id)) })
    }

    fn get(&self, id: TicketId) -> StoreFuture<'_, Option<TicketRecord>> {
        Box::pin(async move { Ok(self.tables.read().await.records.get(&id).cloned()) })
    }

    fn set(&self, id: TicketId, record: TicketRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.records.insert(id, record);
            Ok(())
        })
    }

    fn compare_and_set(
        &self,
        id: TicketId,
        expected: Option<u64>,
        next: Option<TicketRecord>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let actual = tables.records.get(&id).map(|r| r.version);
            if actual != expected {
                return Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual,
                });
            }
            match next {
                Some(mut record) => {
                    let version = expected.map_or(1, |v| v + 1);
                    record.version = version;
                    tables.records.insert(id, record);
                    Ok(version)
                }
                None => {
                    tables.records.remove(&id);
                    Ok(actual.unwrap_or_default())
                }
            }
        })
    }

    fn delete(&self, id: TicketId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.records.remove(&id);
            Ok(())
        })
    }

    fn ids(&self) -> StoreFuture<'_, Vec<TicketId>> {
        Box::pin(async move { Ok(self.tables.read().await.records.keys().cloned().collect()) })
    }

    fn push(&self, list: ListName, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables
                .write()
                .await
                .lists
                .entry(list)
                .or_default()
                .push(value);
            Ok(())
        })
    }

    fn pull(&self, list: ListName, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(values) = self.tables.write().await.lists.get_mut(&list) {
                values.retain(|v| *v != value);
            }
            Ok(())
        })
    }

    fn list(&self, list: ListName) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .tables
                .read()
                .await
                .lists
                .get(&list)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn counter(&self, counter: Counter) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move { Ok(self.tables.read().await.counters.get(&counter).copied()) })
    }

    fn set_counter(&self, counter: Counter, value: u64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.counters.insert(counter, value);
            Ok(())
        })
    }
}
