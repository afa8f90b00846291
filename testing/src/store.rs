//! A [`TicketStore`] that can be told to fail, to lose a commit race or to stall a write.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use ticketdesk_core::ids::TicketId;
use ticketdesk_core::record::{Counter, ListName, TicketRecord};
use ticketdesk_runtime::store::{InMemoryTicketStore, StoreError, StoreFuture, TicketStore};

type Race = Box<dyn FnOnce(&mut TicketRecord) + Send>;

/// In-memory store with failure injection.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryTicketStore,
    unavailable: AtomicBool,
    conflicts: AtomicUsize,
    race: Mutex<Option<Race>>,
    stalled_pull: Mutex<Option<Duration>>,
}

impl FlakyStore {
    /// Healthy store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` compare-and-set calls with a version conflict.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Before the next compare-and-set, let a competing writer change the stored record.
    pub fn race_next_commit(&self, competing: impl FnOnce(&mut TicketRecord) + Send + 'static) {
        *self.race.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(competing));
    }

    /// Hold the next list removal for `delay` before it reaches the store.
    pub fn stall_next_pull(&self, delay: Duration) {
        *self.stalled_pull.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryTicketStore {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for FlakyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyStore")
            .field("unavailable", &self.unavailable)
            .field("conflicts", &self.conflicts)
            .finish_non_exhaustive()
    }
}

impl TicketStore for FlakyStore {
    fn has(&self, id: TicketId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check()?;
            self.inner.has(id).await
        })
    }

    fn get(&self, id: TicketId) -> StoreFuture<'_, Option<TicketRecord>> {
        Box::pin(async move {
            self.check()?;
            self.inner.get(id).await
        })
    }

    fn set(&self, id: TicketId, record: TicketRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.set(id, record).await
        })
    }

    fn compare_and_set(
        &self,
        id: TicketId,
        expected: Option<u64>,
        next: Option<TicketRecord>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check()?;

            let race = self.race.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(competing) = race {
                if let Some(mut record) = self.inner.get(id.clone()).await? {
                    competing(&mut record);
                    record.version += 1;
                    self.inner.set(id.clone(), record).await?;
                }
            }

            let injected = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual: expected.map(|v| v + 1),
                });
            }

            self.inner.compare_and_set(id, expected, next).await
        })
    }

    fn delete(&self, id: TicketId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.delete(id).await
        })
    }

    fn ids(&self) -> StoreFuture<'_, Vec<TicketId>> {
        Box::pin(async move {
            self.check()?;
            self.inner.ids().await
        })
    }

    fn push(&self, list: ListName, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.push(list, value).await
        })
    }

    fn pull(&self, list: ListName, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            let stall = self
                .stalled_pull
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(delay) = stall {
                tokio::time::sleep(delay).await;
            }
            self.inner.pull(list, value).await
        })
    }

    fn list(&self, list: ListName) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.list(list).await
        })
    }

    fn counter(&self, counter: Counter) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            self.check()?;
            self.inner.counter(counter).await
        })
    }

    fn set_counter(&self, counter: Counter, value: u64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.set_counter(counter, value).await
        })
    }
}
