//! # Ticketdesk Runtime
//!
//! Drives the pure lifecycle engine against durable state and the outside world.
//!
//! ## Core Components
//!
//! - **Ticket store** ([`store`]): records, counters and the open-ticket index
//! - **Ports** ([`ports`]): chat platform, templating, transcripts and the audit log
//! - **Effect dispatcher** ([`dispatcher`]): executes effect lists against the ports
//! - **Runtime** ([`TicketRuntime`]): read, reduce, commit, dispatch
//!
//! ## Transition pipeline
//!
//! 1. Read the record (absence is a normal answer).
//! 2. Reduce a copy with [`LifecycleEngine`]. A rejection ends the request; nothing was written.
//! 3. Commit with compare-and-set on the record version. A lost race re-reads and re-reduces.
//! 4. Apply the ledger effects: bump the counters, then make the ticket's open-ticket index
//!    membership match whatever record is stored now.
//! 5. Dispatch the remaining effects. Follow-up actions (e.g. the posted close notice) are
//!    reduced right away; delayed actions (the purge after a delete) are scheduled.
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_runtime::TicketRuntime;
//!
//! let runtime = TicketRuntime::new(store, environment, dispatcher);
//! runtime.bootstrap(0).await?;
//! let applied = runtime.apply(request).await?;
//! ```

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use ticketdesk_core::effect::{Effect, Ledger};
use ticketdesk_core::environment::LifecycleEnvironment;
use ticketdesk_core::ids::{TicketId, UserId};
use ticketdesk_core::lifecycle::{LifecycleEngine, LifecycleRequest};
use ticketdesk_core::record::{Counter, ListName, TicketRecord};
use ticketdesk_core::reducer::Reducer;
use ticketdesk_core::Effects;

/// Per-key cooldowns for creation and commands
pub mod cooldown;

/// Effect execution against the capability ports
pub mod dispatcher;

/// Prometheus metrics for observability
pub mod metrics;

/// Capability interfaces
pub mod ports;

/// Backoff for optimistic commit retries
pub mod retry;

/// Ticket store abstraction and the in-memory implementation
pub mod store;

use dispatcher::EffectDispatcher;
use metrics::{EffectMetrics, TransitionMetrics};
use retry::{RetryPolicy, retry_when};
use store::{StoreError, TicketStore};

/// Error types for the runtime
pub mod error {
    use thiserror::Error;
    use ticketdesk_core::ids::TicketId;
    use ticketdesk_core::rejection::RejectReason;

    use crate::store::StoreError;

    /// Errors returned by [`TicketRuntime::apply`](crate::TicketRuntime::apply).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RuntimeError {
        /// The engine refused the transition. Nothing was written and no effect ran.
        #[error(transparent)]
        Rejected(#[from] RejectReason),

        /// The store failed before the transition committed.
        #[error("Store error: {0}")]
        Store(#[from] StoreError),

        /// Every commit attempt lost a version race.
        #[error("Gave up committing {ticket} after {attempts} attempts")]
        CommitContention {
            /// Contended record.
            ticket: TicketId,
            /// Attempts made.
            attempts: usize,
        },

        /// The runtime is shutting down and not accepting new requests.
        #[error("Runtime is shutting down")]
        ShuttingDown,

        /// Shutdown timed out waiting for scheduled actions.
        #[error("Shutdown timed out with {0} scheduled actions still pending")]
        ShutdownTimeout(usize),
    }

    impl RuntimeError {
        /// Whether this is a lost optimistic-concurrency race.
        #[must_use]
        pub const fn is_conflict(&self) -> bool {
            matches!(self, Self::Store(StoreError::VersionConflict { .. }))
        }

        /// The engine's rejection, if that is what this is.
        #[must_use]
        pub const fn rejection(&self) -> Option<&RejectReason> {
            match self {
                Self::Rejected(reason) => Some(reason),
                _ => None,
            }
        }
    }
}

pub use error::RuntimeError;

/// Outcome of a committed transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// The record as committed (`None` after a purge).
    pub record: Option<TicketRecord>,
    /// Effects that failed during dispatch, including follow-ups.
    pub failures: usize,
}

/// Decrements the pending counter when a scheduled action finishes or is dropped.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Inner {
    store: Arc<dyn TicketStore>,
    engine: LifecycleEngine,
    environment: LifecycleEnvironment,
    dispatcher: EffectDispatcher,
    commit_policy: RetryPolicy,
    shutdown: AtomicBool,
    pending: Arc<AtomicUsize>,
    ledger: tokio::sync::Mutex<()>,
}

/// The lifecycle runtime. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct TicketRuntime {
    inner: Arc<Inner>,
}

impl TicketRuntime {
    /// Wire a runtime.
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        environment: LifecycleEnvironment,
        dispatcher: EffectDispatcher,
    ) -> Self {
        Self::with_commit_policy(store, environment, dispatcher, RetryPolicy::default())
    }

    /// Wire a runtime with a custom backoff for lost commit races.
    #[must_use]
    pub fn with_commit_policy(
        store: Arc<dyn TicketStore>,
        environment: LifecycleEnvironment,
        dispatcher: EffectDispatcher,
        commit_policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                engine: LifecycleEngine::new(),
                environment,
                dispatcher,
                commit_policy,
                shutdown: AtomicBool::new(false),
                pending: Arc::new(AtomicUsize::new(0)),
                ledger: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The ticket store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.inner.store
    }

    /// The engine's environment.
    #[must_use]
    pub fn environment(&self) -> &LifecycleEnvironment {
        &self.inner.environment
    }

    /// The effect dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &EffectDispatcher {
        &self.inner.dispatcher
    }

    /// Scheduled actions that have not run yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Seed the ticket counter the first time the store is used.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the store cannot be reached.
    pub async fn bootstrap(&self, sequence_start: u64) -> Result<(), RuntimeError> {
        let store = &self.inner.store;
        if store.counter(Counter::TotalTickets).await?.is_none() {
            store.set_counter(Counter::TotalTickets, sequence_start).await?;
            tracing::info!(sequence_start, "Seeded ticket counter");
        }
        Ok(())
    }

    /// The record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the store cannot be reached.
    pub async fn record(&self, id: &TicketId) -> Result<Option<TicketRecord>, RuntimeError> {
        Ok(self.inner.store.get(id.clone()).await?)
    }

    /// Open tickets currently held by `owner`, found by scanning every stored record.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the store cannot be reached.
    pub async fn open_tickets_of(&self, owner: &UserId) -> Result<usize, RuntimeError> {
        let store = &self.inner.store;
        let mut count = 0;
        for id in store.ids().await? {
            let record = store.get(id).await?;
            if record.is_some_and(|record| record.is_open() && record.owner_id == *owner) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Run one request through the pipeline.
    ///
    /// Follow-up actions produced by dispatch are applied before this returns; their
    /// failures are logged and do not affect the result.
    ///
    /// # Errors
    ///
    /// - `Rejected`: the engine refused; nothing was written and no effect ran
    /// - `Store`: the store failed before the commit
    /// - `CommitContention`: every retry lost the version race
    /// - `ShuttingDown`: [`shutdown`](Self::shutdown) was called
    pub fn apply(&self, request: LifecycleRequest) -> BoxFuture<'_, Result<Applied, RuntimeError>> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Box::pin(async { Err(RuntimeError::ShuttingDown) });
        }
        self.execute(request)
    }

    fn execute(&self, request: LifecycleRequest) -> BoxFuture<'_, Result<Applied, RuntimeError>> {
        Box::pin(async move {
            let mut queue = VecDeque::from([request]);
            let mut outcome: Option<Applied> = None;

            while let Some(request) = queue.pop_front() {
                let first = outcome.is_none();
                match self.transition(request).await {
                    Ok((applied, follow_ups)) => {
                        queue.extend(follow_ups);
                        match outcome.as_mut() {
                            None => outcome = Some(applied),
                            Some(total) => total.failures += applied.failures,
                        }
                    }
                    Err(error) if first => return Err(error),
                    Err(error) => {
                        tracing::warn!(%error, "Follow-up action failed");
                    }
                }
            }

            // The queue starts non-empty, so the first transition either returned or set this.
            Ok(outcome.unwrap_or(Applied {
                record: None,
                failures: 0,
            }))
        })
    }

    /// Reduce, commit, ledger, dispatch for one request.
    #[tracing::instrument(
        skip(self, request),
        fields(ticket = %request.ticket.id, action = request.action.name(), actor = %request.actor.id())
    )]
    async fn transition(
        &self,
        request: LifecycleRequest,
    ) -> Result<(Applied, Vec<LifecycleRequest>), RuntimeError> {
        let started = Instant::now();
        let action = request.action.name();
        let ticket = request.ticket.id.clone();

        let committed = retry_when(
            &self.inner.commit_policy,
            RuntimeError::is_conflict,
            || self.commit(request.clone()),
        )
        .await;

        let (record, effects) = match committed {
            Ok(committed) => committed,
            Err(RuntimeError::Rejected(reason)) => {
                tracing::info!(%reason, "Transition rejected");
                TransitionMetrics::record_rejection(reason.label());
                return Err(RuntimeError::Rejected(reason));
            }
            Err(error) if error.is_conflict() => {
                tracing::warn!(%error, "Commit contention, giving up");
                return Err(RuntimeError::CommitContention {
                    ticket,
                    attempts: self.inner.commit_policy.max_retries + 1,
                });
            }
            Err(error) => {
                tracing::error!(%error, "Transition aborted by store failure");
                return Err(error);
            }
        };

        let ledger: Vec<Ledger> = effects.iter().flat_map(ledger_ops).cloned().collect();
        self.apply_ledger(ledger).await;

        let report = self
            .inner
            .dispatcher
            .dispatch(&ticket, effects.into_vec())
            .await;

        for (delay, delayed) in report.delayed {
            self.schedule(delay, delayed);
        }

        TransitionMetrics::record(action, started.elapsed());
        tracing::debug!(failures = report.failures, "Transition complete");

        Ok((
            Applied {
                record,
                failures: report.failures,
            },
            report.follow_ups,
        ))
    }

    /// Read, reduce and compare-and-set once.
    async fn commit(
        &self,
        request: LifecycleRequest,
    ) -> Result<(Option<TicketRecord>, Effects<LifecycleRequest>), RuntimeError> {
        let id = request.ticket.id.clone();
        let current = self.inner.store.get(id.clone()).await?;
        let expected = current.as_ref().map(|record| record.version);

        let mut next = current.clone();
        let effects = self
            .inner
            .engine
            .reduce(&mut next, request, &self.inner.environment)?;

        if next != current {
            let version = self
                .inner
                .store
                .compare_and_set(id, expected, next.clone())
                .await
                .inspect_err(|error| {
                    if matches!(error, StoreError::VersionConflict { .. }) {
                        TransitionMetrics::record_conflict();
                    }
                })?;
            if let Some(record) = next.as_mut() {
                record.version = version;
            }
        }

        Ok((next, effects))
    }

    /// Keep the open-ticket index and the counters in step with the committed record.
    ///
    /// Runs after the record commit; a failure here is logged and does not undo it.
    /// Ledger writes from concurrent transitions are serialized so a late index update
    /// cannot overwrite a newer one.
    async fn apply_ledger(&self, ops: Vec<Ledger>) {
        if ops.is_empty() {
            return;
        }
        let store = self.inner.store.as_ref();
        let _serialized = self.inner.ledger.lock().await;

        let mut indexed: Vec<TicketId> = Vec::new();
        for op in ops {
            let result = match &op {
                Ledger::IndexAdd(id) | Ledger::IndexRemove(id) => {
                    if !indexed.contains(id) {
                        indexed.push(id.clone());
                    }
                    Ok(())
                }
                Ledger::Increment(counter) => adjust_counter(store, *counter, true).await,
                Ledger::Decrement(counter) => adjust_counter(store, *counter, false).await,
            };
            if let Err(error) = result {
                tracing::error!(%error, ?op, "Ledger update failed");
                EffectMetrics::record_failure("ledger");
            }
        }

        for id in indexed {
            if let Err(error) = sync_index(store, &id).await {
                tracing::error!(%error, ticket = %id, "Open-ticket index update failed");
                EffectMetrics::record_failure("ledger");
            }
        }
    }

    /// Reduce `request` after `delay` on a background task.
    fn schedule(&self, delay: Duration, request: LifecycleRequest) {
        tracing::debug!(
            delay_ms = delay.as_millis(),
            ticket = %request.ticket.id,
            action = request.action.name(),
            "Scheduling delayed action"
        );
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.inner.pending));
        let runtime = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            if let Err(error) = runtime.execute(request).await {
                tracing::warn!(%error, "Delayed action failed");
            }
        });
    }

    /// Stop accepting requests and wait for scheduled actions to finish.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if scheduled actions are still pending after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        tracing::info!("Initiating graceful shutdown");
        self.inner.shutdown.store(true, Ordering::Release);

        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_millis(50);
        loop {
            let pending = self.pending();
            if pending == 0 {
                tracing::info!("All scheduled actions completed, shutdown successful");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::error!(pending, "Shutdown timeout");
                return Err(RuntimeError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl std::fmt::Debug for TicketRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketRuntime")
            .field("environment", &self.inner.environment)
            .field("commit_policy", &self.inner.commit_policy)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn ledger_ops<A>(effect: &Effect<A>) -> Vec<&Ledger> {
    match effect {
        Effect::Ledger(op) => vec![op],
        Effect::Sequential(effects) => effects.iter().flat_map(ledger_ops).collect(),
        _ => Vec::new(),
    }
}

/// List the ticket in the open-ticket index exactly once if its stored record is open,
/// otherwise not at all.
async fn sync_index(store: &dyn TicketStore, id: &TicketId) -> Result<(), StoreError> {
    let open = store
        .get(id.clone())
        .await?
        .as_ref()
        .is_some_and(TicketRecord::is_open);
    let value = id.to_string();
    let listed = store
        .list(ListName::OpenTickets)
        .await?
        .iter()
        .filter(|entry| **entry == value)
        .count();

    if listed > usize::from(open) || (open && listed == 0) {
        store.pull(ListName::OpenTickets, value.clone()).await?;
        if open {
            store.push(ListName::OpenTickets, value).await?;
        }
    }
    Ok(())
}

async fn adjust_counter(store: &dyn TicketStore, counter: Counter, up: bool) -> Result<(), StoreError> {
    let current = store.counter(counter).await?.unwrap_or_default();
    let next = if up {
        current.saturating_add(1)
    } else {
        current.saturating_sub(1)
    };
    store.set_counter(counter, next).await
}
