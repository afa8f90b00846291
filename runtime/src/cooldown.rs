//! Per-key cooldowns.
//!
//! Used to rate-limit ticket creation per user and command invocations per user and command.
//! Entries are kept in process memory; a restart forgets them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks when each key may act again.
#[derive(Debug)]
pub struct CooldownTracker<K> {
    period: Duration,
    until: Mutex<HashMap<K, Instant>>,
}

impl<K> CooldownTracker<K>
where
    K: Eq + Hash + Clone,
{
    /// Tracker enforcing `period` between successful acquisitions.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            until: Mutex::new(HashMap::new()),
        }
    }

    /// The configured period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Start a cooldown for `key` unless one is running.
    ///
    /// # Errors
    ///
    /// Returns the time left when `key` is still cooling down.
    pub fn try_acquire(&self, key: &K) -> Result<(), Duration> {
        if self.period.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        let mut until = self.lock();
        if let Some(deadline) = until.get(key).filter(|deadline| **deadline > now) {
            return Err(*deadline - now);
        }
        until.insert(key.clone(), now + self.period);
        Ok(())
    }

    /// Time left for `key`, if it is cooling down.
    #[must_use]
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|deadline| **deadline > now)
            .map(|deadline| *deadline - now)
    }

    /// Forget `key`'s cooldown.
    pub fn release(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.lock().retain(|_, deadline| *deadline > now);
    }

    /// Number of keys currently tracked, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Instant>> {
        // A poisoned map only holds deadlines; keep using it.
        self.until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
