//! Chaotic record store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails mutations to test error handling. An
//! injected failure happens before the inner store is touched, which is
//! exactly what a failed rewrite must look like to callers: an error and an
//! unchanged table.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use super::{GroupRecord, GroupTransform, RecordStore, StoreError, UserRecord, UserTransform};

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails appends and rewrites with
/// `StoreError::Io` at the configured rate. Reads always pass through so
/// tests can inspect the inner state.
#[derive(Clone)]
pub struct ChaoticStore<S: RecordStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Number of injected failures
    injected: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos runs are reproducible from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: RecordStore> ChaoticStore<S> {
    /// Create with a fixed seed
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            injected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of failures injected so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    fn chaos(&self, operation: &str) -> Result<(), StoreError> {
        let roll = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next();
        if roll < self.failure_rate {
            self.injected.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Io(format!("injected failure: {operation}")));
        }
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for ChaoticStore<S> {
    fn load_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.inner.load_users()
    }

    fn load_groups(&self) -> Result<Vec<GroupRecord>, StoreError> {
        self.inner.load_groups()
    }

    fn append_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.chaos("append_user")?;
        self.inner.append_user(record)
    }

    fn append_group(&self, record: &GroupRecord) -> Result<(), StoreError> {
        self.chaos("append_group")?;
        self.inner.append_group(record)
    }

    fn rewrite_users(&self, transform: UserTransform<'_>) -> Result<(), StoreError> {
        self.chaos("rewrite_users")?;
        self.inner.rewrite_users(transform)
    }

    fn rewrite_groups(&self, transform: GroupTransform<'_>) -> Result<(), StoreError> {
        self.chaos("rewrite_groups")?;
        self.inner.rewrite_groups(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn always_failing_store_never_mutates() {
        let store = ChaoticStore::new(MemoryStore::new(), 1.0);

        assert!(store.append_user(&UserRecord::new("alice", "pw", vec![])).is_err());
        assert!(store.rewrite_groups(&|_| vec![GroupRecord::new("eng", "alice")]).is_err());

        assert!(store.inner().load_users().unwrap().is_empty());
        assert!(store.inner().load_groups().unwrap().is_empty());
        assert_eq!(store.injected_failures(), 2);
    }

    #[test]
    fn never_failing_store_is_transparent() {
        let store = ChaoticStore::new(MemoryStore::new(), 0.0);

        store.append_group(&GroupRecord::new("eng", "alice")).unwrap();
        assert_eq!(store.load_groups().unwrap().len(), 1);
        assert_eq!(store.injected_failures(), 0);
    }
}
