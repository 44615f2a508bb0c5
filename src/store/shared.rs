//! Shared-access wrapper enforcing the store's concurrency discipline.
//!
//! The index, its identifier map and the position counter are one shared
//! mutable resource. [`SharedIndexStore`] wraps them in a
//! single-writer/multi-reader lock:
//!
//! - `add_vectors`, `delete_vectors`, `clear` and `load` take the write
//!   lock for their whole duration, so no search ever observes a
//!   half-rebuilt index
//! - `search` and `save` take the read lock and may run concurrently with
//!   each other
//!
//! Search is CPU-bound (distance computation, graph traversal) and is
//! expected to run on a pool of worker threads; `Clone` hands out cheap
//! handles for that. Deadline-carrying calls use the lock's timed
//! acquisition so a queued writer cannot stall a reader past its budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{IndexStore, SearchHit, StoreStats};
use crate::vector::DensePosition;

/// Cooperative cancellation signal for long-running rebuilds.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to an [`IndexStore`].
#[derive(Clone)]
pub struct SharedIndexStore {
    inner: Arc<RwLock<IndexStore>>,
}

impl SharedIndexStore {
    /// Wraps a store for shared access.
    #[must_use]
    pub fn new(store: IndexStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Searches with shared access.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        self.inner.read().search(query, top_k, threshold)
    }

    /// Searches with shared access, attaching reconstructed vectors.
    pub fn search_with_vectors(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        self.inner.read().search_with_vectors(query, top_k, threshold)
    }

    /// Searches under a caller-supplied deadline.
    ///
    /// Returns `Timeout` instead of blocking indefinitely: lock
    /// acquisition itself is bounded by the remaining budget, and a result
    /// that arrives after the deadline is discarded as late.
    pub fn search_with_deadline(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
        deadline: Instant,
    ) -> StoreResult<Vec<SearchHit>> {
        let started = Instant::now();
        let Some(budget) = deadline.checked_duration_since(started) else {
            return Err(StoreError::Timeout {
                elapsed: started.elapsed(),
            });
        };

        let Some(guard) = self.inner.try_read_for(budget) else {
            return Err(StoreError::Timeout {
                elapsed: started.elapsed(),
            });
        };

        let hits = guard.search(query, top_k, threshold)?;
        if Instant::now() > deadline {
            return Err(StoreError::Timeout {
                elapsed: started.elapsed(),
            });
        }
        Ok(hits)
    }

    /// Adds vectors with exclusive access.
    pub fn add_vectors(
        &self,
        vectors: &[Vec<f32>],
        external_ids: &[String],
    ) -> StoreResult<Vec<DensePosition>> {
        self.inner.write().add_vectors(vectors, external_ids)
    }

    /// Trains the underlying index with exclusive access.
    pub fn train(&self, samples: &[Vec<f32>]) -> StoreResult<()> {
        self.inner.write().train(samples)
    }

    /// Deletes vectors (rebuild-on-delete) with exclusive access.
    pub fn delete_vectors(&self, external_ids: &[String]) -> StoreResult<bool> {
        self.inner.write().delete_vectors(external_ids)
    }

    /// Cancellable delete; the write lock is held for the whole rebuild so
    /// no reader sees intermediate state, and cancellation rolls back to
    /// the prior index.
    pub fn delete_vectors_with_cancel(
        &self,
        external_ids: &[String],
        token: &CancellationToken,
    ) -> StoreResult<bool> {
        self.inner
            .write()
            .delete_vectors_with_cancel(external_ids, token)
    }

    /// Reconstructs a stored vector by external identifier.
    pub fn get_vector(&self, external_id: &str) -> StoreResult<Vec<f32>> {
        self.inner.read().get_vector(external_id)
    }

    /// Persists the store; runs read-shared alongside searches.
    pub fn save(&self, dir: impl AsRef<std::path::Path>) -> StoreResult<()> {
        self.inner.read().save(dir)
    }

    /// Replaces in-memory state from a persisted image, exclusively.
    pub fn load(&self, dir: impl AsRef<std::path::Path>) -> StoreResult<()> {
        self.inner.write().load(dir)
    }

    /// Clears the store with exclusive access.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Number of live bindings.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().count()
    }

    /// Health counters for readiness checks.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.inner.read().stats()
    }
}

impl std::fmt::Debug for SharedIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Some(store) => write!(f, "SharedIndexStore {{ store: {store:?} }}"),
            None => write!(f, "SharedIndexStore {{ <locked> }}"),
        }
    }
}
