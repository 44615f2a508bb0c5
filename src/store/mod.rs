//! The identifier-mapped vector store.
//!
//! [`IndexStore`] composes a nearest-neighbor index with the
//! [`IdentifierMap`] indirection layer and the next-free-position counter,
//! and owns every mutation of the three: add, delete (with its full
//! rebuild), clear, save and load. [`SharedIndexStore`] wraps it in the
//! single-writer/multi-reader discipline required for concurrent use.

mod idmap;
mod persistence;
mod shared;

pub use idmap::IdentifierMap;
pub use persistence::StoreMetadata;
pub use shared::{CancellationToken, SharedIndexStore};

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::vector::{
    AnyIndex, DensePosition, IndexOptions, IndexTopology, Score, VectorDimension, VectorIndex, math,
};

/// One scored result of a store search.
///
/// Ephemeral: produced per search call, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The caller-supplied identifier the matched position resolves to.
    pub external_id: String,

    /// Similarity score, clamped to [0, 1].
    pub score: Score,

    /// The stored vector, reconstructed on request.
    pub vector: Option<Vec<f32>>,
}

/// Snapshot of store health counters.
///
/// `live_bindings` and `index_rows` coincide except transiently between a
/// delete and the rebuild it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub live_bindings: usize,
    pub index_rows: usize,
    pub dimension: usize,
    pub topology: IndexTopology,
}

/// Vector store addressed by external string identifiers.
///
/// An explicitly constructed, owned instance; the application passes it by
/// handle through the service layer rather than reaching for ambient
/// global state. Load-or-create at construction and save at shutdown are
/// the owner's lifecycle hooks.
#[derive(Debug)]
pub struct IndexStore {
    index: AnyIndex,
    ids: IdentifierMap,
    next_position: u32,
    options: IndexOptions,
}

impl IndexStore {
    /// Creates an empty store with the given topology and dimension.
    pub fn new(
        topology: IndexTopology,
        dimension: VectorDimension,
        options: IndexOptions,
    ) -> StoreResult<Self> {
        let index = AnyIndex::new(topology, dimension, &options)?;
        Ok(Self {
            index,
            ids: IdentifierMap::new(),
            next_position: 0,
            options,
        })
    }

    /// Creates a store from layered settings.
    pub fn from_settings(settings: &crate::config::Settings) -> StoreResult<Self> {
        let dimension = VectorDimension::new(settings.index.dimension)?;
        Self::new(settings.index.topology, dimension, settings.index.options())
    }

    /// The fixed dimension this store accepts.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.index.dimension()
    }

    /// The topology this store was constructed with.
    #[must_use]
    pub fn topology(&self) -> IndexTopology {
        self.index.topology()
    }

    /// Number of live identifier bindings.
    ///
    /// Not necessarily equal to the raw index row count between a delete
    /// and its rebuild; the rebuild makes them coincide again.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Health counters for readiness checks.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            live_bindings: self.ids.len(),
            index_rows: self.index.len(),
            dimension: self.index.dimension().get(),
            topology: self.index.topology(),
        }
    }

    /// Trains the underlying index on representative vectors.
    ///
    /// Samples are normalized here; a no-op for flat and graph topologies.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> StoreResult<()> {
        let normalized: Vec<Vec<f32>> = samples.iter().map(|v| math::normalized(v)).collect();
        self.index.train(&normalized)?;
        Ok(())
    }

    /// Adds a batch of vectors bound to external identifiers.
    ///
    /// The whole batch is validated before the index or the map is touched:
    /// every vector must match the configured dimension and every id must
    /// be fresh (both within the batch and against live bindings). Any
    /// failure leaves the store exactly as it was.
    pub fn add_vectors(
        &mut self,
        vectors: &[Vec<f32>],
        external_ids: &[String],
    ) -> StoreResult<Vec<DensePosition>> {
        if vectors.len() != external_ids.len() {
            return Err(StoreError::BatchLengthMismatch {
                vectors: vectors.len(),
                ids: external_ids.len(),
            });
        }

        let dimension = self.index.dimension();
        for vector in vectors {
            dimension.validate_vector(vector)?;
        }

        let mut batch_ids = HashSet::with_capacity(external_ids.len());
        for id in external_ids {
            if !batch_ids.insert(id.as_str()) || self.ids.position_of(id).is_some() {
                return Err(StoreError::DuplicateIdentifier { id: id.clone() });
            }
        }

        let rows: Vec<Vec<f32>> = vectors.iter().map(|v| math::normalized(v)).collect();
        let positions = self.index.add(&rows)?;

        for (id, position) in external_ids.iter().zip(&positions) {
            // Cannot fail: ids were pre-validated and positions are fresh
            self.ids.bind(id, *position)?;
        }
        self.next_position = self.index.len() as u32;

        debug!(
            added = positions.len(),
            total = self.count(),
            "vectors added to store"
        );
        Ok(positions)
    }

    /// Searches for the nearest neighbors of `query`.
    ///
    /// The query is normalized before delegation. Positions the map cannot
    /// resolve are dropped with a warning - that combination indicates
    /// map/index drift and should be visible in logs, not surfaced as
    /// phantom hits.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        self.search_impl(query, top_k, threshold, false)
    }

    /// Like [`IndexStore::search`], attaching each hit's stored vector.
    pub fn search_with_vectors(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        self.search_impl(query, top_k, threshold, true)
    }

    fn search_impl(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
        attach_vectors: bool,
    ) -> StoreResult<Vec<SearchHit>> {
        self.index.dimension().validate_vector(query)?;
        let query = math::normalized(query);

        let raw = self.index.search(&query, top_k, Score::clamped(threshold))?;

        let mut hits = Vec::with_capacity(raw.len());
        for (position, score) in raw {
            let Some(id) = self.ids.id_of(position) else {
                warn!(
                    %position,
                    "search returned a position with no identifier binding; dropping (map/index drift)"
                );
                continue;
            };
            let vector = if attach_vectors {
                Some(self.index.reconstruct(position)?)
            } else {
                None
            };
            hits.push(SearchHit {
                external_id: id.to_string(),
                score,
                vector,
            });
        }

        Ok(hits)
    }

    /// Reconstructs the stored vector for an external identifier.
    pub fn get_vector(&self, external_id: &str) -> StoreResult<Vec<f32>> {
        let position =
            self.ids
                .position_of(external_id)
                .ok_or_else(|| StoreError::UnknownIdentifier {
                    id: external_id.to_string(),
                })?;
        Ok(self.index.reconstruct(position)?)
    }

    /// Resolves an external identifier to its dense position, if bound.
    #[must_use]
    pub fn position_of(&self, external_id: &str) -> Option<DensePosition> {
        self.ids.position_of(external_id)
    }

    /// Deletes vectors by external identifier. Returns whether anything
    /// was deleted.
    ///
    /// The backing structures have no efficient point deletion, so this is
    /// rebuild-on-delete: reconstruct every kept vector, build a fresh
    /// index of the same topology and configuration, re-add the kept rows
    /// in their original relative order, and rebuild the identifier map
    /// with the new dense positions. O(N) per call - correctness-
    /// preserving, not scalable; tombstoning with periodic compaction is
    /// the noted future optimization.
    ///
    /// Unknown identifiers are skipped with a warning, so deleting an
    /// empty or never-bound set leaves the store unchanged.
    pub fn delete_vectors(&mut self, external_ids: &[String]) -> StoreResult<bool> {
        self.delete_vectors_with_cancel(external_ids, &CancellationToken::new())
    }

    /// [`IndexStore::delete_vectors`] with a cooperative cancellation
    /// signal, checked between reconstruct and re-add steps.
    ///
    /// The rebuild is staged off to the side and swapped in atomically;
    /// on cancellation (or any failure) the prior index remains
    /// authoritative.
    pub fn delete_vectors_with_cancel(
        &mut self,
        external_ids: &[String],
        token: &CancellationToken,
    ) -> StoreResult<bool> {
        let mut targets: HashSet<u32> = HashSet::new();
        for id in external_ids {
            match self.ids.position_of(id) {
                Some(position) => {
                    targets.insert(position.get());
                }
                None => warn!(id = %id, "delete requested for unknown identifier; skipping"),
            }
        }
        if targets.is_empty() {
            return Ok(false);
        }

        // Reconstruct survivors in original relative order
        let mut kept: Vec<(String, Vec<f32>)> = Vec::with_capacity(
            self.index.len().saturating_sub(targets.len()),
        );
        for raw_position in 0..self.index.len() as u32 {
            if token.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            if targets.contains(&raw_position) {
                continue;
            }
            let position = DensePosition::new(raw_position);
            let Some(id) = self.ids.id_of(position) else {
                warn!(%position, "unmapped position dropped during rebuild (map/index drift)");
                continue;
            };
            let id = id.to_string();
            let row = self.index.reconstruct(position)?;
            kept.push((id, row));
        }

        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        // Stage the fresh index and map; swap in only when complete
        let mut fresh_index = self.index.fresh_like();
        let mut fresh_ids = IdentifierMap::new();
        if !kept.is_empty() {
            let rows: Vec<Vec<f32>> = kept.iter().map(|(_, row)| row.clone()).collect();
            let positions = fresh_index.add(&rows)?;
            for ((id, _), position) in kept.iter().zip(&positions) {
                fresh_ids.bind(id, *position)?;
            }
        }

        let deleted = self.count() - fresh_ids.len();
        self.index = fresh_index;
        self.ids = fresh_ids;
        self.next_position = self.index.len() as u32;

        info!(deleted, remaining = self.count(), "rebuild-on-delete complete");
        Ok(true)
    }

    /// Persists the store to `dir` as one unit: the index image, the
    /// identifier-map image (with the position counter) and an
    /// informational metadata sidecar.
    ///
    /// A save failure does not touch in-memory state; the live store
    /// remains the source of truth and the caller may retry.
    pub fn save(&self, dir: impl AsRef<Path>) -> StoreResult<()> {
        let dir = dir.as_ref();
        persistence::write_store_image(dir, &self.index, &self.ids, self.next_position)?;
        StoreMetadata::new(self.topology(), self.dimension(), self.count()).save(dir)?;
        info!(path = %dir.display(), count = self.count(), "store saved");
        Ok(())
    }

    /// Replaces in-memory state with a persisted image.
    ///
    /// Everything is read and validated into locals first - header checks
    /// (magic, version, topology, dimension) and the map/index size
    /// invariant - and adopted only when all of it passes. Any failure
    /// leaves the prior state untouched, including on first boot where
    /// "prior state" is an empty store.
    pub fn load(&mut self, dir: impl AsRef<Path>) -> StoreResult<()> {
        let dir = dir.as_ref();

        let index = persistence::read_index_image(
            dir,
            self.index.dimension(),
            self.index.topology(),
            &self.options,
        )?;
        let (ids, next_position) = persistence::read_map_image(dir)?;

        if ids.len() != index.len() {
            return Err(StoreError::IndexCorrupt {
                reason: format!(
                    "identifier map has {} bindings but index has {} rows",
                    ids.len(),
                    index.len()
                ),
            });
        }
        if (next_position as usize) < index.len() {
            return Err(StoreError::IndexCorrupt {
                reason: format!(
                    "next position counter {next_position} is behind index size {}",
                    index.len()
                ),
            });
        }
        for (id, position) in ids.iter() {
            if position.as_usize() >= index.len() {
                return Err(StoreError::IndexCorrupt {
                    reason: format!("identifier '{id}' bound to out-of-range position {position}"),
                });
            }
        }

        self.index = index;
        self.ids = ids;
        self.next_position = next_position;

        info!(path = %dir.display(), count = self.count(), "store loaded");
        Ok(())
    }

    /// Replaces the index with an empty one of the same topology and
    /// configuration and drops every binding.
    pub fn clear(&mut self) {
        self.index = self.index.fresh_like();
        self.ids.clear();
        self.next_position = 0;
    }
}
