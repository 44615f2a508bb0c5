//! Bidirectional mapping between external identifiers and dense positions.
//!
//! Dense indexes only support positional access, so callers address rows
//! through this indirection layer. Invariant: at most one live binding per
//! external id and per position at any time. The map is owned exclusively
//! by the store and mutated only by add, delete and rebuild.

use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::vector::DensePosition;

/// String id <-> dense position map.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    by_id: HashMap<String, DensePosition>,
    by_position: HashMap<u32, String>,
}

impl IdentifierMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an external id to a dense position.
    ///
    /// Fails if either side already has a live binding; the two sides are
    /// never allowed to drift.
    pub fn bind(&mut self, external_id: &str, position: DensePosition) -> StoreResult<()> {
        if self.by_id.contains_key(external_id) {
            return Err(StoreError::DuplicateIdentifier {
                id: external_id.to_string(),
            });
        }
        if let Some(existing) = self.by_position.get(&position.get()) {
            return Err(StoreError::IndexCorrupt {
                reason: format!(
                    "position {position} is already bound to '{existing}' while binding '{external_id}'"
                ),
            });
        }

        self.by_id.insert(external_id.to_string(), position);
        self.by_position.insert(position.get(), external_id.to_string());
        Ok(())
    }

    /// Resolves an external id to its position, if bound.
    #[must_use]
    pub fn position_of(&self, external_id: &str) -> Option<DensePosition> {
        self.by_id.get(external_id).copied()
    }

    /// Resolves a position to its external id, if bound.
    #[must_use]
    pub fn id_of(&self, position: DensePosition) -> Option<&str> {
        self.by_position.get(&position.get()).map(String::as_str)
    }

    /// Removes the binding for an external id, returning its position.
    pub fn unbind(&mut self, external_id: &str) -> Option<DensePosition> {
        let position = self.by_id.remove(external_id)?;
        self.by_position.remove(&position.get());
        Some(position)
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when no bindings are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterates over `(external_id, position)` bindings in no particular
    /// order. Used by persistence and rebuild.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DensePosition)> {
        self.by_id.iter().map(|(id, pos)| (id.as_str(), *pos))
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_position.clear();
    }
}
