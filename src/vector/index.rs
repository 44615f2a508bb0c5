//! The nearest-neighbor index contract and its closed set of topologies.
//!
//! Every index variant speaks the same [`VectorIndex`] contract: dense
//! positions assigned monotonically in add order, descending-score search
//! with a threshold, and reconstruction of stored rows. The topology is
//! selected once at construction via [`IndexTopology`] and dispatched
//! through [`AnyIndex`]; no per-call topology branching happens anywhere
//! else.

use serde::{Deserialize, Serialize};

use crate::vector::flat::FlatIndex;
use crate::vector::graph::HnswIndex;
use crate::vector::ivf::IvfIndex;
use crate::vector::types::{DensePosition, Score, VectorDimension, VectorError};

/// The closed set of index topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexTopology {
    /// Exact brute-force inner-product scan. Always returns the true top-k.
    Flat,
    /// Clustered-approximate (inverted-file) index with a trained quantizer.
    Ivf,
    /// Graph-approximate index with a layered proximity graph.
    Hnsw,
}

impl IndexTopology {
    /// Stable one-byte identifier used in persisted image headers.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Flat => 0,
            Self::Ivf => 1,
            Self::Hnsw => 2,
        }
    }

    /// Parses the one-byte identifier from a persisted image header.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Flat),
            1 => Some(Self::Ivf),
            2 => Some(Self::Hnsw),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Flat => "flat",
            Self::Ivf => "ivf",
            Self::Hnsw => "hnsw",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for IndexTopology {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "ivf" => Ok(Self::Ivf),
            "hnsw" => Ok(Self::Hnsw),
            other => Err(VectorError::UnknownTopology(other.to_string())),
        }
    }
}

/// Construction-time tuning knobs shared by all topologies.
///
/// Flat ignores all of them; IVF reads `nlist`/`nprobe`; HNSW reads
/// `m`/`ef_construction`/`ef_search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// IVF cluster count. More clusters mean finer partitioning but slower
    /// training and possible empty clusters.
    pub nlist: usize,

    /// IVF clusters visited per query (recall vs. latency).
    pub nprobe: usize,

    /// HNSW maximum links per node on upper layers (layer 0 gets 2x).
    pub m: usize,

    /// HNSW build-time beam width; controls graph quality.
    pub ef_construction: usize,

    /// HNSW query-time beam width (recall vs. latency).
    pub ef_search: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            nlist: 64,
            nprobe: 8,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// Uniform contract over nearest-neighbor index topologies.
///
/// Invariants shared by every implementation:
/// - `add` assigns positions monotonically increasing from the current
///   size; positions are never reused until an explicit rebuild.
/// - `search` returns results sorted descending by score, never more than
///   `top_k`, never below `threshold`, and never emits placeholder
///   positions.
/// - A query of the wrong dimensionality is rejected with
///   `DimensionMismatch`, never coerced.
pub trait VectorIndex {
    /// Adds already-normalized vectors, returning the positions assigned
    /// in call order.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<DensePosition>, VectorError>;

    /// Searches for the nearest neighbors of `query`.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Score,
    ) -> Result<Vec<(DensePosition, Score)>, VectorError>;

    /// Reconstructs the stored vector at `position`.
    ///
    /// Fails with `NotReconstructable` when the position was never
    /// assigned; never silently returns garbage.
    fn reconstruct(&self, position: DensePosition) -> Result<Vec<f32>, VectorError>;

    /// Trains the index on representative samples.
    ///
    /// Required before `add` for clustering topologies; flat and graph
    /// topologies treat this as a no-op.
    fn train(&mut self, samples: &[Vec<f32>]) -> Result<(), VectorError>;

    /// Number of rows currently held by the index.
    fn len(&self) -> usize;

    /// True when the index holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed dimension all rows share.
    fn dimension(&self) -> VectorDimension;
}

/// Closed-enum dispatch over the three topologies.
///
/// Selected once at construction; callers hold an `AnyIndex` and never
/// re-inspect the topology per call.
#[derive(Debug, Clone)]
pub enum AnyIndex {
    Flat(FlatIndex),
    Ivf(IvfIndex),
    Hnsw(HnswIndex),
}

impl AnyIndex {
    /// Creates an empty index of the requested topology.
    pub fn new(
        topology: IndexTopology,
        dimension: VectorDimension,
        options: &IndexOptions,
    ) -> Result<Self, VectorError> {
        match topology {
            IndexTopology::Flat => Ok(Self::Flat(FlatIndex::new(dimension))),
            IndexTopology::Ivf => Ok(Self::Ivf(IvfIndex::new(
                dimension,
                options.nlist,
                options.nprobe,
            )?)),
            IndexTopology::Hnsw => Ok(Self::Hnsw(HnswIndex::new(
                dimension,
                options.m,
                options.ef_construction,
                options.ef_search,
            )?)),
        }
    }

    /// Creates an empty index with the same topology and configuration.
    ///
    /// A trained IVF quantizer survives (matching the behavior of a reset
    /// that keeps training); rows and positions do not. This is the
    /// building block for rebuild-on-delete and `clear`.
    #[must_use]
    pub fn fresh_like(&self) -> Self {
        match self {
            Self::Flat(index) => Self::Flat(FlatIndex::new(index.dimension())),
            Self::Ivf(index) => Self::Ivf(index.fresh()),
            Self::Hnsw(index) => Self::Hnsw(index.fresh()),
        }
    }

    /// The topology this index was constructed with.
    #[must_use]
    pub fn topology(&self) -> IndexTopology {
        match self {
            Self::Flat(_) => IndexTopology::Flat,
            Self::Ivf(_) => IndexTopology::Ivf,
            Self::Hnsw(_) => IndexTopology::Hnsw,
        }
    }
}

impl VectorIndex for AnyIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<DensePosition>, VectorError> {
        match self {
            Self::Flat(index) => index.add(vectors),
            Self::Ivf(index) => index.add(vectors),
            Self::Hnsw(index) => index.add(vectors),
        }
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Score,
    ) -> Result<Vec<(DensePosition, Score)>, VectorError> {
        match self {
            Self::Flat(index) => index.search(query, top_k, threshold),
            Self::Ivf(index) => index.search(query, top_k, threshold),
            Self::Hnsw(index) => index.search(query, top_k, threshold),
        }
    }

    fn reconstruct(&self, position: DensePosition) -> Result<Vec<f32>, VectorError> {
        match self {
            Self::Flat(index) => index.reconstruct(position),
            Self::Ivf(index) => index.reconstruct(position),
            Self::Hnsw(index) => index.reconstruct(position),
        }
    }

    fn train(&mut self, samples: &[Vec<f32>]) -> Result<(), VectorError> {
        match self {
            Self::Flat(index) => index.train(samples),
            Self::Ivf(index) => index.train(samples),
            Self::Hnsw(index) => index.train(samples),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Flat(index) => index.len(),
            Self::Ivf(index) => index.len(),
            Self::Hnsw(index) => index.len(),
        }
    }

    fn dimension(&self) -> VectorDimension {
        match self {
            Self::Flat(index) => index.dimension(),
            Self::Ivf(index) => index.dimension(),
            Self::Hnsw(index) => index.dimension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_byte_roundtrip() {
        for topology in [IndexTopology::Flat, IndexTopology::Ivf, IndexTopology::Hnsw] {
            assert_eq!(IndexTopology::from_u8(topology.as_u8()), Some(topology));
        }
        assert_eq!(IndexTopology::from_u8(200), None);
    }

    #[test]
    fn test_topology_parse() {
        assert_eq!("flat".parse::<IndexTopology>().unwrap(), IndexTopology::Flat);
        assert_eq!("ivf".parse::<IndexTopology>().unwrap(), IndexTopology::Ivf);
        assert_eq!("hnsw".parse::<IndexTopology>().unwrap(), IndexTopology::Hnsw);
        assert!("faiss".parse::<IndexTopology>().is_err());
    }

    #[test]
    fn test_any_index_construction() {
        let dimension = VectorDimension::new(8).unwrap();
        let options = IndexOptions::default();

        for topology in [IndexTopology::Flat, IndexTopology::Ivf, IndexTopology::Hnsw] {
            let index = AnyIndex::new(topology, dimension, &options).unwrap();
            assert_eq!(index.topology(), topology);
            assert!(index.is_empty());
            assert_eq!(index.dimension(), dimension);
        }
    }

    #[test]
    fn test_fresh_like_preserves_topology() {
        let dimension = VectorDimension::new(4).unwrap();
        let options = IndexOptions::default();
        let mut index = AnyIndex::new(IndexTopology::Flat, dimension, &options).unwrap();
        index
            .add(&[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]])
            .unwrap();

        let fresh = index.fresh_like();
        assert_eq!(fresh.topology(), IndexTopology::Flat);
        assert!(fresh.is_empty());
        assert_eq!(index.len(), 2);
    }
}
