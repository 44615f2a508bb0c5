//! Nearest-neighbor index layer for embedding vectors.
//!
//! This module owns the math (normalization, similarity), the quantizer
//! clustering, and the closed set of index topologies behind the
//! [`VectorIndex`] contract:
//!
//! - [`FlatIndex`]: exact brute-force scan, O(N*D) per query
//! - [`IvfIndex`]: clustered-approximate search over `nprobe` of `nlist`
//!   inverted lists
//! - [`HnswIndex`]: graph-approximate search through a layered proximity
//!   graph
//!
//! All topologies operate on L2-normalized vectors so inner product equals
//! cosine similarity.

pub mod math;

mod clustering;
mod flat;
mod graph;
mod index;
mod ivf;
mod types;

pub use clustering::{ClusteringError, KMeansResult, kmeans_clustering, nearest_centroid};
pub use flat::FlatIndex;
pub use graph::HnswIndex;
pub use index::{AnyIndex, IndexOptions, IndexTopology, VectorIndex};
pub use ivf::IvfIndex;
pub use types::{
    DensePosition, EMBEDDING_DIMENSION_384, Score, VectorDimension, VectorError,
};
