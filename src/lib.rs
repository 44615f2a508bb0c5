//! Vector indexing and retrieval-context assembly for retrieval-augmented
//! generation.
//!
//! `contexture` stores embeddings of document fragments and serves
//! nearest-neighbor similarity search to ground a chatbot's answers:
//!
//! - [`vector`]: the index topologies (exact flat, clustered-approximate,
//!   graph-approximate) behind one [`vector::VectorIndex`] contract
//! - [`store`]: the identifier-mapped [`store::IndexStore`] with
//!   persistence, rebuild-on-delete and the shared-access wrapper
//! - [`embedding`]: the text-to-vector boundary (fastembed-backed)
//! - [`retrieval`]: the query-facing service and the token-budgeted
//!   [`retrieval::ContextAssembler`]
//!
//! The HTTP layer, the relational store, document extraction and the
//! completion call are external collaborators reached through traits.

pub mod config;
pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod store;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use embedding::{EmbeddingProvider, FastEmbedProvider};
pub use error::{RetrievalError, RetrievalResult, StoreError, StoreResult};
pub use retrieval::{
    ChunkContent, ChunkSource, ContextAssembler, ContextChunk, RetrievalDefaults,
    RetrievalService, TokenCounter, WordTokenCounter,
};
pub use store::{
    CancellationToken, IdentifierMap, IndexStore, SearchHit, SharedIndexStore, StoreMetadata,
    StoreStats,
};
pub use vector::{
    AnyIndex, DensePosition, IndexOptions, IndexTopology, Score, VectorDimension, VectorError,
    VectorIndex,
};
