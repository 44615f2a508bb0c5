//! Query-facing retrieval orchestration.
//!
//! [`RetrievalService`] is the contract the query-handling layer consumes:
//! embed the query text, search the shared store, resolve hits to stored
//! chunk content, and hand back token-counted [`ContextChunk`]s in
//! descending-score order. The chunk-content store and the tokenizer are
//! external collaborators behind [`ChunkSource`] and [`TokenCounter`].
//!
//! An empty result list is a valid success. Failures are typed errors -
//! never swallowed into an empty list - so the caller can distinguish "no
//! matches" from "operation failed" and render its own "insufficient
//! information" answer.

mod assembler;
mod tokenizer;

pub use assembler::{ContextAssembler, TRUNCATION_MARKER};
pub use tokenizer::{TokenCounter, WordTokenCounter};

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, RetrievalResult};
use crate::store::SharedIndexStore;
use crate::vector::Score;

/// Stored content resolved for one external identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContent {
    /// The fragment text.
    pub text: String,

    /// Identifier of the document the fragment came from.
    pub source_document_id: String,

    /// Zero-based position of the fragment within its document.
    pub position_index: u32,
}

/// Boundary to the chunk-content store (external collaborator).
pub trait ChunkSource: Send + Sync {
    /// Resolves an external identifier to its stored content, if present.
    fn get_content(&self, external_id: &str) -> Option<ChunkContent>;
}

/// One retrieval result, ready for context assembly.
///
/// Created per search hit, consumed once by the assembler; never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextChunk {
    /// External identifier of the matched fragment.
    pub source_id: String,

    /// The fragment text.
    pub text: String,

    /// Similarity score from the index search, clamped to [0, 1].
    pub similarity_score: Score,

    /// Token cost of the raw text, measured by the shared counter.
    pub token_count: usize,
}

/// Default and fallback parameters for text search.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalDefaults {
    /// Result count when the caller passes none.
    pub top_k: usize,

    /// Score threshold when the caller passes none.
    pub score_threshold: f32,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k: 8,
            score_threshold: 0.35,
        }
    }
}

/// Orchestrates embedding, index search and content resolution.
pub struct RetrievalService {
    store: SharedIndexStore,
    embedder: Arc<dyn EmbeddingProvider>,
    chunks: Arc<dyn ChunkSource>,
    tokens: Arc<dyn TokenCounter>,
    defaults: RetrievalDefaults,
}

impl RetrievalService {
    /// Creates a service over an explicitly constructed store and its
    /// collaborators.
    #[must_use]
    pub fn new(
        store: SharedIndexStore,
        embedder: Arc<dyn EmbeddingProvider>,
        chunks: Arc<dyn ChunkSource>,
        tokens: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            store,
            embedder,
            chunks,
            tokens,
            defaults: RetrievalDefaults::default(),
        }
    }

    /// Overrides the default search parameters.
    #[must_use]
    pub fn with_defaults(mut self, defaults: RetrievalDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// The shared token counter, for building a matching assembler.
    #[must_use]
    pub fn token_counter(&self) -> Arc<dyn TokenCounter> {
        Arc::clone(&self.tokens)
    }

    /// Searches by query text.
    ///
    /// Steps: embed the query, search the store, resolve each hit's
    /// content, measure token costs. Hits whose content cannot be
    /// resolved are dropped with a warning (store/content drift should be
    /// observable, not fatal). Order preserves the index search order,
    /// descending by score.
    pub fn search_by_text(
        &self,
        query_text: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> RetrievalResult<Vec<ContextChunk>> {
        let query = self
            .embedder
            .embed(query_text)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let top_k = top_k.unwrap_or(self.defaults.top_k);
        let threshold = threshold.unwrap_or(self.defaults.score_threshold);
        let hits = self.store.search(&query, top_k, threshold)?;

        Ok(self.resolve_hits(hits))
    }

    /// [`RetrievalService::search_by_text`] under a caller-supplied
    /// deadline; exceeding it yields a `Timeout` store error.
    pub fn search_by_text_with_deadline(
        &self,
        query_text: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
        deadline: Instant,
    ) -> RetrievalResult<Vec<ContextChunk>> {
        let query = self
            .embedder
            .embed(query_text)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let top_k = top_k.unwrap_or(self.defaults.top_k);
        let threshold = threshold.unwrap_or(self.defaults.score_threshold);
        let hits = self
            .store
            .search_with_deadline(&query, top_k, threshold, deadline)?;

        Ok(self.resolve_hits(hits))
    }

    fn resolve_hits(&self, hits: Vec<crate::store::SearchHit>) -> Vec<ContextChunk> {
        let offered = hits.len();
        let chunks: Vec<ContextChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let Some(content) = self.chunks.get_content(&hit.external_id) else {
                    warn!(
                        id = %hit.external_id,
                        "search hit has no stored content; dropping (store/content drift)"
                    );
                    return None;
                };
                let token_count = self.tokens.count_tokens(&content.text);
                Some(ContextChunk {
                    source_id: hit.external_id,
                    text: content.text,
                    similarity_score: hit.score,
                    token_count,
                })
            })
            .collect();

        debug!(offered, resolved = chunks.len(), "retrieval hits resolved");
        chunks
    }
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("store", &self.store)
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::store::{IndexStore, SharedIndexStore};
    use crate::vector::{IndexOptions, IndexTopology, VectorDimension};
    use std::collections::HashMap;

    struct MapChunkSource {
        contents: HashMap<String, ChunkContent>,
    }

    impl MapChunkSource {
        fn new(entries: &[(&str, &str)]) -> Self {
            let contents = entries
                .iter()
                .enumerate()
                .map(|(i, (id, text))| {
                    (
                        id.to_string(),
                        ChunkContent {
                            text: text.to_string(),
                            source_document_id: "doc-1".to_string(),
                            position_index: i as u32,
                        },
                    )
                })
                .collect();
            Self { contents }
        }
    }

    impl ChunkSource for MapChunkSource {
        fn get_content(&self, external_id: &str) -> Option<ChunkContent> {
            self.contents.get(external_id).cloned()
        }
    }

    fn service_with(entries: &[(&str, &str)]) -> RetrievalService {
        let dimension = VectorDimension::new(128).unwrap();
        let embedder = Arc::new(HashEmbeddingProvider::new(dimension));

        let store = IndexStore::new(
            IndexTopology::Flat,
            dimension,
            IndexOptions::default(),
        )
        .unwrap();
        let store = SharedIndexStore::new(store);

        let vectors: Vec<Vec<f32>> = entries
            .iter()
            .map(|(_, text)| embedder.embed(text).unwrap())
            .collect();
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.to_string()).collect();
        store.add_vectors(&vectors, &ids).unwrap();

        RetrievalService::new(
            store,
            embedder,
            Arc::new(MapChunkSource::new(entries)),
            Arc::new(WordTokenCounter::new()),
        )
    }

    #[test]
    fn test_search_by_text_returns_ranked_chunks() {
        let service = service_with(&[
            ("auth", "user login and authentication flow"),
            ("db", "database connection pooling"),
            ("math", "matrix multiplication kernels"),
        ]);

        let chunks = service
            .search_by_text("user login and authentication flow", Some(3), Some(0.0))
            .unwrap();

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].source_id, "auth");
        assert!((chunks[0].similarity_score.get() - 1.0).abs() < 1e-4);
        for pair in chunks.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
        // Token counts come from the shared counter
        assert_eq!(chunks[0].token_count, 7); // ceil(5 * 1.33)
    }

    #[test]
    fn test_no_match_is_empty_success_not_error() {
        let service = service_with(&[("only", "completely unrelated content")]);

        let chunks = service
            .search_by_text("zzz qqq xxx", Some(5), Some(0.99))
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_missing_content_dropped_not_fatal() {
        let dimension = VectorDimension::new(64).unwrap();
        let embedder = Arc::new(HashEmbeddingProvider::new(dimension));

        let store = IndexStore::new(IndexTopology::Flat, dimension, IndexOptions::default())
            .unwrap();
        let store = SharedIndexStore::new(store);

        let vector = embedder.embed("orphaned fragment").unwrap();
        store
            .add_vectors(
                std::slice::from_ref(&vector),
                &["orphan".to_string()],
            )
            .unwrap();

        // Chunk source knows nothing about "orphan"
        let service = RetrievalService::new(
            store,
            embedder,
            Arc::new(MapChunkSource::new(&[])),
            Arc::new(WordTokenCounter::new()),
        );

        let chunks = service
            .search_by_text("orphaned fragment", Some(1), Some(0.0))
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_deadline_expired_surfaces_timeout() {
        use crate::error::StoreError;
        use std::time::Duration;

        let service = service_with(&[("a", "some text")]);
        let past = Instant::now() - Duration::from_millis(5);

        let err = service
            .search_by_text_with_deadline("some text", Some(1), Some(0.0), past)
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Store(StoreError::Timeout { .. })
        ));
    }

    #[test]
    fn test_defaults_applied_when_unspecified() {
        let service = service_with(&[("a", "alpha beta gamma")]).with_defaults(
            RetrievalDefaults {
                top_k: 1,
                score_threshold: 0.0,
            },
        );

        let chunks = service
            .search_by_text("alpha beta gamma", None, None)
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
