//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use contexture::{
    ChunkContent, ChunkSource, EmbeddingProvider, IndexOptions, IndexStore, IndexTopology,
    SharedIndexStore, VectorDimension, VectorError,
};

/// Deterministic trigram-hash embedder; equal texts embed identically.
pub struct HashEmbedder {
    dimension: VectorDimension,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).unwrap(),
        }
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let chars: Vec<char> = text.chars().collect();
                let mut embedding = vec![0.0f32; dim];
                for window in chars.windows(3.min(chars.len().max(1))) {
                    let mut hasher = DefaultHasher::new();
                    window.hash(&mut hasher);
                    embedding[(hasher.finish() as usize) % dim] += 1.0;
                }
                contexture::vector::math::normalize(&mut embedding);
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// In-memory chunk-content store.
#[derive(Default)]
pub struct MemoryChunkSource {
    contents: HashMap<String, ChunkContent>,
}

impl MemoryChunkSource {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let contents = entries
            .iter()
            .enumerate()
            .map(|(i, (id, text))| {
                (
                    id.to_string(),
                    ChunkContent {
                        text: text.to_string(),
                        source_document_id: format!("doc-{}", i / 4),
                        position_index: (i % 4) as u32,
                    },
                )
            })
            .collect();
        Self { contents }
    }
}

impl ChunkSource for MemoryChunkSource {
    fn get_content(&self, external_id: &str) -> Option<ChunkContent> {
        self.contents.get(external_id).cloned()
    }
}

/// A flat-topology shared store of the given dimension.
pub fn shared_flat_store(dimension: usize) -> SharedIndexStore {
    let store = IndexStore::new(
        IndexTopology::Flat,
        VectorDimension::new(dimension).unwrap(),
        IndexOptions::default(),
    )
    .unwrap();
    SharedIndexStore::new(store)
}

/// Embeds `texts` with `embedder` and returns (vectors, owned ids).
pub fn embed_all(
    embedder: &dyn EmbeddingProvider,
    entries: &[(&str, &str)],
) -> (Vec<Vec<f32>>, Vec<String>) {
    let vectors = entries
        .iter()
        .map(|(_, text)| embedder.embed(text).unwrap())
        .collect();
    let ids = entries.iter().map(|(id, _)| id.to_string()).collect();
    (vectors, ids)
}
