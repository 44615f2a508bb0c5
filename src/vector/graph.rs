//! Graph-approximate index: an HNSW-style layered proximity graph.
//!
//! Rows are nodes in a multi-layer graph. Upper layers hold an
//! exponentially thinning subset of nodes and act as an express lane for
//! greedy descent; layer 0 holds everyone. A query greedily descends to
//! layer 1, then runs a best-first beam of width `ef_search` at layer 0.
//!
//! # Tuning
//! - `m`: maximum links per node on upper layers (layer 0 allows `2 * m`)
//! - `ef_construction`: build-time beam width; controls graph quality
//! - `ef_search`: query-time beam width (recall vs. latency)
//!
//! Neighbor selection keeps the top-m candidates by similarity. This is
//! the simple selection rule, not the full pruning heuristic from the
//! HNSW paper; it favors implementation clarity and is accurate enough at
//! the collection sizes this store targets.

use std::collections::{BinaryHeap, HashSet};

use rand::Rng;

use crate::vector::math::inner_product;
use crate::vector::types::{DensePosition, Score, VectorDimension, VectorError};
use crate::vector::VectorIndex;

/// Hard cap on sampled node levels.
const MAX_LEVEL: usize = 16;

/// One graph node; `links[l]` are its neighbors on layer `l`.
#[derive(Debug, Clone, Default)]
struct Node {
    links: Vec<Vec<u32>>,
}

/// Search-frontier entry ordered by similarity (ties broken by position
/// so the ordering is total).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    position: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Layered proximity-graph index.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    dimension: VectorDimension,
    m: usize,
    m0: usize,
    ef_construction: usize,
    ef_search: usize,
    /// Level sampling multiplier, 1 / ln(m).
    level_mult: f64,

    /// Row-major raw storage for scoring and reconstruction.
    rows: Vec<f32>,
    nodes: Vec<Node>,
    entry: Option<u32>,
    max_level: usize,
}

impl HnswIndex {
    /// Creates an empty graph index.
    pub fn new(
        dimension: VectorDimension,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Result<Self, VectorError> {
        if m < 2 {
            return Err(VectorError::InvalidParameter("HNSW m must be at least 2"));
        }
        if ef_construction == 0 || ef_search == 0 {
            return Err(VectorError::InvalidParameter("HNSW ef parameters must be at least 1"));
        }

        Ok(Self {
            dimension,
            m,
            m0: 2 * m,
            ef_construction,
            ef_search,
            level_mult: 1.0 / (m as f64).ln(),
            rows: Vec::new(),
            nodes: Vec::new(),
            entry: None,
            max_level: 0,
        })
    }

    /// Returns an empty index with the same configuration.
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self {
            dimension: self.dimension,
            m: self.m,
            m0: self.m0,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            level_mult: self.level_mult,
            rows: Vec::new(),
            nodes: Vec::new(),
            entry: None,
            max_level: 0,
        }
    }

    /// Maximum upper-layer link count.
    #[must_use]
    pub fn m(&self) -> usize {
        self.m
    }

    /// Build-time beam width.
    #[must_use]
    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    /// Query-time beam width.
    #[must_use]
    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    fn row(&self, position: usize) -> &[f32] {
        let d = self.dimension.get();
        &self.rows[position * d..(position + 1) * d]
    }

    fn score(&self, query: &[f32], position: u32) -> f32 {
        inner_product(query, self.row(position as usize))
    }

    /// Draws a level from the standard geometric distribution.
    fn sample_level(&self) -> usize {
        let u: f64 = rand::rng().random::<f64>();
        let u = u.max(f64::MIN_POSITIVE);
        (((-u.ln()) * self.level_mult) as usize).min(MAX_LEVEL)
    }

    /// Greedy hill climb toward the query on one layer.
    fn greedy_closest(&self, query: &[f32], start: u32, layer: usize) -> u32 {
        let mut current = start;
        let mut best = self.score(query, current);

        loop {
            let mut improved = false;
            for &neighbor in &self.nodes[current as usize].links[layer] {
                let score = self.score(query, neighbor);
                if score > best {
                    best = score;
                    current = neighbor;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first beam search on one layer.
    ///
    /// Returns up to `ef` candidates sorted descending by similarity.
    fn search_layer(&self, query: &[f32], entry: u32, ef: usize, layer: usize) -> Vec<Candidate> {
        let entry_candidate = Candidate {
            score: self.score(query, entry),
            position: entry,
        };

        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);

        // Frontier is a max-heap; the result set keeps its worst on top so
        // eviction is O(log ef)
        let mut frontier = BinaryHeap::new();
        frontier.push(entry_candidate);
        let mut results: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
        results.push(std::cmp::Reverse(entry_candidate));

        while let Some(current) = frontier.pop() {
            let worst = results
                .peek()
                .map(|r| r.0.score)
                .unwrap_or(f32::NEG_INFINITY);
            if results.len() >= ef && current.score < worst {
                break;
            }

            for &neighbor in &self.nodes[current.position as usize].links[layer] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let score = self.score(query, neighbor);
                let worst = results
                    .peek()
                    .map(|r| r.0.score)
                    .unwrap_or(f32::NEG_INFINITY);
                if results.len() < ef || score > worst {
                    let candidate = Candidate {
                        score,
                        position: neighbor,
                    };
                    frontier.push(candidate);
                    results.push(std::cmp::Reverse(candidate));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<Candidate> = results.into_iter().map(|r| r.0).collect();
        found.sort_by(|a, b| b.cmp(a));
        found
    }

    /// Re-caps a node's link list after new edges were attached.
    fn prune(&mut self, node: u32, layer: usize) {
        let cap = if layer == 0 { self.m0 } else { self.m };
        if self.nodes[node as usize].links[layer].len() <= cap {
            return;
        }

        let base = self.row(node as usize).to_vec();
        let mut scored: Vec<(f32, u32)> = self.nodes[node as usize].links[layer]
            .iter()
            .map(|&nb| (inner_product(&base, self.row(nb as usize)), nb))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(cap);

        self.nodes[node as usize].links[layer] = scored.into_iter().map(|(_, nb)| nb).collect();
    }

    /// Wires one new node (whose row is already stored) into the graph.
    fn insert_one(&mut self, position: u32) {
        let level = self.sample_level();
        self.nodes.push(Node {
            links: vec![Vec::new(); level + 1],
        });

        let Some(entry) = self.entry else {
            self.entry = Some(position);
            self.max_level = level;
            return;
        };

        let query = self.row(position as usize).to_vec();
        let top = self.max_level;
        let mut current = entry;

        // Express descent through layers above the new node's level
        for layer in ((level + 1)..=top).rev() {
            current = self.greedy_closest(&query, current, layer);
        }

        // Attach on every shared layer, widest beam first
        for layer in (0..=level.min(top)).rev() {
            let found = self.search_layer(&query, current, self.ef_construction, layer);
            let cap = if layer == 0 { self.m0 } else { self.m };

            for candidate in found.iter().take(cap) {
                let neighbor = candidate.position;
                self.nodes[position as usize].links[layer].push(neighbor);
                self.nodes[neighbor as usize].links[layer].push(position);
                self.prune(neighbor, layer);
            }

            if let Some(best) = found.first() {
                current = best.position;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry = Some(position);
        }
    }
}

impl VectorIndex for HnswIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<DensePosition>, VectorError> {
        for vector in vectors {
            self.dimension.validate_vector(vector)?;
        }

        let start = self.len();
        let mut assigned = Vec::with_capacity(vectors.len());
        for (offset, vector) in vectors.iter().enumerate() {
            let position = (start + offset) as u32;
            self.rows.extend_from_slice(vector);
            self.insert_one(position);
            assigned.push(DensePosition::new(position));
        }

        Ok(assigned)
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Score,
    ) -> Result<Vec<(DensePosition, Score)>, VectorError> {
        self.dimension.validate_vector(query)?;

        let Some(entry) = self.entry else {
            return Ok(Vec::new());
        };

        let mut current = entry;
        for layer in (1..=self.max_level).rev() {
            current = self.greedy_closest(query, current, layer);
        }

        let ef = self.ef_search.max(top_k);
        let found = self.search_layer(query, current, ef, 0);

        Ok(found
            .into_iter()
            .map(|c| (DensePosition::new(c.position), Score::clamped(c.score)))
            .filter(|(_, score)| *score >= threshold)
            .take(top_k)
            .collect())
    }

    fn reconstruct(&self, position: DensePosition) -> Result<Vec<f32>, VectorError> {
        if position.as_usize() >= self.len() {
            return Err(VectorError::NotReconstructable(position.get()));
        }
        Ok(self.row(position.as_usize()).to_vec())
    }

    fn train(&mut self, _samples: &[Vec<f32>]) -> Result<(), VectorError> {
        // Graph construction is incremental; no training phase
        Ok(())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
