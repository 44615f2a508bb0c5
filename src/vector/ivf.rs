//! Clustered-approximate (inverted-file) index.
//!
//! The vector space is partitioned into `nlist` clusters by a K-means
//! quantizer; each row lands in the inverted list of its nearest centroid
//! and a query only scans the `nprobe` most promising lists. Sub-linear
//! search at the cost of recall, tuned by:
//! - `nlist`: more clusters mean finer partitioning but slower training
//!   and possible empty clusters
//! - `nprobe`: more probed lists mean better recall but higher latency
//!
//! The quantizer must be trained on at least `2 * nlist` vectors before
//! rows are added. An untrained index receiving `add` bootstraps itself
//! from generated random samples instead of failing; recall is degraded
//! until the quantizer is retrained on real data, and the bootstrap emits
//! a warning saying so.

use rand::Rng;
use tracing::{debug, warn};

use crate::vector::clustering::{kmeans_clustering, nearest_centroid};
use crate::vector::math::{inner_product, normalize};
use crate::vector::types::{DensePosition, Score, VectorDimension, VectorError};
use crate::vector::VectorIndex;

/// Inverted-file index with a K-means quantizer.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    dimension: VectorDimension,
    nlist: usize,
    nprobe: usize,

    /// Unit-norm centroids; empty until trained.
    centroids: Vec<Vec<f32>>,

    /// One inverted list of row positions per centroid.
    lists: Vec<Vec<u32>>,

    /// Row-major raw storage for rescanning and reconstruction.
    rows: Vec<f32>,
}

impl IvfIndex {
    /// Creates an empty, untrained IVF index.
    pub fn new(
        dimension: VectorDimension,
        nlist: usize,
        nprobe: usize,
    ) -> Result<Self, VectorError> {
        if nlist == 0 {
            return Err(VectorError::InvalidParameter("nlist must be at least 1"));
        }
        if nprobe == 0 {
            return Err(VectorError::InvalidParameter("nprobe must be at least 1"));
        }

        Ok(Self {
            dimension,
            nlist,
            nprobe,
            centroids: Vec::new(),
            lists: Vec::new(),
            rows: Vec::new(),
        })
    }

    /// True once the quantizer has centroids.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Cluster count this index was configured with.
    #[must_use]
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    /// Probed cluster count per query.
    #[must_use]
    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    /// Returns an empty index with the same configuration.
    ///
    /// The trained quantizer survives; rows and inverted lists do not.
    #[must_use]
    pub fn fresh(&self) -> Self {
        let lists = if self.is_trained() {
            vec![Vec::new(); self.nlist]
        } else {
            Vec::new()
        };
        Self {
            dimension: self.dimension,
            nlist: self.nlist,
            nprobe: self.nprobe,
            centroids: self.centroids.clone(),
            lists,
            rows: Vec::new(),
        }
    }

    /// Installs centroids directly, bypassing training.
    ///
    /// Used by the persistence layer when reloading an image that already
    /// carries a trained quantizer. Existing rows are reassigned.
    pub(crate) fn install_centroids(&mut self, centroids: Vec<Vec<f32>>) -> Result<(), VectorError> {
        if centroids.len() != self.nlist {
            return Err(VectorError::ClusteringFailed(format!(
                "expected {} centroids, got {}",
                self.nlist,
                centroids.len()
            )));
        }
        for centroid in &centroids {
            self.dimension.validate_vector(centroid)?;
        }
        self.centroids = centroids;
        self.reassign_all();
        Ok(())
    }

    /// Read access for the persistence layer.
    pub(crate) fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    fn row(&self, position: usize) -> &[f32] {
        let d = self.dimension.get();
        &self.rows[position * d..(position + 1) * d]
    }

    fn row_count(&self) -> usize {
        self.rows.len() / self.dimension.get()
    }

    /// Rebuilds every inverted list from the current rows.
    fn reassign_all(&mut self) {
        self.lists = vec![Vec::new(); self.nlist];
        let centroid_refs: Vec<&[f32]> = self.centroids.iter().map(|c| c.as_slice()).collect();
        for position in 0..self.row_count() {
            let list = nearest_centroid(self.row(position), &centroid_refs);
            self.lists[list].push(position as u32);
        }
    }

    /// Trains the quantizer from generated random unit vectors.
    ///
    /// Mirrors the bootstrap behavior of stores that refuse to fail a
    /// first `add`: recall is degraded until `train` is called with real
    /// data.
    fn bootstrap_train(&mut self) -> Result<(), VectorError> {
        let sample_count = 2 * self.nlist;
        warn!(
            nlist = self.nlist,
            samples = sample_count,
            "IVF index is untrained; bootstrapping quantizer from random samples. \
             Recall will be degraded until retrained on real data"
        );

        let mut rng = rand::rng();
        let d = self.dimension.get();
        let samples: Vec<Vec<f32>> = (0..sample_count)
            .map(|_| {
                let mut v: Vec<f32> = (0..d).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
                normalize(&mut v);
                v
            })
            .collect();

        self.train(&samples)
    }
}

impl VectorIndex for IvfIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<DensePosition>, VectorError> {
        for vector in vectors {
            self.dimension.validate_vector(vector)?;
        }

        if !self.is_trained() {
            // A failed bootstrap means the index cannot accept rows at all
            self.bootstrap_train()
                .map_err(|e| VectorError::NotTrained(e.to_string()))?;
        }

        // Assignment pass first so the centroid borrow ends before mutation
        let refs: Vec<&[f32]> = self.centroids.iter().map(|c| c.as_slice()).collect();
        let targets: Vec<usize> = vectors.iter().map(|v| nearest_centroid(v, &refs)).collect();
        drop(refs);

        let start = self.row_count();
        let mut assigned = Vec::with_capacity(vectors.len());
        for (offset, (vector, list)) in vectors.iter().zip(targets).enumerate() {
            let position = (start + offset) as u32;
            self.rows.extend_from_slice(vector);
            self.lists[list].push(position);
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

        if self.is_empty() || !self.is_trained() {
            return Ok(Vec::new());
        }

        // Rank centroids by similarity, probe the nprobe best
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, centroid)| (i, inner_product(query, centroid)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.nprobe);

        let mut candidates = Vec::new();
        for (list, _) in &ranked {
            for &position in &self.lists[*list] {
                let score = Score::clamped(inner_product(query, self.row(position as usize)));
                if score >= threshold {
                    candidates.push((DensePosition::new(position), score));
                }
            }
        }

        debug!(
            probed = ranked.len(),
            candidates = candidates.len(),
            "IVF probe complete"
        );

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.truncate(top_k);

        Ok(candidates)
    }

    fn reconstruct(&self, position: DensePosition) -> Result<Vec<f32>, VectorError> {
        if position.as_usize() >= self.row_count() {
            return Err(VectorError::NotReconstructable(position.get()));
        }
        Ok(self.row(position.as_usize()).to_vec())
    }

    fn train(&mut self, samples: &[Vec<f32>]) -> Result<(), VectorError> {
        let required = 2 * self.nlist;
        if samples.len() < required {
            return Err(VectorError::InsufficientTraining {
                required,
                actual: samples.len(),
            });
        }
        for sample in samples {
            self.dimension.validate_vector(sample)?;
        }

        let result = kmeans_clustering(samples, self.nlist)
            .map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        self.centroids = result.centroids;
        self.reassign_all();

        debug!(
            nlist = self.nlist,
            iterations = result.iterations,
            "IVF quantizer trained"
        );

        Ok(())
    }

    fn len(&self) -> usize {
        self.row_count()
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::math::normalized;

    fn unit(values: &[f32]) -> Vec<f32> {
        normalized(values)
    }

    fn axis_vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let mut v = vec![0.0; dim];
                v[i % dim] = 1.0;
                v[(i + 1) % dim] = 0.1 * (i as f32 + 1.0);
                normalized(&v)
            })
            .collect()
    }

    #[test]
    fn test_train_requires_twice_nlist() {
        let mut index = IvfIndex::new(VectorDimension::new(8).unwrap(), 4, 2).unwrap();
        let samples = axis_vectors(7, 8);

        let err = index.train(&samples).unwrap_err();
        assert!(matches!(
            err,
            VectorError::InsufficientTraining { required: 8, actual: 7 }
        ));

        let samples = axis_vectors(8, 8);
        index.train(&samples).unwrap();
        assert!(index.is_trained());
    }

    #[test]
    fn test_untrained_add_bootstraps() {
        let mut index = IvfIndex::new(VectorDimension::new(16).unwrap(), 4, 4).unwrap();
        assert!(!index.is_trained());

        // Two vectors, fewer than 2*nlist: bootstrap must kick in
        let positions = index
            .add(&[unit(&[1.0; 16]), unit(&[-1.0; 16])])
            .unwrap();

        assert!(index.is_trained());
        assert_eq!(
            positions,
            vec![DensePosition::new(0), DensePosition::new(1)]
        );
    }

    #[test]
    fn test_search_finds_exact_match_with_full_probe() {
        let dimension = VectorDimension::new(8).unwrap();
        // nprobe == nlist makes IVF exhaustive, so recall is exact
        let mut index = IvfIndex::new(dimension, 2, 2).unwrap();

        let vectors = axis_vectors(8, 8);
        index.train(&vectors).unwrap();
        index.add(&vectors).unwrap();

        for (i, query) in vectors.iter().enumerate() {
            let hits = index.search(query, 1, Score::zero()).unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].0, DensePosition::new(i as u32));
            assert!((hits[0].1.get() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_search_results_sorted_and_bounded() {
        let dimension = VectorDimension::new(8).unwrap();
        let mut index = IvfIndex::new(dimension, 2, 2).unwrap();

        let vectors = axis_vectors(12, 8);
        index.train(&vectors).unwrap();
        index.add(&vectors).unwrap();

        let hits = index.search(&vectors[0], 5, Score::zero()).unwrap();
        assert!(hits.len() <= 5);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_fresh_keeps_quantizer_drops_rows() {
        let dimension = VectorDimension::new(8).unwrap();
        let mut index = IvfIndex::new(dimension, 2, 2).unwrap();

        let vectors = axis_vectors(8, 8);
        index.train(&vectors).unwrap();
        index.add(&vectors).unwrap();

        let fresh = index.fresh();
        assert!(fresh.is_trained());
        assert!(fresh.is_empty());
        assert_eq!(fresh.nlist(), 2);
    }

    #[test]
    fn test_empty_search() {
        let index = IvfIndex::new(VectorDimension::new(4).unwrap(), 2, 1).unwrap();
        let hits = index
            .search(&unit(&[1.0, 0.0, 0.0, 0.0]), 3, Score::zero())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = IvfIndex::new(VectorDimension::new(4).unwrap(), 2, 1).unwrap();
        assert!(index.add(&[vec![1.0, 0.0]]).is_err());
        assert!(index.search(&[1.0, 0.0], 3, Score::zero()).is_err());
    }
}
