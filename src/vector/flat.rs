//! Exact brute-force index over contiguous row storage.
//!
//! Rows are kept in one flat `Vec<f32>` so a search is a single cache-
//! friendly sweep. O(N*D) per query, always the true top-k. The right
//! choice for small and medium collections and the reference behavior the
//! approximate topologies are measured against.

use crate::vector::math::inner_product;
use crate::vector::types::{DensePosition, Score, VectorDimension, VectorError};
use crate::vector::VectorIndex;

/// Exact inner-product index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: VectorDimension,
    /// Row-major storage, `len * dimension` values.
    rows: Vec<f32>,
}

impl FlatIndex {
    /// Creates an empty flat index for the given dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
        }
    }

    fn row(&self, position: usize) -> &[f32] {
        let d = self.dimension.get();
        &self.rows[position * d..(position + 1) * d]
    }
}

impl VectorIndex for FlatIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<DensePosition>, VectorError> {
        for vector in vectors {
            self.dimension.validate_vector(vector)?;
        }

        let start = self.len();
        self.rows.reserve(vectors.len() * self.dimension.get());
        for vector in vectors {
            self.rows.extend_from_slice(vector);
        }

        Ok((start..start + vectors.len())
            .map(|p| DensePosition::new(p as u32))
            .collect())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Score,
    ) -> Result<Vec<(DensePosition, Score)>, VectorError> {
        self.dimension.validate_vector(query)?;

        let mut candidates: Vec<(DensePosition, Score)> = (0..self.len())
            .filter_map(|position| {
                let score = Score::clamped(inner_product(query, self.row(position)));
                (score >= threshold).then(|| (DensePosition::new(position as u32), score))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.truncate(top_k);

        Ok(candidates)
    }

    fn reconstruct(&self, position: DensePosition) -> Result<Vec<f32>, VectorError> {
        if position.as_usize() >= self.len() {
            return Err(VectorError::NotReconstructable(position.get()));
        }
        Ok(self.row(position.as_usize()).to_vec())
    }

    fn train(&mut self, _samples: &[Vec<f32>]) -> Result<(), VectorError> {
        // Exact scan needs no training
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len() / self.dimension.get()
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

    #[test]
    fn test_add_assigns_monotonic_positions() {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());

        let first = index.add(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])]).unwrap();
        assert_eq!(first, vec![DensePosition::new(0), DensePosition::new(1)]);

        let second = index.add(&[unit(&[1.0, 1.0])]).unwrap();
        assert_eq!(second, vec![DensePosition::new(2)]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_search_exact_top_k() {
        let mut index = FlatIndex::new(VectorDimension::new(3).unwrap());
        index
            .add(&[
                unit(&[1.0, 0.0, 0.0]),
                unit(&[0.0, 1.0, 0.0]),
                unit(&[0.7, 0.7, 0.0]),
            ])
            .unwrap();

        let hits = index
            .search(&unit(&[1.0, 0.0, 0.0]), 2, Score::zero())
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, DensePosition::new(0));
        assert!((hits[0].1.get() - 1.0).abs() < 1e-6);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn test_search_threshold_filters() {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        index
            .add(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])])
            .unwrap();

        let hits = index
            .search(&unit(&[1.0, 0.0]), 10, Score::clamped(0.5))
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, DensePosition::new(0));
        for (_, score) in &hits {
            assert!(score.get() >= 0.5);
        }
    }

    #[test]
    fn test_search_empty_index() {
        let index = FlatIndex::new(VectorDimension::new(4).unwrap());
        let hits = index
            .search(&unit(&[1.0, 0.0, 0.0, 0.0]), 5, Score::zero())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = FlatIndex::new(VectorDimension::new(4).unwrap());
        assert!(matches!(
            index.add(&[vec![1.0, 0.0]]),
            Err(VectorError::DimensionMismatch { expected: 4, actual: 2 })
        ));
        assert!(index.search(&[1.0, 0.0], 5, Score::zero()).is_err());
    }

    #[test]
    fn test_reconstruct() {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        let row = unit(&[3.0, 4.0]);
        index.add(std::slice::from_ref(&row)).unwrap();

        assert_eq!(index.reconstruct(DensePosition::new(0)).unwrap(), row);
        assert!(matches!(
            index.reconstruct(DensePosition::new(1)),
            Err(VectorError::NotReconstructable(1))
        ));
    }
}
