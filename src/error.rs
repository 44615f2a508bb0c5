//! Error types for the retrieval subsystem.
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. The split mirrors the
//! layering: [`crate::vector::VectorError`] for index-level failures,
//! [`StoreError`] for the identifier-mapped store, [`RetrievalError`] for
//! the query-facing service.

use crate::vector::VectorError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for index store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Index-level failure (dimension, training, reconstruction)
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(
        "Unknown identifier '{id}'\nSuggestion: Verify the id was added and not deleted by a rebuild"
    )]
    UnknownIdentifier { id: String },

    #[error(
        "Duplicate identifier '{id}'\nSuggestion: Delete the existing binding first or use a fresh id"
    )]
    DuplicateIdentifier { id: String },

    #[error(
        "Batch length mismatch: {vectors} vectors but {ids} identifiers\nSuggestion: Supply exactly one identifier per vector"
    )]
    BatchLengthMismatch { vectors: usize, ids: usize },

    /// Persistence I/O errors
    #[error("Failed to access '{path}': {source}\nSuggestion: Check disk space and permissions")]
    PersistenceIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid index image at '{path}': {reason}")]
    InvalidImage { path: PathBuf, reason: String },

    #[error(
        "Persisted image dimension mismatch: image was built for dimension {actual}, store is configured for {expected}\nSuggestion: Rebuild the index with the current embedding model"
    )]
    PersistedDimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Persisted image topology mismatch: image was built as '{actual}', store is configured as '{expected}'\nSuggestion: Rebuild the index with the configured topology"
    )]
    PersistedTopologyMismatch { expected: String, actual: String },

    #[error("Index appears to be corrupted: {reason}\nSuggestion: Rebuild the index from source data")]
    IndexCorrupt { reason: String },

    /// Search exceeded its caller-supplied deadline
    #[error("Operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// A cooperative cancellation signal fired mid-rebuild
    #[error("Operation cancelled; the prior index remains authoritative")]
    Cancelled,
}

impl StoreError {
    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::IndexCorrupt { .. } => vec![
                "Rebuild the index from the original document store",
                "Check for disk errors or filesystem corruption",
            ],
            Self::PersistedDimensionMismatch { .. } | Self::PersistedTopologyMismatch { .. } => {
                vec![
                    "The prior in-memory state was kept; the bad image was not adopted",
                    "Re-save after rebuilding with the current configuration",
                ]
            }
            Self::PersistenceIo { .. } => vec![
                "The in-memory index remains the source of truth",
                "Retry persistence after freeing disk space or fixing permissions",
            ],
            Self::Timeout { .. } => vec![
                "Retry with a longer deadline or a smaller top_k",
                "Consider an approximate topology for large collections",
            ],
            _ => vec![],
        }
    }
}

/// Main error type for query-facing retrieval operations.
///
/// An empty result set is a valid success, never an error; this type only
/// carries genuine failures so callers can distinguish "no matches" from
/// "operation failed".
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
