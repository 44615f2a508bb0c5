//! Configuration module for the retrieval subsystem.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`contexture.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CONTEXTURE_` and use
//! double underscores to separate nested levels:
//! - `CONTEXTURE_INDEX__TOPOLOGY=hnsw` sets `index.topology`
//! - `CONTEXTURE_INDEX__DIMENSION=768` sets `index.dimension`
//! - `CONTEXTURE_RETRIEVAL__MAX_CONTEXT_TOKENS=4096` sets
//!   `retrieval.max_context_tokens`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::retrieval::RetrievalDefaults;
use crate::vector::{EMBEDDING_DIMENSION_384, IndexOptions, IndexTopology};

/// Name of the configuration file searched in the working directory.
pub const CONFIG_FILE_NAME: &str = "contexture.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Index construction settings
    #[serde(default)]
    pub index: IndexSettings,

    /// Query-facing retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexSettings {
    /// Index topology selected once at construction
    #[serde(default = "default_topology")]
    pub topology: IndexTopology,

    /// Vector dimension; must match the embedding model output
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Directory persisted images are saved to and loaded from
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// IVF cluster count
    #[serde(default = "default_nlist")]
    pub nlist: usize,

    /// IVF probed clusters per query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// HNSW links per node on upper layers
    #[serde(default = "default_m")]
    pub m: usize,

    /// HNSW build-time beam width
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// HNSW query-time beam width
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl IndexSettings {
    /// Collects the tuning knobs for index construction.
    #[must_use]
    pub fn options(&self) -> IndexOptions {
        IndexOptions {
            nlist: self.nlist,
            nprobe: self.nprobe,
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalSettings {
    /// Default result count per search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Default minimum similarity score
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Token budget for assembled context
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Label prefixed to each assembled chunk
    #[serde(default = "default_context_label")]
    pub context_label: String,
}

impl RetrievalSettings {
    /// Collects the per-search fallback parameters.
    #[must_use]
    pub fn defaults(&self) -> RetrievalDefaults {
        RetrievalDefaults {
            top_k: self.top_k,
            score_threshold: self.score_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingSettings {
    /// Directory model files are downloaded to and cached in
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: PathBuf,
}

fn default_version() -> u32 {
    1
}

fn default_topology() -> IndexTopology {
    IndexTopology::Flat
}

fn default_dimension() -> usize {
    EMBEDDING_DIMENSION_384
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".contexture/index")
}

fn default_nlist() -> usize {
    64
}

fn default_nprobe() -> usize {
    8
}

fn default_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

fn default_top_k() -> usize {
    8
}

fn default_score_threshold() -> f32 {
    0.35
}

fn default_max_context_tokens() -> usize {
    2048
}

fn default_context_label() -> String {
    "Source".to_string()
}

fn default_model_cache_dir() -> PathBuf {
    PathBuf::from(".contexture/models")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index: IndexSettings::default(),
            retrieval: RetrievalSettings::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            topology: default_topology(),
            dimension: default_dimension(),
            data_dir: default_data_dir(),
            nlist: default_nlist(),
            nprobe: default_nprobe(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            max_context_tokens: default_max_context_tokens(),
            context_label: default_context_label(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_cache_dir: default_model_cache_dir(),
        }
    }
}

impl Settings {
    /// Loads settings from defaults, `contexture.toml` in the working
    /// directory, and `CONTEXTURE_`-prefixed environment variables, in
    /// that precedence order.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Path::new(CONFIG_FILE_NAME)).extract()
    }

    /// Loads settings with an explicit configuration file path.
    pub fn load_from(config_path: &Path) -> Result<Self, figment::Error> {
        Self::figment(config_path).extract()
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CONTEXTURE_").split("__"))
    }
}
