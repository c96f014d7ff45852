//! Configuration for estate services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`ESTATE__` prefix, `__` between sections)
//! 2. Config file (`estate.toml`, or another prefix given on the command line)
//! 3. Defaults

use serde::Deserialize;

use crate::error::{EstateError, Result};

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EstateConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub classify: ClassifyConfig,
}

/// `[store]` section: where the embedded graph lives.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the store file. `:memory:` opens a private in-memory store.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Read connections kept in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// `[ingest]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Mutations applied per write transaction (default: 100).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retries of a failed chunk before it is reported (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Collector batches ingested concurrently.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Directory for the run journal.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
}

/// `[classify]` section: detector weights and thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyConfig {
    /// Findings must score strictly above this.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Confidence contributed by a name keyword hit.
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,

    /// Confidence contributed by checksum/structure validation.
    #[serde(default = "default_shape_weight")]
    pub shape_weight: f64,

    /// Share of non-null samples that must validate for full shape weight.
    #[serde(default = "default_shape_quorum")]
    pub shape_quorum: f64,

    /// Samples considered per column; extra values are ignored.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_store_path() -> String {
    "./estate.db".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_chunk_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_journal_dir() -> String {
    "./journal".to_string()
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_name_weight() -> f64 {
    0.6
}

fn default_shape_weight() -> f64 {
    0.9
}

fn default_shape_quorum() -> f64 {
    0.5
}

fn default_max_samples() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_concurrent_batches: default_max_concurrent_batches(),
            journal_dir: default_journal_dir(),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            name_weight: default_name_weight(),
            shape_weight: default_shape_weight(),
            shape_quorum: default_shape_quorum(),
            max_samples: default_max_samples(),
        }
    }
}

impl ClassifyConfig {
    /// Weights and thresholds are confidences, so each must lie in [0, 1].
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("name_weight", self.name_weight),
            ("shape_weight", self.shape_weight),
            ("shape_quorum", self.shape_quorum),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EstateError::Config(format!(
                    "classify.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl EstateConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) and `ESTATE__*`
    /// environment variables, falling back to defaults for anything unset.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("ESTATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: EstateConfig = cfg.try_deserialize()?;
        loaded.classify.validate()?;
        tracing::debug!(
            store = %loaded.store.path,
            chunk_size = loaded.ingest.chunk_size,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}
