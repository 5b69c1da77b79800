//! Tiered agricultural prediction pipeline
//!
//! Serves crop, disease, market-price and weather predictions from the newest
//! trained artifact on disk, and falls back to deterministic rules whenever no
//! artifact is present or the model tier fails. A known domain always yields a
//! non-empty ranked result.
//!
//! Modules:
//! - `domain`: Prediction domains and their feature schemas
//! - `features`: Request features and normalization into fixed vectors
//! - `locator`: Artifact discovery by file pattern and modification time
//! - `artifact`: Artifact loading (bundle or bare model with siblings)
//! - `models`: Predictor trait and the tree/linear model kinds
//! - `predictor`: Scaled model invocation with output checks
//! - `ranker`: Candidate ranking and the output contract
//! - `rules`: Deterministic per-domain rule engine
//! - `cache`: Process-wide per-domain artifact cache
//! - `pipeline`: Orchestrator, provenance and the global entry point
//! - `config`: TOML and environment configuration
//! - `metrics`: Pipeline counters

pub mod artifact;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod features;
pub mod locator;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod ranker;
pub mod rules;

pub use artifact::{load, Artifact, ArtifactBundle, ArtifactMetadata, LabelDecoder, Scaler};
pub use config::{DomainConfig, PipelineConfig};
pub use domain::Domain;
pub use errors::{ConfigError, InputError, LoadError, PredictError, Result};
pub use features::{normalize, FeatureRequest, FeatureVector, NormalizedFeatures};
pub use locator::{ArtifactRef, FilePattern, Locator};
pub use metrics::PipelineMetrics;
pub use models::{ModelSpec, Predictor, RawPrediction};
pub use pipeline::{
    global, predict, FallbackReason, Pipeline, PipelineState, Prediction, Provenance,
};
pub use ranker::{rank, Candidate, Method, PredictionResult, Source, DEFAULT_TOP_K};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
