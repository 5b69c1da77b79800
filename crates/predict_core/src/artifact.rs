//! Artifact loading
//!
//! Two on-disk shapes are accepted:
//! - a bundle object with a `model` key and optional `scaler`,
//!   `label_encoder`, `feature_names`, `created_at` and `version`;
//! - a bare model object, with `scaler.json` and `label_encoder.json` picked
//!   up from the same directory when present.
//!
//! Every check happens here: an [`Artifact`] that exists is fully usable.

use crate::errors::LoadError;
use crate::locator::ArtifactRef;
use crate::models::{ModelSpec, Predictor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, instrument};

pub const SCALER_FILE: &str = "scaler.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";

/// Feature scaler fitted at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl Scaler {
    pub fn width(&self) -> usize {
        match self {
            Scaler::Standard { mean, .. } => mean.len(),
            Scaler::MinMax { min, .. } => min.len(),
        }
    }

    fn is_consistent(&self) -> bool {
        match self {
            Scaler::Standard { mean, scale } => mean.len() == scale.len(),
            Scaler::MinMax { min, scale } => min.len() == scale.len(),
        }
    }

    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        match self {
            Scaler::Standard { mean, scale } => features
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| {
                    // sklearn stores 1.0 for zero-variance columns; older dumps may not
                    let s = if *s == 0.0 { 1.0 } else { *s };
                    (x - m) / s
                })
                .collect(),
            Scaler::MinMax { min, scale } => features
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        }
    }
}

/// Maps class indices back to label strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDecoder {
    pub classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    /// Label for `index`, or the stringified index when out of range
    pub fn decode(&self, index: usize) -> String {
        self.classes
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Descriptive data captured at load time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub source: PathBuf,
    /// Unix seconds; the bundle's own timestamp, else the file mtime
    pub created_at: u64,
    pub version: Option<String>,
    pub feature_names: Vec<String>,
    pub feature_count: usize,
    pub label_count: Option<usize>,
    /// blake3 of the artifact file bytes
    pub content_hash: String,
}

/// A predictor plus its auxiliary transforms, immutable once built
#[derive(Debug)]
pub struct Artifact {
    predictor: Box<dyn Predictor>,
    scaler: Option<Scaler>,
    decoder: Option<LabelDecoder>,
    metadata: ArtifactMetadata,
}

impl Artifact {
    /// Assemble an artifact from in-memory parts, applying the load-time checks
    pub fn new(
        predictor: Box<dyn Predictor>,
        scaler: Option<Scaler>,
        decoder: Option<LabelDecoder>,
        metadata: ArtifactMetadata,
    ) -> Result<Self, LoadError> {
        let path = metadata.source.clone();
        let feature_count = predictor.feature_count();

        if let Some(scaler) = &scaler {
            if !scaler.is_consistent() || scaler.width() != feature_count {
                return Err(LoadError::corrupt(
                    path,
                    format!(
                        "scaler width {} does not match model feature count {}",
                        scaler.width(),
                        feature_count
                    ),
                ));
            }
        }
        if let (Some(decoder), Some(labels)) = (&decoder, predictor.label_count()) {
            if decoder.len() != labels {
                return Err(LoadError::corrupt(
                    path,
                    format!(
                        "label encoder has {} classes, model has {}",
                        decoder.len(),
                        labels
                    ),
                ));
            }
        }
        if !metadata.feature_names.is_empty() && metadata.feature_names.len() != feature_count {
            return Err(LoadError::corrupt(
                path,
                format!(
                    "{} feature names declared for {} model features",
                    metadata.feature_names.len(),
                    feature_count
                ),
            ));
        }

        let metadata = ArtifactMetadata {
            feature_count,
            label_count: predictor.label_count(),
            ..metadata
        };
        Ok(Self {
            predictor,
            scaler,
            decoder,
            metadata,
        })
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.scaler.as_ref()
    }

    pub fn decoder(&self) -> Option<&LabelDecoder> {
        self.decoder.as_ref()
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }
}

/// Bundle layout as written by training jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub model: ModelSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<Scaler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_encoder: Option<LabelDecoder>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Bundle fields other than the model, parsed after the model's shape is known
#[derive(Debug, Default, Deserialize)]
struct BundleExtras {
    #[serde(default)]
    scaler: Option<Scaler>,
    #[serde(default)]
    label_encoder: Option<LabelDecoder>,
    #[serde(default)]
    feature_names: Vec<String>,
    #[serde(default)]
    created_at: Option<u64>,
    #[serde(default)]
    version: Option<String>,
}

/// Deserialize a located artifact into a usable [`Artifact`]
#[instrument(skip(reference), fields(path = %reference.path.display()))]
pub fn load(reference: &ArtifactRef) -> Result<Artifact, LoadError> {
    let path = reference.path.as_path();
    let bytes = fs::read(path).map_err(|e| LoadError::corrupt(path, format!("read failed: {e}")))?;
    let content_hash = blake3::hash(&bytes).to_hex().to_string();
    let mut document: Value = serde_json::from_slice(&bytes)
        .map_err(|e| LoadError::corrupt(path, format!("invalid JSON: {e}")))?;

    let is_bundle = document
        .as_object()
        .map(|obj| obj.contains_key("model"))
        .unwrap_or(false);

    let (predictor, extras) = if is_bundle {
        let model = document
            .as_object_mut()
            .and_then(|obj| obj.remove("model"))
            .unwrap_or(Value::Null);
        let predictor = build_predictor(path, model)?;
        let extras: BundleExtras = serde_json::from_value(document)
            .map_err(|e| LoadError::corrupt(path, format!("invalid bundle field: {e}")))?;
        debug!("loaded bundle artifact");
        (predictor, extras)
    } else {
        let predictor = build_predictor(path, document)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let extras = BundleExtras {
            scaler: read_sibling(&dir.join(SCALER_FILE))?,
            label_encoder: read_sibling(&dir.join(LABEL_ENCODER_FILE))?,
            ..BundleExtras::default()
        };
        debug!(
            scaler = extras.scaler.is_some(),
            label_encoder = extras.label_encoder.is_some(),
            "loaded bare predictor"
        );
        (predictor, extras)
    };

    let mtime_secs = reference
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let metadata = ArtifactMetadata {
        source: path.to_path_buf(),
        created_at: extras.created_at.unwrap_or(mtime_secs),
        version: extras.version,
        feature_names: extras.feature_names,
        feature_count: predictor.feature_count(),
        label_count: predictor.label_count(),
        content_hash,
    };

    Artifact::new(predictor, extras.scaler, extras.label_encoder, metadata)
}

/// Capability check: the model object must name a known predictor kind
fn build_predictor(path: &Path, model: Value) -> Result<Box<dyn Predictor>, LoadError> {
    let kind = match model.get("kind") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => return Err(LoadError::unsupported(path, "model kind is not a string")),
        None => {
            return Err(LoadError::unsupported(
                path,
                "model exposes no prediction capability",
            ))
        }
    };
    if !ModelSpec::KINDS.iter().any(|known| *known == kind) {
        return Err(LoadError::unsupported(
            path,
            format!("unknown model kind {kind:?}"),
        ));
    }
    let spec: ModelSpec = serde_json::from_value(model)
        .map_err(|e| LoadError::corrupt(path, format!("invalid {kind} model: {e}")))?;
    spec.into_predictor()
        .map_err(|reason| LoadError::corrupt(path, reason))
}

/// Missing siblings are tolerated; present-but-unreadable ones are not
fn read_sibling<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, LoadError> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|e| LoadError::corrupt(path, format!("read failed: {e}")))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LoadError::corrupt(path, format!("invalid JSON: {e}")))
}
