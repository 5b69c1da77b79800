//! Deserializable model definitions and the capability-typed predictor interface
//!
//! Two capabilities exist: classifiers that emit a probability distribution
//! and regressors that emit point estimates. Which one an artifact provides is
//! decided once, when the artifact is loaded.

use crate::errors::PredictError;
use serde::{Deserialize, Serialize};

/// What a predictor produced for one feature vector
#[derive(Debug, Clone, PartialEq)]
pub enum RawPrediction {
    /// Class probabilities indexed by label index
    Distribution(Vec<f64>),
    /// One value per model output
    PointEstimate(Vec<f64>),
}

impl RawPrediction {
    pub fn is_empty(&self) -> bool {
        match self {
            RawPrediction::Distribution(v) | RawPrediction::PointEstimate(v) => v.is_empty(),
        }
    }
}

/// A loaded model that can be invoked on a (scaled) feature vector
///
/// Implementations must be read-only so one instance can serve concurrent
/// requests.
pub trait Predictor: Send + Sync + std::fmt::Debug {
    /// Number of input features the model was trained on
    fn feature_count(&self) -> usize;

    /// Number of classes, or `None` for regressors
    fn label_count(&self) -> Option<usize>;

    fn predict(&self, features: &[f64]) -> Result<RawPrediction, PredictError>;
}

/// A single tree node; leaves carry a value, internal nodes a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub feature_index: usize,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Node {
    pub fn split(feature_index: usize, threshold: f64, left: usize, right: usize) -> Self {
        Self {
            feature_index,
            threshold,
            left,
            right,
            value: None,
        }
    }

    pub fn leaf(value: f64) -> Self {
        Self {
            feature_index: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

/// A decision tree stored as a flat node array rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.value.is_some() {
                continue;
            }
            if node.left >= self.nodes.len() || node.right >= self.nodes.len() {
                return Err(format!("node {idx} has a child outside the tree"));
            }
            if node.left <= idx || node.right <= idx {
                return Err(format!("node {idx} points backwards"));
            }
            if node.feature_index >= feature_count {
                return Err(format!(
                    "node {idx} splits on feature {} of {feature_count}",
                    node.feature_index
                ));
            }
        }
        Ok(())
    }

    /// Walk from the root; children always sit after their parent so this terminates
    fn eval(&self, features: &[f64]) -> Result<f64, PredictError> {
        let mut idx = 0usize;
        loop {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| PredictError::RuntimeFailure(format!("dangling node {idx}")))?;
            if let Some(value) = node.value {
                return Ok(value);
            }
            let feature = features.get(node.feature_index).copied().ok_or_else(|| {
                PredictError::RuntimeFailure(format!(
                    "feature {} missing from input",
                    node.feature_index
                ))
            })?;
            idx = if feature <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

/// Model definitions as they appear in artifact files, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// One ensemble per class; class score is the tree sum plus bias
    TreeEnsembleClassifier {
        feature_count: usize,
        classes: Vec<ClassEnsemble>,
    },
    /// Per-class weight rows; class score is `w · x + b`
    LinearClassifier {
        weights: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// One ensemble per output; output is the tree mean plus bias
    TreeEnsembleRegressor {
        feature_count: usize,
        outputs: Vec<ClassEnsemble>,
    },
    /// Per-output weight rows
    LinearRegressor {
        weights: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

/// Trees contributing to one class score or one regression output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEnsemble {
    #[serde(default)]
    pub bias: f64,
    pub trees: Vec<Tree>,
}

impl ModelSpec {
    pub const KINDS: [&'static str; 4] = [
        "tree_ensemble_classifier",
        "linear_classifier",
        "tree_ensemble_regressor",
        "linear_regressor",
    ];

    /// Check structure and turn the definition into a callable predictor
    pub fn into_predictor(self) -> Result<Box<dyn Predictor>, String> {
        match self {
            ModelSpec::TreeEnsembleClassifier {
                feature_count,
                classes,
            } => {
                validate_ensembles(&classes, feature_count, "class")?;
                if classes.len() < 2 {
                    return Err("classifier needs at least two classes".to_string());
                }
                Ok(Box::new(Classifier {
                    feature_count,
                    scorer: Scorer::Trees {
                        ensembles: classes,
                        average: false,
                    },
                }))
            }
            ModelSpec::LinearClassifier {
                weights,
                intercepts,
            } => {
                let feature_count = validate_linear(&weights, &intercepts)?;
                if weights.len() < 2 {
                    return Err("classifier needs at least two classes".to_string());
                }
                Ok(Box::new(Classifier {
                    feature_count,
                    scorer: Scorer::Linear {
                        weights,
                        intercepts,
                    },
                }))
            }
            ModelSpec::TreeEnsembleRegressor {
                feature_count,
                outputs,
            } => {
                validate_ensembles(&outputs, feature_count, "output")?;
                Ok(Box::new(Regressor {
                    feature_count,
                    scorer: Scorer::Trees {
                        ensembles: outputs,
                        average: true,
                    },
                }))
            }
            ModelSpec::LinearRegressor {
                weights,
                intercepts,
            } => {
                let feature_count = validate_linear(&weights, &intercepts)?;
                Ok(Box::new(Regressor {
                    feature_count,
                    scorer: Scorer::Linear {
                        weights,
                        intercepts,
                    },
                }))
            }
        }
    }
}

fn validate_ensembles(
    ensembles: &[ClassEnsemble],
    feature_count: usize,
    what: &str,
) -> Result<(), String> {
    if feature_count == 0 {
        return Err("model declares no features".to_string());
    }
    if ensembles.is_empty() {
        return Err(format!("model has no {what} ensembles"));
    }
    for (i, ensemble) in ensembles.iter().enumerate() {
        if ensemble.trees.is_empty() {
            return Err(format!("{what} {i} has no trees"));
        }
        for (t, tree) in ensemble.trees.iter().enumerate() {
            tree.validate(feature_count)
                .map_err(|e| format!("{what} {i}, tree {t}: {e}"))?;
        }
    }
    Ok(())
}

fn validate_linear(weights: &[Vec<f64>], intercepts: &[f64]) -> Result<usize, String> {
    let width = weights
        .first()
        .map(Vec::len)
        .ok_or_else(|| "linear model has no weight rows".to_string())?;
    if width == 0 {
        return Err("model declares no features".to_string());
    }
    if weights.iter().any(|row| row.len() != width) {
        return Err("weight rows differ in width".to_string());
    }
    if intercepts.len() != weights.len() {
        return Err(format!(
            "{} intercepts for {} weight rows",
            intercepts.len(),
            weights.len()
        ));
    }
    Ok(width)
}

#[derive(Debug)]
enum Scorer {
    Trees {
        ensembles: Vec<ClassEnsemble>,
        average: bool,
    },
    Linear {
        weights: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

impl Scorer {
    fn scores(&self, features: &[f64]) -> Result<Vec<f64>, PredictError> {
        match self {
            Scorer::Trees { ensembles, average } => ensembles
                .iter()
                .map(|ensemble| {
                    let mut sum = 0.0;
                    for tree in &ensemble.trees {
                        sum += tree.eval(features)?;
                    }
                    if *average {
                        sum /= ensemble.trees.len() as f64;
                    }
                    Ok(sum + ensemble.bias)
                })
                .collect(),
            Scorer::Linear {
                weights,
                intercepts,
            } => Ok(weights
                .iter()
                .zip(intercepts)
                .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + b)
                .collect()),
        }
    }
}

/// Classification with confidence scores
#[derive(Debug)]
pub struct Classifier {
    feature_count: usize,
    scorer: Scorer,
}

impl Predictor for Classifier {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn label_count(&self) -> Option<usize> {
        Some(match &self.scorer {
            Scorer::Trees { ensembles, .. } => ensembles.len(),
            Scorer::Linear { weights, .. } => weights.len(),
        })
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction, PredictError> {
        let scores = self.scorer.scores(features)?;
        Ok(RawPrediction::Distribution(softmax(&scores)?))
    }
}

/// Point-estimate regression without a confidence notion
#[derive(Debug)]
pub struct Regressor {
    feature_count: usize,
    scorer: Scorer,
}

impl Predictor for Regressor {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn label_count(&self) -> Option<usize> {
        None
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction, PredictError> {
        let values = self.scorer.scores(features)?;
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(PredictError::RuntimeFailure(format!(
                "regression output is not finite: {bad}"
            )));
        }
        Ok(RawPrediction::PointEstimate(values))
    }
}

/// Numerically stable softmax; fails on non-finite scores
fn softmax(scores: &[f64]) -> Result<Vec<f64>, PredictError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PredictError::RuntimeFailure(
            "class scores overflowed".to_string(),
        ));
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / total).collect())
}
