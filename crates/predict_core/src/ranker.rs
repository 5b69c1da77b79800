//! Candidate ranking and the uniform output contract

use crate::artifact::LabelDecoder;
use crate::domain::Domain;
use crate::models::RawPrediction;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default number of ranked candidates per request
pub const DEFAULT_TOP_K: usize = 5;

/// Base confidence of the first placeholder candidate over a regression output
pub const REGRESSION_BASE_CONFIDENCE: f64 = 85.0;

/// Confidence step between consecutive placeholder candidates
pub const REGRESSION_CONFIDENCE_STEP: f64 = 5.0;

/// Which path produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Model,
    /// Placeholder ranking over a regression output, not a class ranking
    ModelRegression,
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    TrainedArtifact,
    BuiltInRules,
}

/// One ranked output unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    /// Percentage in [0, 100], rounded to two decimals
    pub confidence: f64,
    pub method: Method,
    pub source: Source,
    /// Estimated quantity for regression-style domains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Candidate {
    pub fn rule(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: round2(confidence.clamp(0.0, 100.0)),
            method: Method::Rule,
            source: Source::BuiltInRules,
            value: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(round2(value));
        self
    }
}

/// Ranked candidates, non-increasing in confidence, at most `top_k` long
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult(Vec<Candidate>);

impl PredictionResult {
    /// Order by descending confidence and cap at `k`; equal confidences keep input order
    pub fn ranked(mut candidates: Vec<Candidate>, k: usize) -> Self {
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(k);
        Self(candidates)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.0
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.0
    }
}

impl<'a> IntoIterator for &'a PredictionResult {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Turn a raw model output into ranked candidates
///
/// Total over any raw prediction; returns `min(k, available)` entries.
pub fn rank(
    raw: &RawPrediction,
    decoder: Option<&LabelDecoder>,
    k: usize,
    domain: Domain,
) -> PredictionResult {
    match raw {
        RawPrediction::Distribution(probabilities) => rank_distribution(probabilities, decoder, k),
        RawPrediction::PointEstimate(values) => rank_point_estimate(values, decoder, k, domain),
    }
}

fn rank_distribution(
    probabilities: &[f64],
    decoder: Option<&LabelDecoder>,
    k: usize,
) -> PredictionResult {
    let sanitized = |p: f64| if p.is_finite() { p } else { 0.0 };

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    // Stable sort: equal probabilities keep ascending index order.
    order.sort_by(|&a, &b| {
        sanitized(probabilities[b]).total_cmp(&sanitized(probabilities[a]))
    });

    let candidates = order
        .into_iter()
        .take(k)
        .map(|idx| Candidate {
            label: decoder
                .map(|d| d.decode(idx))
                .unwrap_or_else(|| idx.to_string()),
            confidence: round2((sanitized(probabilities[idx]) * 100.0).clamp(0.0, 100.0)),
            method: Method::Model,
            source: Source::TrainedArtifact,
            value: None,
        })
        .collect();
    PredictionResult(candidates)
}

fn rank_point_estimate(
    values: &[f64],
    decoder: Option<&LabelDecoder>,
    k: usize,
    domain: Domain,
) -> PredictionResult {
    let count = match decoder {
        Some(d) if !d.is_empty() => k.min(values.len()),
        _ if values.is_empty() => 0,
        _ => k,
    };

    let candidates = (0..count)
        .map(|i| {
            let label = match decoder {
                Some(d) if !d.is_empty() => d.decode(i),
                _ => format!("{}_{}", domain.synthetic_label_prefix(), i),
            };
            let value = values
                .get(i)
                .or_else(|| values.last())
                .copied()
                .map(round2);
            let confidence =
                (REGRESSION_BASE_CONFIDENCE - REGRESSION_CONFIDENCE_STEP * i as f64).max(0.0);
            Candidate {
                label,
                confidence,
                method: Method::ModelRegression,
                source: Source::TrainedArtifact,
                value,
            }
        })
        .collect();
    PredictionResult(candidates)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_takes_top_k_with_decoded_labels() {
        let decoder = LabelDecoder::new(["L0", "L1", "L2"]);
        let raw = RawPrediction::Distribution(vec![0.6, 0.3, 0.1]);
        let result = rank(&raw, Some(&decoder), 2, Domain::Crop);

        let got: Vec<_> = result
            .iter()
            .map(|c| (c.label.as_str(), c.confidence, c.method))
            .collect();
        assert_eq!(
            got,
            vec![("L0", 60.0, Method::Model), ("L1", 30.0, Method::Model)]
        );
    }

    #[test]
    fn ties_break_by_lower_index() {
        let raw = RawPrediction::Distribution(vec![0.2, 0.4, 0.4]);
        let result = rank(&raw, None, 3, Domain::Disease);
        let labels: Vec<_> = result.iter().map(|c| c.label.clone()).collect();
        assert_eq!(labels, vec!["1", "2", "0"]);
    }

    #[test]
    fn confidence_rounds_to_two_decimals() {
        let raw = RawPrediction::Distribution(vec![0.123456, 0.876544]);
        let result = rank(&raw, None, 5, Domain::Crop);
        assert_eq!(result.len(), 2);
        assert_eq!(result.candidates()[0].confidence, 87.65);
        assert_eq!(result.candidates()[1].confidence, 12.35);
    }

    #[test]
    fn regression_without_labels_synthesizes_placeholders() {
        let raw = RawPrediction::PointEstimate(vec![0.42]);
        let result = rank(&raw, None, 5, Domain::Crop);
        let got: Vec<_> = result
            .iter()
            .map(|c| (c.label.as_str(), c.confidence))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Crop_0", 85.0),
                ("Crop_1", 80.0),
                ("Crop_2", 75.0),
                ("Crop_3", 70.0),
                ("Crop_4", 65.0)
            ]
        );
        assert!(result
            .iter()
            .all(|c| c.method == Method::ModelRegression && c.value == Some(0.42)));
    }

    #[test]
    fn regression_with_labels_names_each_output() {
        let decoder = LabelDecoder::new(["temperature", "humidity"]);
        let raw = RawPrediction::PointEstimate(vec![31.256, 70.0]);
        let result = rank(&raw, Some(&decoder), 5, Domain::Weather);
        assert_eq!(result.len(), 2);
        assert_eq!(result.candidates()[0].label, "temperature");
        assert_eq!(result.candidates()[0].value, Some(31.26));
        assert_eq!(result.candidates()[1].confidence, 80.0);
    }

    #[test]
    fn placeholder_confidence_never_goes_negative() {
        let raw = RawPrediction::PointEstimate(vec![1.0]);
        let result = rank(&raw, None, 25, Domain::MarketPrice);
        assert_eq!(result.len(), 25);
        assert!(result.iter().all(|c| c.confidence >= 0.0));
        assert_eq!(result.candidates()[0].label, "Price_0");
    }

    #[test]
    fn serializes_method_and_source_tags() {
        let json = serde_json::to_value(Candidate::rule("Rice", 100.0)).unwrap();
        assert_eq!(json["method"], "rule");
        assert_eq!(json["source"], "built-in-rules");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn ranked_orders_and_truncates() {
        let result = PredictionResult::ranked(
            vec![
                Candidate::rule("a", 60.0),
                Candidate::rule("b", 90.0),
                Candidate::rule("c", 60.0),
            ],
            2,
        );
        let labels: Vec<_> = result.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a"]);
    }
}
