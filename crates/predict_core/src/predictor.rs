//! Primary predictor stage: scale, invoke, sanity-check the raw output

use crate::artifact::Artifact;
use crate::errors::PredictError;
use crate::features::FeatureVector;
use crate::models::RawPrediction;
use std::borrow::Cow;

/// Run the artifact's model on `vector`
///
/// Read-only over the artifact, so concurrent calls on one cached artifact are safe.
pub fn predict(artifact: &Artifact, vector: &FeatureVector) -> Result<RawPrediction, PredictError> {
    let expected = artifact.metadata().feature_count;
    if vector.len() != expected {
        return Err(PredictError::ShapeMismatch {
            expected,
            actual: vector.len(),
        });
    }

    let input: Cow<'_, [f64]> = match artifact.scaler() {
        Some(scaler) => Cow::Owned(scaler.transform(vector.as_slice())),
        None => Cow::Borrowed(vector.as_slice()),
    };
    if input.iter().any(|x| !x.is_finite()) {
        return Err(PredictError::RuntimeFailure(
            "scaled features are not finite".to_string(),
        ));
    }

    let raw = artifact.predictor().predict(&input)?;
    if raw.is_empty() {
        return Err(PredictError::RuntimeFailure(
            "predictor returned no outputs".to_string(),
        ));
    }
    if let RawPrediction::Distribution(probabilities) = &raw {
        if probabilities
            .iter()
            .any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0 + 1e-9)
        {
            return Err(PredictError::RuntimeFailure(
                "predictor returned invalid probabilities".to_string(),
            ));
        }
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactMetadata, Scaler};
    use crate::models::ModelSpec;
    use std::path::PathBuf;

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            source: PathBuf::from("memory"),
            created_at: 0,
            version: None,
            feature_names: Vec::new(),
            feature_count: 0,
            label_count: None,
            content_hash: String::new(),
        }
    }

    fn regressor(scaler: Option<Scaler>) -> Artifact {
        let predictor = ModelSpec::LinearRegressor {
            weights: vec![vec![1.0, 1.0]],
            intercepts: vec![0.0],
        }
        .into_predictor()
        .unwrap();
        Artifact::new(predictor, scaler, None, metadata()).unwrap()
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let artifact = regressor(None);
        let err = predict(&artifact, &FeatureVector::from(vec![1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(
            err,
            PredictError::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn scaler_is_applied_before_the_model() {
        let artifact = regressor(Some(Scaler::Standard {
            mean: vec![1.0, 1.0],
            scale: vec![1.0, 2.0],
        }));
        let raw = predict(&artifact, &FeatureVector::from(vec![3.0, 5.0])).unwrap();
        assert_eq!(raw, RawPrediction::PointEstimate(vec![4.0]));
    }

    #[test]
    fn unscaled_vector_is_used_as_is() {
        let artifact = regressor(None);
        let raw = predict(&artifact, &FeatureVector::from(vec![3.0, 5.0])).unwrap();
        assert_eq!(raw, RawPrediction::PointEstimate(vec![8.0]));
    }
}
