//! Pipeline orchestrator
//!
//! Sequences locate, load, normalize, predict and rank for one request and
//! drops to the rule engine whenever the model tier cannot answer. Callers
//! only ever see an [`InputError`]; every other failure becomes a rule-served
//! [`Prediction`] carrying a [`FallbackReason`].

use crate::cache::{ArtifactCache, Lookup};
use crate::config::PipelineConfig;
use crate::domain::Domain;
use crate::errors::{InputError, Result};
use crate::features::{normalize, FeatureRequest, NormalizedFeatures};
use crate::locator::Locator;
use crate::metrics::{MetricsRecorder, PipelineMetrics};
use crate::predictor;
use crate::ranker::{self, PredictionResult};
use crate::rules;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Orchestrator stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Locating,
    Loading,
    Normalizing,
    Predicting,
    Ranking,
    FallingBack,
    Done,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Locating)
                | (Locating, Loading)
                | (Loading, Normalizing)
                | (Normalizing, Predicting)
                | (Predicting, Ranking)
                | (Ranking, Done)
                | (Idle | Locating | Loading | Predicting | Ranking, FallingBack)
                | (FallingBack, Done)
        )
    }
}

/// Which tier answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Model,
    Rule,
}

/// Why the model tier did not answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No artifact file matched; the normal state before any training run
    NotFound,
    /// The domain is configured to serve rules only
    Disabled,
    LoadFailed(String),
    PredictFailed(String),
    Timeout,
    EmptyResult,
}

/// Caller-facing outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub domain: Domain,
    pub provenance: Provenance,
    pub candidates: PredictionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

impl Prediction {
    pub fn is_fallback(&self) -> bool {
        self.provenance == Provenance::Rule
    }
}

/// Per-request stage tracker
struct Run {
    domain: Domain,
    state: PipelineState,
    /// Set once the run enters `Ranking`, for a caller racing a deadline
    ranking: Option<Arc<AtomicBool>>,
}

impl Run {
    fn new(domain: Domain) -> Self {
        Self {
            domain,
            state: PipelineState::Idle,
            ranking: None,
        }
    }

    fn watched(domain: Domain, ranking: Arc<AtomicBool>) -> Self {
        Self {
            ranking: Some(ranking),
            ..Self::new(domain)
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(domain = %self.domain, from = ?self.state, to = ?next, "pipeline transition");
        if next == PipelineState::Ranking {
            if let Some(flag) = &self.ranking {
                flag.store(true, Ordering::Release);
            }
        }
        self.state = next;
    }
}

#[derive(Debug)]
struct Inner {
    config: PipelineConfig,
    locators: HashMap<Domain, Locator>,
    cache: ArtifactCache,
    metrics: Arc<MetricsRecorder>,
}

/// Tiered prediction pipeline; cheap to clone and safe to share
#[derive(Debug, Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let mut locators = HashMap::new();
        for domain in Domain::ALL {
            match config.locator_for(domain) {
                Ok(Some(locator)) => {
                    locators.insert(domain, locator);
                }
                Ok(None) => debug!(%domain, "model tier disabled, serving rules only"),
                Err(e) => warn!(%domain, error = %e, "invalid artifact pattern, serving rules only"),
            }
        }
        let metrics = Arc::new(MetricsRecorder::default());
        let cache = ArtifactCache::new(config.refresh_interval(), Arc::clone(&metrics));
        Self {
            inner: Arc::new(Inner {
                config,
                locators,
                cache,
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn default_top_k(&self) -> usize {
        self.inner.config.default_top_k
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.inner.metrics.snapshot()
    }

    /// Force a rescan and reload for `domain` on its next request
    pub fn reload(&self, domain: Domain) {
        debug!(%domain, "artifact reload requested");
        self.inner.cache.invalidate(domain);
    }

    pub fn reload_all(&self) {
        debug!("artifact reload requested for all domains");
        self.inner.cache.invalidate_all();
    }

    /// Metadata of the currently cached artifact, if any
    pub fn cached_artifact(&self, domain: Domain) -> Option<crate::artifact::ArtifactMetadata> {
        self.inner
            .cache
            .peek(domain)
            .map(|artifact| artifact.metadata().clone())
    }

    /// Answer one request; fails only on a malformed domain name or `top_k`
    pub fn predict(
        &self,
        domain: &str,
        request: &FeatureRequest,
        top_k: usize,
    ) -> Result<Prediction> {
        let domain = self.begin(domain, top_k)?;
        let mut run = Run::new(domain);
        let normalized = normalize(domain, request);
        let outcome = self.model_tier(&mut run, &normalized, top_k);
        Ok(self.finish(run, &normalized, top_k, outcome))
    }

    /// Like [`Pipeline::predict`], but the model tier runs on a blocking task and
    /// falls back to rules if it has not reached ranking within `timeout`
    pub async fn predict_with_timeout(
        &self,
        domain: &str,
        request: &FeatureRequest,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Prediction> {
        let domain = self.begin(domain, top_k)?;
        let normalized = normalize(domain, request);

        let pipeline = self.clone();
        let task_features = normalized.clone();
        let ranking = Arc::new(AtomicBool::new(false));
        let task_ranking = Arc::clone(&ranking);
        let mut task = tokio::task::spawn_blocking(move || {
            let mut run = Run::watched(domain, task_ranking);
            let outcome = pipeline.model_tier(&mut run, &task_features, top_k);
            (run, outcome)
        });

        let joined = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => Some(joined),
            // Past Ranking only the candidate list remains to be built; keep it.
            Err(_) if ranking.load(Ordering::Acquire) => Some(task.await),
            Err(_) => None,
        };
        let (run, outcome) = match joined {
            Some(Ok((run, outcome))) => (run, outcome),
            Some(Err(join_error)) => {
                error!(%domain, error = %join_error, "model tier task failed");
                self.inner.metrics.record(|m| m.predict_failures += 1);
                (
                    Run::new(domain),
                    Err(FallbackReason::PredictFailed(join_error.to_string())),
                )
            }
            None => {
                warn!(%domain, timeout_ms = timeout.as_millis() as u64, "model tier timed out");
                self.inner.metrics.record(|m| m.timeouts += 1);
                (Run::new(domain), Err(FallbackReason::Timeout))
            }
        };
        Ok(self.finish(run, &normalized, top_k, outcome))
    }

    fn begin(&self, domain: &str, top_k: usize) -> Result<Domain> {
        if top_k == 0 {
            return Err(InputError::InvalidTopK);
        }
        let domain: Domain = domain.parse()?;
        self.inner.metrics.record(|m| m.total_requests += 1);
        Ok(domain)
    }

    /// Locate through Rank. Any `Err` sends the run to the rule engine.
    fn model_tier(
        &self,
        run: &mut Run,
        features: &NormalizedFeatures,
        top_k: usize,
    ) -> std::result::Result<PredictionResult, FallbackReason> {
        let domain = run.domain;
        let locator = self
            .inner
            .locators
            .get(&domain)
            .ok_or(FallbackReason::Disabled)?;

        run.advance(PipelineState::Locating);
        let artifact = match self.inner.cache.resolve(domain, locator) {
            Lookup::Ready(artifact) => artifact,
            Lookup::NotFound => return Err(FallbackReason::NotFound),
            Lookup::Failed(e) => {
                run.advance(PipelineState::Loading);
                return Err(FallbackReason::LoadFailed(e.to_string()));
            }
        };
        run.advance(PipelineState::Loading);
        run.advance(PipelineState::Normalizing);

        run.advance(PipelineState::Predicting);
        let raw = predictor::predict(&artifact, &features.vector).map_err(|e| {
            warn!(
                %domain,
                digest = %features.vector.digest(),
                error = %e,
                "prediction failed"
            );
            self.inner.metrics.record(|m| m.predict_failures += 1);
            FallbackReason::PredictFailed(e.to_string())
        })?;

        run.advance(PipelineState::Ranking);
        let ranked = ranker::rank(&raw, artifact.decoder(), top_k, domain);
        if ranked.is_empty() {
            return Err(FallbackReason::EmptyResult);
        }
        Ok(ranked)
    }

    fn finish(
        &self,
        mut run: Run,
        features: &NormalizedFeatures,
        top_k: usize,
        outcome: std::result::Result<PredictionResult, FallbackReason>,
    ) -> Prediction {
        let domain = run.domain;
        match outcome {
            Ok(candidates) => {
                run.advance(PipelineState::Done);
                self.inner.metrics.record(|m| m.model_served += 1);
                Prediction {
                    domain,
                    provenance: Provenance::Model,
                    candidates,
                    fallback_reason: None,
                }
            }
            Err(reason) => {
                run.advance(PipelineState::FallingBack);
                debug!(%domain, ?reason, "serving from rules");
                let candidates = rules::evaluate(features, top_k);
                run.advance(PipelineState::Done);
                self.inner.metrics.record(|m| m.fallbacks += 1);
                Prediction {
                    domain,
                    provenance: Provenance::Rule,
                    candidates,
                    fallback_reason: Some(reason),
                }
            }
        }
    }
}

static GLOBAL: Lazy<Pipeline> = Lazy::new(|| {
    let config = PipelineConfig::load().unwrap_or_else(|e| {
        error!(error = %e, "invalid pipeline configuration, using defaults");
        PipelineConfig::default()
    });
    Pipeline::new(config)
});

/// Process-wide pipeline built from [`PipelineConfig::load`] on first use
pub fn global() -> &'static Pipeline {
    &GLOBAL
}

/// Predict through the process-wide pipeline
pub fn predict(domain: &str, features: &FeatureRequest, top_k: usize) -> Result<Prediction> {
    global().predict(domain, features, top_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_only() -> Pipeline {
        let dir = tempfile::tempdir().unwrap();
        Pipeline::new(PipelineConfig::default().with_model_root(dir.path().join("none")))
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        use PipelineState::*;
        let path = [Idle, Locating, Loading, Normalizing, Predicting, Ranking, Done];
        assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
        assert!(!Normalizing.can_transition_to(FallingBack));
        assert!(!Done.can_transition_to(Locating));
    }

    #[test]
    fn entering_ranking_signals_the_watcher() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut run = Run::watched(Domain::Crop, Arc::clone(&flag));
        for state in [
            PipelineState::Locating,
            PipelineState::Loading,
            PipelineState::Normalizing,
            PipelineState::Predicting,
        ] {
            run.advance(state);
            assert!(!flag.load(Ordering::Acquire));
        }
        run.advance(PipelineState::Ranking);
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn rejects_zero_top_k_and_unknown_domain() {
        let pipeline = rules_only();
        let request = FeatureRequest::new();
        assert_eq!(
            pipeline.predict("crop", &request, 0).unwrap_err(),
            InputError::InvalidTopK
        );
        assert_eq!(
            pipeline.predict("soil", &request, 5).unwrap_err(),
            InputError::UnknownDomain("soil".to_string())
        );
        assert_eq!(pipeline.metrics().total_requests, 0);
    }

    #[test]
    fn missing_artifacts_fall_back_to_rules() {
        let pipeline = rules_only();
        let prediction = pipeline.predict("weather", &FeatureRequest::new(), 3).unwrap();
        assert!(prediction.is_fallback());
        assert_eq!(prediction.fallback_reason, Some(FallbackReason::NotFound));
        assert!(!prediction.candidates.is_empty());

        let metrics = pipeline.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.fallbacks, 1);
    }

    #[test]
    fn disabled_domain_never_scans() {
        let mut config = PipelineConfig::default();
        config.domains.insert(
            "crop".to_string(),
            crate::config::DomainConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let pipeline = Pipeline::new(config);
        let prediction = pipeline.predict("crop", &FeatureRequest::new(), 5).unwrap();
        assert_eq!(prediction.fallback_reason, Some(FallbackReason::Disabled));
        assert_eq!(pipeline.metrics().rescans, 0);
    }

    #[test]
    fn prediction_serializes_provenance() {
        let prediction = rules_only()
            .predict("disease", &FeatureRequest::new(), 1)
            .unwrap();
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["domain"], "disease");
        assert_eq!(json["provenance"], "rule");
        assert_eq!(json["fallback_reason"]["kind"], "not_found");
        assert_eq!(json["candidates"].as_array().unwrap().len(), 1);
    }
}
