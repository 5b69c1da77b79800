//! Pipeline counters

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_requests: u64,
    pub model_served: u64,
    pub fallbacks: u64,
    pub load_failures: u64,
    pub predict_failures: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub rescans: u64,
}

impl PipelineMetrics {
    /// Share of requests answered by a trained artifact
    pub fn model_hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.model_served as f64 / self.total_requests as f64
        }
    }
}

/// Shared, lock-protected counters
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    inner: RwLock<PipelineMetrics>,
}

impl MetricsRecorder {
    pub(crate) fn record(&self, update: impl FnOnce(&mut PipelineMetrics)) {
        let mut metrics = self.inner.write();
        update(&mut *metrics);
    }

    pub(crate) fn snapshot(&self) -> PipelineMetrics {
        self.inner.read().clone()
    }
}
