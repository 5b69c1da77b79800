//! Process-wide artifact cache
//!
//! One entry per domain. An entry remembers the outcome of the last
//! locate+load (a ready artifact, nothing found, or a failed load of a
//! specific file) and when it was last checked. Entries are replaced whole;
//! readers hold an `Arc<Artifact>` that stays valid across a swap.
//!
//! Locate and load run behind a per-domain gate, so concurrent requests that
//! find a stale entry wait for a single rescan instead of each doing their own.

use crate::artifact::{self, Artifact};
use crate::domain::Domain;
use crate::errors::LoadError;
use crate::locator::{ArtifactRef, Locator};
use crate::metrics::MetricsRecorder;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of resolving a domain's artifact
#[derive(Debug, Clone)]
pub enum Lookup {
    Ready(Arc<Artifact>),
    NotFound,
    Failed(LoadError),
}

#[derive(Debug, Clone)]
enum Slot {
    Ready {
        reference: ArtifactRef,
        artifact: Arc<Artifact>,
    },
    Missing,
    Failed {
        reference: ArtifactRef,
        error: LoadError,
    },
}

impl Slot {
    fn reference(&self) -> Option<&ArtifactRef> {
        match self {
            Slot::Ready { reference, .. } | Slot::Failed { reference, .. } => Some(reference),
            Slot::Missing => None,
        }
    }

    fn lookup(&self) -> Lookup {
        match self {
            Slot::Ready { artifact, .. } => Lookup::Ready(Arc::clone(artifact)),
            Slot::Missing => Lookup::NotFound,
            Slot::Failed { error, .. } => Lookup::Failed(error.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    slot: Slot,
    checked_at: Instant,
}

/// Per-domain artifact cache with interval-based refresh
#[derive(Debug)]
pub struct ArtifactCache {
    entries: RwLock<HashMap<Domain, CacheEntry>>,
    /// Held only across locate+load, never by readers of a fresh entry
    load_gates: HashMap<Domain, Mutex<()>>,
    refresh_interval: Duration,
    metrics: Arc<MetricsRecorder>,
}

impl ArtifactCache {
    pub(crate) fn new(refresh_interval: Duration, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            load_gates: Domain::ALL
                .into_iter()
                .map(|domain| (domain, Mutex::new(())))
                .collect(),
            refresh_interval,
            metrics,
        }
    }

    /// Current artifact for `domain`, rescanning only when the entry is stale
    pub fn resolve(&self, domain: Domain, locator: &Locator) -> Lookup {
        if let Some(lookup) = self.fresh(domain) {
            return lookup;
        }

        let _gate = self.load_gates.get(&domain).map(|gate| gate.lock());
        // Another request may have refreshed the entry while this one waited.
        if let Some(lookup) = self.fresh(domain) {
            return lookup;
        }
        let previous = self
            .entries
            .read()
            .get(&domain)
            .map(|entry| entry.slot.clone());

        self.metrics.record(|m| m.rescans += 1);
        let located = locator.locate();

        // Same file as last time: trust the previous outcome, just restart the clock.
        if let Some(previous) = previous {
            if previous.reference() == located.as_ref() {
                let lookup = previous.lookup();
                self.store(domain, previous);
                return lookup;
            }
        }

        let slot = match located {
            None => {
                debug!(%domain, "no artifact located, rules will serve");
                Slot::Missing
            }
            Some(reference) => match artifact::load(&reference) {
                Ok(loaded) => {
                    info!(
                        %domain,
                        path = %reference.path.display(),
                        hash = %loaded.metadata().content_hash,
                        "artifact loaded"
                    );
                    Slot::Ready {
                        reference,
                        artifact: Arc::new(loaded),
                    }
                }
                Err(error) => {
                    warn!(%domain, path = %error.path().display(), %error, "artifact load failed");
                    self.metrics.record(|m| m.load_failures += 1);
                    Slot::Failed { reference, error }
                }
            },
        };
        let lookup = slot.lookup();
        self.store(domain, slot);
        lookup
    }

    /// The cached outcome when it was checked within the refresh interval
    fn fresh(&self, domain: Domain) -> Option<Lookup> {
        let entries = self.entries.read();
        let entry = entries.get(&domain)?;
        if entry.checked_at.elapsed() >= self.refresh_interval {
            return None;
        }
        self.metrics.record(|m| m.cache_hits += 1);
        Some(entry.slot.lookup())
    }

    fn store(&self, domain: Domain, slot: Slot) {
        self.entries.write().insert(
            domain,
            CacheEntry {
                slot,
                checked_at: Instant::now(),
            },
        );
    }

    /// Drop the entry so the next request rescans and reloads
    pub fn invalidate(&self, domain: Domain) {
        self.entries.write().remove(&domain);
    }

    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// The cached artifact, if one is ready, without touching disk
    pub fn peek(&self, domain: Domain) -> Option<Arc<Artifact>> {
        match &self.entries.read().get(&domain)?.slot {
            Slot::Ready { artifact, .. } => Some(Arc::clone(artifact)),
            _ => None,
        }
    }
}
