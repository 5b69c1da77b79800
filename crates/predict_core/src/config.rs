//! Pipeline configuration
//!
//! Loaded from a TOML file (path from `AGRI_PREDICT_CONFIG`, else
//! `config/predict.toml` when present), then overridden by environment
//! variables. Every field has a default so an empty file is valid.

use crate::domain::Domain;
use crate::errors::ConfigError;
use crate::locator::{FilePattern, Locator};
use crate::ranker::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "AGRI_PREDICT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/predict.toml";

const MODEL_ROOT_ENV: &str = "AGRI_MODEL_ROOT";
const REFRESH_SECS_ENV: &str = "AGRI_REFRESH_SECS";
const TOP_K_ENV: &str = "AGRI_TOP_K";
const TIMEOUT_MS_ENV: &str = "AGRI_TIMEOUT_MS";

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the artifact store; each domain defaults to `<root>/<domain>`
    pub model_root: PathBuf,
    /// How long a locate result is trusted before the directory is rescanned
    pub refresh_interval_secs: u64,
    /// Candidates returned when the caller does not ask for a count
    pub default_top_k: usize,
    /// Budget for the model tier in the async entry point
    pub request_timeout_ms: u64,
    /// Per-domain overrides keyed by domain name
    pub domains: BTreeMap<String, DomainConfig>,
}

/// Per-domain artifact store overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Serve this domain from rules only
    pub enabled: bool,
    pub directory: Option<PathBuf>,
    pub primary_pattern: Option<String>,
    pub legacy_pattern: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("./models"),
            refresh_interval_secs: 300,
            default_top_k: DEFAULT_TOP_K,
            request_timeout_ms: 2_000,
            domains: BTreeMap::new(),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            primary_pattern: None,
            legacy_pattern: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the config file, apply environment overrides and validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded pipeline configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn with_model_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.model_root = root.into();
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_secs = interval.as_secs();
        self
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; split out so tests need not touch the process env
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(MODEL_ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            self.model_root = PathBuf::from(root.trim());
        }
        if let Some(secs) = parse_override(&lookup, REFRESH_SECS_ENV)? {
            self.refresh_interval_secs = secs;
        }
        if let Some(k) = parse_override(&lookup, TOP_K_ENV)? {
            self.default_top_k = k;
        }
        if let Some(ms) = parse_override(&lookup, TIMEOUT_MS_ENV)? {
            self.request_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_top_k == 0 {
            return Err(ConfigError::InvalidEnv {
                key: "default_top_k".to_string(),
                value: "0".to_string(),
            });
        }
        for name in self.domains.keys() {
            Domain::from_str(name).map_err(|_| ConfigError::InvalidEnv {
                key: "domains".to_string(),
                value: name.clone(),
            })?;
        }
        for domain in Domain::ALL {
            self.locator_for(domain)?;
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn domain_config(&self, domain: Domain) -> Option<&DomainConfig> {
        self.domains.iter().find_map(|(name, cfg)| {
            (Domain::from_str(name).ok() == Some(domain)).then_some(cfg)
        })
    }

    /// Locator for `domain`, or `None` when the domain is pinned to rules
    pub fn locator_for(&self, domain: Domain) -> Result<Option<Locator>, ConfigError> {
        let overrides = self.domain_config(domain);
        if overrides.map(|cfg| !cfg.enabled).unwrap_or(false) {
            return Ok(None);
        }
        let (primary, legacy) = domain.default_patterns();
        let directory = overrides
            .and_then(|cfg| cfg.directory.clone())
            .unwrap_or_else(|| self.model_root.join(domain.as_str()));
        let primary = overrides
            .and_then(|cfg| cfg.primary_pattern.as_deref())
            .unwrap_or(primary);
        let legacy = overrides
            .and_then(|cfg| cfg.legacy_pattern.as_deref())
            .unwrap_or(legacy);

        Ok(Some(Locator {
            directory,
            primary: FilePattern::new(primary)?,
            legacy: if legacy.is_empty() {
                None
            } else {
                Some(FilePattern::new(legacy)?)
            },
        }))
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
    }
}
