//! Feature normalization
//!
//! Maps a loosely-typed request onto the fixed, ordered vector a domain's
//! artifacts expect. Normalization is total: unknown keys are ignored,
//! unparseable values fall back to the slot default, and out-of-range values
//! are clamped.

use crate::domain::{Domain, FeatureSlot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw request features, keyed by whatever names the caller used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRequest(BTreeMap<String, Value>);

impl FeatureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object; anything that is not an object yields an empty request
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().collect()),
            _ => Self::default(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for FeatureRequest {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered numeric features; width and order always match the domain schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Short blake3 digest used to correlate log lines with a request
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for value in &self.0 {
            hasher.update(&value.to_bits().to_le_bytes());
        }
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Output of normalization: the model vector plus categorical values for rules
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeatures {
    pub domain: Domain,
    pub vector: FeatureVector,
    categories: BTreeMap<&'static str, String>,
}

impl NormalizedFeatures {
    /// Numeric value by canonical slot name, or the slot default
    pub fn value(&self, name: &str) -> f64 {
        let schema = self.domain.schema();
        match schema.index_of(name) {
            Some(idx) => self
                .vector
                .get(idx)
                .unwrap_or(schema.numeric[idx].default),
            None => 0.0,
        }
    }

    /// Lower-cased categorical value by canonical slot name
    pub fn category(&self, name: &str) -> &str {
        self.categories.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Build the feature vector and categorical values for `domain`
pub fn normalize(domain: Domain, request: &FeatureRequest) -> NormalizedFeatures {
    let schema = domain.schema();

    let values = schema
        .numeric
        .iter()
        .map(|slot| {
            lookup(request, slot.name, slot.aliases)
                .and_then(coerce_number)
                .map(|raw| clamp_to_slot(raw, slot))
                .unwrap_or(slot.default)
        })
        .collect();

    let categories = schema
        .categorical
        .iter()
        .map(|slot| {
            let value = lookup(request, slot.name, slot.aliases)
                .and_then(coerce_category)
                .unwrap_or_else(|| slot.default.to_string());
            (slot.name, value)
        })
        .collect();

    NormalizedFeatures {
        domain,
        vector: FeatureVector(values),
        categories,
    }
}

/// First present key among the canonical name and its aliases
fn lookup<'a>(request: &'a FeatureRequest, name: &str, aliases: &[&str]) -> Option<&'a Value> {
    std::iter::once(name)
        .chain(aliases.iter().copied())
        .find_map(|key| request.get(key).filter(|v| !v.is_null()))
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn coerce_category(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let normalized = s.trim().to_lowercase();
            (!normalized.is_empty()).then_some(normalized)
        }
        _ => None,
    }
}

fn clamp_to_slot(value: f64, slot: &FeatureSlot) -> f64 {
    match slot.range {
        Some((lo, hi)) => value.clamp(lo, hi),
        None => value,
    }
}
