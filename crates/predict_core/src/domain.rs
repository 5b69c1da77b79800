//! Prediction domains and their declarative feature schemas

use crate::errors::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One prediction use-case. Fixes the feature schema, label space and rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Disease,
    Crop,
    MarketPrice,
    Weather,
}

/// A numeric slot of the feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSlot {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default: f64,
    /// Inclusive valid range; values outside are clamped into it
    pub range: Option<(f64, f64)>,
}

/// A string-valued slot consumed by the rule engine only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoricalSlot {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default: &'static str,
}

/// Ordered schema for one domain
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub numeric: &'static [FeatureSlot],
    pub categorical: &'static [CategoricalSlot],
}

impl Schema {
    /// Width of the feature vector handed to artifacts
    pub fn width(&self) -> usize {
        self.numeric.len()
    }

    /// Position of a numeric slot by canonical name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.numeric.iter().position(|slot| slot.name == name)
    }
}

const fn slot(
    name: &'static str,
    aliases: &'static [&'static str],
    default: f64,
    range: Option<(f64, f64)>,
) -> FeatureSlot {
    FeatureSlot {
        name,
        aliases,
        default,
        range,
    }
}

const CROP_NUMERIC: &[FeatureSlot] = &[
    slot("N", &["nitrogen", "n"], 70.0, Some((0.0, 300.0))),
    slot("P", &["phosphorus", "p"], 40.0, Some((0.0, 300.0))),
    slot("K", &["potassium", "k"], 40.0, Some((0.0, 300.0))),
    slot("temperature", &["temp"], 25.0, Some((-20.0, 60.0))),
    slot("humidity", &[], 65.0, Some((0.0, 100.0))),
    slot("ph", &["pH", "PH"], 7.0, Some((0.0, 14.0))),
    slot("rainfall", &["rain"], 800.0, Some((0.0, 5000.0))),
];

const CROP_CATEGORICAL: &[CategoricalSlot] = &[CategoricalSlot {
    name: "soil_type",
    aliases: &["soilType", "soil"],
    default: "alluvial",
}];

const DISEASE_NUMERIC: &[FeatureSlot] = &[
    slot("temperature", &["temp"], 25.0, Some((-20.0, 60.0))),
    slot("humidity", &[], 65.0, Some((0.0, 100.0))),
    slot(
        "leaf_wetness_hours",
        &["leafWetness", "wetness_hours"],
        0.0,
        Some((0.0, 24.0)),
    ),
    slot("rainfall", &["rain"], 0.0, Some((0.0, 5000.0))),
    slot(
        "lesion_coverage",
        &["spot_density", "lesionCoverage"],
        0.0,
        Some((0.0, 1.0)),
    ),
];

const DISEASE_CATEGORICAL: &[CategoricalSlot] = &[CategoricalSlot {
    name: "crop_type",
    aliases: &["cropType", "crop"],
    default: "unknown",
}];

const MARKET_NUMERIC: &[FeatureSlot] = &[
    slot("month", &[], 0.0, Some((0.0, 12.0))),
    slot("horizon_days", &["days", "days_ahead"], 7.0, Some((1.0, 365.0))),
    slot(
        "latest_price",
        &["price", "current_price"],
        0.0,
        Some((0.0, f64::MAX)),
    ),
    slot(
        "average_price",
        &["avg_price", "mean_price"],
        0.0,
        Some((0.0, f64::MAX)),
    ),
];

const MARKET_CATEGORICAL: &[CategoricalSlot] = &[CategoricalSlot {
    name: "commodity",
    aliases: &["crop", "crop_type"],
    default: "rice",
}];

const WEATHER_NUMERIC: &[FeatureSlot] = &[
    slot("temperature", &["temp"], 25.0, Some((-60.0, 60.0))),
    slot("humidity", &[], 65.0, Some((0.0, 100.0))),
    slot("pressure", &[], 1013.0, Some((850.0, 1100.0))),
    slot("wind_speed", &["windSpeed", "wind"], 10.0, Some((0.0, 300.0))),
    slot("rainfall", &["rain"], 0.0, Some((0.0, 5000.0))),
];

impl Domain {
    /// Every domain, in a stable order
    pub const ALL: [Domain; 4] = [
        Domain::Disease,
        Domain::Crop,
        Domain::MarketPrice,
        Domain::Weather,
    ];

    /// Canonical name used in requests, logs and artifact directories
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Disease => "disease",
            Domain::Crop => "crop",
            Domain::MarketPrice => "market-price",
            Domain::Weather => "weather",
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            Domain::Crop => Schema {
                numeric: CROP_NUMERIC,
                categorical: CROP_CATEGORICAL,
            },
            Domain::Disease => Schema {
                numeric: DISEASE_NUMERIC,
                categorical: DISEASE_CATEGORICAL,
            },
            Domain::MarketPrice => Schema {
                numeric: MARKET_NUMERIC,
                categorical: MARKET_CATEGORICAL,
            },
            Domain::Weather => Schema {
                numeric: WEATHER_NUMERIC,
                categorical: &[],
            },
        }
    }

    /// Default artifact file patterns: primary first, legacy second
    pub fn default_patterns(&self) -> (&'static str, &'static str) {
        match self {
            Domain::Crop => ("*crop*random_forest*.json", "crop_recommender*.json"),
            Domain::Disease => ("*disease*classifier*.json", "disease_model*.json"),
            Domain::MarketPrice => ("*market*regressor*.json", "market_model*.json"),
            Domain::Weather => ("*weather*regressor*.json", "weather_model*.json"),
        }
    }

    /// Prefix for placeholder labels over a regression output
    pub fn synthetic_label_prefix(&self) -> &'static str {
        match self {
            Domain::Crop => "Crop",
            Domain::Disease => "Disease",
            Domain::MarketPrice => "Price",
            Domain::Weather => "Forecast",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crop" | "crop-recommendation" | "crop_recommendation" => Ok(Domain::Crop),
            "disease" | "disease-detection" | "disease_detection" => Ok(Domain::Disease),
            "market-price" | "market_price" | "market" => Ok(Domain::MarketPrice),
            "weather" | "weather-forecast" | "weather_forecast" => Ok(Domain::Weather),
            _ => Err(InputError::UnknownDomain(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("crop".parse::<Domain>().unwrap(), Domain::Crop);
        assert_eq!(" Market ".parse::<Domain>().unwrap(), Domain::MarketPrice);
        assert_eq!(
            "disease-detection".parse::<Domain>().unwrap(),
            Domain::Disease
        );
        assert_eq!(
            "soil".parse::<Domain>(),
            Err(InputError::UnknownDomain("soil".to_string()))
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        for domain in Domain::ALL {
            assert_eq!(domain.to_string().parse::<Domain>().unwrap(), domain);
        }
    }

    #[test]
    fn crop_schema_matches_training_column_order() {
        let names: Vec<_> = Domain::Crop
            .schema()
            .numeric
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec!["N", "P", "K", "temperature", "humidity", "ph", "rainfall"]
        );
    }

    #[test]
    fn defaults_sit_inside_declared_ranges() {
        for domain in Domain::ALL {
            for slot in domain.schema().numeric {
                if let Some((lo, hi)) = slot.range {
                    assert!(
                        slot.default >= lo && slot.default <= hi,
                        "{}.{} default out of range",
                        domain,
                        slot.name
                    );
                }
            }
        }
    }
}
