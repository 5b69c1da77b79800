//! Deterministic rule engine
//!
//! The last-resort tier: pure threshold rules per domain. Every input,
//! including an all-default one, yields at least one candidate.

use crate::domain::Domain;
use crate::features::NormalizedFeatures;
use crate::ranker::{Candidate, PredictionResult};

const MIN_RULE_CONFIDENCE: f64 = 50.0;
const MAX_RULE_CONFIDENCE: f64 = 100.0;

const HOT_WET_CROPS: &[&str] = &["Rice", "Sugarcane", "Jute", "Banana", "Coconut"];
const WARM_CROPS: &[&str] = &["Cotton", "Maize", "Soybean", "Groundnut", "Turmeric"];
const TEMPERATE_CROPS: &[&str] = &["Wheat", "Barley", "Mustard", "Chickpea", "Lentil"];
const DRYLAND_CROPS: &[&str] = &[
    "Pearl Millet",
    "Finger Millet",
    "Sorghum",
    "Pigeon Pea",
    "Green Gram",
];

const COOL_WET_DISEASES: &[&str] = &[
    "Late Blight",
    "Downy Mildew",
    "Leaf Blight",
    "Bacterial Spot",
    "Anthracnose",
];
const WARM_HUMID_DISEASES: &[&str] = &[
    "Leaf Blight",
    "Bacterial Spot",
    "Anthracnose",
    "Rust",
    "Powdery Mildew",
];
const HOT_DRY_DISEASES: &[&str] = &[
    "Powdery Mildew",
    "Spider Mite Damage",
    "Leaf Curl Virus",
    "Rust",
    "Leaf Blight",
];
const GENERIC_DISEASES: &[&str] = &[
    "Leaf Blight",
    "Powdery Mildew",
    "Rust",
    "Bacterial Spot",
    "Healthy",
];

/// Evaluate the domain's rules over normalized features
pub fn evaluate(features: &NormalizedFeatures, top_k: usize) -> PredictionResult {
    let candidates = match features.domain {
        Domain::Crop => crop_rules(features),
        Domain::Disease => disease_rules(features),
        Domain::MarketPrice => market_rules(features),
        Domain::Weather => weather_rules(features),
    };
    PredictionResult::ranked(candidates, top_k.max(1))
}

/// `base - 5i + bonus`, clamped, over an ordered label bucket
fn descending(labels: &[&str], base: f64, bonus: f64) -> Vec<Candidate> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let confidence = (base - 5.0 * i as f64 + bonus)
                .clamp(MIN_RULE_CONFIDENCE, MAX_RULE_CONFIDENCE);
            Candidate::rule(*label, confidence)
        })
        .collect()
}

fn holds_any(bucket: &[&str], names: &[&str]) -> bool {
    bucket.iter().any(|label| names.contains(label))
}

fn crop_rules(features: &NormalizedFeatures) -> Vec<Candidate> {
    let temp = features.value("temperature");
    let rainfall = features.value("rainfall");
    let soil = features.category("soil_type");

    let (crops, base) = if temp > 30.0 && rainfall > 1000.0 {
        (HOT_WET_CROPS, 90.0)
    } else if temp > 25.0 && rainfall > 500.0 {
        (WARM_CROPS, 85.0)
    } else if temp > 20.0 && rainfall > 300.0 {
        (TEMPERATE_CROPS, 80.0)
    } else {
        (DRYLAND_CROPS, 75.0)
    };

    let soil_bonus = match soil {
        "black" | "clay" if holds_any(crops, &["Cotton", "Sugarcane"]) => 10.0,
        "alluvial" if holds_any(crops, &["Rice", "Wheat"]) => 10.0,
        _ => 0.0,
    };

    descending(crops, base, soil_bonus)
}

fn disease_rules(features: &NormalizedFeatures) -> Vec<Candidate> {
    let temp = features.value("temperature");
    let humidity = features.value("humidity");
    let wetness = features.value("leaf_wetness_hours");
    let lesions = features.value("lesion_coverage");
    let crop = features.category("crop_type");

    let (diseases, base) = if humidity > 85.0 && (15.0..=25.0).contains(&temp) {
        (COOL_WET_DISEASES, 85.0)
    } else if humidity > 70.0 && temp > 25.0 {
        (WARM_HUMID_DISEASES, 80.0)
    } else if humidity < 50.0 && temp > 28.0 {
        (HOT_DRY_DISEASES, 75.0)
    } else {
        (GENERIC_DISEASES, 75.0)
    };

    let mut bonus = 0.0;
    if wetness > 10.0 {
        bonus += 5.0;
    }
    if lesions > 0.3 {
        bonus += 5.0;
    }
    if matches!(crop, "tomato" | "potato") && diseases.contains(&"Late Blight") {
        bonus += 10.0;
    }

    descending(diseases, base, bonus)
}

/// Reference price per kg used when the request carries no price history
fn base_price(commodity: &str) -> f64 {
    match commodity {
        "rice" => 45.0,
        "wheat" => 30.0,
        "maize" => 25.0,
        "cotton" => 80.0,
        "sugarcane" => 5.0,
        "groundnut" => 70.0,
        "soybean" => 50.0,
        "potato" => 20.0,
        "onion" => 30.0,
        "tomato" => 25.0,
        _ => 25.0,
    }
}

/// Monthly price multiplier; month 0 means unspecified
fn seasonal_factor(commodity: &str, month: usize) -> f64 {
    const RICE: [f64; 12] = [1.1, 1.05, 1.0, 0.95, 0.9, 0.85, 0.9, 0.95, 1.0, 1.1, 1.15, 1.2];
    const WHEAT: [f64; 12] = [1.2, 1.15, 1.1, 1.05, 1.0, 0.95, 0.9, 0.85, 0.9, 0.95, 1.0, 1.1];
    const TOMATO: [f64; 12] = [1.3, 1.2, 1.0, 0.8, 0.7, 0.6, 0.7, 0.8, 1.0, 1.2, 1.3, 1.4];
    const POTATO: [f64; 12] = [1.1, 1.0, 0.9, 0.8, 0.7, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2];
    const ONION: [f64; 12] = [1.2, 1.1, 1.0, 0.9, 0.8, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3];

    let table = match commodity {
        "rice" => &RICE,
        "wheat" => &WHEAT,
        "tomato" => &TOMATO,
        "potato" => &POTATO,
        "onion" => &ONION,
        _ => return 1.0,
    };
    match month {
        1..=12 => table[month - 1],
        _ => 1.0,
    }
}

fn market_rules(features: &NormalizedFeatures) -> Vec<Candidate> {
    let commodity = features.category("commodity");
    let month = features.value("month").round() as usize;
    let horizon = features.value("horizon_days").round().max(1.0);
    let latest = features.value("latest_price");
    let average = features.value("average_price");

    let baseline = base_price(commodity) * seasonal_factor(commodity, month);
    let anchor = if latest > 0.0 { latest } else { baseline };
    let change_pct = if latest > 0.0 && average > 0.0 {
        (latest - average) / average * 100.0
    } else {
        0.0
    };

    let mut candidates = vec![
        Candidate::rule("next_7_days", 75.0).with_value(anchor * (1.0 + change_pct / 400.0)),
    ];
    if horizon != 7.0 && horizon != 30.0 {
        let confidence = (70.0 - horizon / 30.0).max(55.0);
        let value = anchor * (1.0 + change_pct / 100.0 * horizon / 30.0);
        candidates.push(
            Candidate::rule(format!("next_{}_days", horizon as u32), confidence).with_value(value),
        );
    }
    candidates.push(
        Candidate::rule("next_30_days", 65.0).with_value(anchor * (1.0 + change_pct / 100.0)),
    );
    candidates.push(Candidate::rule("seasonal_baseline", 60.0).with_value(baseline));
    candidates
}

fn weather_rules(features: &NormalizedFeatures) -> Vec<Candidate> {
    let temp = features.value("temperature");
    let humidity = features.value("humidity");
    let pressure = features.value("pressure");
    let wind = features.value("wind_speed");
    let rainfall = features.value("rainfall");

    let heavy_rain = if rainfall > 50.0 {
        Some(90.0)
    } else if rainfall > 20.0 {
        Some(80.0)
    } else if humidity > 85.0 && pressure < 1005.0 {
        Some(70.0)
    } else {
        None
    };
    let heatwave = if temp > 40.0 {
        Some(90.0)
    } else if temp > 35.0 {
        Some(80.0)
    } else {
        None
    };
    let frost = if temp < 5.0 {
        Some(90.0)
    } else if temp < 10.0 {
        Some(80.0)
    } else {
        None
    };
    let strong_winds = if wind > 50.0 {
        Some(90.0)
    } else if wind > 30.0 {
        Some(80.0)
    } else {
        None
    };
    let light_rain = (humidity > 80.0 && rainfall > 0.0).then_some(65.0);

    let mut candidates: Vec<Candidate> = [
        ("Heavy Rainfall", heavy_rain),
        ("Heatwave", heatwave),
        ("Frost", frost),
        ("Strong Winds", strong_winds),
        ("Light Rain", light_rain),
    ]
    .into_iter()
    .filter_map(|(label, confidence)| confidence.map(|c| Candidate::rule(label, c)))
    .collect();

    let fair = if candidates.is_empty() { 75.0 } else { 50.0 };
    candidates.push(Candidate::rule("Fair Weather", fair));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{normalize, FeatureRequest};
    use crate::ranker::Method;

    fn run(domain: Domain, request: FeatureRequest) -> PredictionResult {
        evaluate(&normalize(domain, &request), 5)
    }

    fn labels(result: &PredictionResult) -> Vec<&str> {
        result.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn hot_wet_alluvial_recommends_rice() {
        let result = run(
            Domain::Crop,
            FeatureRequest::new()
                .with("temperature", 32)
                .with("rainfall", 1200)
                .with("ph", 6.5)
                .with("soil_type", "alluvial"),
        );
        let top = result.top().unwrap();
        assert_eq!(top.label, "Rice");
        assert_eq!(top.confidence, 100.0);
        assert_eq!(top.method, Method::Rule);
    }

    #[test]
    fn default_crop_request_lands_in_wheat_bucket() {
        let result = run(Domain::Crop, FeatureRequest::new());
        assert_eq!(
            labels(&result),
            vec!["Wheat", "Barley", "Mustard", "Chickpea", "Lentil"]
        );
        let confidences: Vec<f64> = result.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![90.0, 85.0, 80.0, 75.0, 70.0]);
    }

    #[test]
    fn black_soil_boosts_cotton_bucket() {
        let result = run(
            Domain::Crop,
            FeatureRequest::new()
                .with("temperature", 28)
                .with("rainfall", 700)
                .with("soil", "black"),
        );
        assert_eq!(result.top().unwrap().label, "Cotton");
        assert_eq!(result.top().unwrap().confidence, 95.0);
    }

    #[test]
    fn dry_cold_conditions_fall_to_millets() {
        let result = run(
            Domain::Crop,
            FeatureRequest::new()
                .with("temperature", 12)
                .with("rainfall", 100),
        );
        assert_eq!(result.top().unwrap().label, "Pearl Millet");
        assert_eq!(result.top().unwrap().confidence, 75.0);
    }

    #[test]
    fn cool_wet_tomato_points_to_late_blight() {
        let result = run(
            Domain::Disease,
            FeatureRequest::new()
                .with("humidity", 92)
                .with("temperature", 18)
                .with("leaf_wetness_hours", 12)
                .with("crop_type", "Tomato"),
        );
        let top = result.top().unwrap();
        assert_eq!(top.label, "Late Blight");
        assert_eq!(top.confidence, 100.0);
    }

    #[test]
    fn long_leaf_wetness_raises_hot_dry_bucket() {
        let request = FeatureRequest::new()
            .with("humidity", 40)
            .with("temperature", 30)
            .with("leaf_wetness_hours", 12);
        let result = evaluate(&normalize(Domain::Disease, &request), 1);
        let top = result.top().unwrap();
        assert_eq!(top.label, "Powdery Mildew");
        assert_eq!(top.confidence, 80.0);
    }

    #[test]
    fn default_disease_request_matches_generic_fallback() {
        let result = run(Domain::Disease, FeatureRequest::new());
        assert_eq!(result.top().unwrap().label, "Leaf Blight");
        assert_eq!(result.top().unwrap().confidence, 75.0);
    }

    #[test]
    fn market_defaults_use_commodity_baseline() {
        let result = run(Domain::MarketPrice, FeatureRequest::new());
        assert_eq!(
            labels(&result),
            vec!["next_7_days", "next_30_days", "seasonal_baseline"]
        );
        assert!(result.iter().all(|c| c.value == Some(45.0)));
    }

    #[test]
    fn market_trend_projects_from_latest_price() {
        let result = run(
            Domain::MarketPrice,
            FeatureRequest::new()
                .with("commodity", "wheat")
                .with("month", 1)
                .with("price", 33)
                .with("avg_price", 30)
                .with("days", 14),
        );
        assert_eq!(
            labels(&result),
            vec![
                "next_7_days",
                "next_14_days",
                "next_30_days",
                "seasonal_baseline"
            ]
        );
        let values: Vec<f64> = result.iter().filter_map(|c| c.value).collect();
        // change is +10%: 7d +2.5%, 14d +4.67%, 30d +10%, baseline 30 * 1.2
        assert_eq!(values, vec![33.82, 34.54, 36.3, 36.0]);
    }

    #[test]
    fn calm_weather_is_fair() {
        let result = run(Domain::Weather, FeatureRequest::new());
        assert_eq!(labels(&result), vec!["Fair Weather"]);
        assert_eq!(result.top().unwrap().confidence, 75.0);
    }

    #[test]
    fn storm_conditions_raise_alerts() {
        let result = run(
            Domain::Weather,
            FeatureRequest::new()
                .with("rainfall", 60)
                .with("windSpeed", 45)
                .with("humidity", 90)
                .with("temperature", 22),
        );
        assert_eq!(
            labels(&result),
            vec!["Heavy Rainfall", "Strong Winds", "Light Rain", "Fair Weather"]
        );
    }

    #[test]
    fn top_k_caps_rule_output() {
        let result = evaluate(&normalize(Domain::Crop, &FeatureRequest::new()), 2);
        assert_eq!(result.len(), 2);
    }
}
