//! Agri prediction CLI
//!
//! Runs one request through the tiered pipeline and prints the result as JSON.

use agri_predict_core::{FeatureRequest, Pipeline, PipelineConfig};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "agri-predict")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crop, disease, market and weather predictions with rule fallback", long_about = None)]
struct Args {
    /// Prediction domain (crop, disease, market-price, weather)
    #[arg(short, long)]
    domain: String,

    /// Feature mapping as a JSON object
    #[arg(short, long, default_value = "{}")]
    features: String,

    /// Number of ranked candidates (defaults to the configured value)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Config file; otherwise AGRI_PREDICT_CONFIG or config/predict.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the artifact root directory
    #[arg(long)]
    model_root: Option<PathBuf>,

    /// Artifact rescan interval in seconds
    #[arg(long)]
    reload_interval: Option<u64>,

    /// Bound the model tier; on expiry rules answer instead
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print pipeline counters to stderr after the prediction
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = PipelineConfig::from_file(path)?;
            config.apply_env_overrides()?;
            config
        }
        None => PipelineConfig::load()?,
    };
    if let Some(root) = args.model_root {
        config.model_root = root;
    }
    if let Some(secs) = args.reload_interval {
        config.refresh_interval_secs = secs;
    }
    config.validate().context("invalid pipeline configuration")?;
    debug!(?config, "effective configuration");

    let request = FeatureRequest::from_json(&args.features)
        .context("--features must be a JSON object of feature values")?;
    let top_k = args.top_k.unwrap_or(config.default_top_k);
    if top_k == 0 {
        bail!("--top-k must be at least 1");
    }
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.request_timeout());

    let pipeline = Pipeline::new(config);
    let prediction = pipeline
        .predict_with_timeout(&args.domain, &request, top_k, timeout)
        .await?;
    info!(
        domain = %prediction.domain,
        provenance = ?prediction.provenance,
        candidates = prediction.candidates.len(),
        "prediction complete"
    );

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    if args.metrics {
        eprintln!("{}", serde_json::to_string_pretty(&pipeline.metrics())?);
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
