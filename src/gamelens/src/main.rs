//! GameLens: analytics over exported game event tables.
//!
//! Loads a JSON dataset, runs the analysis pipeline or answers a single
//! question, and prints the result as JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gamelens_core::config::AppConfig;
use gamelens_core::Dataset;
use gamelens_insights::{CompletionProvider, HttpCompletionProvider};
use gamelens_pipeline::AnalysisPipeline;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gamelens")]
#[command(about = "Column mapping, anomalies, cohorts and insights for game analytics data")]
#[command(version)]
struct Cli {
    /// Config file (TOML/YAML/JSON); GAMELENS__* env vars override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider API key (overrides config)
    #[arg(long, global = true, env = "GAMELENS__PROVIDER__API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Provider model (overrides config)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis over a dataset
    Analyze {
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Answer one natural-language question about a dataset
    Ask {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        question: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskOutput<T: Serialize, R: Serialize> {
    mapping: T,
    response: R,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamelens=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => {
            return Err(e).with_context(|| format!("loading config from {:?}", cli.config));
        }
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(key) = cli.api_key {
        config.provider.api_key = Some(key);
    }
    if let Some(model) = cli.model {
        config.provider.model = model;
    }

    let provider: Option<Arc<dyn CompletionProvider>> = match config.provider.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            let http = HttpCompletionProvider::new(&config.provider)?;
            Some(Arc::new(http) as Arc<dyn CompletionProvider>)
        }
        _ => {
            info!("No provider API key configured, insights use the deterministic fallback");
            None
        }
    };

    info!(
        model = %config.provider.model,
        provider = provider.is_some(),
        cache_ttl_secs = config.cache.ttl_secs,
        requests_per_minute = config.rate_limit.requests_per_minute,
        "Configuration loaded"
    );

    let pipeline = AnalysisPipeline::from_config(&config, provider);

    match cli.command {
        Command::Analyze { dataset } => {
            let data = Dataset::load_json(&dataset)
                .with_context(|| format!("loading dataset {}", dataset.display()))?;
            let report = pipeline.run(&data).await;
            print_json(&report, cli.pretty)?;
        }
        Command::Ask { dataset, question } => {
            let data = Dataset::load_json(&dataset)
                .with_context(|| format!("loading dataset {}", dataset.display()))?;
            let mapping = pipeline.map(&data).await;
            let response = pipeline.ask(&data, &mapping, &question).await;
            print_json(&AskOutput { mapping: &mapping, response: &response }, cli.pretty)?;
        }
    }

    Ok(())
}
