//! Green Seam CLI
//!
//! Reads a game log, runs the pipeline and prints the JSON report.
//!
//! Usage: green_seam <game.txt> [--context ctx.json] [--config config.json]
//!                   [--deterministic] [--extract-only] [--no-strict-aliases]

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use green_seam::llm::{LLMProvider, OllamaProvider, OpenAICompatibleProvider};
use green_seam::{ExtractionPipeline, GameContext, PipelineConfig};

#[derive(Debug, Default)]
struct CliArgs {
    input: PathBuf,
    context: Option<PathBuf>,
    config: Option<PathBuf>,
    deterministic: bool,
    extract_only: bool,
    lenient_aliases: bool,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = CliArgs::default();
        let mut input = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--context" => parsed.context = Some(args.next().context("--context needs a path")?.into()),
                "--config" => parsed.config = Some(args.next().context("--config needs a path")?.into()),
                "--deterministic" => parsed.deterministic = true,
                "--extract-only" => parsed.extract_only = true,
                "--no-strict-aliases" => parsed.lenient_aliases = true,
                flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
                path => input = Some(PathBuf::from(path)),
            }
        }
        parsed.input = input.context("usage: green_seam <game.txt> [--context ctx.json] [--config config.json] [--deterministic] [--extract-only] [--no-strict-aliases]")?;
        Ok(parsed)
    }
}

fn provider_from_env() -> Arc<dyn LLMProvider> {
    match OpenAICompatibleProvider::from_env() {
        Some(provider) => {
            info!("Using OpenAI-compatible provider");
            Arc::new(provider)
        }
        None => {
            info!("OPENAI_API_KEY not set, using Ollama");
            Arc::new(OllamaProvider::from_env())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("green_seam=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse(std::env::args().skip(1))?;

    let mut config = if args.deterministic {
        PipelineConfig::deterministic()
    } else if let Some(ref path) = args.config {
        PipelineConfig::load(path).await?
    } else {
        PipelineConfig::from_env()?
    };
    if args.lenient_aliases {
        config.strict_aliases = false;
    }

    let ctx: GameContext = match args.context {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read context {}", path.display()))?;
            serde_json::from_str(&text).context("Game context is not valid JSON")?
        }
        None => GameContext::default(),
    };

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read game log {}", args.input.display()))?;

    let mut pipeline = ExtractionPipeline::new(config);
    if pipeline.config().needs_model() {
        pipeline = pipeline.with_provider(provider_from_env());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight work");
            on_signal.cancel();
        }
    });

    let output = if args.extract_only {
        let report = pipeline.extract(&raw, &ctx, &cancel).await?;
        serde_json::to_string_pretty(&report)?
    } else {
        let report = pipeline.run(&raw, &ctx, &cancel).await?;
        info!(
            "Extracted {} plate appearances for {} hitters",
            report.meta.pa_total,
            report.hitters.len()
        );
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", output);
    Ok(())
}
