//! Scholar-Relay command line entry point

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use scholar_relay::{
    config,
    engines::{ProviderContext, ProviderLoader},
    metrics::ProviderMetrics,
    network::HttpClient,
    CompletionOrchestrator, SearchQuery,
};
use std::io::BufRead;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RELAY_SETTINGS_PATH        Path to relay.yml
    RELAY_COMPLETION_BACKEND   openai (default) or gemini
    RELAY_COMPLETION_API_URL   Chat completion endpoint
    RELAY_COMPLETION_API_KEY   API key for the completion endpoint
    RELAY_COMPLETION_MODEL     Model name
    RELAY_SEARCH_API_KEY       serper.dev key for Scholar and web providers
    RELAY_CONCURRENCY          In-flight completion calls per model
    RUST_LOG                   Log filter (default: info)";

/// Bounded-concurrency chat completion and academic search
#[derive(Parser, Debug)]
#[command(name = "scholar-relay", version, about, long_about = None)]
#[command(after_help = ENV_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query every enabled search provider and print merged results as JSON
    Search {
        /// Results per provider
        #[arg(short = 'n', long = "max-results")]
        max_results: Option<i64>,

        /// relevance, lastUpdatedDate or submittedDate
        #[arg(short, long)]
        sort: Option<String>,

        /// Query words
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Send one prompt to the default model
    Chat {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Complete every non-empty line of stdin concurrently
    Batch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Scholar-Relay v{}", scholar_relay::VERSION);

    let settings = config::load()?;
    let client = HttpClient::with_settings(&settings.outgoing)?;

    match cli.command {
        Command::Search {
            max_results,
            sort,
            query,
        } => {
            let mut query = SearchQuery::new(query.join(" "));
            if let Some(count) = max_results {
                query = query.with_max_results(count);
            }
            if let Some(sort) = sort {
                query = query.with_sort(sort);
            }

            let metrics = Arc::new(ProviderMetrics::new());
            let ctx = ProviderContext::from_settings(client, &settings.search)
                .with_observer(metrics.clone());
            let aggregator = ProviderLoader::load(&settings, &ctx);
            let results = aggregator.search(&query).await;
            println!("{}", serde_json::to_string_pretty(&results)?);

            for (name, stats) in metrics.provider_stats() {
                info!(
                    provider = %name,
                    avg_ms = ?stats.avg_response_time,
                    reliability = stats.reliability,
                    "provider stats"
                );
            }
        }
        Command::Chat { prompt } => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                bail!("chat requires a prompt");
            }
            let orchestrator = CompletionOrchestrator::from_settings(client, &settings.completion)?;
            let reply = orchestrator
                .chat(prompt, settings.completion.temperature)
                .await;
            println!("{}", reply);
        }
        Command::Batch => {
            let prompts: Vec<String> = std::io::stdin()
                .lock()
                .lines()
                .collect::<std::io::Result<Vec<_>>>()?
                .into_iter()
                .filter(|line| !line.trim().is_empty())
                .collect();
            let orchestrator = CompletionOrchestrator::from_settings(client, &settings.completion)?;
            let replies = orchestrator
                .batch_chat(prompts, settings.completion.temperature)
                .await;
            println!("{}", serde_json::to_string_pretty(&replies)?);

            let usage = orchestrator.ledger().summary();
            info!(
                calls = usage.calls,
                failures = usage.failures,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "batch finished"
            );
        }
    }

    Ok(())
}
