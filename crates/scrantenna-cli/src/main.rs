//! Scrantenna CLI - Command-line interface
//!
//! Usage:
//!   scrantenna extract "<text>"
//!   scrantenna resolve "<text>"
//!   scrantenna ingest <news.json>
//!   scrantenna strategies
//!   scrantenna stats

mod news;
mod pipeline;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scrantenna_core::{AppConfig, LoggingConfig, StrategyPreference};
use scrantenna_extractor::ExtractorOrchestrator;
use scrantenna_knowledge::{EntityResolver, KnowledgeStore};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "scrantenna")]
#[command(about = "News entity extraction and knowledge vault")]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Entity vault directory
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Strategy to try first: auto, llm, statistical, rule_based
    #[arg(long, global = true)]
    strategy: Option<StrategyPreference>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities and relationships from text
    Extract {
        /// Text to analyse; read from stdin when omitted
        text: Option<String>,
    },
    /// Extract, then resolve against the vault
    Resolve {
        /// Text to analyse; read from stdin when omitted
        text: Option<String>,
    },
    /// Run every article of a news file through the pipeline
    Ingest {
        /// News JSON: `{"articles": [...]}` or a bare array
        path: PathBuf,

        /// Only process the first N articles
        #[arg(long)]
        limit: Option<usize>,

        /// Extract only, leave the vault untouched
        #[arg(long)]
        dry_run: bool,

        /// Print the batch summary instead of per-article reports
        #[arg(long)]
        summary: bool,
    },
    /// List configured strategies and whether they are reachable
    Strategies,
    /// Summarise the vault
    Stats,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    if let Some(vault) = &cli.vault {
        config.knowledge.vault_path = vault.clone();
    }
    if let Some(preference) = cli.strategy {
        config.extraction.preferred = preference;
    }
    Ok(config)
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn input_text(text: Option<String>) -> anyhow::Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            Ok(buffer)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

fn open_vault(config: &AppConfig) -> anyhow::Result<KnowledgeStore> {
    KnowledgeStore::from_config(&config.knowledge).with_context(|| {
        format!(
            "Failed to open vault {}",
            config.knowledge.vault_path.display()
        )
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Extract { text } => {
            let orchestrator = ExtractorOrchestrator::from_config(&config);
            let result = orchestrator.extract(&input_text(text)?);
            print_json(&result, cli.pretty)?;
        }
        Commands::Resolve { text } => {
            let orchestrator = ExtractorOrchestrator::from_config(&config);
            let mut store = open_vault(&config)?;
            let resolver = EntityResolver::from_config(&mut store, &config.knowledge);

            let (_, resolution) = Pipeline::new(&orchestrator)
                .with_resolver(resolver)
                .process_text(&input_text(text)?);
            print_json(&resolution, cli.pretty)?;
        }
        Commands::Ingest {
            path,
            limit,
            dry_run,
            summary,
        } => {
            let mut articles = news::load_articles(&path)?;
            if let Some(limit) = limit {
                articles.truncate(limit);
            }

            let orchestrator = ExtractorOrchestrator::from_config(&config);
            let mut store = if dry_run {
                None
            } else {
                Some(open_vault(&config)?)
            };

            let mut pipeline = Pipeline::new(&orchestrator);
            if let Some(store) = store.as_mut() {
                pipeline = pipeline.with_resolver(EntityResolver::from_config(store, &config.knowledge));
            }
            let (reports, totals) = pipeline.run(&articles);

            if summary {
                print_json(&totals, cli.pretty)?;
            } else {
                print_json(&reports, cli.pretty)?;
            }
        }
        Commands::Strategies => {
            let orchestrator = ExtractorOrchestrator::from_config(&config);
            print_json(&orchestrator.availability(), cli.pretty)?;
        }
        Commands::Stats => {
            let store = open_vault(&config)?;
            print_json(&store.statistics(), cli.pretty)?;
        }
    }

    Ok(())
}
