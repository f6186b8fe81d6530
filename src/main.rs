//! # Compliance Harness CLI (`chq`)
//!
//! ## Usage
//!
//! ```bash
//! chq --config ./config/chq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chq init` | Create the SQLite corpus schema |
//! | `chq import <file>` | Append JSONL chunks to the corpus |
//! | `chq retrieve "<question>"` | Ranked passages with citations |
//! | `chq classify "<question>"` | Print the classified intent |
//! | `chq serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! chq init
//! chq import ./data/chunks.jsonl
//! chq retrieve "minimum apron flashing cover" --k 5
//! chq retrieve "B1 amendment 13 bracing" --intent compliance_strict --json
//! RUST_LOG=debug chq retrieve "what is a CCC" --explain
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use compliance_harness::config::{self, Config};
use compliance_harness::service::{RetrievalService, RetrieveOptions};
use compliance_harness::sqlite_store::SqliteManager;
use compliance_harness::{db, embedding, import, migrate, server};
use compliance_harness_core::models::{IntentCategory, RetrievalResponse};

/// Compliance Harness: hybrid retrieval with authoritative citations for
/// NZ building-code questions.
#[derive(Parser)]
#[command(
    name = "chq",
    about = "Compliance Harness: hybrid retrieval and citation resolution for building-code questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chq.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the corpus schema. Idempotent.
    Init,

    /// Append chunks from a JSONL file (one chunk per line).
    Import {
        file: PathBuf,
    },

    /// Retrieve ranked passages and citations for a question.
    Retrieve {
        question: String,

        /// Number of results. Defaults to the intent's top_k.
        #[arg(long, default_value_t = 0)]
        k: usize,

        /// Skip classification and use this intent.
        #[arg(long)]
        intent: Option<IntentCategory>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,

        /// Show the per-signal score breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Classify a question and print the intent.
    Classify {
        question: String,
    },

    /// Start the HTTP server.
    Serve,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Corpus initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Retrieve {
            question,
            k,
            intent,
            json,
            explain,
        } => {
            run_retrieve(&cfg, &question, RetrieveOptions { k, intent, explain }, json).await?;
        }
        Commands::Classify { question } => {
            let intent = cfg.build_classifier().classify(&question, None);
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_retrieve(
    cfg: &Config,
    question: &str,
    options: RetrieveOptions,
    json: bool,
) -> anyhow::Result<()> {
    let embedder = embedding::create_provider(&cfg.embedding)?;
    let manager = SqliteManager::new(db::connect_options(cfg)?);
    let service = Arc::new(RetrievalService::new(cfg.clone(), manager, embedder)?);
    service.init().await?;

    let result = service.retrieve_with(question, &options).await;
    service.shutdown();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response, options.explain);
    }
    Ok(())
}

fn print_response(response: &RetrievalResponse, explain: bool) {
    println!(
        "intent: {} ({:.2}, rule {})",
        response.intent.category, response.intent.confidence, response.intent.rule
    );
    for d in &response.degraded {
        println!("degraded: {}", d.label());
    }
    if response.results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, r) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} p.{} ({})",
            i + 1,
            r.final_score,
            r.source,
            r.page,
            r.doc_type
        );
        println!("    {}", r.snippet.replace('\n', " "));
        if let (true, Some(b)) = (explain, r.explain.as_ref()) {
            println!(
                "    vector={:.3}×{:.2} keyword={:.3}×{:.2} bias={:.3}×{:.2}{}",
                b.vector_similarity,
                b.vector_weight,
                b.keyword_boost,
                b.keyword_weight,
                b.source_bias,
                b.source_bias_weight,
                if b.amendment_match { " amendment" } else { "" }
            );
        }
    }

    if !response.citations.is_empty() {
        println!();
        println!("Citations:");
        for c in &response.citations {
            println!("  - {}", c.display_text);
        }
    }
}
