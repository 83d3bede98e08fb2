//! # Forex RAG CLI (`fxrag`)
//!
//! Refreshes the document index, answers questions against it, and
//! exports the knowledge graph.
//!
//! ## Usage
//!
//! ```bash
//! fxrag --config ./config/fxrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fxrag index [--full]` | Bring the index up to date with the data root |
//! | `fxrag scan` | Show which files changed since the last refresh |
//! | `fxrag ask "<query>"` | Refresh if needed, then answer one query |
//! | `fxrag chat` | Interactive query loop (`exit` quits) |
//! | `fxrag graph export` | Write `nodes.csv` and `relationships.csv` |
//! | `fxrag signals list` | List compiled strategy generators |
//! | `fxrag signals run <name>` | Run a strategy over a candle CSV |
//! | `fxrag stats` | Summarize the saved index |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `forex_rag=info,fxrag=info`).

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use forex_rag::config::{self, Config};
use forex_rag::embedding::create_embedder;
use forex_rag::generate::create_generator;
use forex_rag::index::IndexedCorpus;
use forex_rag::knowledge::{self, KnowledgeFacts, RuleExtractor};
use forex_rag::models::{Document, SearchHit};
use forex_rag::pipeline::{self, RefreshKind};
use forex_rag::progress::ProgressMode;
use forex_rag::retrieve::Retriever;
use forex_rag::signals::{load_candles, SignalRegistry};
use forex_rag::stats;
use forex_rag::tracker::{changed_files, ChangeTracker};

/// Forex RAG: incremental indexing and hybrid retrieval over forex documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "fxrag",
    about = "Forex RAG: question answering over a local forex document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fxrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the data root and rebuild the index if anything changed.
    Index {
        /// Ignore saved fingerprints and rebuild from every tracked file.
        #[arg(long)]
        full: bool,

        /// Progress output on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// List files that changed since the last refresh. Does not update state.
    Scan,

    /// Answer a single query.
    Ask {
        query: String,

        /// Print the retrieved documents before the answer.
        #[arg(long)]
        show_context: bool,
    },

    /// Interactive query loop.
    Chat,

    /// Knowledge graph operations.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Strategy signal generators.
    Signals {
        #[command(subcommand)]
        action: SignalsAction,
    },

    /// Show index statistics.
    Stats,
}

#[derive(Subcommand)]
enum GraphAction {
    /// Extract facts from the indexed corpus and write CSV files.
    Export {
        #[arg(long, default_value = "graph_visualization_files")]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum SignalsAction {
    /// List registered generators.
    List,

    /// Run one generator over a candle CSV and write any setup it finds.
    Run {
        /// Generator name (see `fxrag signals list`).
        name: String,

        #[arg(long)]
        symbol: String,

        /// CSV with open, high, low and close columns, oldest first.
        #[arg(long)]
        candles: PathBuf,

        /// Output directory. Defaults to `<data.root>/strategies`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forex_rag=info,fxrag=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Index { full, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            run_index(&cfg, full, mode).await?;
        }
        Commands::Scan => run_scan(&cfg)?,
        Commands::Ask {
            query,
            show_context,
        } => run_ask(&cfg, &query, show_context).await?,
        Commands::Chat => run_chat(&cfg).await?,
        Commands::Graph {
            action: GraphAction::Export { dir },
        } => {
            let data = refresh_quietly(&cfg).await?;
            let facts = extract_facts(&data)?;
            facts.export_csv(&dir)?;
            println!(
                "Graph data exported to {} ({} entities, {} relationships)",
                dir.display(),
                facts.entities.len(),
                facts.relationships.len()
            );
        }
        Commands::Signals { action } => run_signals(&cfg, action)?,
        Commands::Stats => stats::run_stats(&cfg)?,
    }

    Ok(())
}

async fn run_index(cfg: &Config, full: bool, mode: ProgressMode) -> Result<()> {
    let embedder = create_embedder(&cfg.embedding)?;
    let reporter = mode.reporter();
    let outcome = pipeline::refresh(cfg, embedder.as_ref(), full, reporter.as_ref()).await?;

    let label = match outcome.kind {
        RefreshKind::ColdStart => "built",
        RefreshKind::Incremental => "updated",
        RefreshKind::Warm => "up to date",
    };
    println!("index {}", label);
    println!("  changed files:     {}", outcome.changed_files);
    println!("  documents updated: {}", outcome.documents_updated);
    println!("  corpus size:       {}", outcome.data.corpus().len());
    Ok(())
}

fn run_scan(cfg: &Config) -> Result<()> {
    let tracker = ChangeTracker::from_config(cfg)?;
    let files = tracker.scan_files()?;
    let changed = changed_files(&files, &tracker.load_state());

    for file in &changed {
        println!("{}", file.key);
    }
    eprintln!("{} of {} tracked files changed", changed.len(), files.len());
    Ok(())
}

async fn run_ask(cfg: &Config, query: &str, show_context: bool) -> Result<()> {
    let embedder = create_embedder(&cfg.embedding)?;
    let generator = create_generator(&cfg.generation)?;
    let data = pipeline::refresh(
        cfg,
        embedder.as_ref(),
        false,
        ProgressMode::Off.reporter().as_ref(),
    )
    .await?
    .data;
    let facts = extract_facts(&data)?;

    let mut retriever = Retriever::new(
        embedder.as_ref(),
        generator.as_ref(),
        cfg.retrieval.cache_capacity,
        cfg.retrieval.top_k,
    );
    let answer = retriever.answer(query, &data, &facts).await;
    if show_context {
        print_documents(&answer.documents);
    }
    println!("{}", answer.text);
    Ok(())
}

async fn run_chat(cfg: &Config) -> Result<()> {
    let embedder = create_embedder(&cfg.embedding)?;
    let generator = create_generator(&cfg.generation)?;
    let data = pipeline::refresh(
        cfg,
        embedder.as_ref(),
        false,
        ProgressMode::default_for_tty().reporter().as_ref(),
    )
    .await?
    .data;
    let facts = extract_facts(&data)?;

    let mut retriever = Retriever::new(
        embedder.as_ref(),
        generator.as_ref(),
        cfg.retrieval.cache_capacity,
        cfg.retrieval.top_k,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nEnter your financial query (or type 'exit' to quit): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case("exit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let answer = retriever.answer(query, &data, &facts).await;
        if answer.cached {
            println!("\n(cached answer)");
        } else {
            print_documents(&answer.documents);
        }
        println!("\n--- Final Answer ---");
        println!("{}", answer.text);
    }
    println!("Goodbye!");
    Ok(())
}

fn print_documents(documents: &[(SearchHit, &Document)]) {
    println!("\n--- Retrieved Context ---");
    for (i, (hit, doc)) in documents.iter().enumerate() {
        let preview: String = doc.text.chars().take(200).collect();
        println!("Document {} (score {:.3}):\n{}...", i + 1, hit.score, preview);
    }
}

fn run_signals(cfg: &Config, action: SignalsAction) -> Result<()> {
    let registry = SignalRegistry::builtin();
    match action {
        SignalsAction::List => {
            for generator in registry.iter() {
                println!("{:<20} {}", generator.name(), generator.description());
            }
        }
        SignalsAction::Run {
            name,
            symbol,
            candles,
            dir,
        } => {
            let candles = load_candles(&candles)?;
            let dir = dir.unwrap_or_else(|| cfg.data.root.join("strategies"));
            match registry.run_into(&name, &symbol, &candles, &dir)? {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("{}: no setup for {}", name, symbol),
            }
        }
    }
    Ok(())
}

async fn refresh_quietly(cfg: &Config) -> Result<IndexedCorpus> {
    let embedder = create_embedder(&cfg.embedding)?;
    let outcome = pipeline::refresh(
        cfg,
        embedder.as_ref(),
        false,
        ProgressMode::Off.reporter().as_ref(),
    )
    .await?;
    Ok(outcome.data)
}

fn extract_facts(data: &IndexedCorpus) -> Result<KnowledgeFacts> {
    let extractor = RuleExtractor::new()?;
    Ok(knowledge::extract(data.corpus(), &extractor))
}
