use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plantscan_contracts::analysis::AnalysisOutcome;
use plantscan_contracts::history::{HistoryEntry, HistoryStore};
use plantscan_contracts::report::{parse_sections, title_hint};
use plantscan_engine::{build_pipeline, NormalizeOptions, Settings};
use tracing_subscriber::EnvFilter;

const EXIT_ANALYSIS_FAILED: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "plantscan", version, about = "Identify plants from photos")]
struct Cli {
    /// History file (defaults to $PLANTSCAN_HISTORY or ./scan_history.json).
    #[arg(long, global = true)]
    history: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    image: PathBuf,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = plantscan_engine::image_prep::MAX_DIMENSION)]
    max_dim: u32,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Clear,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("plantscan error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(path) = cli.history {
        settings.history_path = path;
    }
    match cli.command {
        Command::Analyze(args) => run_analyze(settings, args),
        Command::History(HistoryCommand::List { json }) => {
            run_history_list(&HistoryStore::new(&settings.history_path), json)
        }
        Command::History(HistoryCommand::Clear) => {
            HistoryStore::new(&settings.history_path).clear()?;
            println!("History cleared.");
            Ok(0)
        }
    }
}

fn run_analyze(mut settings: Settings, args: AnalyzeArgs) -> Result<i32> {
    if let Some(model) = args.model {
        settings.model = model;
    }
    let pipeline = build_pipeline(&settings)?.with_normalize_options(NormalizeOptions {
        max_dimension: args.max_dim,
        ..NormalizeOptions::default()
    });
    let outcome = pipeline.analyze_image(&args.image);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("failed to encode outcome")?
        );
    } else {
        print_outcome(&outcome);
    }
    Ok(if outcome.is_success() {
        0
    } else {
        EXIT_ANALYSIS_FAILED
    })
}

fn print_outcome(outcome: &AnalysisOutcome) {
    match outcome {
        AnalysisOutcome::Success {
            sections,
            tokens_used,
            ..
        } => {
            for section in sections {
                if !section.is_headerless() {
                    println!("{}", section.header);
                }
                for line in section.body.lines() {
                    println!("  {line}");
                }
                println!();
            }
            if let Some(tokens) = tokens_used {
                println!("({tokens} tokens)");
            }
        }
        AnalysisOutcome::Failure { error, .. } => {
            eprintln!("Analysis failed [{}]: {error}", error.kind());
        }
    }
}

fn run_history_list(store: &HistoryStore, json: bool) -> Result<i32> {
    let entries = store.list();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("failed to encode history")?
        );
        return Ok(0);
    }
    if entries.is_empty() {
        println!("No scan history yet.");
        return Ok(0);
    }
    for entry in &entries {
        println!("{}", history_line(entry));
    }
    Ok(0)
}

fn history_line(entry: &HistoryEntry) -> String {
    let title = if entry.success {
        title_hint(&parse_sections(&entry.raw_response))
    } else {
        "Scan failed".to_string()
    };
    let status = if entry.success { "ok" } else { "failed" };
    format!(
        "{}  {:<6}  {:<30}  {}",
        entry.timestamp, status, title, entry.image_path
    )
}
