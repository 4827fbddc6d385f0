//! tokenledger - context budget accounting for AI coding agent transcripts
//!
//! Reads the agent's JSONL transcripts for a project and reports how much of
//! the context budget is used, what each task chain cost, and what each
//! completed todo cost.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokenledger_core::analysis::ReportFilter;
use tokenledger_core::command::{run, AnalysisRequest};
use tokenledger_core::{Config, OutputStyle, ReportView, SessionSelector, TodoStatus};

#[derive(Parser)]
#[command(name = "tokenledger")]
#[command(about = "Token usage accounting for AI coding agent transcripts")]
#[command(version)]
struct Args {
    /// Project directory whose transcripts are analyzed (defaults to the
    /// current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Session ID to analyze (unique prefix match supported)
    #[arg(short, long, global = true, conflicts_with_all = ["recent", "file"])]
    session: Option<String>,

    /// Analyze the N most recent sessions
    #[arg(short, long, global = true, conflicts_with = "file")]
    recent: Option<usize>,

    /// Analyze this transcript file instead of looking sessions up
    /// (repeatable)
    #[arg(short, long = "file", global = true)]
    file: Vec<PathBuf>,

    /// One line per item
    #[arg(short, long, global = true, conflicts_with = "json")]
    brief: bool,

    /// Print the whole report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Agent data directory (defaults to ~/.claude)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/tokenledger/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Current context usage against the budget (default)
    #[command(alias = "tokens")]
    Context,
    /// Reconstructed task chains and their token cost
    #[command(alias = "inspect-tasks")]
    Tasks {
        /// Case-insensitive regex matched against task names
        pattern: Option<String>,
    },
    /// Todo items and the tokens spent completing them
    #[command(alias = "todo-list")]
    Todos {
        /// Only items with this status (pending, in_progress, completed, unknown)
        #[arg(long)]
        status: Option<TodoStatus>,
        /// Only items with this priority
        #[arg(long)]
        priority: Option<String>,
    },
    /// Task chains and todos side by side with totals
    Report,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    if let Some(root) = &args.root {
        config.sources.claude_root = Some(root.clone());
    }

    // Initialize logging
    let log_guard =
        tokenledger_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let request = build_request(&args)?;
    tracing::info!(
        project = %request.project.display(),
        view = ?request.view,
        "Running analysis"
    );

    let result = run(&config, &request);
    if !result.success {
        drop(log_guard);
        eprintln!("Error: {}", result.message);
        std::process::exit(1);
    }

    println!("{}", result.message);
    Ok(())
}

fn build_request(args: &Args) -> Result<AnalysisRequest> {
    let project = match &args.project {
        Some(project) => project.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    let selector = if !args.file.is_empty() {
        SessionSelector::Files(args.file.clone())
    } else if let Some(id) = &args.session {
        SessionSelector::Id(id.clone())
    } else if let Some(n) = args.recent {
        if n == 0 {
            bail!("--recent must be at least 1");
        }
        SessionSelector::Recent(n)
    } else {
        SessionSelector::Latest
    };

    let style = if args.json {
        OutputStyle::Json
    } else if args.brief {
        OutputStyle::Brief
    } else {
        OutputStyle::Full
    };

    let mut filter = ReportFilter::default();
    let view = match &args.command {
        None | Some(Commands::Context) => ReportView::Context,
        Some(Commands::Tasks { pattern }) => {
            if let Some(pattern) = pattern {
                filter.chain_pattern = Some(
                    ReportFilter::compile_pattern(pattern)
                        .with_context(|| format!("invalid task pattern {:?}", pattern))?,
                );
            }
            ReportView::Tasks
        }
        Some(Commands::Todos { status, priority }) => {
            filter.todo_status = *status;
            filter.todo_priority = priority.clone();
            ReportView::Todos
        }
        Some(Commands::Report) => ReportView::Unified,
    };

    Ok(AnalysisRequest::new(project)
        .selector(selector)
        .view(view)
        .style(style)
        .filter(filter))
}
