use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revlens::app::{
    binding::Outcome,
    diff_view::DiffPresenter,
    log_view::LogPresenter,
    r#loop::{run_view, ShowPresenter},
    repository::Repository,
    sources::{DiffSource, LogSource},
    watcher::{RepoWatcher, WatchScope},
};
use revlens::config::Config;
use revlens::domain::models::StatusFilter;
use revlens::infrastructure::GitCli;

/// Read-only views over a git repository.
#[derive(Parser, Debug)]
#[command(name = "revlens")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Repository to open (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Config file (defaults to ~/.config/revlens/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List revisions
    Log {
        /// Start from this reference instead of HEAD
        #[arg(short, long = "ref")]
        reference: Option<String>,

        /// Maximum number of revisions (0 for no limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Include every reference
        #[arg(long)]
        all: bool,

        /// Only show revisions whose subject, author or hash matches
        #[arg(long)]
        grep: Option<String>,

        /// Reload whenever the repository changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Show one revision and the files it touched
    Show {
        revision: String,
    },

    /// Show a patch
    Diff {
        /// Revision to diff against its first parent; omit for local changes
        revision: Option<String>,

        /// Staged changes instead of unstaged ones
        #[arg(long, conflicts_with = "revision")]
        cached: bool,

        /// Status letters to show, e.g. "AM" ("*" for all)
        #[arg(short, long)]
        status: Option<String>,

        /// Reload whenever the repository changes
        #[arg(short, long)]
        watch: bool,
    },
}

fn init_tracing() {
    let log_format = std::env::var("REVLENS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_env("REVLENS_LOG")
        .unwrap_or_else(|_| "warn".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn watcher(enabled: bool, repo: &Repository, scope: WatchScope, config: &Config) -> Result<Option<RepoWatcher>> {
    if !enabled {
        return Ok(None);
    }
    let watcher = RepoWatcher::spawn(&repo.workspace_root(), scope, config.watch.debounce())?;
    Ok(Some(watcher))
}

async fn run(cli: Cli) -> Result<Option<Outcome>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let start = match cli.repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let git = GitCli::discover(&start, &config.git).await?;
    let repo = Repository::new(Arc::new(git));
    tracing::debug!(root = %repo.workspace_root().display(), "opened repository");

    let mut stdout = std::io::stdout();
    match cli.command {
        Commands::Log {
            reference,
            limit,
            all,
            grep,
            watch,
        } => {
            let mut source = LogSource::new(reference, limit.unwrap_or(config.log.limit));
            source.query.all = all;
            let mut presenter = LogPresenter::new();
            if let Some(text) = grep {
                presenter.set_text_filter(&text);
            }
            let watcher = watcher(watch, &repo, WatchScope::Refs, &config)?;
            run_view(repo.bind(source, presenter), watcher, &mut stdout).await
        }
        Commands::Show { revision } => {
            let source = DiffSource::revision(revision, config.diff.options());
            run_view(repo.bind(source, ShowPresenter::new()), None, &mut stdout).await
        }
        Commands::Diff {
            revision,
            cached,
            status,
            watch,
        } => {
            let filter = match status {
                Some(letters) => StatusFilter::parse(&letters)
                    .ok_or_else(|| anyhow!("Invalid status filter '{letters}'"))?,
                None => config.diff.status_filter()?,
            };
            let (source, scope) = match revision {
                Some(rev) => (DiffSource::revision(rev, config.diff.options()), WatchScope::Refs),
                None if cached => (DiffSource::index(true, config.diff.options()), WatchScope::Refs),
                None => (DiffSource::index(false, config.diff.options()), WatchScope::WorkTree),
            };
            let watcher = watcher(watch, &repo, scope, &config)?;
            run_view(repo.bind(source, DiffPresenter::new(filter)), watcher, &mut stdout).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(Some(Outcome::Failed)) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("revlens: {err:#}");
            ExitCode::FAILURE
        }
    }
}
