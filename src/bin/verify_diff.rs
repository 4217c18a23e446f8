use anyhow::{anyhow, Result};
use revlens::app::diff_view::{DiffPresenter, DiffViewStatus};
use revlens::app::log_view::LogPresenter;
use revlens::app::repository::Repository;
use revlens::app::sources::{DiffSource, LogSource};
use revlens::config::GitConfig;
use revlens::domain::{models::StatusFilter, vcs::DiffOptions};
use revlens::infrastructure::GitCli;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    println!("Opening repository...");
    let git = GitCli::discover(&std::env::current_dir()?, &GitConfig::default()).await?;
    let repo = Repository::new(Arc::new(git));
    println!("Workspace root: {}", repo.workspace_root().display());

    println!("Fetching log...");
    let mut log = repo.bind(LogSource::new(None, 2), LogPresenter::new());
    log.reload()?;
    log.settle().await;
    if let Some(error) = log.consumer().error() {
        return Err(anyhow!("log failed: {error}"));
    }
    let revisions: Vec<_> = log.consumer().visible().cloned().collect();
    log.dispose();

    // Prefer the parent of HEAD so the diff has a real first parent.
    let target = revisions.get(1).or_else(|| revisions.first()).map(|r| r.hash().to_string());
    let Some(target) = target else {
        println!("Repository has no revisions");
        return Ok(());
    };
    println!("Diffing {target}");

    // Reload twice in a row: only the second generation may complete.
    let mut diff = repo.bind(
        DiffSource::revision(target, DiffOptions::default()),
        DiffPresenter::new(StatusFilter::ALL),
    );
    diff.reload()?;
    let generation = diff.reload()?;
    let outcome = diff.settle().await;
    println!("Generation {generation} finished: {outcome:?}");

    let presenter = diff.consumer();
    if let DiffViewStatus::Failed(error) = presenter.status() {
        return Err(anyhow!("diff failed: {error}"));
    }
    if presenter.updates() != 1 {
        return Err(anyhow!("expected exactly one completed load, saw {}", presenter.updates()));
    }

    println!("--- Files ---");
    for file in presenter.visible_files() {
        let (added, removed) = file.stats();
        println!("{} {} +{added} -{removed}", file.status.letter(), file.path);
    }
    println!("-------------");
    println!("Graph holds {} revisions", repo.graph().len());
    diff.dispose();

    Ok(())
}
