use crate::app::binding::{AsyncFetchBinding, Delivery, FetchConsumer, Outcome};
use crate::app::diff_view::{DiffPresenter, DiffViewStatus};
use crate::app::log_view::LogPresenter;
use crate::app::sources::{FetchError, FetchSource, ResolvedDiff};
use crate::app::watcher::RepoWatcher;
use crate::domain::{
    graph::Revision,
    models::{DiffFile, DiffLineKind, StatusFilter},
    vcs::OperationProgress,
};
use anyhow::Result;
use std::io::Write;

const SHORT_HASH: usize = 10;

/// Plain-text output of a presenter's current state.
pub trait Render {
    fn render(&self, out: &mut dyn Write) -> std::io::Result<()>;

    /// Latest progress message while a load is running.
    fn progress_line(&self) -> Option<&str> {
        None
    }
}

/// Drives one binding until its first terminal outcome, or, with a watcher,
/// until Ctrl-C, reloading on every repository change.
///
/// The binding is always disposed before returning.
pub async fn run_view<S, C>(
    mut binding: AsyncFetchBinding<S, C>,
    mut watcher: Option<RepoWatcher>,
    out: &mut dyn Write,
) -> Result<Option<Outcome>>
where
    S: FetchSource,
    C: FetchConsumer<S::Output> + Render,
{
    let result = pump(&mut binding, &mut watcher, out).await;
    binding.dispose();
    result
}

async fn pump<S, C>(
    binding: &mut AsyncFetchBinding<S, C>,
    watcher: &mut Option<RepoWatcher>,
    out: &mut dyn Write,
) -> Result<Option<Outcome>>
where
    S: FetchSource,
    C: FetchConsumer<S::Output> + Render,
{
    binding.reload()?;
    loop {
        tokio::select! {
            delivery = binding.dispatch_next() => match delivery {
                Some(Delivery::Terminal(outcome)) => {
                    binding.consumer().render(out)?;
                    out.flush()?;
                    if watcher.is_none() {
                        return Ok(Some(outcome));
                    }
                }
                Some(Delivery::Progress) => {
                    if let Some(line) = binding.consumer().progress_line() {
                        tracing::info!(generation = binding.generation(), "{line}");
                    }
                }
                Some(Delivery::Stale) => {}
                None => return Ok(binding.last_outcome()),
            },
            Some(()) = next_change(watcher) => {
                tracing::info!("repository changed, reloading");
                binding.reload()?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                return Ok(binding.last_outcome());
            }
        }
    }
}

async fn next_change(watcher: &mut Option<RepoWatcher>) -> Option<()> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

fn write_revision_line(out: &mut dyn Write, revision: &Revision) -> std::io::Result<()> {
    let data = revision.snapshot();
    let refs: Vec<String> = data.references.iter().map(ToString::to_string).collect();
    write!(out, "{}", revision.hash().short(SHORT_HASH))?;
    if !refs.is_empty() {
        write!(out, " ({})", refs.join(", "))?;
    }
    writeln!(out, " {}", data.subject)
}

fn write_revision_header(out: &mut dyn Write, revision: &Revision) -> std::io::Result<()> {
    let data = revision.snapshot();
    writeln!(out, "revision {}", revision.hash())?;
    if !data.references.is_empty() {
        let refs: Vec<String> = data.references.iter().map(ToString::to_string).collect();
        writeln!(out, "Refs:   {}", refs.join(", "))?;
    }
    if data.parents.len() > 1 {
        let parents: Vec<&str> = data.parents.iter().map(|p| p.short(SHORT_HASH)).collect();
        writeln!(out, "Merge:  {}", parents.join(" "))?;
    }
    if let Some(author) = &data.author {
        writeln!(out, "Author: {} <{}>", author.name, author.email)?;
        writeln!(out, "Date:   {}", author.when.format("%Y-%m-%d %H:%M:%S %z"))?;
    }
    writeln!(out)?;
    writeln!(out, "    {}", data.subject)?;
    if !data.body.is_empty() {
        writeln!(out)?;
        for line in data.body.lines() {
            writeln!(out, "    {line}")?;
        }
    }
    writeln!(out)
}

fn write_file_stat(out: &mut dyn Write, file: &DiffFile) -> std::io::Result<()> {
    let path = match &file.old_path {
        Some(old) => format!("{old} => {}", file.path),
        None => file.path.clone(),
    };
    if file.is_binary {
        return writeln!(out, " {} {path} | Bin", file.status.letter());
    }
    let (added, removed) = file.stats();
    writeln!(out, " {} {path} | +{added} -{removed}", file.status.letter())
}

fn write_file_patch(out: &mut dyn Write, file: &DiffFile) -> std::io::Result<()> {
    write_file_stat(out, file)?;
    for hunk in &file.hunks {
        writeln!(out, "{}", hunk.header)?;
        for line in &hunk.lines {
            let marker = match line.kind {
                DiffLineKind::Context => " ",
                DiffLineKind::Added => "+",
                DiffLineKind::Removed => "-",
                DiffLineKind::NoNewline => "",
            };
            writeln!(out, "{marker}{}", line.text)?;
        }
    }
    Ok(())
}

fn write_hidden_count(out: &mut dyn Write, shown: usize, total: usize) -> std::io::Result<()> {
    if shown < total {
        writeln!(out, "({} of {total} files hidden by filter)", total - shown)?;
    }
    Ok(())
}

impl Render for LogPresenter {
    fn progress_line(&self) -> Option<&str> {
        self.progress()
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        if let Some(error) = self.error() {
            return writeln!(out, "error: {error}");
        }
        for revision in self.visible() {
            write_revision_line(out, revision)?;
        }
        if let Some(filter) = self.text_filter() {
            writeln!(out, "({} of {} revisions match '{filter}')", self.visible().len(), self.total())?;
        }
        Ok(())
    }
}

impl Render for DiffPresenter {
    fn progress_line(&self) -> Option<&str> {
        match self.status() {
            DiffViewStatus::Loading(message) => message.as_deref(),
            _ => None,
        }
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        match self.status() {
            DiffViewStatus::Failed(error) => return writeln!(out, "error: {error}"),
            DiffViewStatus::Empty | DiffViewStatus::Loading(_) => return Ok(()),
            DiffViewStatus::Ready => {}
        }
        if let Some(revision) = self.header() {
            write_revision_line(out, revision)?;
        }
        for file in self.visible_files() {
            write_file_patch(out, file)?;
        }
        write_hidden_count(out, self.visible_files().len(), self.total_files())
    }
}

/// Revision header followed by a per-file summary.
#[derive(Debug)]
pub struct ShowPresenter {
    diff: DiffPresenter,
}

impl ShowPresenter {
    pub fn new() -> Self {
        Self {
            diff: DiffPresenter::new(StatusFilter::ALL),
        }
    }
}

impl Default for ShowPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchConsumer<ResolvedDiff> for ShowPresenter {
    fn on_started(&mut self, generation: u64) {
        self.diff.on_started(generation);
    }

    fn on_progress(&mut self, progress: &OperationProgress) {
        self.diff.on_progress(progress);
    }

    fn on_completed(&mut self, generation: u64, result: ResolvedDiff) {
        self.diff.on_completed(generation, result);
    }

    fn on_failed(&mut self, generation: u64, error: &FetchError) {
        self.diff.on_failed(generation, error);
    }

    fn on_cancelled(&mut self, generation: u64) {
        self.diff.on_cancelled(generation);
    }
}

impl Render for ShowPresenter {
    fn progress_line(&self) -> Option<&str> {
        self.diff.progress_line()
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        match self.diff.status() {
            DiffViewStatus::Failed(error) => return writeln!(out, "error: {error}"),
            DiffViewStatus::Empty | DiffViewStatus::Loading(_) => return Ok(()),
            DiffViewStatus::Ready => {}
        }
        if let Some(revision) = self.diff.header() {
            write_revision_header(out, revision)?;
        }
        for file in self.diff.visible_files() {
            write_file_stat(out, file)?;
        }
        Ok(())
    }
}
