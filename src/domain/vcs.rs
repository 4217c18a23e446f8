use crate::domain::models::{Diff, RevisionRecord};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogQuery {
    /// Starting point; `None` means HEAD.
    pub reference: Option<String>,
    pub all: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub context_lines: u32,
    pub ignore_whitespace: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            ignore_whitespace: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffTarget {
    /// A committed revision against its first parent.
    Revision(String),
    /// Staged changes (`cached`) or working tree against the index.
    Index { cached: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffQuery {
    pub target: DiffTarget,
    pub options: DiffOptions,
}

/// What to ask the backend for. The accessor dispatches on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Log(LogQuery),
    Revision(String),
    Diff(DiffQuery),
}

impl Query {
    pub fn describe(&self) -> String {
        match self {
            Self::Log(q) => format!("log {}", q.reference.as_deref().unwrap_or("HEAD")),
            Self::Revision(rev) => format!("revision {rev}"),
            Self::Diff(q) => match &q.target {
                DiffTarget::Revision(rev) => format!("diff {rev}"),
                DiffTarget::Index { cached: true } => "diff --cached".to_string(),
                DiffTarget::Index { cached: false } => "diff".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    Revisions(Vec<RevisionRecord>),
    Diff {
        header: Option<RevisionRecord>,
        diff: Diff,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("query was cancelled")]
    Cancelled,
    #[error("backend i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationProgress {
    pub message: String,
    pub current: Option<usize>,
    pub total: Option<usize>,
}

impl OperationProgress {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            current: None,
            total: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ProgressEvent {
    pub generation: u64,
    pub progress: OperationProgress,
}

/// Progress channel handed to the accessor for one fetch attempt.
/// Updates are stamped with the attempt's generation so stale ones can be dropped.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    generation: u64,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            generation,
            tx: Some(tx),
        }
    }

    /// A sink that discards everything.
    pub fn detached() -> Self {
        Self {
            generation: 0,
            tx: None,
        }
    }

    pub fn report(&self, progress: OperationProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                generation: self.generation,
                progress,
            });
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryAccessor: Send + Sync {
    /// Runs a query. Implementations should stop promptly once `cancel` fires
    /// and may report that as `AccessError::Cancelled`.
    async fn execute(
        &self,
        query: &Query,
        progress: &ProgressSink,
        cancel: CancellationToken,
    ) -> Result<QueryOutput, AccessError>;

    fn workspace_root(&self) -> std::path::PathBuf;
}
