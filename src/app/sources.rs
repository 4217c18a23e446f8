use crate::domain::{
    graph::{Revision, RevisionGraph},
    models::Diff,
    vcs::{DiffOptions, DiffQuery, DiffTarget, LogQuery, Query, QueryOutput},
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Query(anyhow::Error),
    #[error("backend returned unexpected output for {0}")]
    UnexpectedOutput(String),
    #[error("backend returned malformed data: {0}")]
    Malformed(String),
}

/// Describes one kind of fetch: how to ask the accessor and how to turn
/// what comes back into graph-backed results.
pub trait FetchSource: Send + 'static {
    type Output;

    fn query(&self) -> Query;

    /// Runs on the coordinating context, only for the current generation.
    fn resolve(&self, output: QueryOutput, graph: &RevisionGraph)
        -> Result<Self::Output, FetchError>;
}

#[derive(Debug, Clone)]
pub struct LogSource {
    pub query: LogQuery,
}

impl LogSource {
    pub fn new(reference: Option<String>, limit: usize) -> Self {
        Self {
            query: LogQuery {
                reference,
                all: false,
                limit,
            },
        }
    }
}

impl FetchSource for LogSource {
    type Output = Vec<Arc<Revision>>;

    fn query(&self) -> Query {
        Query::Log(self.query.clone())
    }

    fn resolve(&self, output: QueryOutput, graph: &RevisionGraph) -> Result<Self::Output, FetchError> {
        let QueryOutput::Revisions(records) = output else {
            return Err(FetchError::UnexpectedOutput(self.query().describe()));
        };
        Ok(records
            .iter()
            .map(|record| graph.apply_loaded_data(record).revision)
            .collect())
    }
}

/// Loads a single revision by any name the backend understands.
#[derive(Debug, Clone)]
pub struct RevisionSource {
    pub revision: String,
}

impl FetchSource for RevisionSource {
    type Output = Arc<Revision>;

    fn query(&self) -> Query {
        Query::Revision(self.revision.clone())
    }

    fn resolve(&self, output: QueryOutput, graph: &RevisionGraph) -> Result<Self::Output, FetchError> {
        match output {
            QueryOutput::Revisions(records) => match records.as_slice() {
                [record] => Ok(graph.apply_loaded_data(record).revision),
                _ => Err(FetchError::Malformed(format!(
                    "expected one revision for {}, got {}",
                    self.revision,
                    records.len()
                ))),
            },
            QueryOutput::Diff { .. } => Err(FetchError::UnexpectedOutput(self.query().describe())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedDiff {
    /// Set for revision diffs only.
    pub revision: Option<Arc<Revision>>,
    pub diff: Diff,
}

#[derive(Debug, Clone)]
pub struct DiffSource {
    pub target: DiffTarget,
    pub options: DiffOptions,
}

impl DiffSource {
    pub fn revision(revision: impl Into<String>, options: DiffOptions) -> Self {
        Self {
            target: DiffTarget::Revision(revision.into()),
            options,
        }
    }

    pub fn index(cached: bool, options: DiffOptions) -> Self {
        Self {
            target: DiffTarget::Index { cached },
            options,
        }
    }
}

impl FetchSource for DiffSource {
    type Output = ResolvedDiff;

    fn query(&self) -> Query {
        Query::Diff(DiffQuery {
            target: self.target.clone(),
            options: self.options,
        })
    }

    fn resolve(&self, output: QueryOutput, graph: &RevisionGraph) -> Result<Self::Output, FetchError> {
        let QueryOutput::Diff { header, diff } = output else {
            return Err(FetchError::UnexpectedOutput(self.query().describe()));
        };
        let revision = match (&self.target, header) {
            (DiffTarget::Revision(_), Some(record)) => Some(graph.apply_loaded_data(&record).revision),
            (DiffTarget::Revision(rev), None) => {
                return Err(FetchError::Malformed(format!("missing header for {rev}")));
            }
            (DiffTarget::Index { .. }, _) => None,
        };
        Ok(ResolvedDiff { revision, diff })
    }
}
