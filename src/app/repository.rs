use crate::app::binding::{AsyncFetchBinding, FetchConsumer};
use crate::app::sources::FetchSource;
use crate::domain::{graph::RevisionGraph, vcs::RepositoryAccessor};
use std::path::PathBuf;
use std::sync::Arc;

/// Handle to one repository: the accessor used to query it and the graph
/// that every binding created from this handle resolves into.
#[derive(Clone)]
pub struct Repository {
    accessor: Arc<dyn RepositoryAccessor>,
    graph: Arc<RevisionGraph>,
}

impl Repository {
    pub fn new(accessor: Arc<dyn RepositoryAccessor>) -> Self {
        Self {
            accessor,
            graph: Arc::new(RevisionGraph::new()),
        }
    }

    pub fn graph(&self) -> &Arc<RevisionGraph> {
        &self.graph
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.accessor.workspace_root()
    }

    pub fn bind<S, C>(&self, source: S, consumer: C) -> AsyncFetchBinding<S, C>
    where
        S: FetchSource,
        C: FetchConsumer<S::Output>,
    {
        AsyncFetchBinding::new(source, self.accessor.clone(), self.graph.clone(), consumer)
    }
}
