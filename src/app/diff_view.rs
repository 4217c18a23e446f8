use crate::app::binding::FetchConsumer;
use crate::app::sources::{FetchError, ResolvedDiff};
use crate::domain::{
    filtered_view::FilteredView,
    graph::Revision,
    models::{DiffFile, StatusFilter},
    vcs::OperationProgress,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum DiffViewStatus {
    Empty,
    Loading(Option<String>),
    Ready,
    Failed(String),
}

/// View-model for a diff: the fetched files, the status filter applied to
/// them, and an optional revision header.
#[derive(Debug)]
pub struct DiffPresenter {
    status: DiffViewStatus,
    // What was shown before the current load; a cancelled load goes back to it.
    settled: DiffViewStatus,
    header: Option<Arc<Revision>>,
    files: FilteredView<DiffFile>,
    filter: StatusFilter,
    updates: u64,
}

impl DiffPresenter {
    pub fn new(filter: StatusFilter) -> Self {
        let mut presenter = Self {
            status: DiffViewStatus::Empty,
            settled: DiffViewStatus::Empty,
            header: None,
            files: FilteredView::new(),
            filter: StatusFilter::ALL,
            updates: 0,
        };
        presenter.set_status_filter(filter);
        presenter
    }

    pub fn status(&self) -> &DiffViewStatus {
        &self.status
    }

    pub fn header(&self) -> Option<&Arc<Revision>> {
        self.header.as_ref()
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.filter
    }

    /// Recomputes the visible files from what was already fetched.
    pub fn set_status_filter(&mut self, filter: StatusFilter) {
        self.filter = filter;
        if filter.is_all() {
            self.files.clear_filter();
        } else {
            self.files.set_filter(move |file| filter.contains(file.status));
        }
    }

    pub fn visible_files(&self) -> impl ExactSizeIterator<Item = &DiffFile> + '_ {
        self.files.visible()
    }

    pub fn total_files(&self) -> usize {
        self.files.backing().len()
    }

    /// Number of completed loads applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl FetchConsumer<ResolvedDiff> for DiffPresenter {
    fn on_started(&mut self, _generation: u64) {
        if !matches!(self.status, DiffViewStatus::Loading(_)) {
            self.settled = self.status.clone();
        }
        self.status = DiffViewStatus::Loading(None);
    }

    fn on_progress(&mut self, progress: &OperationProgress) {
        if let DiffViewStatus::Loading(message) = &mut self.status {
            *message = Some(progress.message.clone());
        }
    }

    fn on_completed(&mut self, _generation: u64, result: ResolvedDiff) {
        self.header = result.revision;
        self.files.set_backing(result.diff.files);
        self.status = DiffViewStatus::Ready;
        self.updates += 1;
    }

    fn on_failed(&mut self, _generation: u64, error: &FetchError) {
        self.files.set_backing(Vec::new());
        self.header = None;
        self.status = DiffViewStatus::Failed(error.to_string());
    }

    fn on_cancelled(&mut self, _generation: u64) {
        self.status = self.settled.clone();
    }
}
