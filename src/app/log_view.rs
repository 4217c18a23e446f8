use crate::app::binding::FetchConsumer;
use crate::app::sources::FetchError;
use crate::domain::{filtered_view::FilteredView, graph::Revision, vcs::OperationProgress};
use std::sync::Arc;

/// View-model for a revision list with a free-text filter.
#[derive(Debug, Default)]
pub struct LogPresenter {
    rows: FilteredView<Arc<Revision>>,
    text_filter: Option<String>,
    loading: bool,
    progress: Option<String>,
    error: Option<String>,
    updates: u64,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn text_filter(&self) -> Option<&str> {
        self.text_filter.as_deref()
    }

    /// Case-insensitive match on subject, author name, or hash prefix.
    /// An empty string clears the filter.
    pub fn set_text_filter(&mut self, text: &str) {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            self.text_filter = None;
            self.rows.clear_filter();
            return;
        }
        self.text_filter = Some(needle.clone());
        self.rows.set_filter(move |revision| matches_text(revision, &needle));
    }

    pub fn visible(&self) -> impl ExactSizeIterator<Item = &Arc<Revision>> + '_ {
        self.rows.visible()
    }

    pub fn total(&self) -> usize {
        self.rows.backing().len()
    }
}

fn matches_text(revision: &Revision, needle: &str) -> bool {
    if revision.hash().as_str().starts_with(needle) {
        return true;
    }
    let data = revision.snapshot();
    data.subject.to_lowercase().contains(needle)
        || data
            .author
            .is_some_and(|author| author.name.to_lowercase().contains(needle))
}

impl FetchConsumer<Vec<Arc<Revision>>> for LogPresenter {
    fn on_started(&mut self, _generation: u64) {
        self.loading = true;
        self.progress = None;
    }

    fn on_progress(&mut self, progress: &OperationProgress) {
        self.progress = Some(progress.message.clone());
    }

    fn on_completed(&mut self, _generation: u64, result: Vec<Arc<Revision>>) {
        self.rows.set_backing(result);
        self.loading = false;
        self.progress = None;
        self.error = None;
        self.updates += 1;
    }

    fn on_failed(&mut self, _generation: u64, error: &FetchError) {
        self.loading = false;
        self.progress = None;
        self.error = Some(error.to_string());
    }

    fn on_cancelled(&mut self, _generation: u64) {
        self.loading = false;
        self.progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::RevisionGraph;
    use crate::domain::models::{Hash, RevisionRecord, Signature};
    use chrono::Utc;

    fn load(graph: &RevisionGraph, n: u8, subject: &str, author: &str) -> Arc<Revision> {
        let sig = Signature {
            name: author.to_string(),
            email: format!("{author}@example.com"),
            when: Utc::now(),
        };
        graph
            .apply_loaded_data(&RevisionRecord {
                hash: Hash::parse(&format!("{n:02x}").repeat(20)).unwrap(),
                tree: Hash::parse(&"ff".repeat(20)).unwrap(),
                parents: vec![],
                author: sig.clone(),
                committer: sig,
                subject: subject.to_string(),
                body: String::new(),
                references: vec![],
            })
            .revision
    }

    #[test]
    fn test_text_filter_over_loaded_rows() {
        let graph = RevisionGraph::new();
        let rows = vec![
            load(&graph, 0xa1, "Fix parser", "alice"),
            load(&graph, 0xb2, "Add docs", "bob"),
            load(&graph, 0xc3, "Parser cleanup", "carol"),
        ];
        let mut presenter = LogPresenter::new();
        presenter.on_started(1);
        assert!(presenter.is_loading());
        presenter.on_completed(1, rows);
        assert!(!presenter.is_loading());

        presenter.set_text_filter("PARSER");
        let subjects: Vec<_> = presenter.visible().map(|r| r.subject()).collect();
        assert_eq!(subjects, vec!["Fix parser", "Parser cleanup"]);

        presenter.set_text_filter("bob");
        assert_eq!(presenter.visible().len(), 1);

        presenter.set_text_filter("c3c3");
        assert_eq!(presenter.visible().next().unwrap().subject(), "Parser cleanup");

        presenter.set_text_filter("  ");
        assert_eq!(presenter.visible().len(), 3);
        assert_eq!(presenter.text_filter(), None);
    }

    #[test]
    fn test_failure_keeps_previous_rows() {
        let graph = RevisionGraph::new();
        let mut presenter = LogPresenter::new();
        presenter.on_completed(1, vec![load(&graph, 1, "one", "alice")]);
        presenter.on_started(2);
        presenter.on_failed(2, &FetchError::Malformed("truncated".to_string()));
        assert_eq!(presenter.total(), 1);
        assert!(presenter.error().unwrap().contains("truncated"));
    }
}
