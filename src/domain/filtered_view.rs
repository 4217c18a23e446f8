use std::fmt;

pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Order-preserving subset of an owned backing sequence.
///
/// The view owns its items; callers hand over a snapshot and can only read
/// back through [`FilteredView::visible`]. Changing the predicate recomputes
/// the visible indices in one pass without touching the backing items.
pub struct FilteredView<T> {
    backing: Vec<T>,
    predicate: Option<Predicate<T>>,
    visible: Vec<usize>,
}

impl<T> FilteredView<T> {
    pub fn new() -> Self {
        Self {
            backing: Vec::new(),
            predicate: None,
            visible: Vec::new(),
        }
    }

    pub fn set_backing(&mut self, items: Vec<T>) {
        self.backing = items;
        self.recompute();
    }

    pub fn set_filter<F>(&mut self, predicate: F)
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self.recompute();
    }

    /// Accept everything.
    pub fn clear_filter(&mut self) {
        self.predicate = None;
        self.recompute();
    }

    pub fn visible(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.visible.iter().map(|&i| &self.backing[i])
    }

    /// Positions of the visible items within the backing sequence.
    pub fn visible_indices(&self) -> &[usize] {
        &self.visible
    }

    pub fn get(&self, visible_index: usize) -> Option<&T> {
        self.visible.get(visible_index).map(|&i| &self.backing[i])
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn backing(&self) -> &[T] {
        &self.backing
    }

    fn recompute(&mut self) {
        self.visible.clear();
        match &self.predicate {
            None => self.visible.extend(0..self.backing.len()),
            Some(predicate) => self.visible.extend(
                self.backing
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| predicate(item))
                    .map(|(i, _)| i),
            ),
        }
    }
}

impl<T> Default for FilteredView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for FilteredView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredView")
            .field("backing", &self.backing)
            .field("filtered", &self.predicate.is_some())
            .field("visible", &self.visible)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FileStatus, StatusFilter};

    fn tagged() -> Vec<(&'static str, FileStatus)> {
        vec![
            ("a", FileStatus::Deleted),
            ("b", FileStatus::Added),
            ("c", FileStatus::Renamed),
            ("d", FileStatus::Modified),
            ("e", FileStatus::Copied),
        ]
    }

    fn names<'a>(view: &'a FilteredView<(&'static str, FileStatus)>) -> Vec<&'a str> {
        view.visible().map(|(name, _)| *name).collect()
    }

    fn by_status(view: &mut FilteredView<(&'static str, FileStatus)>, filter: StatusFilter) {
        view.set_filter(move |(_, status)| filter.contains(*status));
    }

    #[test]
    fn test_status_filter_changes_without_refetch() {
        let mut view = FilteredView::new();
        view.set_backing(tagged());

        by_status(&mut view, StatusFilter::ADDED | StatusFilter::MODIFIED);
        assert_eq!(names(&view), vec!["b", "d"]);
        assert_eq!(view.visible_indices(), &[1, 3]);

        by_status(&mut view, StatusFilter::DELETED);
        assert_eq!(names(&view), vec!["a"]);

        view.clear_filter();
        assert_eq!(names(&view), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(view.backing().len(), 5);
    }

    #[test]
    fn test_empty_backing_is_empty_for_any_filter() {
        let mut view: FilteredView<(&'static str, FileStatus)> = FilteredView::new();
        assert!(view.is_empty());
        by_status(&mut view, StatusFilter::ALL);
        assert!(view.is_empty());
        view.set_filter(|_| true);
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn test_new_backing_keeps_active_filter() {
        let mut view = FilteredView::new();
        by_status(&mut view, StatusFilter::ADDED);
        view.set_backing(tagged());
        assert_eq!(names(&view), vec!["b"]);

        view.set_backing(vec![("x", FileStatus::Added), ("y", FileStatus::Added)]);
        assert_eq!(names(&view), vec!["x", "y"]);
        assert_eq!(view.get(1).map(|(n, _)| *n), Some("y"));
        assert!(view.get(2).is_none());
    }

    #[test]
    fn test_visible_matches_predicate_for_many_inputs() {
        let mut view = FilteredView::new();
        for len in 0..20usize {
            let items: Vec<usize> = (0..len).map(|i| (i * 7) % 5).collect();
            view.set_backing(items.clone());
            for modulus in 1..4usize {
                view.set_filter(move |x| x % modulus == 0);
                let expected: Vec<usize> =
                    items.iter().copied().filter(|x| x % modulus == 0).collect();
                assert_eq!(view.visible().copied().collect::<Vec<_>>(), expected);
            }
        }
    }
}
