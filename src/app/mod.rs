pub mod binding;
pub mod diff_view;
pub mod log_view;
pub mod r#loop;
pub mod repository;
pub mod sources;
pub mod watcher;
