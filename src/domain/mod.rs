pub mod filtered_view;
pub mod graph;
pub mod models;
pub mod vcs;
