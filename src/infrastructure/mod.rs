pub mod git;

pub use git::GitCli;
