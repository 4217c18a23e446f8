use crate::config::GitConfig;
use crate::domain::{
    models::{DiffKind, RevisionRecord},
    vcs::{
        AccessError, DiffOptions, DiffQuery, DiffTarget, LogQuery, OperationProgress,
        ProgressSink, Query, QueryOutput, RepositoryAccessor,
    },
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub mod diff;
pub mod log;

const PROGRESS_EVERY: usize = 100;

/// Repository accessor backed by the `git` executable.
pub struct GitCli {
    workdir: PathBuf,
    executable: String,
    semaphore: Arc<Semaphore>,
}

impl GitCli {
    pub fn new(workdir: PathBuf, config: &GitConfig) -> Self {
        Self {
            workdir,
            executable: config.executable.clone(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_queries.max(1))),
        }
    }

    /// Finds the top level of the work tree containing `path`.
    pub async fn discover(path: &Path, config: &GitConfig) -> anyhow::Result<Self> {
        let output = tokio::process::Command::new(&config.executable)
            .arg("rev-parse")
            .arg("--show-toplevel")
            .current_dir(path)
            .output()
            .await
            .with_context(|| format!("Failed to run '{}'", config.executable))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Not a git repository: {}", stderr.trim()));
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::new(PathBuf::from(root), config))
    }

    fn command(&self, args: &[String]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> Result<String, AccessError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AccessError::Failed(anyhow!(e)))?;
        tracing::debug!(?args, "running git");
        let child = self.command(&args).spawn()?;
        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AccessError::Cancelled),
            out = child.wait_with_output() => out?,
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AccessError::Failed(anyhow!(
                "git {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Streams `git log` output record by record so progress can be reported
    /// while a long history is still being read.
    async fn run_log(
        &self,
        args: Vec<String>,
        limit: Option<usize>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<RevisionRecord>, AccessError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AccessError::Failed(anyhow!(e)))?;
        tracing::debug!(?args, "running git");
        let mut child = self.command(&args).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AccessError::Failed(anyhow!("git stdout was not captured")))?;
        let mut reader = tokio::io::BufReader::new(stdout);
        // stderr is drained alongside stdout so a chatty child cannot stall on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let mut records = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AccessError::Cancelled),
                read = reader.read_until(log::RECORD_SEPARATOR, &mut buf) => read?,
            };
            if read == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buf);
            if chunk.trim_matches(['\n', log::RECORD_SEPARATOR as char]).is_empty() {
                continue;
            }
            records.push(log::parse_record(&chunk).map_err(AccessError::Failed)?);
            if records.len() % PROGRESS_EVERY == 0 {
                progress.report(OperationProgress {
                    message: format!("Loaded {} revisions...", records.len()),
                    current: Some(records.len()),
                    total: limit,
                });
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            };
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(AccessError::Failed(anyhow!("git log failed: {}", stderr.trim())));
        }
        Ok(records)
    }

    async fn log(
        &self,
        query: &LogQuery,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<QueryOutput, AccessError> {
        progress.report(OperationProgress::message("Fetching log..."));
        let mut args = log_args();
        if query.limit > 0 {
            args.push(format!("--max-count={}", query.limit));
        }
        if query.all {
            args.push("--all".to_string());
        }
        if let Some(reference) = &query.reference {
            args.push(reference.clone());
        }
        args.push("--".to_string());
        let limit = (query.limit > 0).then_some(query.limit);
        let records = self.run_log(args, limit, progress, cancel).await?;
        Ok(QueryOutput::Revisions(records))
    }

    async fn revision(
        &self,
        revision: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RevisionRecord, AccessError> {
        let mut args = log_args();
        args.push("--max-count=1".to_string());
        args.push(revision.to_string());
        args.push("--".to_string());
        let mut records = self.run_log(args, Some(1), progress, cancel).await?;
        records
            .pop()
            .ok_or_else(|| AccessError::Failed(anyhow!("unknown revision '{revision}'")))
    }

    async fn diff(
        &self,
        query: &DiffQuery,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<QueryOutput, AccessError> {
        let (header, args, kind) = match &query.target {
            DiffTarget::Revision(rev) => {
                progress.report(OperationProgress::message(format!("Loading {rev}...")));
                let header = self.revision(rev, progress, cancel).await?;
                let mut args = vec!["diff-tree".to_string(), "-r".to_string(), "--root".to_string()];
                args.extend(diff_args(&query.options));
                args.push("--no-commit-id".to_string());
                // Merges are shown against their first parent.
                if let Some(first_parent) = header.parents.first() {
                    args.push(first_parent.to_string());
                }
                args.push(header.hash.to_string());
                (Some(header), args, DiffKind::Revision)
            }
            DiffTarget::Index { cached } => {
                let mut args = vec!["diff".to_string()];
                args.extend(diff_args(&query.options));
                let kind = if *cached {
                    args.push("--cached".to_string());
                    DiffKind::Index
                } else {
                    DiffKind::WorkingTree
                };
                (None, args, kind)
            }
        };

        progress.report(OperationProgress::message("Computing diff..."));
        let patch = self.run(args, cancel).await?;
        let diff = diff::parse_patch(&patch, kind).map_err(AccessError::Failed)?;
        progress.report(OperationProgress {
            message: format!("{} files changed", diff.files.len()),
            current: Some(diff.files.len()),
            total: Some(diff.files.len()),
        });
        Ok(QueryOutput::Diff { header, diff })
    }
}

fn log_args() -> Vec<String> {
    vec![
        "log".to_string(),
        "--decorate=full".to_string(),
        "--no-color".to_string(),
        log::LOG_FORMAT.to_string(),
    ]
}

fn diff_args(options: &DiffOptions) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        "-M".to_string(),
        "--no-color".to_string(),
        "--no-ext-diff".to_string(),
        format!("-U{}", options.context_lines),
    ];
    if options.ignore_whitespace {
        args.push("-w".to_string());
    }
    args
}

#[async_trait]
impl RepositoryAccessor for GitCli {
    async fn execute(
        &self,
        query: &Query,
        progress: &ProgressSink,
        cancel: CancellationToken,
    ) -> Result<QueryOutput, AccessError> {
        match query {
            Query::Log(q) => self.log(q, progress, &cancel).await,
            Query::Revision(rev) => {
                let record = self.revision(rev, progress, &cancel).await?;
                Ok(QueryOutput::Revisions(vec![record]))
            }
            Query::Diff(q) => self.diff(q, progress, &cancel).await,
        }
    }

    fn workspace_root(&self) -> PathBuf {
        self.workdir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_args() {
        let args = diff_args(&DiffOptions {
            context_lines: 5,
            ignore_whitespace: true,
        });
        assert!(args.contains(&"-U5".to_string()));
        assert!(args.contains(&"-w".to_string()));
        assert!(!diff_args(&DiffOptions::default()).contains(&"-w".to_string()));
    }

    #[tokio::test]
    async fn test_missing_executable_is_reported() {
        let config = GitConfig {
            executable: "revlens-no-such-git".to_string(),
            ..GitConfig::default()
        };
        let git = GitCli::new(std::env::temp_dir(), &config);
        let err = git
            .execute(
                &Query::Revision("HEAD".to_string()),
                &ProgressSink::detached(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Io(_)));
    }

    #[tokio::test]
    async fn test_cancelled_query_returns_cancelled() {
        let git = GitCli::new(std::env::temp_dir(), &GitConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = git
            .execute(
                &Query::Diff(DiffQuery {
                    target: DiffTarget::Index { cached: false },
                    options: DiffOptions::default(),
                }),
                &ProgressSink::detached(),
                cancel,
            )
            .await;
        // Either the spawn fails (no git installed) or the cancellation wins.
        assert!(matches!(
            result,
            Err(AccessError::Cancelled) | Err(AccessError::Io(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_survives_noisy_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy-git");
        std::fs::write(
            &script,
            "#!/bin/sh\nhead -c 300000 /dev/zero | tr '\\0' x >&2\necho 'fatal: bad revision' >&2\nexit 128\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = GitConfig {
            executable: script.to_string_lossy().into_owned(),
            ..GitConfig::default()
        };
        let git = GitCli::new(dir.path().to_path_buf(), &config);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            git.execute(
                &Query::Log(LogQuery::default()),
                &ProgressSink::detached(),
                CancellationToken::new(),
            ),
        )
        .await
        .expect("git log stalled on stderr");

        match result {
            Err(AccessError::Failed(err)) => {
                assert!(err.to_string().ends_with("fatal: bad revision"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
