use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchScope {
    /// HEAD, index and refs only.
    Refs,
    /// Also every file in the work tree.
    WorkTree,
}

/// Debounced "something changed in the repository" notifications.
pub struct RepoWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl RepoWatcher {
    pub fn spawn(root: &Path, scope: WatchScope, debounce: Duration) -> Result<Self> {
        let (notify_tx, mut notify_rx) = mpsc::channel(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = notify_tx.try_send(());
            }
        })?;

        let git_dir = root.join(".git");
        match scope {
            WatchScope::WorkTree => watcher.watch(root, RecursiveMode::Recursive)?,
            WatchScope::Refs if git_dir.is_dir() => {
                watcher.watch(&git_dir, RecursiveMode::NonRecursive)?;
                let refs = git_dir.join("refs");
                if refs.is_dir() {
                    watcher.watch(&refs, RecursiveMode::Recursive)?;
                }
            }
            WatchScope::Refs => {
                tracing::warn!(root = %root.display(), "no .git directory to watch");
            }
        }

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut pending = false;
            loop {
                if pending {
                    tokio::select! {
                        Some(()) = notify_rx.recv() => {}
                        () = tokio::time::sleep(debounce) => {
                            if tx.send(()).await.is_err() {
                                break;
                            }
                            pending = false;
                        }
                    }
                } else if notify_rx.recv().await.is_some() {
                    pending = true;
                } else {
                    break;
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Resolves once per quiet period after a burst of changes.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_of_changes_is_debounced() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher =
            RepoWatcher::spawn(dir.path(), WatchScope::WorkTree, Duration::from_millis(200)).unwrap();

        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }

        let first = tokio::time::timeout(Duration::from_secs(5), watcher.changed()).await;
        assert_eq!(first.unwrap(), Some(()));

        let second = tokio::time::timeout(Duration::from_millis(600), watcher.changed()).await;
        assert!(second.is_err(), "expected a single notification for the burst");
    }
}
