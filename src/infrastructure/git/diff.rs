use crate::domain::models::{Diff, DiffFile, DiffHunk, DiffKind, DiffLine, DiffLineKind, FileStatus};
use anyhow::{anyhow, Result};

/// Parses unified patch output from `git diff` / `git diff-tree -p`,
/// including combined (`diff --cc`) sections for unmerged paths.
pub(crate) fn parse_patch(text: &str, kind: DiffKind) -> Result<Diff> {
    let mut files = Vec::new();
    let mut current: Option<FileBuilder> = None;

    for (number, line) in text.lines().enumerate() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take().map(FileBuilder::finish));
            current = Some(FileBuilder::new(parse_git_paths(rest), FileStatus::Modified, 1));
            continue;
        }
        if let Some(path) = line
            .strip_prefix("diff --cc ")
            .or_else(|| line.strip_prefix("diff --combined "))
        {
            files.extend(current.take().map(FileBuilder::finish));
            current = Some(FileBuilder::new(path.to_string(), FileStatus::Unmerged, 2));
            continue;
        }

        let Some(file) = current.as_mut() else {
            if line.starts_with("@@") {
                return Err(anyhow!("hunk before any file header at line {}", number + 1));
            }
            continue;
        };

        if line.starts_with("@@") {
            file.hunks.push(DiffHunk {
                header: line.to_string(),
                lines: Vec::new(),
            });
        } else if let Some(hunk) = file.hunks.last_mut() {
            hunk.lines.push(parse_hunk_line(line, file.columns));
        } else {
            file.header_line(line);
        }
    }
    files.extend(current.take().map(FileBuilder::finish));

    Ok(Diff { kind, files })
}

struct FileBuilder {
    path: String,
    old_path: Option<String>,
    status: FileStatus,
    is_binary: bool,
    hunks: Vec<DiffHunk>,
    // Marker columns per hunk line: 1 for plain diffs, one per parent for combined.
    columns: usize,
}

impl FileBuilder {
    fn new(path: String, status: FileStatus, columns: usize) -> Self {
        Self {
            path,
            old_path: None,
            status,
            is_binary: false,
            hunks: Vec::new(),
            columns,
        }
    }

    fn header_line(&mut self, line: &str) {
        if line.starts_with("new file mode") {
            self.status = FileStatus::Added;
        } else if line.starts_with("deleted file mode") {
            self.status = FileStatus::Deleted;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            self.status = FileStatus::Renamed;
            self.old_path = Some(from.to_string());
        } else if let Some(to) = line.strip_prefix("rename to ") {
            self.path = to.to_string();
        } else if let Some(from) = line.strip_prefix("copy from ") {
            self.status = FileStatus::Copied;
            self.old_path = Some(from.to_string());
        } else if let Some(to) = line.strip_prefix("copy to ") {
            self.path = to.to_string();
        } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
            self.is_binary = true;
        } else if let Some(to) = line.strip_prefix("+++ b/") {
            self.path = to.to_string();
        }
    }

    fn finish(self) -> DiffFile {
        DiffFile {
            path: self.path,
            old_path: self.old_path,
            status: self.status,
            is_binary: self.is_binary,
            hunks: self.hunks,
        }
    }
}

// "a/src/x.rs b/src/x.rs"
fn parse_git_paths(rest: &str) -> String {
    match rest.rfind(" b/") {
        Some(split) => rest[split + 3..].to_string(),
        None => rest.trim_start_matches("a/").to_string(),
    }
}

fn parse_hunk_line(line: &str, columns: usize) -> DiffLine {
    if line.starts_with('\\') {
        return DiffLine {
            kind: DiffLineKind::NoNewline,
            text: line.to_string(),
        };
    }
    let mut split = columns.min(line.len());
    while !line.is_char_boundary(split) {
        split -= 1;
    }
    let (markers, text) = line.split_at(split);
    let kind = if markers.contains('+') {
        DiffLineKind::Added
    } else if markers.contains('-') {
        DiffLineKind::Removed
    } else {
        DiffLineKind::Context
    };
    DiffLine {
        kind,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn main() {
-    old();
+    new();
--- not a header
 }
diff --git a/NEW.md b/NEW.md
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/NEW.md
@@ -0,0 +1 @@
+hello
\\ No newline at end of file
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
index 4444444..0000000
--- a/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye
diff --git a/old name.rs b/new name.rs
similarity index 90%
rename from old name.rs
rename to new name.rs
diff --git a/logo.png b/logo.png
index 5555555..6666666 100644
Binary files a/logo.png and b/logo.png differ
";

    #[test]
    fn test_parse_patch_statuses() {
        let diff = parse_patch(PATCH, DiffKind::Revision).unwrap();
        let summary: Vec<_> = diff
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("src/lib.rs", FileStatus::Modified),
                ("NEW.md", FileStatus::Added),
                ("gone.txt", FileStatus::Deleted),
                ("new name.rs", FileStatus::Renamed),
                ("logo.png", FileStatus::Modified),
            ]
        );
        assert_eq!(diff.files[3].old_path.as_deref(), Some("old name.rs"));
        assert!(diff.files[4].is_binary);
        assert!(diff.files[4].hunks.is_empty());
    }

    #[test]
    fn test_parse_patch_hunk_lines() {
        let diff = parse_patch(PATCH, DiffKind::Revision).unwrap();
        let lib = &diff.files[0];
        assert_eq!(lib.hunks.len(), 1);
        assert_eq!(lib.hunks[0].header, "@@ -1,3 +1,3 @@");
        // "--- not a header" is a removed line inside the hunk.
        assert_eq!(lib.stats(), (1, 2));
        assert_eq!(lib.hunks[0].lines[1].text, "    old();");

        let new = &diff.files[1];
        assert_eq!(new.hunks[0].lines[1].kind, DiffLineKind::NoNewline);
        assert_eq!(new.stats(), (1, 0));
    }

    #[test]
    fn test_parse_combined_diff() {
        let text = "\
diff --cc conflict.txt
index 1111111,2222222..0000000
--- a/conflict.txt
+++ b/conflict.txt
@@@ -1,1 -1,1 +1,5 @@@
++<<<<<<< ours
 +mine
++=======
+ theirs
++>>>>>>> theirs
";
        let diff = parse_patch(text, DiffKind::WorkingTree).unwrap();
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].status, FileStatus::Unmerged);
        assert_eq!(diff.files[0].path, "conflict.txt");
        assert_eq!(diff.files[0].hunks[0].lines[1].text, "mine");
        assert_eq!(diff.files[0].stats(), (5, 0));
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(parse_patch("", DiffKind::Index).unwrap().files.is_empty());
        assert!(parse_patch("@@ -1 +1 @@\n+x\n", DiffKind::Index).is_err());
    }
}
