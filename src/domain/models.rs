use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Content hash naming a revision or tree. Always stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(String);

impl Hash {
    /// Accepts SHA-1 (40) and SHA-256 (64) hex digests.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !matches!(text.len(), 40 | 64) || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(text.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceName {
    Head,
    Branch(String),
    RemoteBranch(String),
    Tag(String),
    Other(String),
}

impl ReferenceName {
    /// Parses a fully qualified name (`refs/heads/main`, `HEAD`, ...).
    pub fn parse(full: &str) -> Self {
        let full = full.trim();
        if full == "HEAD" {
            Self::Head
        } else if let Some(name) = full.strip_prefix("refs/heads/") {
            Self::Branch(name.to_string())
        } else if let Some(name) = full.strip_prefix("refs/remotes/") {
            Self::RemoteBranch(name.to_string())
        } else if let Some(name) = full.strip_prefix("refs/tags/") {
            Self::Tag(name.to_string())
        } else {
            Self::Other(full.to_string())
        }
    }
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => write!(f, "HEAD"),
            Self::Branch(name) | Self::RemoteBranch(name) | Self::Other(name) => {
                write!(f, "{name}")
            }
            Self::Tag(name) => write!(f, "tag: {name}"),
        }
    }
}

/// Raw revision data as parsed by an accessor, before it is merged into the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub hash: Hash,
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub author: Signature,
    pub committer: Signature,
    pub subject: String,
    pub body: String,
    pub references: Vec<ReferenceName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
}

impl FileStatus {
    pub fn letter(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Unmerged => 'U',
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Added => 1,
            Self::Modified => 1 << 1,
            Self::Deleted => 1 << 2,
            Self::Renamed => 1 << 3,
            Self::Copied => 1 << 4,
            Self::Unmerged => 1 << 5,
        }
    }
}

/// Bitmask of file statuses accepted by a diff view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusFilter(u8);

impl StatusFilter {
    pub const NONE: Self = Self(0);
    pub const ADDED: Self = Self(1);
    pub const MODIFIED: Self = Self(1 << 1);
    pub const DELETED: Self = Self(1 << 2);
    pub const RENAMED: Self = Self(1 << 3);
    pub const COPIED: Self = Self(1 << 4);
    pub const UNMERGED: Self = Self(1 << 5);
    pub const ALL: Self = Self(0b11_1111);

    pub fn contains(self, status: FileStatus) -> bool {
        self.0 & status.bit() != 0
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    /// Parses status letters such as `"AMD"`. Unknown letters yield `None`.
    pub fn parse(letters: &str) -> Option<Self> {
        let mut filter = Self::NONE;
        for c in letters.chars() {
            filter |= match c.to_ascii_uppercase() {
                'A' => Self::ADDED,
                'M' => Self::MODIFIED,
                'D' => Self::DELETED,
                'R' => Self::RENAMED,
                'C' => Self::COPIED,
                'U' => Self::UNMERGED,
                '*' => Self::ALL,
                _ => return None,
            };
        }
        Some(filter)
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<FileStatus> for StatusFilter {
    fn from(status: FileStatus) -> Self {
        Self(status.bit())
    }
}

impl BitOr for StatusFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusFilter {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Context,
    Added,
    Removed,
    NoNewline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub header: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: String,
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub is_binary: bool,
    pub hunks: Vec<DiffHunk>,
}

impl DiffFile {
    /// (added, removed) line counts.
    pub fn stats(&self) -> (usize, usize) {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .fold((0, 0), |(added, removed), line| match line.kind {
                DiffLineKind::Added => (added + 1, removed),
                DiffLineKind::Removed => (added, removed + 1),
                _ => (added, removed),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Revision,
    Index,
    WorkingTree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub kind: DiffKind,
    pub files: Vec<DiffFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_parse() {
        let hash = Hash::parse("ABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(hash.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(hash.short(7), "abcdef0");
        assert!(Hash::parse("abc").is_none());
        assert!(Hash::parse("zzzzzz0123456789abcdef0123456789abcdef01").is_none());
    }

    #[test]
    fn test_reference_name_parse() {
        assert_eq!(ReferenceName::parse("HEAD"), ReferenceName::Head);
        assert_eq!(
            ReferenceName::parse("refs/heads/feature/x"),
            ReferenceName::Branch("feature/x".to_string())
        );
        assert_eq!(
            ReferenceName::parse("refs/remotes/origin/main"),
            ReferenceName::RemoteBranch("origin/main".to_string())
        );
        assert_eq!(
            ReferenceName::parse("refs/tags/v1.0"),
            ReferenceName::Tag("v1.0".to_string())
        );
    }

    #[test]
    fn test_status_filter() {
        let filter = StatusFilter::ADDED | StatusFilter::MODIFIED;
        assert!(filter.contains(FileStatus::Added));
        assert!(filter.contains(FileStatus::Modified));
        assert!(!filter.contains(FileStatus::Deleted));
        assert_eq!(StatusFilter::parse("am"), Some(filter));
        assert_eq!(StatusFilter::parse("*"), Some(StatusFilter::ALL));
        assert_eq!(StatusFilter::parse("X"), None);
        assert!(StatusFilter::default().is_all());
    }
}
