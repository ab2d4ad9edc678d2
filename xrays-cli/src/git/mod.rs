//! Git adapter: the two capability sets the engine consumes.
//!
//! Concrete implementations are wired in by construction; nothing in the
//! analysis layer touches libgit2 directly.

mod history;
mod source;

pub use history::Git2History;
pub use source::Git2Source;

use crate::error::Result;
use crate::models::FileChange;
use chrono::{DateTime, Utc};

/// Commit-history capabilities.
///
/// `file_changes` must return records ordered by commit timestamp ascending;
/// a rename is reported as a change on the new path only.
pub trait GitRepository {
    fn commit_count(&self) -> Result<u64>;
    fn first_commit_date(&self) -> Result<Option<DateTime<Utc>>>;
    fn last_commit_date(&self) -> Result<Option<DateTime<Utc>>>;
    fn file_changes(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileChange>>;
    /// Resolve a SHA prefix, tag, branch, or ISO-8601 date to the instant of
    /// the referenced commit (closest-before for a date).
    fn resolve_ref(&self, reference: &str) -> Result<DateTime<Utc>>;
}

/// Source-tree capabilities at an arbitrary ref.
pub trait SourceReader {
    /// Analyzable source paths (`.py` / `.java`), sorted ascending.
    fn list_source_files(&self, tree_ref: Option<&str>) -> Result<Vec<String>>;
    fn read_file(&self, path: &str, tree_ref: Option<&str>) -> Result<Vec<u8>>;
}
