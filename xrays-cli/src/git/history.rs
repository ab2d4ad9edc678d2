//! Commit-history extraction using libgit2.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use git2::{Repository, Sort};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, XraysError};
use crate::git::GitRepository;
use crate::models::FileChange;

/// History reader over one repository handle.
pub struct Git2History {
    repo: Repository,
}

impl std::fmt::Debug for Git2History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2History").finish_non_exhaustive()
    }
}

impl Git2History {
    /// Open a repository. The path itself must be a repository root or live
    /// inside one; anything else is a user error.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|_| XraysError::Input(format!("Not a git repository: {}", path.display())))?;
        debug!(repo = %repo.path().display(), "opened repository");
        Ok(Self { repo })
    }

    pub fn is_git_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    /// One retry on adapter failures before surfacing the error.
    fn with_retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut(&Repository) -> std::result::Result<T, git2::Error>,
    ) -> Result<T> {
        match op(&self.repo) {
            Ok(v) => Ok(v),
            Err(first) => {
                debug!(%what, error = %first, "git operation failed, retrying once");
                op(&self.repo)
                    .map_err(|e| XraysError::Adapter(format!("{what}: {e}")))
            }
        }
    }

    fn walk_times(&self, oldest_first: bool) -> std::result::Result<Vec<i64>, git2::Error> {
        let mut revwalk = self.repo.revwalk()?;
        let sorting = if oldest_first {
            Sort::TIME | Sort::REVERSE
        } else {
            Sort::TIME
        };
        revwalk.set_sorting(sorting)?;
        revwalk.push_head()?;
        let mut times = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            times.push(commit.time().seconds());
        }
        Ok(times)
    }

    fn changes_for_commit(
        repo: &Repository,
        commit: &git2::Commit,
    ) -> std::result::Result<Vec<FileChange>, git2::Error> {
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let tree = commit.tree()?;
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let author = commit.author().name().unwrap_or("Unknown").to_string();
        let timestamp = epoch_to_utc(commit.time().seconds());
        let commit_id = commit.id().to_string();

        let mut changes = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let Some(path) = delta.new_file().path() else {
                continue;
            };
            let (added, deleted) = match git2::Patch::from_diff(&diff, idx)? {
                Some(mut patch) => {
                    let (_, additions, deletions) = patch.line_stats()?;
                    (additions as u64, deletions as u64)
                }
                // Binary delta: no line stats.
                None => (0, 0),
            };
            changes.push(FileChange {
                commit_id: commit_id.clone(),
                author: author.clone(),
                timestamp,
                path: path.to_string_lossy().to_string(),
                added_lines: added,
                deleted_lines: deleted,
            });
        }
        Ok(changes)
    }

    /// Resolve an ISO-8601 date to the instant of the closest commit at or
    /// before that date.
    fn resolve_date(&self, date: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let times = self
            .with_retry("rev-list", |_| self.walk_times(true))
            .unwrap_or_default();
        let cutoff = date.timestamp();
        let mut best: Option<i64> = None;
        for t in times {
            if t <= cutoff {
                best = Some(t);
            } else {
                break;
            }
        }
        match best {
            Some(t) => Ok(epoch_to_utc(t)),
            None => Err(XraysError::Input(format!(
                "No commit at or before {}",
                date.to_rfc3339()
            ))),
        }
    }
}

impl GitRepository for Git2History {
    fn commit_count(&self) -> Result<u64> {
        if self.repo.head().is_err() {
            return Ok(0);
        }
        let times = self.with_retry("rev-list --count", |_| self.walk_times(false))?;
        Ok(times.len() as u64)
    }

    fn first_commit_date(&self) -> Result<Option<DateTime<Utc>>> {
        if self.repo.head().is_err() {
            return Ok(None);
        }
        let times = self.with_retry("log --reverse", |_| self.walk_times(true))?;
        Ok(times.first().map(|&t| epoch_to_utc(t)))
    }

    fn last_commit_date(&self) -> Result<Option<DateTime<Utc>>> {
        if self.repo.head().is_err() {
            return Ok(None);
        }
        let times = self.with_retry("log -1", |_| self.walk_times(false))?;
        Ok(times.first().map(|&t| epoch_to_utc(t)))
    }

    fn file_changes(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileChange>> {
        if self.repo.head().is_err() {
            return Ok(Vec::new());
        }
        let mut changes = self.with_retry("log --numstat", |repo| {
            let mut revwalk = repo.revwalk()?;
            revwalk.set_sorting(Sort::TIME | Sort::REVERSE)?;
            revwalk.push_head()?;

            let mut out = Vec::new();
            for oid in revwalk {
                let commit = repo.find_commit(oid?)?;
                // Merge commits carry no first-parent numstat attribution.
                if commit.parent_count() > 1 {
                    continue;
                }
                let ts = epoch_to_utc(commit.time().seconds());
                if let Some(s) = since {
                    if ts < s {
                        continue;
                    }
                }
                if let Some(u) = until {
                    if ts > u {
                        continue;
                    }
                }
                out.extend(Self::changes_for_commit(repo, &commit)?);
            }
            Ok(out)
        })?;
        // Revwalk time order can interleave equal timestamps; pin it down.
        changes.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.commit_id.cmp(&b.commit_id))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(changes)
    }

    fn resolve_ref(&self, reference: &str) -> Result<DateTime<Utc>> {
        // SHA prefix / tag / branch first.
        if let Ok(obj) = self.repo.revparse_single(reference) {
            if let Ok(commit) = obj.peel_to_commit() {
                return Ok(epoch_to_utc(commit.time().seconds()));
            }
        }
        // Then an ISO-8601 date, resolved to the closest commit before it.
        if let Ok(dt) = DateTime::parse_from_rfc3339(reference) {
            return self.resolve_date(dt.with_timezone(&Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(reference, "%Y-%m-%d") {
            let end_of_day = date.and_hms_opt(23, 59, 59).expect("valid time");
            return self.resolve_date(Utc.from_utc_datetime(&end_of_day));
        }
        Err(XraysError::Input(format!("Unknown ref: {reference}")))
    }
}

fn epoch_to_utc(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use git2::{Signature, Time};
    use std::path::PathBuf;

    /// Build a throwaway repository and commit files with fixed timestamps.
    pub(crate) struct TestRepo {
        pub dir: tempfile::TempDir,
        pub repo: Repository,
    }

    impl TestRepo {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let repo = Repository::init(dir.path()).expect("init");
            {
                let mut config = repo.config().expect("config");
                config.set_str("user.name", "Test User").unwrap();
                config.set_str("user.email", "test@example.com").unwrap();
            }
            Self { dir, repo }
        }

        pub fn commit(&self, author: &str, epoch: i64, files: &[(&str, &str)]) -> String {
            let sig = Signature::new(
                author,
                &format!("{}@example.com", author.to_lowercase()),
                &Time::new(epoch, 0),
            )
            .expect("signature");

            let tree_id = {
                let mut index = self.repo.index().expect("index");
                for (name, content) in files {
                    let full = self.dir.path().join(name);
                    if let Some(parent) = full.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(&full, content).unwrap();
                    index.add_path(&PathBuf::from(name)).unwrap();
                }
                index.write().unwrap();
                index.write_tree().unwrap()
            };
            let tree = self.repo.find_tree(tree_id).unwrap();
            let parent = self
                .repo
                .head()
                .ok()
                .and_then(|h| h.peel_to_commit().ok());
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            let oid = self
                .repo
                .commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
                .unwrap();
            oid.to_string()
        }
    }

    #[test]
    fn open_rejects_non_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = Git2History::open(dir.path()).unwrap_err();
        assert!(matches!(err, XraysError::Input(_)));
    }

    #[test]
    fn counts_and_dates() {
        let t = TestRepo::new();
        t.commit("Alice", 1_700_000_000, &[("a.py", "x = 1\n")]);
        t.commit("Bob", 1_700_100_000, &[("b.py", "y = 2\n")]);

        let history = Git2History::open(t.dir.path()).unwrap();
        assert_eq!(history.commit_count().unwrap(), 2);
        assert_eq!(
            history.first_commit_date().unwrap().unwrap(),
            epoch_to_utc(1_700_000_000)
        );
        assert_eq!(
            history.last_commit_date().unwrap().unwrap(),
            epoch_to_utc(1_700_100_000)
        );
    }

    #[test]
    fn file_changes_are_time_ordered_and_windowed() {
        let t = TestRepo::new();
        t.commit("Alice", 1_700_000_000, &[("a.py", "line\n")]);
        t.commit("Alice", 1_700_200_000, &[("a.py", "line\nmore\n")]);
        t.commit("Bob", 1_700_400_000, &[("b.py", "other\n")]);

        let history = Git2History::open(t.dir.path()).unwrap();
        let all = history.file_changes(None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let windowed = history
            .file_changes(Some(epoch_to_utc(1_700_100_000)), None)
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[0].path, "a.py");
        assert_eq!(windowed[0].added_lines, 1);
        assert_eq!(windowed[1].path, "b.py");
    }

    #[test]
    fn resolve_ref_handles_sha_and_date() {
        let t = TestRepo::new();
        let first = t.commit("Alice", 1_700_000_000, &[("a.py", "x\n")]);
        t.commit("Alice", 1_700_500_000, &[("a.py", "x\ny\n")]);

        let history = Git2History::open(t.dir.path()).unwrap();
        assert_eq!(
            history.resolve_ref(&first[..10]).unwrap(),
            epoch_to_utc(1_700_000_000)
        );
        assert_eq!(
            history.resolve_ref("HEAD").unwrap(),
            epoch_to_utc(1_700_500_000)
        );

        // A date between the two commits resolves to the earlier one.
        let mid = epoch_to_utc(1_700_250_000).to_rfc3339();
        assert_eq!(history.resolve_ref(&mid).unwrap(), epoch_to_utc(1_700_000_000));

        let err = history.resolve_ref("no-such-ref").unwrap_err();
        assert!(matches!(err, XraysError::Input(_)));
    }

    #[test]
    fn empty_repo_degrades_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let history = Git2History::open(dir.path()).unwrap();
        assert_eq!(history.commit_count().unwrap(), 0);
        assert!(history.first_commit_date().unwrap().is_none());
        assert!(history.file_changes(None, None).unwrap().is_empty());
    }
}
