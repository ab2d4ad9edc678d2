//! Shared fixture: throwaway git repositories with controlled timestamps.

use git2::{Repository, Signature, Time};
use std::path::PathBuf;

pub struct TestRepo {
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

    /// Commit `files` as `author` at the given epoch second.
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
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
            .unwrap()
            .to_string()
    }
}

/// Epoch seconds `days` before now, so default windows include the commits.
pub fn days_ago(days: i64) -> i64 {
    chrono::Utc::now().timestamp() - days * 86_400
}
