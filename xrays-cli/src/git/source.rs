//! Source-tree access at an arbitrary ref, using libgit2 tree walks.

use git2::{ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, XraysError};
use crate::git::SourceReader;

/// Extensions the AST front-ends understand.
const SOURCE_EXTENSIONS: &[&str] = &[".py", ".java"];

pub struct Git2Source {
    repo: Repository,
}

impl Git2Source {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|_| XraysError::Input(format!("Not a git repository: {}", path.display())))?;
        Ok(Self { repo })
    }

    fn tree_at<'a>(
        repo: &'a Repository,
        tree_ref: Option<&str>,
    ) -> std::result::Result<git2::Tree<'a>, git2::Error> {
        let spec = tree_ref.unwrap_or("HEAD");
        let obj = repo.revparse_single(spec)?;
        obj.peel_to_tree()
    }
}

impl SourceReader for Git2Source {
    fn list_source_files(&self, tree_ref: Option<&str>) -> Result<Vec<String>> {
        if self.repo.head().is_err() {
            return Ok(Vec::new());
        }
        let tree = Self::tree_at(&self.repo, tree_ref).map_err(|e| {
            XraysError::Input(format!(
                "Unknown ref: {}: {e}",
                tree_ref.unwrap_or("HEAD")
            ))
        })?;

        let walk = || -> std::result::Result<Vec<String>, git2::Error> {
            let mut files = Vec::new();
            tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    let name = entry.name().unwrap_or("");
                    if SOURCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                        files.push(format!("{dir}{name}"));
                    }
                }
                TreeWalkResult::Ok
            })?;
            Ok(files)
        };
        // One retry before surfacing the failure.
        let mut files = walk().or_else(|first| {
            debug!(error = %first, "tree walk failed, retrying once");
            walk().map_err(|e| XraysError::Adapter(format!("tree walk: {e}")))
        })?;

        files.sort();
        debug!(count = files.len(), "listed source files");
        Ok(files)
    }

    fn read_file(&self, path: &str, tree_ref: Option<&str>) -> Result<Vec<u8>> {
        let read = || -> std::result::Result<Vec<u8>, git2::Error> {
            let tree = Self::tree_at(&self.repo, tree_ref)?;
            let entry = tree.get_path(Path::new(path))?;
            let blob = self.repo.find_blob(entry.id())?;
            Ok(blob.content().to_vec())
        };
        // One retry before surfacing the failing path.
        read().or_else(|first| {
            debug!(%path, error = %first, "blob read failed, retrying once");
            read().map_err(|e| XraysError::Adapter(format!("read {path}: {e}")))
        })
    }
}
