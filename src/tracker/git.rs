use anyhow::Result;
use git2::{DiffFormat, DiffOptions, Repository, Signature, Sort, StatusOptions, Tree};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{Snapshot, checkpoint_subject_prefix};
use crate::errors::SnapshotError;
use crate::phase::Phase;

/// [`Snapshot`] backed by a git repository through `git2`.
pub struct GitTracker {
    repo: Mutex<Repository>,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self, SnapshotError> {
        let repo = Repository::open(project_dir).map_err(|source| SnapshotError::OpenFailed {
            path: project_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            repo: Mutex::new(repo),
        })
    }

    fn repo(&self) -> Result<MutexGuard<'_, Repository>, SnapshotError> {
        self.repo.lock().map_err(|_| SnapshotError::LockPoisoned)
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Result<Option<String>, SnapshotError> {
        let repo = self.repo()?;
        Ok(head_commit(&repo).map(|c| c.id().to_string()))
    }
}

/// Get the HEAD commit if it exists (returns None for unborn branches)
fn head_commit(repo: &Repository) -> Option<git2::Commit<'_>> {
    repo.head().ok().and_then(|head| head.peel_to_commit().ok())
}

fn last_checkpoint(repo: &Repository, marker: &str) -> Result<Option<git2::Oid>, SnapshotError> {
    if head_commit(repo).is_none() {
        return Ok(None);
    }

    let mut walk = repo.revwalk().map_err(SnapshotError::git("revwalk"))?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(SnapshotError::git("revwalk"))?;
    walk.push_head().map_err(SnapshotError::git("revwalk"))?;

    for oid in walk {
        let oid = oid.map_err(SnapshotError::git("revwalk"))?;
        let commit = repo.find_commit(oid).map_err(SnapshotError::git("find_commit"))?;
        if commit.message().is_some_and(|m| m.contains(marker)) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

/// Newest commit on the first-parent chain from HEAD that is not a BUILD
/// checkpoint. BUILD work is committed before REVIEW runs, so diffing against
/// this commit keeps that work in view.
fn review_base(repo: &Repository) -> Result<Option<git2::Commit<'_>>, SnapshotError> {
    let build_prefix = checkpoint_subject_prefix(Phase::Build);
    let mut current = head_commit(repo);

    while let Some(commit) = current {
        let is_build = commit
            .message()
            .is_some_and(|m| m.starts_with(&build_prefix));
        if !is_build {
            return Ok(Some(commit));
        }
        current = if commit.parent_count() == 0 {
            None
        } else {
            Some(commit.parent(0).map_err(SnapshotError::git("parent"))?)
        };
    }
    Ok(None)
}

/// Resolve the tree a diff is taken against. `None` is the empty tree.
fn base_tree<'r>(
    repo: &'r Repository,
    reference: Option<&str>,
) -> Result<Option<Tree<'r>>, SnapshotError> {
    let commit = match reference {
        Some(rev) => Some(
            repo.revparse_single(rev)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(SnapshotError::git("revparse"))?,
        ),
        None => review_base(repo)?,
    };

    commit
        .map(|c| c.tree().map_err(SnapshotError::git("tree")))
        .transpose()
}

impl Snapshot for GitTracker {
    fn has_uncommitted_changes(&self) -> Result<bool> {
        let repo = self.repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(SnapshotError::git("status"))?;
        Ok(!statuses.is_empty())
    }

    fn diff(&self, reference: Option<&str>) -> Result<String> {
        let repo = self.repo()?;
        let tree = base_tree(&repo, reference)?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);

        let diff = repo
            .diff_tree_to_workdir_with_index(tree.as_ref(), Some(&mut opts))
            .map_err(SnapshotError::git("diff"))?;

        let mut buf = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                buf.push(line.origin() as u8);
            }
            buf.extend_from_slice(line.content());
            true
        })
        .map_err(SnapshotError::git("diff"))?;

        Ok(String::from_utf8_lossy(&buf).to_string())
    }

    fn commit(&self, message: &str) -> Result<String> {
        let repo = self.repo()?;
        let mut index = repo.index().map_err(SnapshotError::git("index"))?;

        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .map_err(SnapshotError::git("add"))?;
        // add_all does not pick up deletions
        index
            .update_all(["*"].iter(), None)
            .map_err(SnapshotError::git("add"))?;
        index.write().map_err(SnapshotError::git("index"))?;

        let tree_id = index.write_tree().map_err(SnapshotError::git("write_tree"))?;
        let tree = repo.find_tree(tree_id).map_err(SnapshotError::git("find_tree"))?;
        let sig = Signature::now("ratchet", "ratchet@localhost")
            .map_err(SnapshotError::git("signature"))?;

        // Handle unborn branch (new repo with no commits yet)
        let parents: Vec<git2::Commit<'_>> = head_commit(&repo).into_iter().collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let commit_id = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(SnapshotError::git("commit"))?;

        tracing::debug!(commit = %commit_id, "checkpoint committed");
        Ok(commit_id.to_string())
    }

    fn find_last_checkpoint(&self, marker: &str) -> Result<Option<String>> {
        let repo = self.repo()?;
        Ok(last_checkpoint(&repo, marker)?.map(|oid| oid.to_string()))
    }
}
