//! Version-control checkpoints.
//!
//! The orchestrator only talks to version control through [`Snapshot`], so the
//! loop can be driven against a real repository ([`GitTracker`]) or a test
//! double. Only the orchestrator calls [`Snapshot::commit`].

pub mod git;

pub use git::GitTracker;

use anyhow::Result;

use crate::phase::Phase;

/// Marker carried by every loop-authored commit message.
pub const CHECKPOINT_MARKER: &str = "[ratchet]";

/// Start of the subject line of every checkpoint taken when leaving `from`.
pub fn checkpoint_subject_prefix(from: Phase) -> String {
    format!("{} {} ->", CHECKPOINT_MARKER, from)
}

pub trait Snapshot: Send + Sync {
    /// True when tracked files are modified or untracked, non-ignored files exist.
    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Unified diff of the working tree against `reference`.
    ///
    /// `None` means the newest first-parent commit that is not a BUILD
    /// checkpoint, so the latest build work stays visible after it has been
    /// committed. Falls back to the empty tree when there is no such commit.
    fn diff(&self, reference: Option<&str>) -> Result<String>;

    /// Stage every working-tree change and commit it. Returns the new commit id.
    fn commit(&self, message: &str) -> Result<String>;

    /// Most recent commit reachable from HEAD whose message contains `marker`.
    fn find_last_checkpoint(&self, marker: &str) -> Result<Option<String>>;
}
