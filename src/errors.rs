//! Typed error hierarchy for the ratchet loop.
//!
//! Three enums cover the fatal failure classes:
//! - `StateError`: the persisted state document cannot be read or written
//! - `AgentError`: the hosted agent session failed in transport
//! - `SnapshotError`: the version-control collaborator failed
//!
//! Decision parse failures are not fatal and live in [`crate::transition`].

use std::path::PathBuf;
use thiserror::Error;

use crate::phase::Phase;

/// Errors from the state store. All of them abort the run.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file at {path} has schema version {found}, this build supports up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Failed to write state file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from a hosted agent session. Fatal for the current iteration.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent process '{cmd}': {source}")]
    SpawnFailed {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent stream I/O failed: {0}")]
    Stream(#[source] std::io::Error),

    #[error("Agent session for {phase} reported an error: {message}")]
    SessionFailed { phase: Phase, message: String },

    #[error("Agent session for {phase} ended without a result")]
    Incomplete { phase: Phase },
}

/// Errors from the version-control collaborator.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to open git repository at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Git operation '{op}' failed: {source}")]
    Git {
        op: &'static str,
        #[source]
        source: git2::Error,
    },

    #[error("Git repository lock poisoned")]
    LockPoisoned,
}

impl SnapshotError {
    pub fn git(op: &'static str) -> impl FnOnce(git2::Error) -> Self {
        move |source| SnapshotError::Git { op, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_error_unsupported_version_names_both_versions() {
        let err = StateError::UnsupportedVersion {
            path: PathBuf::from("/p/.ratchet/state.json"),
            found: 7,
            supported: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("version 7"));
        assert!(msg.contains("up to 1"));
    }

    #[test]
    fn state_error_malformed_carries_path() {
        let source = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = StateError::Malformed {
            path: PathBuf::from("/p/state.json"),
            source,
        };
        match &err {
            StateError::Malformed { path, .. } => {
                assert_eq!(path, &PathBuf::from("/p/state.json"))
            }
            _ => panic!("Expected Malformed"),
        }
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn agent_error_spawn_failed_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "claude not found");
        let err = AgentError::SpawnFailed {
            cmd: "claude".into(),
            source: io_err,
        };
        match &err {
            AgentError::SpawnFailed { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            _ => panic!("Expected SpawnFailed"),
        }
    }

    #[test]
    fn agent_error_incomplete_mentions_phase() {
        let err = AgentError::Incomplete { phase: Phase::Build };
        assert!(err.to_string().contains("BUILD"));
    }

    #[test]
    fn snapshot_error_git_helper_records_operation() {
        let err = SnapshotError::git("commit")(git2::Error::from_str("boom"));
        assert!(err.to_string().contains("'commit'"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        assert_std_error(&SnapshotError::LockPoisoned);
        assert_std_error(&AgentError::Incomplete { phase: Phase::Plan });
    }
}
