use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::StateError;
use crate::phase::Phase;

/// Schema version written into every state document.
pub const STATE_VERSION: u32 = 1;

/// What the planner decided to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Plan {
    pub task: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

/// Builder's account of the last BUILD session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
}

/// Reviewer's verdict on the last build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFeedback {
    pub last_feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub approved: bool,
}

/// One completed loop step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    /// Phase whose runner executed
    pub phase: Phase,
    /// Phase the loop moved to
    pub transition: Phase,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Iteration in which the step ran
    #[serde(default)]
    pub iteration: u32,
}

/// The loop's durable state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default = "default_version")]
    pub version: u32,
    pub phase: Phase,
    pub iteration: u32,
    /// Consecutive REVIEW → BUILD round trips since the last PLAN
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub build: Option<BuildReport>,
    #[serde(default)]
    pub review: Option<ReviewFeedback>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            phase: Phase::Plan,
            iteration: 1,
            retry_count: 0,
            plan: None,
            build: None,
            review: None,
            history: Vec::new(),
        }
    }
}

/// Partial state returned by a phase runner. Present fields replace the
/// corresponding field of [`State`]; absent fields leave it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdates {
    pub plan: Option<Plan>,
    pub build: Option<BuildReport>,
    pub review: Option<ReviewFeedback>,
}

impl StateUpdates {
    pub fn is_empty(&self) -> bool {
        self.plan.is_none() && self.build.is_none() && self.review.is_none()
    }
}

impl State {
    pub fn merge(&mut self, updates: StateUpdates) {
        if let Some(plan) = updates.plan {
            self.plan = Some(plan);
        }
        if let Some(build) = updates.build {
            self.build = Some(build);
        }
        if let Some(review) = updates.review {
            self.review = Some(review);
        }
    }

    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.last()
    }
}

/// Loads and persists the state document.
pub struct StateManager {
    state_file: PathBuf,
}

impl StateManager {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Return the persisted state, or the initial state when none exists.
    pub fn read_state(&self) -> Result<State, StateError> {
        if !self.state_file.exists() {
            return Ok(State::default());
        }

        let content =
            fs::read_to_string(&self.state_file).map_err(|source| StateError::ReadFailed {
                path: self.state_file.clone(),
                source,
            })?;

        let state: State =
            serde_json::from_str(&content).map_err(|source| StateError::Malformed {
                path: self.state_file.clone(),
                source,
            })?;

        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                path: self.state_file.clone(),
                found: state.version,
                supported: STATE_VERSION,
            });
        }

        Ok(state)
    }

    /// Persist `next` and hand it back.
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// see either the old document or the new one.
    pub fn write_state(&self, next: State) -> Result<State, StateError> {
        let write_err = |source| StateError::WriteFailed {
            path: self.state_file.clone(),
            source,
        };

        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&next).map_err(StateError::Serialize)?;
        let tmp = self.state_file.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(write_err)?;
            file.write_all(json.as_bytes()).map_err(write_err)?;
            file.write_all(b"\n").map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp, &self.state_file).map_err(write_err)?;

        Ok(next)
    }

    pub fn reset(&self) -> Result<(), StateError> {
        if self.state_file.exists() {
            fs::remove_file(&self.state_file).map_err(|source| StateError::WriteFailed {
                path: self.state_file.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
