use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::prompts::review_instruction;
use super::{PhaseResult, PhaseRunner, SessionDriver};
use crate::config::Config;
use crate::orchestrator::state::{ReviewFeedback, State, StateUpdates};
use crate::phase::Phase;
use crate::tracker::Snapshot;
use crate::transition;

const NEXT_PHASES: &[Phase] = &[Phase::Plan, Phase::Build, Phase::End, Phase::Review];
const DEFAULT_NEXT: Phase = Phase::Plan;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReviewerPayload {
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    approved: bool,
}

/// Judges the latest build work. Reads diffs, never commits.
pub struct Reviewer {
    driver: SessionDriver,
    snapshot: Arc<dyn Snapshot>,
}

impl Reviewer {
    pub fn new(driver: SessionDriver, snapshot: Arc<dyn Snapshot>) -> Self {
        Self { driver, snapshot }
    }
}

#[async_trait]
impl PhaseRunner for Reviewer {
    fn phase(&self) -> Phase {
        Phase::Review
    }

    async fn run(&self, state: &State, config: &Config) -> Result<PhaseResult> {
        let diff = self
            .snapshot
            .diff(None)
            .context("Failed to diff working tree for review")?;
        let instruction = review_instruction(state, config, &diff);
        let response = self
            .driver
            .converse(Phase::Review, instruction, state, config)
            .await?;

        Ok(
            match transition::decode::<ReviewerPayload>(&response, NEXT_PHASES) {
                Ok(decision) => {
                    tracing::info!(
                        approved = decision.payload.approved,
                        issues = decision.payload.issues.len(),
                        "review verdict"
                    );
                    PhaseResult {
                        next_phase: decision.next_phase,
                        reason: decision.reason,
                        state_updates: StateUpdates {
                            review: Some(ReviewFeedback {
                                last_feedback: decision.payload.feedback,
                                issues: decision.payload.issues,
                                approved: decision.payload.approved,
                            }),
                            ..StateUpdates::default()
                        },
                    }
                }
                Err(e) => {
                    self.driver.report_fallback(Phase::Review, &e);
                    PhaseResult::fallback(Phase::Review, DEFAULT_NEXT, &e)
                }
            },
        )
    }
}
