use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::prompts::build_instruction;
use super::{PhaseResult, PhaseRunner, SessionDriver};
use crate::config::Config;
use crate::orchestrator::state::{BuildReport, State, StateUpdates};
use crate::phase::Phase;
use crate::transition;

const NEXT_PHASES: &[Phase] = &[Phase::Review, Phase::Plan, Phase::Build];
const DEFAULT_NEXT: Phase = Phase::Review;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BuilderPayload {
    #[serde(default)]
    completed_steps: Vec<String>,
    #[serde(default)]
    blockers: Vec<String>,
}

/// Lets the agent implement the plan in the working tree.
pub struct Builder {
    driver: SessionDriver,
}

impl Builder {
    pub fn new(driver: SessionDriver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl PhaseRunner for Builder {
    fn phase(&self) -> Phase {
        Phase::Build
    }

    async fn run(&self, state: &State, config: &Config) -> Result<PhaseResult> {
        let instruction = build_instruction(state, config);
        let response = self
            .driver
            .converse(Phase::Build, instruction, state, config)
            .await?;

        Ok(
            match transition::decode::<BuilderPayload>(&response, NEXT_PHASES) {
                Ok(decision) => {
                    if !decision.payload.blockers.is_empty() {
                        tracing::info!(
                            blockers = decision.payload.blockers.len(),
                            "builder reported blockers"
                        );
                    }
                    PhaseResult {
                        next_phase: decision.next_phase,
                        reason: decision.reason,
                        state_updates: StateUpdates {
                            build: Some(BuildReport {
                                completed_steps: decision.payload.completed_steps,
                                blockers: decision.payload.blockers,
                            }),
                            ..StateUpdates::default()
                        },
                    }
                }
                Err(e) => {
                    self.driver.report_fallback(Phase::Build, &e);
                    PhaseResult::fallback(Phase::Build, DEFAULT_NEXT, &e)
                }
            },
        )
    }
}
