use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::prompts::plan_instruction;
use super::{PhaseResult, PhaseRunner, SessionDriver};
use crate::config::Config;
use crate::orchestrator::state::{Plan, State, StateUpdates};
use crate::phase::Phase;
use crate::transition::{self, Decision, DecisionError};

const NEXT_PHASES: &[Phase] = &[Phase::Build, Phase::Review, Phase::End];
const DEFAULT_NEXT: Phase = Phase::Build;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlannerPayload {
    #[serde(default)]
    plan: Option<Plan>,
}

/// Produces or keeps the plan and decides whether there is work left.
pub struct Planner {
    driver: SessionDriver,
}

impl Planner {
    pub fn new(driver: SessionDriver) -> Self {
        Self { driver }
    }
}

/// BUILD and REVIEW need a plan, either a new one or the one already in state.
fn check_plan(
    decision: Decision<PlannerPayload>,
    state: &State,
) -> Result<Decision<PlannerPayload>, DecisionError> {
    if let Some(plan) = &decision.payload.plan
        && plan.task.trim().is_empty()
    {
        return Err(DecisionError::InvalidPayload("plan task is empty".into()));
    }
    if matches!(decision.next_phase, Phase::Build | Phase::Review)
        && decision.payload.plan.is_none()
        && state.plan.is_none()
    {
        return Err(DecisionError::InvalidPayload(format!(
            "a plan is required before {}",
            decision.next_phase
        )));
    }
    Ok(decision)
}

#[async_trait]
impl PhaseRunner for Planner {
    fn phase(&self) -> Phase {
        Phase::Plan
    }

    async fn run(&self, state: &State, config: &Config) -> Result<PhaseResult> {
        let instruction = plan_instruction(state, config);
        let response = self
            .driver
            .converse(Phase::Plan, instruction, state, config)
            .await?;

        let decision = transition::decode::<PlannerPayload>(&response, NEXT_PHASES)
            .and_then(|decision| check_plan(decision, state));

        Ok(match decision {
            Ok(decision) => PhaseResult {
                next_phase: decision.next_phase,
                reason: decision.reason,
                state_updates: StateUpdates {
                    plan: decision.payload.plan,
                    ..StateUpdates::default()
                },
            },
            Err(e) => {
                self.driver.report_fallback(Phase::Plan, &e);
                PhaseResult::fallback(Phase::Plan, DEFAULT_NEXT, &e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::runners::testing::ScriptedSession;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn run_planner(response: &str, state: &State) -> (PhaseResult, Arc<ScriptedSession>) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("PLAN.md"), "Build a tokenizer").unwrap();
        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        let session = Arc::new(ScriptedSession::replying(response));
        let planner = Planner::new(SessionDriver::new(session.clone(), None));
        let result = planner.run(state, &config).await.unwrap();
        (result, session)
    }

    fn existing_plan() -> Plan {
        Plan {
            task: "Tokenizer".into(),
            files: vec![],
            steps: vec!["lex".into()],
            acceptance_criteria: vec![],
        }
    }

    #[tokio::test]
    async fn test_new_plan_is_returned_as_update() {
        let response = r#"Here is the plan.
{"nextPhase": "BUILD", "reason": "plan ready", "payload": {"plan": {"task": "Tokenizer", "files": ["src/lex.rs"], "steps": ["lex idents"], "acceptanceCriteria": ["tests pass"]}}}"#;

        let (result, session) = run_planner(response, &State::default()).await;

        assert_eq!(result.next_phase, Phase::Build);
        assert_eq!(result.reason, "plan ready");
        let plan = result.state_updates.plan.unwrap();
        assert_eq!(plan.task, "Tokenizer");
        assert_eq!(plan.steps, vec!["lex idents".to_string()]);
        assert!(session.last_instruction().contains("Build a tokenizer"));
    }

    #[tokio::test]
    async fn test_null_plan_without_existing_plan_falls_back() {
        let response = r#"{"nextPhase": "BUILD", "reason": "go", "payload": {"plan": null}}"#;

        let (result, _) = run_planner(response, &State::default()).await;

        assert_eq!(result.next_phase, Phase::Build);
        assert!(result.reason.contains("a plan is required before BUILD"));
        assert!(result.state_updates.is_empty());
    }

    #[tokio::test]
    async fn test_review_without_any_plan_falls_back() {
        let response = r#"{"nextPhase": "REVIEW", "reason": "nothing to plan"}"#;

        let (result, _) = run_planner(response, &State::default()).await;

        assert_eq!(result.next_phase, Phase::Build);
        assert!(result.reason.contains("a plan is required before REVIEW"));
        assert!(result.state_updates.is_empty());
    }

    #[tokio::test]
    async fn test_null_plan_keeps_existing_plan() {
        let state = State {
            plan: Some(existing_plan()),
            ..State::default()
        };
        let response = r#"{"nextPhase": "BUILD", "reason": "plan still holds", "payload": {"plan": null}}"#;

        let (result, _) = run_planner(response, &state).await;

        assert_eq!(result.next_phase, Phase::Build);
        assert_eq!(result.reason, "plan still holds");
        assert!(result.state_updates.plan.is_none());
    }

    #[tokio::test]
    async fn test_end_without_plan_is_allowed() {
        let response = r#"{"nextPhase": "END", "reason": "already complete"}"#;

        let (result, _) = run_planner(response, &State::default()).await;

        assert_eq!(result.next_phase, Phase::End);
        assert!(result.state_updates.is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_phase_defaults_to_build() {
        let response = r#"{"nextPhase": "PLAN", "reason": "think more"}"#;

        let (result, _) = run_planner(response, &State::default()).await;

        assert_eq!(result.next_phase, Phase::Build);
        assert!(result.reason.contains("PLAN decision could not be parsed"));
    }

    #[tokio::test]
    async fn test_blank_task_rejected() {
        let response = r#"{"nextPhase": "BUILD", "reason": "r", "payload": {"plan": {"task": " "}}}"#;

        let (result, _) = run_planner(response, &State::default()).await;

        assert!(result.reason.contains("plan task is empty"));
        assert!(result.state_updates.is_empty());
    }
}
