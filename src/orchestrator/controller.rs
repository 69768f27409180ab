use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::policy::RetryPolicy;
use super::state::{State, StateManager, TransitionRecord};
use crate::agent::AgentSession;
use crate::config::Config;
use crate::phase::Phase;
use crate::runners::{Builder, PhaseRunner, Planner, Reviewer, SessionDriver};
use crate::tracker::{Snapshot, checkpoint_subject_prefix};
use crate::ui::LoopUI;

/// First line plus body of a checkpoint commit.
pub fn checkpoint_message(from: Phase, to: Phase, iteration: u32, reason: &str) -> String {
    format!(
        "{} {} (iteration {})\n\n{}",
        checkpoint_subject_prefix(from),
        to,
        iteration,
        reason
    )
}

/// Drives the PLAN -> BUILD -> REVIEW state machine until END.
///
/// The orchestrator is the only writer of the persisted state and the only
/// caller of [`Snapshot::commit`]. Steps run strictly one after another.
pub struct Orchestrator {
    config: Config,
    store: StateManager,
    snapshot: Arc<dyn Snapshot>,
    runners: HashMap<Phase, Arc<dyn PhaseRunner>>,
    policy: RetryPolicy,
    ui: Option<Arc<LoopUI>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        snapshot: Arc<dyn Snapshot>,
        runners: Vec<Arc<dyn PhaseRunner>>,
    ) -> Self {
        let runners = runners.into_iter().map(|r| (r.phase(), r)).collect();
        Self {
            store: StateManager::new(config.state_file.clone()),
            policy: RetryPolicy::new(config.max_retries),
            config,
            snapshot,
            runners,
            ui: None,
        }
    }

    /// The planner, builder and reviewer wired to one agent session.
    pub fn standard(
        config: Config,
        session: Arc<dyn AgentSession>,
        snapshot: Arc<dyn Snapshot>,
        ui: Option<Arc<LoopUI>>,
    ) -> Self {
        let driver = SessionDriver::new(session, ui.clone());
        let runners: Vec<Arc<dyn PhaseRunner>> = vec![
            Arc::new(Planner::new(driver.clone())),
            Arc::new(Builder::new(driver.clone())),
            Arc::new(Reviewer::new(driver, snapshot.clone())),
        ];
        let mut orchestrator = Self::new(config, snapshot, runners);
        orchestrator.ui = ui;
        orchestrator
    }

    pub fn store(&self) -> &StateManager {
        &self.store
    }

    /// Load state, apply the start phase override, and step until END.
    pub async fn run(&self) -> Result<State> {
        let mut state = self.store.read_state()?;

        if let Some(start) = self.config.start_phase {
            tracing::info!(from = %state.phase, to = %start, "start phase override");
            state.phase = start;
            state = self.store.write_state(state)?;
        }

        if state.phase.is_terminal() {
            tracing::info!(iteration = state.iteration, "state is already at END, nothing to do");
        }

        let mut steps = 0usize;
        while !state.phase.is_terminal() {
            state = self.step(state).await?;
            steps += 1;
        }

        if let Some(ref ui) = self.ui {
            ui.finished(state.iteration, steps);
        }
        Ok(state)
    }

    /// Run the runner for `state.phase` and persist the resulting transition.
    pub async fn step(&self, mut state: State) -> Result<State> {
        let from = state.phase;
        let runner = self
            .runners
            .get(&from)
            .with_context(|| format!("No runner registered for phase {}", from))?;

        tracing::info!(
            phase = %from,
            iteration = state.iteration,
            retry_count = state.retry_count,
            "running phase"
        );
        if let Some(ref ui) = self.ui {
            ui.start_step(from, state.iteration, state.retry_count, self.policy.max_retries());
        }

        let result = match runner.run(&state, &self.config).await {
            Ok(result) => result,
            Err(e) => {
                if let Some(ref ui) = self.ui {
                    ui.step_failed(from, &e.to_string());
                }
                return Err(e.context(format!("{} phase failed in iteration {}", from, state.iteration)));
            }
        };

        let outcome = self
            .policy
            .apply(from, result.next_phase, result.reason, state.retry_count);
        if outcome.forced_replan {
            tracing::warn!(
                retries = state.retry_count + 1,
                max_retries = self.policy.max_retries(),
                "retry budget exhausted, forcing replan"
            );
            if let Some(ref ui) = self.ui {
                ui.show_forced_replan(state.retry_count + 1, self.policy.max_retries());
            }
        }

        self.checkpoint(from, outcome.next_phase, state.iteration, &outcome.reason)?;

        state.merge(result.state_updates);
        state.retry_count = outcome.retry_count;
        state.history.push(TransitionRecord {
            phase: from,
            transition: outcome.next_phase,
            reason: outcome.reason.clone(),
            timestamp: Utc::now(),
            iteration: state.iteration,
        });
        state.phase = outcome.next_phase;
        if outcome.next_phase == Phase::Plan {
            state.iteration += 1;
        }

        let state = self.store.write_state(state)?;

        tracing::info!(
            from = %from,
            to = %state.phase,
            iteration = state.iteration,
            retry_count = state.retry_count,
            reason = %outcome.reason,
            "transition"
        );
        if let Some(ref ui) = self.ui {
            ui.show_transition(
                from,
                state.phase,
                &outcome.reason,
                state.retry_count,
                self.policy.max_retries(),
            );
        }

        Ok(state)
    }

    /// Commit pending work unless this is a dry run.
    fn checkpoint(&self, from: Phase, to: Phase, iteration: u32, reason: &str) -> Result<()> {
        if self.config.dry_run {
            tracing::debug!("dry run, skipping checkpoint");
            if let Some(ref ui) = self.ui {
                ui.show_checkpoint_skipped();
            }
            return Ok(());
        }

        if !self
            .snapshot
            .has_uncommitted_changes()
            .context("Failed to check working tree status")?
        {
            tracing::debug!("working tree clean, no checkpoint");
            return Ok(());
        }

        let commit = self
            .snapshot
            .commit(&checkpoint_message(from, to, iteration, reason))
            .context("Failed to commit checkpoint")?;
        tracing::info!(commit = %commit, "checkpoint committed");
        if let Some(ref ui) = self.ui {
            ui.show_checkpoint(&commit);
        }
        Ok(())
    }
}
