//! Phase runners.
//!
//! A runner owns one phase: it composes an instruction, drives exactly one
//! agent session to completion, and turns the agent's decision into a
//! [`PhaseResult`]. Runners never commit and never persist state.

pub mod builder;
pub mod planner;
pub mod prompts;
pub mod reviewer;

pub use builder::Builder;
pub use planner::Planner;
pub use reviewer::Reviewer;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{AgentSession, SessionEvent, SessionRequest};
use crate::config::Config;
use crate::errors::AgentError;
use crate::orchestrator::state::{State, StateUpdates};
use crate::phase::Phase;
use crate::stream::{snippet, tool_emoji};
use crate::transition::DecisionError;
use crate::ui::LoopUI;

/// What a runner hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResult {
    pub next_phase: Phase,
    pub reason: String,
    pub state_updates: StateUpdates,
}

impl PhaseResult {
    /// Result used when the agent's decision could not be read.
    pub fn fallback(phase: Phase, default: Phase, error: &DecisionError) -> Self {
        Self {
            next_phase: default,
            reason: format!(
                "{} decision could not be parsed ({}); defaulting to {}",
                phase, error, default
            ),
            state_updates: StateUpdates::default(),
        }
    }
}

#[async_trait]
pub trait PhaseRunner: Send + Sync {
    fn phase(&self) -> Phase;

    async fn run(&self, state: &State, config: &Config) -> Result<PhaseResult>;
}

/// Drives one agent session per call and records its transcript.
#[derive(Clone)]
pub struct SessionDriver {
    session: Arc<dyn AgentSession>,
    ui: Option<Arc<LoopUI>>,
}

impl SessionDriver {
    pub fn new(session: Arc<dyn AgentSession>, ui: Option<Arc<LoopUI>>) -> Self {
        Self { session, ui }
    }

    /// Send `instruction` and return the agent's final response text.
    ///
    /// The `result` of the terminal event wins; without one, the accumulated
    /// fragments are returned. An unsuccessful terminal event or a stream that
    /// ends without one is an [`AgentError`].
    pub async fn converse(
        &self,
        phase: Phase,
        instruction: String,
        state: &State,
        config: &Config,
    ) -> Result<String> {
        let (prompt_file, output_file) = transcript_files(config, state, phase);
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
        std::fs::write(&prompt_file, &instruction).context("Failed to write prompt file")?;

        let request = SessionRequest {
            phase,
            instruction,
            max_turns: config.max_turns,
            working_dir: config.project_dir.clone(),
        };
        let mut events = self.session.open(request).await?;

        let mut accumulated = String::new();
        let mut finished = None;
        while let Some(event) = events.next().await {
            match event? {
                SessionEvent::Fragment(text) => {
                    if let Some(ref ui) = self.ui {
                        ui.show_thinking(&snippet(&text, 80));
                    }
                    accumulated.push_str(&text);
                    accumulated.push('\n');
                }
                SessionEvent::Progress { tool, description } => {
                    tracing::debug!(phase = %phase, tool = %tool, "{}", description);
                    if let Some(ref ui) = self.ui {
                        ui.show_tool_use(tool_emoji(&tool), &description);
                    }
                }
                SessionEvent::Finished {
                    success,
                    result,
                    detail,
                } => finished = Some((success, result, detail)),
            }
        }

        let Some((success, result, detail)) = finished else {
            std::fs::write(&output_file, &accumulated).context("Failed to write output file")?;
            return Err(AgentError::Incomplete { phase }.into());
        };

        let response = match result {
            Some(text) if !text.trim().is_empty() => text,
            _ => accumulated,
        };
        std::fs::write(&output_file, &response).context("Failed to write output file")?;

        if !success {
            let message = if response.trim().is_empty() {
                detail
            } else {
                format!("{}: {}", detail, snippet(&response, 200))
            };
            return Err(AgentError::SessionFailed { phase, message }.into());
        }

        tracing::info!(phase = %phase, chars = response.len(), "agent session finished");
        Ok(response)
    }

    /// Log and narrate a decision that fell back to the phase default.
    pub fn report_fallback(&self, phase: Phase, error: &DecisionError) {
        tracing::warn!(phase = %phase, error = %error, "agent decision unreadable, using default");
        if let Some(ref ui) = self.ui {
            ui.show_fallback(phase, &error.to_string());
        }
    }
}

fn transcript_files(config: &Config, state: &State, phase: Phase) -> (PathBuf, PathBuf) {
    let stem = format!(
        "iter-{}-step-{}-{}",
        state.iteration,
        state.history.len() + 1,
        phase.slug()
    );
    (
        config.log_dir.join(format!("{}-prompt.md", stem)),
        config.log_dir.join(format!("{}-output.log", stem)),
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted agent session shared by the runner tests.

    use super::*;
    use crate::agent::EventStream;
    use std::sync::Mutex;

    /// Replays a fixed event sequence and records every request it receives.
    pub struct ScriptedSession {
        events: Vec<SessionEvent>,
        pub requests: Mutex<Vec<SessionRequest>>,
    }

    impl ScriptedSession {
        pub fn new(events: Vec<SessionEvent>) -> Self {
            Self {
                events,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A session whose final result is `text`.
        pub fn replying(text: &str) -> Self {
            Self::new(vec![
                SessionEvent::Fragment("working on it".into()),
                SessionEvent::Finished {
                    success: true,
                    result: Some(text.to_string()),
                    detail: "success".into(),
                },
            ])
        }

        pub fn last_instruction(&self) -> String {
            self.requests
                .lock()
                .unwrap()
                .last()
                .map(|r| r.instruction.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl AgentSession for ScriptedSession {
        async fn open(&self, request: SessionRequest) -> Result<EventStream> {
            self.requests.lock().unwrap().push(request);
            let events: Vec<Result<SessionEvent>> = self.events.iter().cloned().map(Ok).collect();
            Ok(futures::stream::iter(events).boxed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSession;
    use super::*;
    use crate::config::ConfigOverrides;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config {
        Config::new(dir.to_path_buf(), ConfigOverrides::default()).unwrap()
    }

    #[tokio::test]
    async fn test_converse_prefers_result_text() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let session = Arc::new(ScriptedSession::replying("final"));
        let driver = SessionDriver::new(session.clone(), None);

        let text = driver
            .converse(Phase::Plan, "instr".into(), &State::default(), &config)
            .await
            .unwrap();

        assert_eq!(text, "final");
        let requests = session.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_turns, config.max_turns);
        assert_eq!(requests[0].working_dir, config.project_dir);
    }

    #[tokio::test]
    async fn test_converse_falls_back_to_fragments() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let session = Arc::new(ScriptedSession::new(vec![
            SessionEvent::Fragment("part one".into()),
            SessionEvent::Progress {
                tool: "Read".into(),
                description: "Reading src/lib.rs".into(),
            },
            SessionEvent::Fragment("part two".into()),
            SessionEvent::Finished {
                success: true,
                result: None,
                detail: "exited with code 0".into(),
            },
        ]));
        let driver = SessionDriver::new(session, None);

        let text = driver
            .converse(Phase::Build, "instr".into(), &State::default(), &config)
            .await
            .unwrap();

        assert_eq!(text, "part one\npart two\n");
    }

    #[tokio::test]
    async fn test_converse_writes_transcripts() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let driver = SessionDriver::new(Arc::new(ScriptedSession::replying("answer")), None);

        driver
            .converse(Phase::Review, "the instruction".into(), &State::default(), &config)
            .await
            .unwrap();

        let prompt = std::fs::read_to_string(config.log_dir.join("iter-1-step-1-review-prompt.md"))
            .unwrap();
        let output = std::fs::read_to_string(config.log_dir.join("iter-1-step-1-review-output.log"))
            .unwrap();
        assert_eq!(prompt, "the instruction");
        assert_eq!(output, "answer");
    }

    #[tokio::test]
    async fn test_unsuccessful_session_is_an_agent_error() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let driver = SessionDriver::new(
            Arc::new(ScriptedSession::new(vec![SessionEvent::Finished {
                success: false,
                result: None,
                detail: "exited with code 1".into(),
            }])),
            None,
        );

        let err = driver
            .converse(Phase::Build, "instr".into(), &State::default(), &config)
            .await
            .unwrap_err();

        match err.downcast_ref::<AgentError>() {
            Some(AgentError::SessionFailed { phase, message }) => {
                assert_eq!(*phase, Phase::Build);
                assert!(message.contains("exited with code 1"));
            }
            other => panic!("Expected SessionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_without_finish_is_incomplete() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let driver = SessionDriver::new(
            Arc::new(ScriptedSession::new(vec![SessionEvent::Fragment("partial".into())])),
            None,
        );

        let err = driver
            .converse(Phase::Plan, "instr".into(), &State::default(), &config)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::Incomplete { phase: Phase::Plan })
        ));
    }

    #[test]
    fn test_fallback_reason_names_failure() {
        let result = PhaseResult::fallback(Phase::Review, Phase::Plan, &DecisionError::Missing);
        assert_eq!(result.next_phase, Phase::Plan);
        assert!(result.reason.contains("REVIEW decision could not be parsed"));
        assert!(result.reason.contains("no transition decision found"));
        assert!(result.state_updates.is_empty());
    }
}
