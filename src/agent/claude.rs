use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{AgentSession, EventStream, SessionEvent, SessionRequest};
use crate::config::Config;
use crate::errors::AgentError;
use crate::phase::Phase;
use crate::stream::decode_line;

/// Runs the agent CLI as a child process in `stream-json` mode.
///
/// The instruction is written to stdin, stdout is decoded line by line. When
/// the process exits without a `result` event, a [`SessionEvent::Finished`]
/// is synthesized from its exit status.
pub struct ClaudeSession {
    cmd: String,
    flags: Vec<String>,
}

impl ClaudeSession {
    pub fn new(config: &Config) -> Self {
        Self::with_command(config.agent_cmd.clone(), config.agent_flags())
    }

    pub fn with_command(cmd: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            flags,
        }
    }
}

struct SessionStream {
    phase: Phase,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    pending: VecDeque<SessionEvent>,
    saw_result: bool,
    done: bool,
}

impl SessionStream {
    async fn next_event(&mut self) -> Option<Result<SessionEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if matches!(event, SessionEvent::Finished { .. }) {
                    self.saw_result = true;
                }
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            match self.lines.next_line().await {
                Ok(Some(line)) => self.pending.extend(decode_line(&line)),
                Ok(None) => {
                    self.done = true;
                    let status = match self.child.wait().await {
                        Ok(status) => status,
                        Err(e) => return Some(Err(AgentError::Stream(e).into())),
                    };
                    let exit_code = status.code().unwrap_or(-1);
                    tracing::debug!(phase = %self.phase, exit_code, "agent process exited");
                    if !self.saw_result {
                        self.pending.push_back(SessionEvent::Finished {
                            success: status.success(),
                            result: None,
                            detail: format!("exited with code {}", exit_code),
                        });
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(AgentError::Stream(e).into()));
                }
            }
        }
    }
}

#[async_trait]
impl AgentSession for ClaudeSession {
    async fn open(&self, request: SessionRequest) -> Result<EventStream> {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(&self.flags)
            .arg("--max-turns")
            .arg(request.max_turns.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&request.working_dir)
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AgentError::SpawnFailed {
            cmd: self.cmd.clone(),
            source,
        })?;

        tracing::info!(
            phase = %request.phase,
            pid = child.id().unwrap_or(0),
            chars = request.instruction.len(),
            "agent session started"
        );

        // Write instruction to stdin and close it
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.instruction.as_bytes())
                .await
                .map_err(AgentError::Stream)?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        // Drain stderr so a chatty agent never blocks on a full pipe
        if let Some(stderr) = child.stderr.take() {
            let phase = request.phase;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(phase = %phase, "agent stderr: {}", line);
                }
            });
        }

        let stdout = child.stdout.take().context("Failed to get agent stdout")?;
        let state = SessionStream {
            phase: request.phase,
            child,
            lines: BufReader::new(stdout).lines(),
            pending: VecDeque::new(),
            saw_result: false,
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            state.next_event().await.map(|event| (event, state))
        });
        Ok(stream.boxed())
    }
}
