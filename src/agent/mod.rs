//! Hosted agent sessions.
//!
//! A session takes one instruction and yields a finite, ordered stream of
//! [`SessionEvent`]s that ends with [`SessionEvent::Finished`]. Runners consume
//! the stream to completion before returning; nothing else reads it.

pub mod claude;

pub use claude::ClaudeSession;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::PathBuf;

use crate::phase::Phase;

/// One discrete piece of a streamed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Incremental assistant text
    Fragment(String),
    /// The agent invoked a tool
    Progress { tool: String, description: String },
    /// Terminal signal. `result` is the agent's final response when it sent one.
    Finished {
        success: bool,
        result: Option<String>,
        detail: String,
    },
}

/// Input for one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Phase the session is run for, used in logs and errors
    pub phase: Phase,
    pub instruction: String,
    pub max_turns: u32,
    pub working_dir: PathBuf,
}

pub type EventStream = BoxStream<'static, Result<SessionEvent>>;

#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Start a session. Errors here and inside the stream are transport failures.
    async fn open(&self, request: SessionRequest) -> Result<EventStream>;
}
