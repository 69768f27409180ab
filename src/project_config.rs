//! Project configuration file for ratchet.
//!
//! Reads `.ratchet/ratchet.toml`. Every setting is optional; missing values
//! fall back to environment variables and then to built-in defaults. CLI flags
//! are applied on top by [`crate::config::Config`].
//!
//! # Configuration File Format
//!
//! ```toml
//! [agent]
//! cmd = "claude"
//! skip_permissions = true
//!
//! [loop]
//! max_retries = 3
//! max_turns = 50
//! target_document = "PLAN.md"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the directory holding state, logs and configuration.
pub const RATCHET_DIR: &str = ".ratchet";

/// Name of the configuration file inside [`RATCHET_DIR`].
pub const CONFIG_FILE: &str = "ratchet.toml";

/// Hosted agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent CLI command (default: "claude")
    #[serde(default)]
    pub cmd: Option<String>,
    /// Whether to pass the permission-skipping flag to the agent
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            cmd: None,
            skip_permissions: default_skip_permissions(),
        }
    }
}

/// Loop policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSection {
    /// REVIEW → BUILD round trips allowed before a forced replan
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Agent-internal tool turns allowed per session
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Document describing the work, relative to the project directory
    #[serde(default = "default_target_document")]
    pub target_document: PathBuf,
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_turns() -> u32 {
    50
}

fn default_target_document() -> PathBuf {
    PathBuf::from("PLAN.md")
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_turns: default_max_turns(),
            target_document: default_target_document(),
        }
    }
}

/// Parsed `ratchet.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatchetToml {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default, rename = "loop")]
    pub loop_settings: LoopSection,
}

impl RatchetToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ratchet.toml")
    }

    /// Load `<ratchet_dir>/ratchet.toml`, or defaults when the file is absent.
    pub fn load_or_default(ratchet_dir: &Path) -> Result<Self> {
        let config_path = ratchet_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Agent command: `RATCHET_AGENT_CMD`, then the file, then "claude".
    pub fn agent_cmd(&self) -> String {
        std::env::var("RATCHET_AGENT_CMD")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty())
            .or_else(|| self.agent.cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// `RATCHET_SKIP_PERMISSIONS` overrides the file setting.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var("RATCHET_SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.agent.skip_permissions
    }

    /// Return human-readable warnings for questionable settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.loop_settings.max_turns == 0 {
            warnings.push("loop.max_turns must be greater than 0".to_string());
        }
        if self.loop_settings.target_document.as_os_str().is_empty() {
            warnings.push("loop.target_document is empty".to_string());
        }
        warnings
    }
}
