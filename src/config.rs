use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::phase::Phase;
use crate::project_config::{RATCHET_DIR, RatchetToml};

/// Values supplied on the command line. `None` means "use the file or default".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_retries: Option<u32>,
    pub max_turns: Option<u32>,
    pub target_document: Option<PathBuf>,
    pub dry_run: bool,
    pub start_phase: Option<Phase>,
    pub verbose: bool,
}

/// Runtime configuration for one loop run.
///
/// Built once at startup from `ratchet.toml`, the environment and CLI flags,
/// then passed by reference to every component. Nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// REVIEW → BUILD round trips before a forced replan
    pub max_retries: u32,
    /// Agent-internal tool turns per session
    pub max_turns: u32,
    /// Absolute path of the document describing the work
    pub target_document: PathBuf,
    /// Suppress checkpoint commits
    pub dry_run: bool,
    /// Phase to force before the first step
    pub start_phase: Option<Phase>,
    pub project_dir: PathBuf,
    pub ratchet_dir: PathBuf,
    pub state_file: PathBuf,
    pub log_dir: PathBuf,
    pub agent_cmd: String,
    pub skip_permissions: bool,
    pub verbose: bool,
    /// Problems found in `ratchet.toml`, reported once logging is up
    pub warnings: Vec<String>,
}

impl Config {
    pub fn new(project_dir: PathBuf, overrides: ConfigOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let ratchet_dir = project_dir.join(RATCHET_DIR);
        let toml = RatchetToml::load_or_default(&ratchet_dir)?;
        let warnings = toml.validate();

        let max_turns = overrides
            .max_turns
            .unwrap_or(toml.loop_settings.max_turns);
        if max_turns == 0 {
            anyhow::bail!("max turns must be greater than 0");
        }

        let target_document = overrides
            .target_document
            .unwrap_or_else(|| toml.loop_settings.target_document.clone());
        let target_document = if target_document.is_absolute() {
            target_document
        } else {
            project_dir.join(target_document)
        };

        Ok(Self {
            max_retries: overrides
                .max_retries
                .unwrap_or(toml.loop_settings.max_retries),
            max_turns,
            target_document,
            dry_run: overrides.dry_run,
            start_phase: overrides.start_phase,
            state_file: ratchet_dir.join("state.json"),
            log_dir: ratchet_dir.join("logs"),
            agent_cmd: toml.agent_cmd(),
            skip_permissions: toml.skip_permissions(),
            verbose: overrides.verbose,
            warnings,
            project_dir,
            ratchet_dir,
        })
    }

    /// Log the `ratchet.toml` warnings. Call after the subscriber is installed.
    pub fn report_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!("ratchet.toml: {}", warning);
        }
    }

    /// Create `.ratchet/` and `.ratchet/logs/`, and keep both out of git.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        let gitignore = self.ratchet_dir.join(".gitignore");
        if !gitignore.exists() {
            std::fs::write(&gitignore, "*\n").context("Failed to write .ratchet/.gitignore")?;
        }
        Ok(())
    }

    /// Arguments for the agent CLI in streaming mode. The per-session turn
    /// bound is appended by the session itself.
    pub fn agent_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags.push("--print".to_string());
        flags.push("--output-format".to_string());
        flags.push("stream-json".to_string());
        flags.push("--verbose".to_string());
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_turns, 50);
        assert!(!config.dry_run);
        assert!(config.start_phase.is_none());
        assert_eq!(config.target_document, root.join("PLAN.md"));
        assert_eq!(config.state_file, root.join(".ratchet/state.json"));
        assert_eq!(config.log_dir, root.join(".ratchet/logs"));
    }

    #[test]
    fn test_cli_overrides_beat_file() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".ratchet")).unwrap();
        fs::write(
            dir.path().join(".ratchet/ratchet.toml"),
            "[loop]\nmax_retries = 9\nmax_turns = 4\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            max_retries: Some(1),
            dry_run: true,
            start_phase: Some(Phase::Review),
            ..Default::default()
        };
        let config = Config::new(dir.path().to_path_buf(), overrides).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_turns, 4);
        assert!(config.dry_run);
        assert_eq!(config.start_phase, Some(Phase::Review));
    }

    #[test]
    fn test_toml_warnings_are_kept_for_later() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".ratchet")).unwrap();
        fs::write(
            dir.path().join(".ratchet/ratchet.toml"),
            "[loop]\ntarget_document = \"\"\n",
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.warnings, vec!["loop.target_document is empty".to_string()]);
    }

    #[test]
    fn test_clean_toml_has_no_warnings() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let dir = tempdir().unwrap();
        let overrides = ConfigOverrides {
            max_turns: Some(0),
            ..Default::default()
        };
        let err = Config::new(dir.path().to_path_buf(), overrides).unwrap_err();
        assert!(err.to_string().contains("max turns"));
    }

    #[test]
    fn test_absolute_target_document_kept() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("elsewhere.md");
        let overrides = ConfigOverrides {
            target_document: Some(doc.clone()),
            ..Default::default()
        };
        let config = Config::new(dir.path().to_path_buf(), overrides).unwrap();
        assert_eq!(config.target_document, doc);
    }

    #[test]
    fn test_ensure_directories_writes_gitignore() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.log_dir.exists());
        let ignore = fs::read_to_string(config.ratchet_dir.join(".gitignore")).unwrap();
        assert_eq!(ignore.trim(), "*");
    }

    #[test]
    fn test_agent_flags_request_stream_json() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), ConfigOverrides::default()).unwrap();
        let flags = config.agent_flags();
        let pos = flags.iter().position(|f| f == "--output-format").unwrap();
        assert_eq!(flags[pos + 1], "stream-json");
        assert!(flags.contains(&"--print".to_string()));
    }
}
