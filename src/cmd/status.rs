//! Inspection and housekeeping: `ratchet status`, `ratchet diff`, `ratchet reset`.

use anyhow::Result;
use std::path::Path;

use ratchet::config::{Config, ConfigOverrides};
use ratchet::orchestrator::StateManager;
use ratchet::tracker::{CHECKPOINT_MARKER, GitTracker, Snapshot};

/// History records shown by `status`.
const STATUS_HISTORY: usize = 10;

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), ConfigOverrides::default())?;
    config.report_warnings();

    println!();
    println!("Ratchet Loop Status");
    println!("===================");
    println!();

    let target_status = if config.target_document.exists() {
        "Ready"
    } else {
        "Missing"
    };
    println!(
        "Target:     {} ({})",
        config.target_document.display(),
        target_status
    );

    let store = StateManager::new(config.state_file.clone());
    if !store.path().exists() {
        println!("State:      None");
        println!();
        println!("Run 'ratchet run' to start the loop.");
        println!();
        return Ok(());
    }

    let state = store.read_state()?;
    println!("Phase:      {}", state.phase);
    println!("Iteration:  {}", state.iteration);
    println!("Retries:    {}/{}", state.retry_count, config.max_retries);

    match &state.plan {
        Some(plan) => {
            println!();
            println!("Plan: {}", plan.task);
            for (i, step) in plan.steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        None => println!("Plan:       None"),
    }

    if let Some(build) = &state.build {
        println!();
        println!(
            "Last build: {} step(s) done, {} blocker(s)",
            build.completed_steps.len(),
            build.blockers.len()
        );
        for blocker in &build.blockers {
            println!("  blocked: {}", blocker);
        }
    }

    if let Some(review) = &state.review {
        println!();
        println!(
            "Last review ({}): {}",
            if review.approved { "approved" } else { "not approved" },
            review.last_feedback
        );
        for issue in &review.issues {
            println!("  - {}", issue);
        }
    }

    if !state.history.is_empty() {
        println!();
        println!("History ({} step(s)):", state.history.len());
        let skip = state.history.len().saturating_sub(STATUS_HISTORY);
        for record in &state.history[skip..] {
            println!(
                "  [iter {}] {} -> {}  {}  {}",
                record.iteration,
                record.phase,
                record.transition,
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.reason.lines().next().unwrap_or("")
            );
        }
    }

    if let Ok(tracker) = GitTracker::new(&config.project_dir) {
        println!();
        if let Some(head) = tracker.head_sha()? {
            println!("HEAD:            {}", &head[..head.len().min(8)]);
        }
        match tracker.find_last_checkpoint(CHECKPOINT_MARKER)? {
            Some(commit) => println!("Last checkpoint: {}", &commit[..commit.len().min(8)]),
            None => println!("Last checkpoint: None"),
        }
        if tracker.has_uncommitted_changes()? {
            println!("Working tree:    uncommitted changes");
        }
    }

    println!();
    Ok(())
}

pub fn cmd_diff(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), ConfigOverrides::default())?;
    config.report_warnings();
    let tracker = GitTracker::new(&config.project_dir)?;

    let diff = tracker.diff(None)?;
    if diff.is_empty() {
        println!("No changes since the last plan or review checkpoint");
    } else {
        print!("{}", diff);
    }
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = Config::new(project_dir.to_path_buf(), ConfigOverrides::default())?;
    config.report_warnings();

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will delete the loop state and logs. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let store = StateManager::new(config.state_file.clone());
    store.reset()?;

    if config.log_dir.exists() {
        std::fs::remove_dir_all(&config.log_dir).ok();
    }

    tracing::info!(state = %config.state_file.display(), "loop state reset");
    println!("Reset complete");
    Ok(())
}
