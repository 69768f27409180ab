//! The loop itself: `ratchet run`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use ratchet::agent::ClaudeSession;
use ratchet::config::Config;
use ratchet::orchestrator::Orchestrator;
use ratchet::tracker::{GitTracker, Snapshot};
use ratchet::ui::LoopUI;

pub async fn run_loop(config: Config) -> Result<()> {
    let tracker = GitTracker::new(&config.project_dir).with_context(|| {
        format!(
            "{} is not a git repository. Run 'git init' first.",
            config.project_dir.display()
        )
    })?;
    let snapshot: Arc<dyn Snapshot> = Arc::new(tracker);
    let session = Arc::new(ClaudeSession::new(&config));
    let ui = Arc::new(LoopUI::new(config.verbose));

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);
    span.in_scope(|| {
        tracing::info!(
            project = %config.project_dir.display(),
            target = %config.target_document.display(),
            max_retries = config.max_retries,
            max_turns = config.max_turns,
            dry_run = config.dry_run,
            "starting loop"
        );
    });

    if !config.target_document.exists() {
        println!(
            "Warning: target document {} not found, agents will be told it is missing",
            config.target_document.display()
        );
    }

    let state_file = config.state_file.clone();
    let orchestrator = Orchestrator::standard(config, session, snapshot, Some(ui));
    let state = orchestrator.run().instrument(span).await?;

    println!(
        "Loop ended in iteration {} after {} recorded step(s). State: {}",
        state.iteration,
        state.history.len(),
        state_file.display()
    );
    if let Some(review) = &state.review {
        println!(
            "Last review: {} ({})",
            review.last_feedback,
            if review.approved { "approved" } else { "not approved" }
        );
    }
    Ok(())
}
