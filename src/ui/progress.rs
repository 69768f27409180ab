use crate::phase::Phase;
use crate::ui::icons::{ARROW, CHECK, COMMIT, CROSS, REPLAN, SPARKLE, WARN};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Terminal narration for the loop, rendered via an `indicatif` spinner.
///
/// The spinner shows the running phase and the latest agent activity. Durable
/// lines (transitions, checkpoints, forced replans) are printed above it.
pub struct LoopUI {
    spinner: ProgressBar,
    verbose: bool,
    current: Mutex<String>,
}

impl LoopUI {
    pub fn new(verbose: bool) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style);
        spinner.set_prefix("ratchet");

        Self {
            spinner,
            verbose,
            current: Mutex::new(String::new()),
        }
    }

    /// Print a line above the spinner, falling back to `eprintln!` if that fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.spinner.is_hidden() {
            eprintln!("{}", msg);
        } else {
            self.spinner.println(msg);
        }
    }

    fn set_activity(&self, activity: String) {
        let header = self
            .current
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default();
        self.spinner.set_message(format!("{} {}", header, activity));
    }

    /// Announce the runner about to execute and start the spinner.
    pub fn start_step(&self, phase: Phase, iteration: u32, retry_count: u32, max_retries: u32) {
        let header = format!(
            "{} iteration {} (retries {}/{})",
            style(phase).yellow().bold(),
            style(iteration).cyan(),
            retry_count,
            max_retries
        );
        self.print_line(format!("{} {}", style("▶").green().bold(), header));
        if let Ok(mut current) = self.current.lock() {
            *current = header;
        }
        self.set_activity(style("(starting...)").dim().to_string());
        self.spinner.enable_steady_tick(Duration::from_millis(100));
    }

    /// Show a tool use event (Read, Write, Edit, Bash, etc.)
    pub fn show_tool_use(&self, emoji: &str, description: &str) {
        self.set_activity(format!("{} {}", emoji, style(description).yellow()));
        self.print_line(format!("    {} {}", emoji, style(description).yellow()));
    }

    /// Show a brief snippet of agent text; printed only in verbose mode
    pub fn show_thinking(&self, snippet: &str) {
        self.set_activity(style(format!("💭 {}", snippet)).dim().to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("💭").dim(), style(snippet).dim()));
        }
    }

    /// A runner could not read the agent's decision and fell back to its default.
    pub fn show_fallback(&self, phase: Phase, error: &str) {
        self.print_line(format!(
            "    {} {} decision unreadable: {}",
            WARN,
            phase,
            style(error).yellow()
        ));
    }

    pub fn show_forced_replan(&self, retry_count: u32, max_retries: u32) {
        self.print_line(format!(
            "    {} {}",
            REPLAN,
            style(format!(
                "Retry budget exhausted ({}/{}), forcing a replan",
                retry_count, max_retries
            ))
            .red()
            .bold()
        ));
    }

    pub fn show_checkpoint(&self, commit: &str) {
        let short = commit.get(..8).unwrap_or(commit);
        self.print_line(format!("    {} checkpoint {}", COMMIT, style(short).cyan()));
    }

    pub fn show_checkpoint_skipped(&self) {
        self.print_line(format!(
            "    {} {}",
            COMMIT,
            style("dry run: changes left uncommitted").dim()
        ));
    }

    /// Print the transition chosen for the finished step.
    pub fn show_transition(
        &self,
        from: Phase,
        to: Phase,
        reason: &str,
        retry_count: u32,
        max_retries: u32,
    ) {
        self.spinner.set_message(String::new());
        self.print_line(format!(
            "  {} {} {} {} {}",
            CHECK,
            style(from).yellow(),
            ARROW,
            style(to).green().bold(),
            style(format!("(retries {}/{})", retry_count, max_retries)).dim()
        ));
        self.print_line(format!("     {} {}", style("reason:").dim(), reason));
    }

    pub fn step_failed(&self, phase: Phase, msg: &str) {
        self.spinner
            .finish_with_message(format!("{} {} failed: {}", CROSS, phase, msg));
    }

    /// Stop the spinner after the loop reached END.
    pub fn finished(&self, iteration: u32, steps: usize) {
        self.spinner.finish_and_clear();
        self.print_line(format!(
            "\n{} Loop finished after {} step(s) in iteration {}\n",
            SPARKLE,
            style(steps).green().bold(),
            style(iteration).cyan()
        ));
    }
}
