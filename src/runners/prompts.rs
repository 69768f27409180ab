//! Instruction composition for the three phase runners.
//!
//! Every instruction has the same skeleton: the target document, a summary of
//! the persisted state, the phase task, and the decision contract the agent
//! must close its response with.

use std::fmt::Write;

use crate::config::Config;
use crate::orchestrator::state::State;
use crate::phase::Phase;

/// Number of history records echoed back to the agent.
const RECENT_HISTORY: usize = 5;

/// Upper bound on diff text embedded in a review instruction.
const MAX_DIFF_CHARS: usize = 60_000;

pub fn plan_instruction(state: &State, config: &Config) -> String {
    let task = r#"## TASK: PLAN
Decide what to do next toward the target document.

- If no plan exists yet, or the last review asked for a new approach, write a
  plan: one task, the files it touches, ordered steps, and acceptance criteria.
- If the existing plan is still right, you may keep it by sending `"plan": null`.
- If everything in the target document is already done, choose END.

Do not edit any files in this phase."#;

    let contract = contract(
        &[Phase::Build, Phase::Review, Phase::End],
        r#"{
    "plan": {
      "task": "one-line task",
      "files": ["src/lib.rs"],
      "steps": ["first step", "second step"],
      "acceptanceCriteria": ["tests pass"]
    }
  }"#,
        "`plan` may be null only when a plan already exists or you choose END.",
    );

    compose(state, config, task, None, &contract)
}

pub fn build_instruction(state: &State, config: &Config) -> String {
    let task = r#"## TASK: BUILD
Implement the current plan in the working tree.

- Work through the plan steps in order and check existing code first.
- Run the project's tests or checks before you finish.
- Do not commit. The loop records checkpoints itself.
- Choose REVIEW when the steps are done, BUILD to keep going in a fresh
  session, or PLAN when the plan cannot work."#;

    let contract = contract(
        &[Phase::Review, Phase::Plan, Phase::Build],
        r#"{
    "completedSteps": ["first step"],
    "blockers": []
  }"#,
        "List only steps you actually finished.",
    );

    compose(state, config, task, None, &contract)
}

pub fn review_instruction(state: &State, config: &Config, diff: &str) -> String {
    let task = r#"## TASK: REVIEW
Review the latest build changes against the plan and the target
document.

- Choose END when the target document is fully satisfied.
- Choose BUILD when the plan is right but the work needs fixes.
- Choose PLAN when the approach itself is wrong.
- Choose REVIEW only if you need another look in a fresh session.

Do not edit any files in this phase."#;

    let contract = contract(
        &[Phase::Plan, Phase::Build, Phase::End, Phase::Review],
        r#"{
    "feedback": "summary of the review",
    "issues": ["concrete problem"],
    "approved": false
  }"#,
        "Set `approved` to true only when you choose END.",
    );

    compose(state, config, task, Some(diff), &contract)
}

fn compose(
    state: &State,
    config: &Config,
    task: &str,
    diff: Option<&str>,
    contract: &str,
) -> String {
    let target = std::fs::read_to_string(&config.target_document).unwrap_or_else(|e| {
        format!(
            "[ERROR: Could not read target document {}: {}]",
            config.target_document.display(),
            e
        )
    });

    let mut out = format!(
        "You are one phase of an autonomous plan, build and review loop.\n\n## TARGET DOCUMENT\n{}\n\n",
        target.trim_end()
    );
    out.push_str(&state_summary(state));
    if let Some(diff) = diff {
        out.push_str(&diff_section(diff));
    }
    out.push_str(task);
    out.push_str("\n\n");
    out.push_str(contract);
    out
}

fn state_summary(state: &State) -> String {
    let mut out = String::from("## LOOP STATE\n");
    let _ = writeln!(
        out,
        "Iteration {}, retry {} since the last plan.",
        state.iteration, state.retry_count
    );

    match &state.plan {
        Some(plan) => {
            let _ = writeln!(out, "\n### Current plan\nTask: {}", plan.task);
            if !plan.files.is_empty() {
                let files: Vec<String> = plan.files.iter().map(|f| f.display().to_string()).collect();
                let _ = writeln!(out, "Files: {}", files.join(", "));
            }
            for (i, step) in plan.steps.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, step);
            }
            for criterion in &plan.acceptance_criteria {
                let _ = writeln!(out, "- [ ] {}", criterion);
            }
        }
        None => out.push_str("\nNo plan yet.\n"),
    }

    if let Some(build) = &state.build {
        out.push_str("\n### Last build\n");
        for step in &build.completed_steps {
            let _ = writeln!(out, "- done: {}", step);
        }
        for blocker in &build.blockers {
            let _ = writeln!(out, "- blocked: {}", blocker);
        }
    }

    if let Some(review) = &state.review {
        let _ = writeln!(
            out,
            "\n### Last review ({})\n{}",
            if review.approved { "approved" } else { "not approved" },
            review.last_feedback
        );
        for issue in &review.issues {
            let _ = writeln!(out, "- issue: {}", issue);
        }
    }

    let skip = state.history.len().saturating_sub(RECENT_HISTORY);
    if !state.history.is_empty() {
        out.push_str("\n### Recent transitions\n");
        for record in &state.history[skip..] {
            let _ = writeln!(
                out,
                "- {} -> {}: {}",
                record.phase, record.transition, record.reason
            );
        }
    }

    out.push('\n');
    out
}

fn diff_section(diff: &str) -> String {
    if diff.trim().is_empty() {
        return "## CHANGES UNDER REVIEW\n(no changes)\n\n".to_string();
    }
    let body = match diff.char_indices().nth(MAX_DIFF_CHARS) {
        Some((cut, _)) => format!("{}\n[diff truncated]", &diff[..cut]),
        None => diff.to_string(),
    };
    format!("## CHANGES UNDER REVIEW\n```diff\n{}\n```\n\n", body.trim_end())
}

fn contract(allowed: &[Phase], payload_example: &str, note: &str) -> String {
    let allowed: Vec<&str> = allowed.iter().map(|p| p.as_str()).collect();
    format!(
        r#"## RESPONSE FORMAT
End your final response with exactly one JSON object:

```json
{{
  "nextPhase": "{}",
  "reason": "why this is the right next phase",
  "payload": {}
}}
```

`nextPhase` must be one of: {}. `reason` must not be empty.
{}
"#,
        allowed[0],
        payload_example,
        allowed.join(", "),
        note
    )
}
