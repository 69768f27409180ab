//! Retry budget and forced replans.

use crate::phase::Phase;

/// The transition the orchestrator actually takes after applying the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub next_phase: Phase,
    pub reason: String,
    pub retry_count: u32,
    /// The proposed REVIEW -> BUILD was rewritten to PLAN
    pub forced_replan: bool,
}

/// Counts REVIEW -> BUILD round trips since the last PLAN and forces a
/// replan once `max_retries` of them have happened.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn apply(&self, from: Phase, proposed: Phase, reason: String, retry_count: u32) -> PolicyOutcome {
        if from == Phase::Review && proposed == Phase::Build {
            let retries = retry_count + 1;
            if retries >= self.max_retries {
                return PolicyOutcome {
                    next_phase: Phase::Plan,
                    reason: format!(
                        "Forced replan: retry budget exhausted after {} review round trip(s) (max {}). Last review: {}",
                        retries, self.max_retries, reason
                    ),
                    retry_count: 0,
                    forced_replan: true,
                };
            }
            return PolicyOutcome {
                next_phase: proposed,
                reason,
                retry_count: retries,
                forced_replan: false,
            };
        }

        PolicyOutcome {
            next_phase: proposed,
            reason,
            retry_count: if proposed == Phase::Plan { 0 } else { retry_count },
            forced_replan: false,
        }
    }
}
