//! Loop phases.
//!
//! The loop cycles `PLAN → BUILD → REVIEW` until a runner hands control to
//! `END`. Phases are persisted and exchanged with the agent by their upper-case
//! names (`"PLAN"`, `"BUILD"`, ...).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Decide what to do next and produce a plan
    #[default]
    Plan,
    /// Implement the current plan
    Build,
    /// Judge the build against the plan
    Review,
    /// Terminal; the loop stops here
    End,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Plan, Phase::Build, Phase::Review, Phase::End];

    pub fn is_terminal(self) -> bool {
        self == Phase::End
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Plan => "PLAN",
            Phase::Build => "BUILD",
            Phase::Review => "REVIEW",
            Phase::End => "END",
        }
    }

    /// Lower-case slug used in transcript file names.
    pub fn slug(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Review => "review",
            Phase::End => "end",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let valid: Vec<&str> = Phase::ALL.iter().map(|p| p.as_str()).collect();
                anyhow::anyhow!("Invalid phase '{}'. Valid values: {}", s, valid.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Plan.to_string(), "PLAN");
        assert_eq!(Phase::Review.to_string(), "REVIEW");
    }

    #[test]
    fn test_phase_from_str_case_insensitive() {
        assert_eq!("build".parse::<Phase>().unwrap(), Phase::Build);
        assert_eq!(" End ".parse::<Phase>().unwrap(), Phase::End);
        assert_eq!("Review".parse::<Phase>().unwrap(), Phase::Review);
    }

    #[test]
    fn test_phase_from_str_invalid() {
        let err = "deploy".parse::<Phase>().unwrap_err();
        assert!(err.to_string().contains("Invalid phase 'deploy'"));
        assert!(err.to_string().contains("Valid values: PLAN, BUILD, REVIEW, END"));
    }

    #[test]
    fn test_phase_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Phase::Build).unwrap(), "\"BUILD\"");
        let phase: Phase = serde_json::from_str("\"END\"").unwrap();
        assert_eq!(phase, Phase::End);
    }

    #[test]
    fn test_only_end_is_terminal() {
        for phase in Phase::ALL {
            assert_eq!(phase.is_terminal(), phase == Phase::End);
        }
    }

    #[test]
    fn test_default_is_plan() {
        assert_eq!(Phase::default(), Phase::Plan);
    }
}
