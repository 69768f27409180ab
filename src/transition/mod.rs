//! Transition decisions carried in agent responses.
//!
//! The agent's final response is untrusted text. It must contain a JSON object
//! of the shape
//!
//! ```json
//! {"nextPhase": "REVIEW", "reason": "all steps done", "payload": { ... }}
//! ```
//!
//! [`decode`] locates the last such object, rejects unknown top-level fields,
//! checks the phase against the caller's allowed set, requires a non-empty
//! reason, and decodes `payload` into the caller's type. Every failure is a
//! [`DecisionError`]; callers fall back to a conservative default instead of
//! aborting the run.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::phase::Phase;
use crate::util::json_object_candidates;

/// Why a response did not yield a usable decision.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("no transition decision found in agent response")]
    Missing,

    #[error("transition decision is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("transition to {phase} is not allowed here (allowed: {allowed})")]
    Disallowed { phase: Phase, allowed: String },

    #[error("transition decision has an empty reason")]
    EmptyReason,

    #[error("transition payload is invalid: {0}")]
    InvalidPayload(String),
}

/// A validated decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<P> {
    pub next_phase: Phase,
    pub reason: String,
    pub payload: P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawDecision {
    next_phase: String,
    reason: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// Key that marks a JSON object as a decision candidate.
const DECISION_KEY: &str = "nextPhase";

/// Decode the decision in `text`, allowing only the phases in `allowed`.
pub fn decode<P: DeserializeOwned>(
    text: &str,
    allowed: &[Phase],
) -> Result<Decision<P>, DecisionError> {
    let value = find_decision_object(text).ok_or(DecisionError::Missing)?;
    let raw: RawDecision = serde_json::from_value(value).map_err(DecisionError::Malformed)?;

    let next_phase: Phase = raw
        .next_phase
        .parse()
        .map_err(|_| DecisionError::UnknownPhase(raw.next_phase.clone()))?;

    if !allowed.contains(&next_phase) {
        return Err(DecisionError::Disallowed {
            phase: next_phase,
            allowed: allowed
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let reason = raw.reason.trim().to_string();
    if reason.is_empty() {
        return Err(DecisionError::EmptyReason);
    }

    let payload = match raw.payload {
        Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    };
    let payload =
        serde_json::from_value(payload).map_err(|e| DecisionError::InvalidPayload(e.to_string()))?;

    Ok(Decision {
        next_phase,
        reason,
        payload,
    })
}

/// The last JSON object in `text` that carries [`DECISION_KEY`].
fn find_decision_object(text: &str) -> Option<Value> {
    json_object_candidates(text)
        .into_iter()
        .rev()
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find(|value| value.get(DECISION_KEY).is_some())
}
