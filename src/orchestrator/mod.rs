pub mod controller;
pub mod policy;
pub mod state;

pub use controller::{Orchestrator, checkpoint_message};
pub use policy::{PolicyOutcome, RetryPolicy};
pub use state::{State, StateManager};
