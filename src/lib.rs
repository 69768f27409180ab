pub mod agent;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod phase;
pub mod project_config;
pub mod runners;
pub mod stream;
pub mod tracker;
pub mod transition;
pub mod ui;
pub mod util;
