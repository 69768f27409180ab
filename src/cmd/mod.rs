//! CLI command implementations.
//!
//! | Module   | Commands handled           |
//! |----------|----------------------------|
//! | `run`    | `Run`                      |
//! | `status` | `Status`, `Diff`, `Reset`  |

pub mod run;
pub mod status;

pub use run::run_loop;
pub use status::{cmd_diff, cmd_reset, cmd_status};
