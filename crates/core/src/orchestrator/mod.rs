//! Run orchestrator: one sequential pass over candidate items.
//!
//! Each item is resolved to its next stage, the matching collaborator is
//! called for exactly that stage, and the outcome is accounted and persisted
//! before the next item is touched. A crash therefore leaves at most one item
//! in an attempted-but-unknown state, which the next run resolves again.

mod config;
mod runner;
mod types;

pub use config::RunConfig;
pub use runner::RunOrchestrator;
pub use types::{PlannedAction, RunError, RunReport};
