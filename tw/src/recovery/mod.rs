//! Recovery engine
//!
//! On task failure: check the retry ceiling, classify the error text, check
//! for a repeating (task, category) loop, then insert a fix task ahead of the
//! failed task and re-arm it. Every path ends in a retry or a stop.

mod classifier;
mod engine;
mod strategies;

pub use classifier::{classify, classify_with_hints};
pub use engine::{DEFAULT_MAX_RETRIES, RecoveryAction, RecoveryEngine, RecoveryOutcome};
pub use strategies::alternatives;
