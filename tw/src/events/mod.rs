//! Run events for live observability
//!
//! The orchestrator emits an event for every significant step of a run
//! (phase changes, waves, checkpoints, task results, recovery decisions).
//! Consumers such as the CLI progress output or the JSONL [`EventLogger`]
//! subscribe to the [`EventBus`].
//!
//! ```text
//!   Orchestrator ──emit──▶ EventBus (tokio broadcast) ──▶ CLI progress
//!                                                    └──▶ EventLogger (.jsonl)
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use logger::EventLogger;
pub use types::{EventLogEntry, RunEvent};
