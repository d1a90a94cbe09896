//! Orchestrator - composition root for a request
//!
//! Wires the planner, scheduler, executor, recovery engine and checkpoint
//! store together and owns the per-request phase machine.

mod core;
mod report;

pub use core::{Orchestrator, OrchestratorSettings};
pub use report::{RequestPhase, RunOutcome, RunReport, StopReason, WaveRecord};
