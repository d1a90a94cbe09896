//! Scheduler - execution order, ready sets and wave planning
//!
//! Pure graph computations; nothing here performs I/O or mutates the graph.
//! The orchestrator drives [`next_wave`] against the live graph, while
//! [`execution_waves`] gives the static plan used for previews.

mod error;
mod order;
mod waves;

pub use error::ScheduleError;
pub use order::{topological_order, validate_structure};
pub use waves::{execution_waves, next_wave, ready_tasks};
