//! Simulation engine.
//!
//! Builds the starting world from a seed graph, runs the tick loop with
//! snapshot semantics, and measures and batches finished runs.

pub mod apply;
pub mod context;
pub mod engine;
pub mod harness;
pub mod metrics;
pub mod setup;
pub mod step;

pub use engine::Simulation;
pub use harness::{run_batch, verify_determinism, BatchResults};
pub use metrics::SimulationMetrics;
pub use setup::SeedGraph;
pub use step::{SimulationState, TickSummary};
