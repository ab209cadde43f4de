//! World-history simulation library
//!
//! Grows a seed knowledge graph tick by tick: templates create pre-connected
//! entity clusters, systems and actions mutate what exists, pressures feed
//! back into eligibility, and eras reshape the weights as history unfolds.

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod ids;
pub mod mutation;
pub mod persistence;
pub mod predicate;
pub mod pressure;
pub mod sampling;
pub mod simulation;
pub mod systems;
pub mod templates;
pub mod testing;
pub mod time;

pub use config::{EngineSettings, LoadReport, SimulationConfig};
pub use error::{ConfigError, PersistenceError, SimulationError, UnitFault};
pub use events::{Chronicle, EventKind, HistoryEvent};
pub use graph::{Entity, EntityGraph, ProminenceRung, Relationship, RelationshipStatus};
pub use ids::{EntityId, RelationshipId};
pub use persistence::SimulationOutput;
pub use pressure::{PressureSystem, PressureUpdate};
pub use simulation::{SeedGraph, Simulation, SimulationMetrics};
