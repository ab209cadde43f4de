//! Structured event log.

pub mod chronicle;
pub mod types;

pub use chronicle::Chronicle;
pub use types::{EventKind, HistoryEvent};
