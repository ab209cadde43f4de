//! Output serialization.
//!
//! The document shape is a fixed contract:
//! `{version, seed, ticks, worldData: {hardState, relationships},
//! simulationState: {pressureUpdates, eras, finalPressures}, history}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{PersistenceError, SimulationError};
use crate::events::{Chronicle, HistoryEvent};
use crate::graph::{Entity, EntityGraph, Relationship};
use crate::pressure::PressureUpdate;
use crate::simulation::setup::SeedGraph;
use crate::simulation::step::SimulationState;
use crate::time::EraSpan;

/// Current output format version. Newer files are rejected on load.
pub const OUTPUT_VERSION: u32 = 1;

/// The final graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldData {
    /// Entities keyed by their display id (`e12`).
    pub hard_state: BTreeMap<String, Entity>,
    pub relationships: Vec<Relationship>,
}

/// Replay trace and era timeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub pressure_updates: Vec<PressureUpdate>,
    pub eras: Vec<EraSpan>,
    pub final_pressures: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutput {
    pub version: u32,
    pub seed: u64,
    pub ticks: u64,
    pub world_data: WorldData,
    pub simulation_state: StateData,
    pub history: Vec<HistoryEvent>,
}

impl SimulationOutput {
    pub fn from_state(state: &SimulationState, seed: u64) -> Self {
        let hard_state = state.graph.entities()
            .map(|e| (e.id.to_string(), e.clone()))
            .collect();
        Self {
            version: OUTPUT_VERSION,
            seed,
            ticks: state.tick,
            world_data: WorldData {
                hard_state,
                relationships: state.graph.relationships().cloned().collect(),
            },
            simulation_state: StateData {
                pressure_updates: state.pressure_updates.clone(),
                eras: state.scheduler.timeline().spans.clone(),
                final_pressures: state.pressures.values(),
            },
            history: state.chronicle.events().to_vec(),
        }
    }

    /// Rebuild the final graph.
    pub fn graph(&self) -> Result<EntityGraph, SimulationError> {
        SeedGraph {
            entities: self.world_data.hard_state.values().cloned().collect(),
            relationships: self.world_data.relationships.clone(),
        }
        .into_graph()
    }

    /// The history with its indexes rebuilt.
    pub fn chronicle(&self) -> Chronicle {
        Chronicle::from_events(self.history.clone())
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let output: SimulationOutput = serde_json::from_str(json)?;
        if output.version > OUTPUT_VERSION {
            return Err(PersistenceError::UnsupportedVersion { found: output.version, supported: OUTPUT_VERSION });
        }
        Ok(output)
    }
}

/// Write the output document to `path`.
pub fn save_output(output: &SimulationOutput, path: &Path) -> Result<(), PersistenceError> {
    fs::write(path, output.to_json()?)?;
    Ok(())
}

/// Read an output document, rejecting versions newer than this build writes.
pub fn load_output(path: &Path) -> Result<SimulationOutput, PersistenceError> {
    let text = fs::read_to_string(path)?;
    SimulationOutput::from_json(&text)
}

/// Write the history as one line per event to a plain text file.
pub fn export_chronicle_text(output: &SimulationOutput, path: &Path) -> Result<(), PersistenceError> {
    let mut text = String::new();
    text.push_str(&format!("World history (seed {}, {} ticks)\n\n", output.seed, output.ticks));
    for span in &output.simulation_state.eras {
        let end = span.end_tick.map_or_else(|| "present".to_string(), |t| t.to_string());
        text.push_str(&format!("Era {}: {} ({} - {})\n", span.order + 1, span.id, span.start_tick, end));
    }
    text.push('\n');
    for event in &output.history {
        text.push_str(&format!("[{:>5}] {:<20} {}\n", event.tick, event.type_name(), event.description));
    }
    fs::write(path, text)?;
    Ok(())
}
