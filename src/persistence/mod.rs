//! Simulation output - the serialized contract, save/load and export.
//!
//! Saves and loads a finished run as a versioned JSON document and
//! exports the history as readable text.

pub mod serialize;

pub use serialize::{
    export_chronicle_text, load_output, save_output, SimulationOutput, StateData, WorldData, OUTPUT_VERSION,
};
