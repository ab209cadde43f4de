//! Simulation engine.
//!
//! Owns the configuration, the world state and the single seeded PRNG,
//! and drives the tick loop.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::events::Chronicle;
use crate::graph::EntityGraph;
use crate::persistence::SimulationOutput;
use crate::pressure::{PressureSystem, PressureUpdate};
use crate::time::{EraDef, EraScheduler, Timeline};
use super::context::SystemMemory;
use super::setup::{initialize, SeedGraph};
use super::step::{simulate_tick, SimulationState, TickSummary};

/// A deterministic world-history run.
pub struct Simulation {
    config: SimulationConfig,
    state: SimulationState,
    rng: ChaCha8Rng,
    seed: u64,
}

impl Simulation {
    /// Check the configuration against the seed graph and prepare tick 0.
    pub fn new(config: SimulationConfig, seed_graph: SeedGraph, seed: u64) -> Result<Self, SimulationError> {
        let (graph, ids) = initialize(&config, seed_graph)?;
        let scheduler = EraScheduler::start(&config.eras).ok_or(SimulationError::NoEras)?;
        let pressures = PressureSystem::new(&config.pressures, config.settings.feedback_ordering);
        let state = SimulationState {
            tick: 0,
            graph,
            pressures,
            scheduler,
            chronicle: Chronicle::new(),
            pressure_updates: Vec::new(),
            memory: SystemMemory::new(),
            ids,
            unit_faults: 0,
        };
        Ok(Self {
            config,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        })
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickSummary {
        let summary = simulate_tick(&mut self.state, &self.config, &mut self.rng);
        let interval = self.config.settings.progress_interval;
        if interval > 0 && self.state.tick % interval == 0 {
            info!(
                tick = self.state.tick,
                era = %self.current_era().id,
                entities = self.state.graph.entity_count(),
                events = self.state.chronicle.len(),
                faults = self.state.unit_faults,
                "simulation progress"
            );
        }
        summary
    }

    /// Run the configured number of ticks (`settings.ticks`) from wherever the run is.
    pub fn run(&mut self) -> &Chronicle {
        let remaining = self.config.settings.ticks.saturating_sub(self.state.tick);
        self.run_ticks(remaining);
        info!(
            ticks = self.state.tick,
            events = self.state.chronicle.len(),
            entities = self.state.graph.entity_count(),
            relationships = self.state.graph.relationship_count(),
            "simulation complete"
        );
        &self.state.chronicle
    }

    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Tick until `stop` holds after a tick or `settings.ticks` is reached.
    /// Returns the number of ticks run.
    pub fn run_until(&mut self, mut stop: impl FnMut(&Simulation) -> bool) -> u64 {
        let start = self.state.tick;
        while self.state.tick < self.config.settings.ticks {
            self.tick();
            if stop(self) {
                break;
            }
        }
        self.state.tick - start
    }

    // === Accessors ===

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The next tick to run; equals the number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.state.tick
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.state.graph
    }

    pub fn pressures(&self) -> &PressureSystem {
        &self.state.pressures
    }

    pub fn pressure_updates(&self) -> &[PressureUpdate] {
        &self.state.pressure_updates
    }

    pub fn chronicle(&self) -> &Chronicle {
        &self.state.chronicle
    }

    pub fn current_era(&self) -> &EraDef {
        self.state.scheduler.current(&self.config.eras)
    }

    pub fn timeline(&self) -> &Timeline {
        self.state.scheduler.timeline()
    }

    pub fn unit_faults(&self) -> usize {
        self.state.unit_faults
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Snapshot of the run in the output format.
    pub fn output(&self) -> SimulationOutput {
        SimulationOutput::from_state(&self.state, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{colony_config, colony_seed};

    #[test]
    fn test_ticks_advance_and_trace_grows() {
        let mut sim = Simulation::new(colony_config(), colony_seed(), 7).unwrap();
        sim.run_ticks(5);
        assert_eq!(sim.current_tick(), 5);
        assert_eq!(sim.pressure_updates().len(), 5);
        assert_eq!(sim.pressure_updates()[4].tick, 4);
    }

    #[test]
    fn test_run_until_stops_early() {
        let mut sim = Simulation::new(colony_config(), colony_seed(), 7).unwrap();
        let ran = sim.run_until(|s| s.current_tick() >= 3);
        assert_eq!(ran, 3);
    }

    #[test]
    fn test_run_respects_configured_ticks() {
        let mut config = colony_config();
        config.settings.ticks = 12;
        let mut sim = Simulation::new(config, colony_seed(), 1).unwrap();
        sim.run();
        assert_eq!(sim.current_tick(), 12);
        assert_eq!(sim.timeline().spans.first().map(|s| s.start_tick), Some(0));
    }
}
