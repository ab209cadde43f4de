//! Batch harness: many independent runs, in parallel.
//!
//! Runs N simulations with consecutive seeds, collects metrics per run,
//! and checks that a seed reproduces its history exactly.

use rayon::prelude::*;

use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::graph::ProminenceRung;
use super::engine::Simulation;
use super::metrics::SimulationMetrics;
use super::setup::SeedGraph;

/// Metrics from a batch of runs, in seed order.
#[derive(Clone, Debug)]
pub struct BatchResults {
    pub base_seed: u64,
    pub runs: Vec<(u64, SimulationMetrics)>,
}

impl BatchResults {
    fn mean(&self, f: impl Fn(&SimulationMetrics) -> f64) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(|(_, m)| f(m)).sum::<f64>() / self.runs.len() as f64
    }

    pub fn mean_events(&self) -> f64 {
        self.mean(|m| m.total_events() as f64)
    }

    pub fn mean_entities(&self) -> f64 {
        self.mean(|m| m.entity_count as f64)
    }

    pub fn mean_entropy(&self) -> f64 {
        self.mean(|m| m.event_type_entropy)
    }

    pub fn mean_rung_share(&self, rung: ProminenceRung) -> f64 {
        self.mean(|m| m.rung_share(rung))
    }

    pub fn report(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("=== Batch: {} runs from seed {} ===\n", self.runs.len(), self.base_seed));
        s.push_str(&format!("  Mean events:            {:.1}\n", self.mean_events()));
        s.push_str(&format!("  Mean entities:          {:.1}\n", self.mean_entities()));
        s.push_str(&format!("  Mean entropy:           {:.2} bits\n", self.mean_entropy()));
        s.push_str(&format!("  Mean mythic share:      {:.1}%\n", self.mean_rung_share(ProminenceRung::Mythic) * 100.0));
        s.push_str(&format!("  Mean forgotten share:   {:.1}%\n", self.mean_rung_share(ProminenceRung::Forgotten) * 100.0));
        let faults: usize = self.runs.iter().map(|(_, m)| m.unit_faults).sum();
        s.push_str(&format!("  Unit faults (total):    {}\n", faults));
        s
    }
}

/// Run `runs` full simulations with seeds `base_seed..base_seed + runs`.
pub fn run_batch(config: &SimulationConfig, seed_graph: &SeedGraph, base_seed: u64, runs: u64) -> Result<BatchResults, SimulationError> {
    let results = (0..runs)
        .into_par_iter()
        .map(|i| {
            let seed = base_seed.wrapping_add(i);
            let mut sim = Simulation::new(config.clone(), seed_graph.clone(), seed)?;
            sim.run();
            Ok((seed, SimulationMetrics::compute(&sim)))
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;
    Ok(BatchResults { base_seed, runs: results })
}

/// Serialized history and pressure trace of a finished run.
fn fingerprint(sim: &Simulation) -> Option<(String, String)> {
    let history = serde_json::to_string(sim.chronicle().events()).ok()?;
    let trace = serde_json::to_string(sim.pressure_updates()).ok()?;
    Some((history, trace))
}

/// Run the same seed twice and compare histories and pressure traces byte for byte.
pub fn verify_determinism(config: &SimulationConfig, seed_graph: &SeedGraph, seed: u64) -> Result<bool, SimulationError> {
    let (first, second) = rayon::join(
        || -> Result<_, SimulationError> {
            let mut sim = Simulation::new(config.clone(), seed_graph.clone(), seed)?;
            sim.run();
            Ok(fingerprint(&sim))
        },
        || -> Result<_, SimulationError> {
            let mut sim = Simulation::new(config.clone(), seed_graph.clone(), seed)?;
            sim.run();
            Ok(fingerprint(&sim))
        },
    );
    match (first?, second?) {
        (Some(a), Some(b)) => Ok(a == b),
        _ => Ok(false),
    }
}
