//! Read-only view of one tick, shared by every unit that runs in it.

use std::collections::BTreeMap;

use crate::config::SimulationConfig;
use crate::error::UnitFault;
use crate::graph::EntityGraph;
use crate::ids::EntityId;
use crate::mutation::UnitOutput;
use crate::predicate::EvalContext;
use crate::time::EraDef;

/// The tick-start state: configuration, graph snapshot, pressure values and era.
#[derive(Clone, Copy, Debug)]
pub struct TickContext<'a> {
    pub config: &'a SimulationConfig,
    pub snapshot: &'a EntityGraph,
    pub pressures: &'a BTreeMap<String, f64>,
    pub era: &'a EraDef,
    pub tick: u64,
}

impl<'a> TickContext<'a> {
    pub fn eval(&self) -> EvalContext<'a> {
        EvalContext {
            graph: self.snapshot,
            pressures: self.pressures,
            era: &self.era.id,
            tick: self.tick,
        }
    }
}

/// The result of running one template, system, action or era entry.
#[derive(Clone, Debug)]
pub struct UnitRun {
    pub unit: String,
    pub result: Result<UnitOutput, UnitFault>,
}

impl UnitRun {
    pub fn ok(unit: impl Into<String>, output: UnitOutput) -> Self {
        Self { unit: unit.into(), result: Ok(output) }
    }
}

/// State systems carry between ticks, keyed by (system id, entity).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemMemory {
    /// Consecutive evaluations an entity has spent without a same-tagged neighbor.
    pub isolation_streaks: BTreeMap<(String, EntityId), u32>,
    /// Recovery transitions already taken by an entity.
    pub recoveries: BTreeMap<(String, EntityId), u32>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recoveries(&self, system: &str, entity: EntityId) -> u32 {
        self.recoveries.get(&(system.to_string(), entity)).copied().unwrap_or(0)
    }
}
