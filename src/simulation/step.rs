//! One tick of world history.
//!
//! Every unit reads the same tick-start snapshot and returns buffered
//! output; nothing a unit does is visible to another unit in the same
//! tick. Outputs are applied in unit order once all units have run.

use std::collections::BTreeMap;
use rand::Rng;
use tracing::{debug, warn};

use crate::actions::run_actions;
use crate::config::SimulationConfig;
use crate::events::{Chronicle, EventKind, HistoryEvent};
use crate::graph::EntityGraph;
use crate::ids::IdGenerators;
use crate::pressure::{FeedbackOrdering, PressureRecord, PressureSystem, PressureUpdate};
use crate::systems::prominence::{run_prominence, rung_shifts, PROMINENCE_UNIT};
use crate::systems::run_systems;
use crate::templates::fire_templates;
use crate::time::{transition_output, EraScheduler};
use super::apply::apply_output;
use super::context::{SystemMemory, TickContext, UnitRun};

/// Everything that changes from tick to tick.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub tick: u64,
    pub graph: EntityGraph,
    pub pressures: PressureSystem,
    pub scheduler: EraScheduler,
    pub chronicle: Chronicle,
    pub pressure_updates: Vec<PressureUpdate>,
    pub memory: SystemMemory,
    pub ids: IdGenerators,
    /// Units whose output was discarded, over the whole run.
    pub unit_faults: usize,
}

/// Counts for one finished tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub units: usize,
    pub faults: usize,
    pub events: usize,
    pub rejected_relationships: usize,
}

/// Run one tick.
pub fn simulate_tick(state: &mut SimulationState, config: &SimulationConfig, rng: &mut impl Rng) -> TickSummary {
    let tick = state.tick;
    let snapshot = state.graph.clone();
    let pressure_values = state.pressures.values();
    let mut runs: Vec<UnitRun> = Vec::new();

    // 1. Era exit check, against the era that was current at tick start
    let outgoing = state.scheduler.current(&config.eras);
    let exit_ctx = TickContext { config, snapshot: &snapshot, pressures: &pressure_values, era: outgoing, tick };
    if state.scheduler.exit_due(&config.eras, &exit_ctx.eval()) {
        if let Some((from, to)) = state.scheduler.advance(&config.eras, tick) {
            let out = transition_output(&config.eras[from], &config.eras[to], to, &snapshot, &mut state.ids, tick);
            runs.push(UnitRun::ok(config.eras[to].id.clone(), out));
        }
    }

    let era = state.scheduler.current(&config.eras);
    let ctx = TickContext { config, snapshot: &snapshot, pressures: &pressure_values, era, tick };

    // 2. Systems
    runs.extend(run_systems(&ctx, &mut state.memory, &mut state.ids, rng));

    // 3. Prominence dynamics
    if let Some(out) = run_prominence(&ctx) {
        runs.push(UnitRun::ok(PROMINENCE_UNIT, out));
    }

    // 4. Templates
    runs.extend(fire_templates(&ctx, &mut state.ids, rng));

    // 5. Actions
    runs.extend(run_actions(&ctx, &mut state.ids, rng));

    // 6. Apply buffered output in unit order
    let mut summary = TickSummary { tick, units: runs.len(), ..TickSummary::default() };
    let mut modifications = Vec::new();
    let mut events = Vec::new();
    for run in runs {
        match run.result {
            Ok(mut out) => {
                let report = apply_output(&mut state.graph, config, &mut out, tick);
                summary.rejected_relationships += report.rejected.len();
                if report.skipped > 0 {
                    debug!(tick, unit = %run.unit, skipped = report.skipped, "mutations skipped");
                }
                modifications.append(&mut out.modifications);
                events.append(&mut out.events);
            }
            Err(fault) => {
                warn!(tick, unit = %run.unit, error = %fault, "unit failed; its output is discarded");
                summary.faults += 1;
            }
        }
    }

    // 7. Rung crossings, one per entity
    events.extend(rung_shifts(&snapshot, &state.graph, tick));

    // 8. Pressures
    let counts_from = match state.pressures.ordering() {
        FeedbackOrdering::BeforeDiscrete => &snapshot,
        FeedbackOrdering::AfterDiscrete => &state.graph,
    };
    let update = state.pressures.update(tick, modifications, counts_from);
    let threshold = config.settings.pressure_event_threshold;
    if threshold > 0.0 {
        events.extend(update.pressures.iter()
            .filter(|r| r.delta.abs() >= threshold)
            .map(|r| pressure_event(tick, r)));
    }

    // 9. Record
    summary.events = events.len();
    for event in events {
        state.chronicle.record(event);
    }
    state.pressure_updates.push(update);
    state.unit_faults += summary.faults;
    state.tick += 1;
    summary
}

fn pressure_event(tick: u64, record: &PressureRecord) -> HistoryEvent {
    let direction = if record.delta >= 0.0 { "rises" } else { "falls" };
    let description = format!(
        "{} {} from {:.1} to {:.1}",
        record.id.replace('_', " "),
        direction,
        record.previous_value,
        record.new_value,
    );
    HistoryEvent::new(tick, EventKind::PressureChanged {
        pressure_id: record.id.clone(),
        previous_value: record.previous_value,
        new_value: record.new_value,
    }, description)
}

/// Pressure values at the end of the run, keyed by id.
pub fn final_pressures(state: &SimulationState) -> BTreeMap<String, f64> {
    state.pressures.values()
}
