//! Pressures: named scalar world-state variables.
//!
//! Each tick a pressure moves by the discrete modifications attributed to it,
//! a homeostatic pull toward its target, and scaled feedback from entity and
//! relationship counts. Values are unbounded; consumers enforce thresholds.

pub mod feedback;
pub mod trace;

pub use feedback::{FeedbackMatcher, FeedbackTerm, RelationshipMatch};
pub use trace::{Breakdown, DiscreteModification, ModificationSource, PressureRecord, PressureUpdate};

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::graph::EntityGraph;

/// When feedback is computed relative to the tick's discrete modifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackOrdering {
    /// Homeostasis pulls from the previous value; counts read the tick-start snapshot.
    #[default]
    BeforeDiscrete,
    /// Homeostasis pulls from previous + discrete; counts read the post-mutation graph.
    AfterDiscrete,
}

/// Configured pressure.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureDef {
    pub id: String,
    #[serde(default, alias = "value")]
    pub initial_value: f64,
    #[serde(default)]
    pub homeostasis_target: f64,
    #[serde(default)]
    pub homeostasis_coefficient: f64,
    #[serde(default)]
    pub positive_feedback: Vec<FeedbackTerm>,
    #[serde(default)]
    pub negative_feedback: Vec<FeedbackTerm>,
}

impl PressureDef {
    pub fn new(id: impl Into<String>, initial_value: f64) -> Self {
        Self {
            id: id.into(),
            initial_value,
            homeostasis_target: 0.0,
            homeostasis_coefficient: 0.0,
            positive_feedback: Vec::new(),
            negative_feedback: Vec::new(),
        }
    }

    pub fn with_homeostasis(mut self, target: f64, coefficient: f64) -> Self {
        self.homeostasis_target = target;
        self.homeostasis_coefficient = coefficient;
        self
    }

    /// All feedback terms, positive first.
    pub fn terms_mut(&mut self) -> impl Iterator<Item = &mut FeedbackTerm> {
        self.positive_feedback.iter_mut().chain(self.negative_feedback.iter_mut())
    }
}

#[derive(Clone, Debug)]
struct PressureState {
    def: PressureDef,
    value: f64,
}

/// The live set of pressures, in configuration order.
#[derive(Clone, Debug)]
pub struct PressureSystem {
    states: Vec<PressureState>,
    ordering: FeedbackOrdering,
}

impl PressureSystem {
    pub fn new(defs: &[PressureDef], ordering: FeedbackOrdering) -> Self {
        let states = defs.iter()
            .map(|def| PressureState { value: def.initial_value, def: def.clone() })
            .collect();
        Self { states, ordering }
    }

    pub fn ordering(&self) -> FeedbackOrdering {
        self.ordering
    }

    pub fn value(&self, id: &str) -> Option<f64> {
        self.states.iter().find(|s| s.def.id == id).map(|s| s.value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.iter().any(|s| s.def.id == id)
    }

    /// Current values keyed by id.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.states.iter().map(|s| (s.def.id.clone(), s.value)).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Apply one tick of modifications and feedback.
    ///
    /// `counts_from` is the graph feedback counts are read from; the caller
    /// passes the snapshot or the post-mutation graph according to
    /// [`FeedbackOrdering`]. Modifications naming unknown pressures are
    /// dropped from the trace.
    pub fn update(&mut self, tick: u64, modifications: Vec<DiscreteModification>, counts_from: &EntityGraph) -> PressureUpdate {
        let (known, unknown): (Vec<_>, Vec<_>) = modifications.into_iter()
            .partition(|m| self.contains(&m.pressure_id));
        for m in &unknown {
            warn!(tick, pressure = %m.pressure_id, source = m.source.id(), "discrete modification for unknown pressure ignored");
        }

        let mut records = Vec::with_capacity(self.states.len());
        for state in &mut self.states {
            let previous = state.value;
            let raw_delta = known.iter()
                .filter(|m| m.pressure_id == state.def.id)
                .fold(0.0, |acc, m| acc + m.delta);

            let base = match self.ordering {
                FeedbackOrdering::BeforeDiscrete => previous,
                FeedbackOrdering::AfterDiscrete => previous + raw_delta,
            };
            let homeostatic_delta = (state.def.homeostasis_target - base) * state.def.homeostasis_coefficient;
            let positive = feedback_sum(&state.def.id, &state.def.positive_feedback, counts_from, tick);
            let negative = feedback_sum(&state.def.id, &state.def.negative_feedback, counts_from, tick);
            let scaled_feedback = positive - negative;

            let new_value = previous + raw_delta + homeostatic_delta + scaled_feedback;
            state.value = new_value;

            records.push(PressureRecord {
                id: state.def.id.clone(),
                previous_value: previous,
                new_value,
                delta: new_value - previous,
                breakdown: Breakdown {
                    homeostatic_delta,
                    scaled_feedback,
                    feedback_total: homeostatic_delta + scaled_feedback,
                    raw_delta,
                },
            });
        }

        PressureUpdate { tick, pressures: records, discrete_modifications: known }
    }
}

fn feedback_sum(pressure: &str, terms: &[FeedbackTerm], graph: &EntityGraph, tick: u64) -> f64 {
    terms.iter().enumerate().fold(0.0, |acc, (index, term)| match term.count(graph) {
        Some(count) => acc + term.coefficient * count as f64,
        None => {
            warn!(tick, pressure, index, reason = term.malformed_reason().unwrap_or(""), "malformed feedback term contributes zero");
            acc
        }
    })
}
