//! Threshold triggers: configured mutations applied to candidates whose
//! trigger holds.

use std::collections::BTreeMap;
use rand::Rng;
use serde::Deserialize;

use crate::config::References;
use crate::error::UnitFault;
use crate::events::{EventKind, HistoryEvent};
use crate::graph::Entity;
use crate::ids::IdGenerators;
use crate::mutation::{resolve_specs, Bindings, MutationSpec, UnitOutput};
use crate::predicate::{CompareOp, EntityFilter, Predicate};
use crate::sampling::chance;
use super::SystemEnv;

fn always() -> f64 {
    1.0
}

/// Per-candidate count of neighbors over one relationship kind.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborCondition {
    #[serde(alias = "kind")]
    pub relationship_kind: String,
    #[serde(default)]
    pub filter: EntityFilter,
    pub op: CompareOp,
    pub count: f64,
}

impl NeighborCondition {
    pub fn holds(&self, entity: &Entity, env: &SystemEnv<'_>) -> bool {
        let graph = env.ctx.snapshot;
        let matching = graph.neighbors(entity.id, Some(&self.relationship_kind))
            .into_iter()
            .filter_map(|id| graph.entity(id))
            .filter(|n| self.filter.matches(n))
            .count();
        self.op.apply(matching as f64, self.count)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdTrigger {
    pub candidates: EntityFilter,
    /// Global gate evaluated once per tick.
    #[serde(default)]
    pub condition: Predicate,
    #[serde(default)]
    pub neighbors: Option<NeighborCondition>,
    #[serde(default = "always")]
    pub probability: f64,
    /// Applied with `subject` bound to the candidate.
    #[serde(default)]
    pub mutations: Vec<MutationSpec>,
    /// Added once per application.
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
    #[serde(default)]
    pub max_per_tick: Option<usize>,
}

impl ThresholdTrigger {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.filter(&self.candidates);
        refs.predicate(&self.condition);
        if let Some(n) = &self.neighbors {
            refs.relationship_kinds.push(&n.relationship_kind);
            refs.filter(&n.filter);
        }
        refs.mutations(&self.mutations);
        refs.pressure_changes(&self.pressure_changes);
    }

    pub fn run(&self, env: &SystemEnv<'_>, ids: &mut IdGenerators, rng: &mut impl Rng) -> Result<UnitOutput, UnitFault> {
        let ctx = env.ctx;
        let mut out = env.output();
        if !self.condition.evaluate(&ctx.eval()) {
            return Ok(out);
        }

        let p = env.probability(self.probability);
        let limit = self.max_per_tick.unwrap_or(usize::MAX);
        let mut applied = 0;
        for entity in self.candidates.select(ctx.snapshot) {
            if applied >= limit {
                break;
            }
            if let Some(n) = &self.neighbors {
                if !n.holds(entity, env) {
                    continue;
                }
            }
            if !chance(p, rng) {
                continue;
            }

            let mut bindings = Bindings { subject: Some(entity.id), ..Bindings::default() };
            let created = resolve_specs(&self.mutations, &mut bindings, ctx.snapshot, ctx.config, ids, ctx.tick, rng, &mut out.mutations)?;
            out.add_pressure_changes(&self.pressure_changes);

            let label = entity.label();
            let description = env.describe(&[("subject", label.as_str())], || format!("{} affects {}", env.id.replace('_', " "), label));
            out.events.push(
                HistoryEvent::new(ctx.tick, EventKind::SystemApplied { system_id: env.id.to_string(), subject: Some(entity.id) }, description)
                    .with_created(created.entities, created.relationships)
                    .with_removed(created.archived),
            );
            applied += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use crate::config::SimulationConfig;
    use crate::graph::{EntityGraph, Relationship};
    use crate::ids::{EntityId, RelationshipId};
    use crate::mutation::Mutation;
    use crate::simulation::context::TickContext;
    use crate::time::EraDef;

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "location", "colony", "Ash", 0).with_tag("cleansed"));
        graph.add_entity(Entity::new(EntityId(1), "location", "colony", "Birch", 0).with_tag("cleansed"));
        graph.add_entity(Entity::new(EntityId(2), "location", "colony", "Cairn", 0).with_tag("cleansed"));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(0), EntityId(1), "adjacent_to", 0));
        graph
    }

    fn trigger() -> ThresholdTrigger {
        serde_json::from_value(serde_json::json!({
            "candidates": {"kind": "location", "hasTags": ["cleansed"]},
            "neighbors": {"relationshipKind": "adjacent_to", "filter": {"hasTags": ["cleansed"]}, "op": "==", "count": 0},
            "mutations": [{"op": "addTag", "entity": "subject", "tag": "exposed"}],
            "pressureChanges": {"harmony": -1}
        })).unwrap()
    }

    #[test]
    fn test_only_isolated_candidates_fire() {
        let graph = graph();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 1 };
        let env = SystemEnv { id: "exposure", description: Some("{subject} stands alone"), ctx: &ctx, modifier: 1.0 };
        let mut ids = IdGenerators::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = trigger().run(&env, &mut ids, &mut rng).unwrap();
        assert_eq!(out.mutations, vec![Mutation::AddTag { entity: EntityId(2), tag: "exposed".into() }]);
        assert_eq!(out.modifications.len(), 1);
        assert_eq!(out.events[0].description, "Cairn stands alone");
    }

    #[test]
    fn test_condition_gates_everything() {
        let graph = graph();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 1 };
        let env = SystemEnv { id: "exposure", description: None, ctx: &ctx, modifier: 1.0 };
        let mut t = trigger();
        t.condition = Predicate::pressure("harmony", CompareOp::Gt, 0.0);
        let out = t.run(&env, &mut IdGenerators::new(), &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        assert!(out.is_empty());
    }
}
