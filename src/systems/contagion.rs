//! Contagion: a tag spreads from carriers to susceptible neighbors.

use std::collections::{BTreeMap, BTreeSet};
use rand::Rng;
use serde::Deserialize;

use crate::config::References;
use crate::events::{EventKind, HistoryEvent};
use crate::mutation::{Mutation, UnitOutput};
use crate::predicate::EntityFilter;
use crate::sampling::chance;
use super::SystemEnv;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contagion {
    pub tag: String,
    pub relationship_kind: String,
    /// Neighbors the tag can reach, e.g. `{"lacksTags": ["cleansed"]}`.
    #[serde(default)]
    pub susceptible: EntityFilter,
    /// Chance per carrier-neighbor edge.
    pub probability: f64,
    /// Added once per new carrier.
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
}

impl Contagion {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.tags.push(&self.tag);
        refs.relationship_kinds.push(&self.relationship_kind);
        refs.filter(&self.susceptible);
        refs.pressure_changes(&self.pressure_changes);
    }

    pub fn run(&self, env: &SystemEnv<'_>, rng: &mut impl Rng) -> UnitOutput {
        let ctx = env.ctx;
        let graph = ctx.snapshot;
        let p = env.probability(self.probability);
        let mut out = env.output();
        let mut infected = BTreeSet::new();

        for carrier in graph.by_tag(&self.tag).filter(|e| !e.is_ended()) {
            for id in graph.neighbors(carrier.id, Some(&self.relationship_kind)) {
                let Some(neighbor) = graph.entity(id) else { continue };
                if neighbor.has_tag(&self.tag) || infected.contains(&id) || !self.susceptible.matches(neighbor) {
                    continue;
                }
                if !chance(p, rng) {
                    continue;
                }
                infected.insert(id);
                out.mutations.push(Mutation::AddTag { entity: id, tag: self.tag.clone() });
                out.add_pressure_changes(&self.pressure_changes);

                let (from, to) = (carrier.label(), neighbor.label());
                let description = env.describe(
                    &[("subject", to.as_str()), ("source", from.as_str()), ("tag", self.tag.as_str())],
                    || format!("{} spreads from {} to {}", self.tag.replace('_', " "), from, to),
                );
                out.events.push(HistoryEvent::new(ctx.tick, EventKind::TagAdded {
                    entity: id,
                    tag: self.tag.clone(),
                    cause: env.id.to_string(),
                }, description));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use crate::config::SimulationConfig;
    use crate::graph::{Entity, EntityGraph, Relationship};
    use crate::ids::{EntityId, RelationshipId};
    use crate::simulation::context::TickContext;
    use crate::time::EraDef;

    #[test]
    fn test_spread_blocked_by_filter_and_deduped() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "location", "", "Blight Hollow", 0).with_tag("corrupted"));
        graph.add_entity(Entity::new(EntityId(1), "location", "", "Fen Gate", 0).with_tag("corrupted"));
        graph.add_entity(Entity::new(EntityId(2), "location", "", "Reed Bank", 0));
        graph.add_entity(Entity::new(EntityId(3), "location", "", "Sun Shrine", 0).with_tag("cleansed"));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(0), EntityId(2), "adjacent_to", 0));
        graph.add_relationship(Relationship::new(RelationshipId(1), EntityId(1), EntityId(2), "adjacent_to", 0));
        graph.add_relationship(Relationship::new(RelationshipId(2), EntityId(0), EntityId(3), "adjacent_to", 0));

        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 2 };
        let env = SystemEnv { id: "corruption_spreads", description: None, ctx: &ctx, modifier: 1.0 };
        let contagion = Contagion {
            tag: "corrupted".into(),
            relationship_kind: "adjacent_to".into(),
            susceptible: EntityFilter::default().without_tag("cleansed"),
            probability: 1.0,
            pressure_changes: BTreeMap::from([("harmony".to_string(), -2.0)]),
        };

        let out = contagion.run(&env, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(out.mutations, vec![Mutation::AddTag { entity: EntityId(2), tag: "corrupted".into() }]);
        assert_eq!(out.modifications.len(), 1);
        assert_eq!(out.events[0].description, "corrupted spreads from Blight Hollow to Reed Bank");
    }
}
