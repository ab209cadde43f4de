//! Isolation decay: a tag fades from entities left without a same-tagged
//! neighbor for a run of consecutive evaluations.

use serde::Deserialize;

use crate::config::References;
use crate::events::{EventKind, HistoryEvent};
use crate::ids::EntityId;
use crate::mutation::{Mutation, UnitOutput};
use crate::predicate::EntityFilter;
use crate::simulation::context::SystemMemory;
use super::SystemEnv;

fn adjacent() -> String {
    "adjacent_to".to_string()
}

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationDecay {
    pub tag: String,
    #[serde(default = "adjacent")]
    pub relationship_kind: String,
    /// Further restricts which tagged entities decay.
    #[serde(default)]
    pub candidates: EntityFilter,
    /// Consecutive isolated evaluations before the tag is removed.
    #[serde(default = "one")]
    pub window: u32,
}

impl IsolationDecay {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.tags.push(&self.tag);
        refs.relationship_kinds.push(&self.relationship_kind);
        refs.filter(&self.candidates);
    }

    /// Whether `entity` has no active neighbor carrying the tag.
    fn isolated(&self, env: &SystemEnv<'_>, entity: EntityId) -> bool {
        let graph = env.ctx.snapshot;
        !graph.neighbors(entity, Some(&self.relationship_kind))
            .into_iter()
            .filter_map(|id| graph.entity(id))
            .any(|n| !n.is_ended() && n.has_tag(&self.tag))
    }

    pub fn run(&self, env: &SystemEnv<'_>, memory: &mut SystemMemory) -> UnitOutput {
        let ctx = env.ctx;
        let mut out = env.output();
        let key = |id| (env.id.to_string(), id);

        let tagged: Vec<_> = ctx.snapshot.by_tag(&self.tag)
            .filter(|e| !e.is_ended() && self.candidates.matches(e))
            .collect();

        // Streaks for entities that lost the tag some other way.
        memory.isolation_streaks.retain(|(system, id), _| {
            system != env.id || tagged.iter().any(|e| e.id == *id)
        });

        for entity in tagged {
            if !self.isolated(env, entity.id) {
                memory.isolation_streaks.remove(&key(entity.id));
                continue;
            }
            let streak = memory.isolation_streaks.entry(key(entity.id)).or_insert(0);
            *streak += 1;
            if *streak < self.window.max(1) {
                continue;
            }
            memory.isolation_streaks.remove(&key(entity.id));

            out.mutations.push(Mutation::RemoveTag { entity: entity.id, tag: self.tag.clone() });
            let label = entity.label();
            let description = env.describe(
                &[("subject", label.as_str()), ("tag", self.tag.as_str())],
                || format!("{} is no longer {}", label, self.tag.replace('_', " ")),
            );
            out.events.push(HistoryEvent::new(ctx.tick, EventKind::TagRemoved {
                entity: entity.id,
                tag: self.tag.clone(),
                cause: env.id.to_string(),
            }, description));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::config::SimulationConfig;
    use crate::graph::{Entity, EntityGraph, Relationship};
    use crate::ids::{EntityId, RelationshipId};
    use crate::simulation::context::TickContext;
    use crate::time::EraDef;

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "location", "", "Lone Spire", 0).with_tag("cleansed"));
        graph.add_entity(Entity::new(EntityId(1), "location", "", "Twin East", 0).with_tag("cleansed"));
        graph.add_entity(Entity::new(EntityId(2), "location", "", "Twin West", 0).with_tag("cleansed"));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(1), EntityId(2), "adjacent_to", 0));
        graph
    }

    fn decay(window: u32) -> IsolationDecay {
        IsolationDecay {
            tag: "cleansed".into(),
            relationship_kind: "adjacent_to".into(),
            candidates: EntityFilter::default(),
            window,
        }
    }

    #[test]
    fn test_tag_removed_after_window() {
        let graph = graph();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let mut memory = SystemMemory::new();
        let system = decay(2);

        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        let env = SystemEnv { id: "cleansing_fades", description: None, ctx: &ctx, modifier: 1.0 };
        assert!(system.run(&env, &mut memory).is_empty());
        assert_eq!(memory.isolation_streaks.get(&("cleansing_fades".to_string(), EntityId(0))), Some(&1));

        let ctx = TickContext { tick: 1, ..ctx };
        let env = SystemEnv { ctx: &ctx, ..env };
        let out = system.run(&env, &mut memory);
        assert_eq!(out.mutations, vec![Mutation::RemoveTag { entity: EntityId(0), tag: "cleansed".into() }]);
        assert_eq!(out.events[0].type_name(), "tagRemoved");
        assert!(memory.isolation_streaks.is_empty());
    }

    #[test]
    fn test_streak_resets_when_neighbor_appears() {
        let mut graph = graph();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let mut memory = SystemMemory::new();
        let system = decay(2);
        {
            let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
            let env = SystemEnv { id: "cleansing_fades", description: None, ctx: &ctx, modifier: 1.0 };
            system.run(&env, &mut memory);
        }
        graph.add_relationship(Relationship::new(RelationshipId(1), EntityId(0), EntityId(1), "adjacent_to", 1));
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 1 };
        let env = SystemEnv { id: "cleansing_fades", description: None, ctx: &ctx, modifier: 1.0 };
        assert!(system.run(&env, &mut memory).is_empty());
        assert!(memory.isolation_streaks.is_empty());
    }

    #[test]
    fn test_ended_entities_keep_their_tag() {
        let mut graph = graph();
        if let Some(e) = graph.entity_mut(EntityId(0)) {
            e.temporal.end_tick = Some(0);
        }
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let mut memory = SystemMemory::new();
        let system = IsolationDecay {
            candidates: EntityFilter { include_ended: true, ..EntityFilter::default() },
            ..decay(1)
        };

        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 3 };
        let env = SystemEnv { id: "cleansing_fades", description: None, ctx: &ctx, modifier: 1.0 };
        assert!(system.run(&env, &mut memory).is_empty());
        assert!(memory.isolation_streaks.is_empty());
    }
}
