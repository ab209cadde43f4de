//! Ordered status machines: corruption, wounds, structural integrity.
//!
//! An entity walks `states` one step at a time. The empty status counts
//! as the first state. An optional recovery edge moves it back, at most
//! `maxRecoveries` times per entity. Entering a state may cascade into
//! tag changes, archived relationships and a prominence shift.

use std::collections::{BTreeMap, BTreeSet};
use rand::Rng;
use serde::Deserialize;

use crate::config::References;
use crate::error::UnitFault;
use crate::events::{EventKind, HistoryEvent};
use crate::graph::Entity;
use crate::mutation::{Mutation, UnitOutput};
use crate::predicate::{EntityFilter, Predicate};
use crate::sampling::chance;
use crate::simulation::context::SystemMemory;
use super::SystemEnv;

fn yes() -> bool {
    true
}

fn one() -> u32 {
    1
}

/// Cascade applied when an entity enters a state.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEffects {
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub remove_tags: Vec<String>,
    /// Relationship kinds archived in either direction.
    #[serde(default)]
    pub archive_kinds: Vec<String>,
    /// Relationship kind for held items; outgoing links of it are archived.
    #[serde(default)]
    pub drop_held: Option<String>,
    #[serde(default)]
    pub prominence_delta: f64,
}

/// Backward edge of the machine.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recovery {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub when: Predicate,
    #[serde(default)]
    pub requires: Option<EntityFilter>,
    pub probability: f64,
    #[serde(default = "one")]
    pub max_recoveries: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    pub candidates: EntityFilter,
    pub states: Vec<String>,
    #[serde(default)]
    pub advance_when: Predicate,
    /// Per-entity gate on advancing.
    #[serde(default)]
    pub advance_requires: Option<EntityFilter>,
    pub advance_probability: f64,
    #[serde(default)]
    pub recovery: Option<Recovery>,
    #[serde(default)]
    pub on_enter: BTreeMap<String, StateEffects>,
    /// Reaching the last state ends the entity.
    #[serde(default = "yes")]
    pub terminal_ends_entity: bool,
}

impl Progression {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.filter(&self.candidates);
        refs.predicate(&self.advance_when);
        if let Some(f) = &self.advance_requires {
            refs.filter(f);
        }
        if let Some(r) = &self.recovery {
            refs.predicate(&r.when);
            if let Some(f) = &r.requires {
                refs.filter(f);
            }
        }
        for effects in self.on_enter.values() {
            refs.tags.extend(effects.add_tags.iter().chain(&effects.remove_tags).map(String::as_str));
            refs.relationship_kinds.extend(effects.archive_kinds.iter().map(String::as_str));
            refs.relationship_kinds.extend(effects.drop_held.as_deref());
        }
    }

    fn state_index(&self, status: &str) -> Option<usize> {
        if status.is_empty() {
            return (!self.states.is_empty()).then_some(0);
        }
        self.states.iter().position(|s| s == status)
    }

    fn require(&self, env: &SystemEnv<'_>, state: &str) -> Result<usize, UnitFault> {
        self.states.iter().position(|s| s == state).ok_or_else(|| UnitFault::UnknownState {
            machine: env.id.to_string(),
            status: state.to_string(),
        })
    }

    pub fn run(&self, env: &SystemEnv<'_>, memory: &mut SystemMemory, rng: &mut impl Rng) -> Result<UnitOutput, UnitFault> {
        let ctx = env.ctx;
        let eval = ctx.eval();
        let mut out = env.output();

        let recovery = match &self.recovery {
            Some(r) => Some((r, self.require(env, &r.from)?, self.require(env, &r.to)?, r.when.evaluate(&eval))),
            None => None,
        };
        let advancing = self.advance_when.evaluate(&eval);
        let advance_p = env.probability(self.advance_probability);

        for entity in self.candidates.select(ctx.snapshot) {
            let Some(current) = self.state_index(&entity.status) else { continue };

            if let Some((r, from, to, open)) = recovery {
                let key = (env.id.to_string(), entity.id);
                if open
                    && current == from
                    && memory.recoveries(env.id, entity.id) < r.max_recoveries
                    && r.requires.as_ref().map_or(true, |f| f.matches(entity))
                    && chance(env.probability(r.probability), rng)
                {
                    *memory.recoveries.entry(key).or_insert(0) += 1;
                    self.enter(env, entity, current, to, &mut out);
                    continue;
                }
            }

            if !advancing || current + 1 >= self.states.len() {
                continue;
            }
            if !self.advance_requires.as_ref().map_or(true, |f| f.matches(entity)) {
                continue;
            }
            if chance(advance_p, rng) {
                self.enter(env, entity, current, current + 1, &mut out);
            }
        }
        Ok(out)
    }

    fn enter(&self, env: &SystemEnv<'_>, entity: &Entity, from: usize, to: usize, out: &mut UnitOutput) {
        let ctx = env.ctx;
        let (from_state, to_state) = (&self.states[from], &self.states[to]);
        out.mutations.push(Mutation::SetStatus { entity: entity.id, status: to_state.clone() });

        let mut removed = Vec::new();
        if let Some(effects) = self.on_enter.get(to_state) {
            for tag in &effects.remove_tags {
                out.mutations.push(Mutation::RemoveTag { entity: entity.id, tag: tag.clone() });
            }
            for tag in &effects.add_tags {
                out.mutations.push(Mutation::AddTag { entity: entity.id, tag: tag.clone() });
            }
            let mut archived = BTreeSet::new();
            for rel in ctx.snapshot.active_relationships_of(entity.id, None) {
                let archive_kind = effects.archive_kinds.contains(&rel.kind);
                let held = effects.drop_held.as_deref() == Some(rel.kind.as_str()) && rel.src == entity.id;
                if (archive_kind || held) && archived.insert(rel.id) {
                    out.mutations.push(Mutation::ArchiveRelationship { id: rel.id });
                    removed.push(rel.id);
                }
            }
            if effects.prominence_delta != 0.0 {
                out.mutations.push(Mutation::AdjustProminence { entity: entity.id, delta: effects.prominence_delta });
            }
        }
        if self.terminal_ends_entity && to + 1 == self.states.len() {
            out.mutations.push(Mutation::EndEntity { entity: entity.id });
        }

        let label = entity.label();
        let description = env.describe(
            &[("subject", label.as_str()), ("from", from_state.as_str()), ("to", to_state.as_str())],
            || format!("{} goes from {} to {}", label, from_state, to_state),
        );
        out.events.push(
            HistoryEvent::new(ctx.tick, EventKind::StatusChanged {
                entity: entity.id,
                from: from_state.clone(),
                to: to_state.clone(),
                cause: env.id.to_string(),
            }, description)
            .with_removed(removed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use crate::config::SimulationConfig;
    use crate::graph::{EntityGraph, Relationship};
    use crate::ids::{EntityId, RelationshipId};
    use crate::simulation::context::TickContext;
    use crate::time::EraDef;

    fn wounds() -> Progression {
        serde_json::from_value(serde_json::json!({
            "candidates": {"kind": "npc"},
            "states": ["healthy", "wounded", "maimed", "dead"],
            "advanceProbability": 1.0,
            "onEnter": {
                "dead": {"addTags": ["fallen"], "dropHeld": "holds", "archiveKinds": ["member_of"]}
            }
        })).unwrap()
    }

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "npc", "", "Rusk", 0));
        graph.add_entity(Entity::new(EntityId(1), "npc", "", "Sable", 0).with_status("maimed"));
        graph.add_entity(Entity::new(EntityId(2), "artifact", "", "Ember Blade", 0));
        graph.add_entity(Entity::new(EntityId(3), "faction", "", "Grey Watch", 0));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(1), EntityId(2), "holds", 0));
        graph.add_relationship(Relationship::new(RelationshipId(1), EntityId(1), EntityId(3), "member_of", 0));
        graph
    }

    #[test]
    fn test_advance_and_terminal_cascade() {
        let graph = graph();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 3 };
        let env = SystemEnv { id: "wound_progression", description: None, ctx: &ctx, modifier: 1.0 };
        let mut memory = SystemMemory::new();

        let out = wounds().run(&env, &mut memory, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        assert!(out.mutations.contains(&Mutation::SetStatus { entity: EntityId(0), status: "wounded".into() }));
        assert!(out.mutations.contains(&Mutation::SetStatus { entity: EntityId(1), status: "dead".into() }));
        assert!(out.mutations.contains(&Mutation::AddTag { entity: EntityId(1), tag: "fallen".into() }));
        assert!(out.mutations.contains(&Mutation::ArchiveRelationship { id: RelationshipId(0) }));
        assert!(out.mutations.contains(&Mutation::ArchiveRelationship { id: RelationshipId(1) }));
        assert!(out.mutations.contains(&Mutation::EndEntity { entity: EntityId(1) }));

        let dead = out.events.iter().find(|e| e.participants().contains(&EntityId(1))).unwrap();
        assert_eq!(dead.relationships_removed, vec![RelationshipId(0), RelationshipId(1)]);
    }

    #[test]
    fn test_recovery_is_bounded() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "building", "", "Old Mill", 0).with_status("damaged"));
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let integrity: Progression = serde_json::from_value(serde_json::json!({
            "candidates": {"kind": "building"},
            "states": ["intact", "damaged", "destroyed"],
            "advanceProbability": 0.0,
            "recovery": {"from": "damaged", "to": "intact", "probability": 1.0, "maxRecoveries": 1}
        })).unwrap();
        let mut memory = SystemMemory::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        let env = SystemEnv { id: "integrity", description: None, ctx: &ctx, modifier: 1.0 };
        let out = integrity.run(&env, &mut memory, &mut rng).unwrap();
        assert_eq!(out.mutations, vec![Mutation::SetStatus { entity: EntityId(0), status: "intact".into() }]);
        assert_eq!(memory.recoveries("integrity", EntityId(0)), 1);

        // Damaged again: the single recovery is spent.
        let out = integrity.run(&env, &mut memory, &mut rng).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_recovery_state_faults() {
        let graph = EntityGraph::new();
        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        let env = SystemEnv { id: "integrity", description: None, ctx: &ctx, modifier: 1.0 };
        let mut p = wounds();
        p.recovery = Some(Recovery {
            from: "wounded".into(),
            to: "blessed".into(),
            when: Predicate::default(),
            requires: None,
            probability: 1.0,
            max_recoveries: 1,
        });
        let err = p.run(&env, &mut SystemMemory::new(), &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, UnitFault::UnknownState { .. }));
    }
}
