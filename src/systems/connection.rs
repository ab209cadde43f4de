//! Connection evolution: relationships of one kind strengthen or weaken
//! over time, and new ones form between entities sharing a neighbor.

use std::collections::{BTreeMap, BTreeSet};
use rand::Rng;
use serde::Deserialize;

use crate::config::References;
use crate::events::{EventKind, HistoryEvent};
use crate::ids::IdGenerators;
use crate::graph::Relationship;
use crate::mutation::{Mutation, UnitOutput};
use crate::predicate::EntityFilter;
use crate::sampling::chance;
use super::SystemEnv;

fn one() -> f64 {
    1.0
}

fn half() -> f64 {
    0.5
}

/// New links between candidates that share a neighbor over `via`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
    pub candidates: EntityFilter,
    pub via: String,
    pub probability: f64,
    #[serde(default = "half")]
    pub strength: f64,
    /// Added once per new relationship.
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvolution {
    pub relationship_kind: String,
    /// Strength change per tick; negative weakens.
    #[serde(default)]
    pub drift: f64,
    #[serde(default = "one")]
    pub max_strength: f64,
    /// Strength given to relationships that have none.
    #[serde(default = "one")]
    pub default_strength: f64,
    /// Relationships falling below this are archived.
    #[serde(default)]
    pub archive_below: Option<f64>,
    #[serde(default)]
    pub formation: Option<Formation>,
}

impl ConnectionEvolution {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.relationship_kinds.push(&self.relationship_kind);
        if let Some(f) = &self.formation {
            refs.filter(&f.candidates);
            refs.relationship_kinds.push(&f.via);
            refs.pressure_changes(&f.pressure_changes);
        }
    }

    pub fn run(&self, env: &SystemEnv<'_>, ids: &mut IdGenerators, rng: &mut impl Rng) -> UnitOutput {
        let mut out = env.output();
        self.evolve(env, &mut out);
        if let Some(formation) = &self.formation {
            self.form(formation, env, ids, rng, &mut out);
        }
        out
    }

    fn evolve(&self, env: &SystemEnv<'_>, out: &mut UnitOutput) {
        if self.drift == 0.0 {
            return;
        }
        let ctx = env.ctx;
        let drift = self.drift * env.modifier;
        for rel in ctx.snapshot.relationships().filter(|r| r.is_active() && r.kind == self.relationship_kind) {
            let current = rel.strength.unwrap_or(self.default_strength);
            let next = (current + drift).clamp(0.0, self.max_strength);
            match self.archive_below {
                Some(floor) if next < floor => {
                    out.mutations.push(Mutation::ArchiveRelationship { id: rel.id });
                    out.events.push(archived_event(env, rel, "fades"));
                }
                _ if next != current => out.mutations.push(Mutation::SetStrength { id: rel.id, strength: next }),
                _ => {}
            }
        }
    }

    fn form(&self, formation: &Formation, env: &SystemEnv<'_>, ids: &mut IdGenerators, rng: &mut impl Rng, out: &mut UnitOutput) {
        let ctx = env.ctx;
        let graph = ctx.snapshot;
        let p = env.probability(formation.probability);
        let mut considered: BTreeSet<_> = BTreeSet::new();

        for a in formation.candidates.select(graph) {
            for hub in graph.neighbors(a.id, Some(&formation.via)) {
                for b_id in graph.neighbors(hub, Some(&formation.via)) {
                    if b_id <= a.id || !considered.insert((a.id, b_id)) {
                        continue;
                    }
                    let Some(b) = graph.entity(b_id) else { continue };
                    if !formation.candidates.matches(b) || graph.has_active_between(a.id, b_id, &self.relationship_kind) {
                        continue;
                    }
                    if !chance(p, rng) {
                        continue;
                    }
                    let id = ids.next_relationship();
                    let rel = Relationship::new(id, a.id, b_id, self.relationship_kind.clone(), ctx.tick)
                        .with_strength(formation.strength);
                    out.mutations.push(Mutation::FormRelationship(rel));
                    out.add_pressure_changes_if_formed(&formation.pressure_changes, &[id]);

                    let (la, lb) = (a.label(), b.label());
                    let description = env.describe(
                        &[("src", la.as_str()), ("dst", lb.as_str())],
                        || format!("{} and {} become {}", la, lb, self.relationship_kind.replace('_', " ")),
                    );
                    out.events.push(
                        HistoryEvent::new(ctx.tick, EventKind::RelationshipFormed {
                            relationship: id,
                            kind: self.relationship_kind.clone(),
                            src: a.id,
                            dst: b_id,
                            cause: env.id.to_string(),
                        }, description)
                        .with_created(Vec::new(), vec![id]),
                    );
                }
            }
        }
    }
}

/// `relationshipArchived` event for a relationship archived by a system.
pub fn archived_event(env: &SystemEnv<'_>, rel: &Relationship, verb: &str) -> HistoryEvent {
    let graph = env.ctx.snapshot;
    let label = |id| graph.entity(id).map(|e| e.label()).unwrap_or_else(|| id.to_string());
    let (src, dst) = (label(rel.src), label(rel.dst));
    let description = format!("The {} between {} and {} {}", rel.kind.replace('_', " "), src, dst, verb);
    HistoryEvent::new(env.ctx.tick, EventKind::RelationshipArchived {
        relationship: rel.id,
        kind: rel.kind.clone(),
        src: rel.src,
        dst: rel.dst,
        cause: env.id.to_string(),
    }, description)
    .with_removed(vec![rel.id])
}
