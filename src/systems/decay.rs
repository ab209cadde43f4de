//! Relationship decay: strength falls each tick and links under the floor
//! are archived.

use serde::Deserialize;

use crate::mutation::{Mutation, UnitOutput};
use super::connection::archived_event;
use super::SystemEnv;

fn one() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDecay {
    pub relationship_kind: String,
    pub rate: f64,
    #[serde(default)]
    pub floor: f64,
    /// Strength assumed for relationships created without one.
    #[serde(default = "one")]
    pub initial_strength: f64,
}

impl RelationshipDecay {
    pub fn run(&self, env: &SystemEnv<'_>) -> UnitOutput {
        let mut out = env.output();
        let loss = self.rate * env.modifier;
        if loss <= 0.0 {
            return out;
        }
        for rel in env.ctx.snapshot.relationships().filter(|r| r.is_active() && r.kind == self.relationship_kind) {
            let next = rel.strength.unwrap_or(self.initial_strength) - loss;
            if next < self.floor {
                out.mutations.push(Mutation::ArchiveRelationship { id: rel.id });
                out.events.push(archived_event(env, rel, "dissolves"));
            } else {
                out.mutations.push(Mutation::SetStrength { id: rel.id, strength: next });
            }
        }
        out
    }
}
