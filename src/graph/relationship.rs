//! Relationships: directed, typed edges that are archived rather than deleted.

use serde::{Serialize, Deserialize};
use crate::ids::{EntityId, RelationshipId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    Active,
    Historical,
}

/// An edge between two entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub src: EntityId,
    pub dst: EntityId,
    pub kind: String,
    #[serde(default)]
    pub status: RelationshipStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Relationship {
    pub fn new(id: RelationshipId, src: EntityId, dst: EntityId, kind: impl Into<String>, tick: u64) -> Self {
        Self {
            id,
            src,
            dst,
            kind: kind.into(),
            status: RelationshipStatus::Active,
            strength: None,
            created_at: tick,
            updated_at: tick,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.src == id {
            Some(self.dst)
        } else if self.dst == id {
            Some(self.src)
        } else {
            None
        }
    }

    /// Whether this edge joins `a` and `b`, in either direction.
    pub fn joins(&self, a: EntityId, b: EntityId) -> bool {
        (self.src == a && self.dst == b) || (self.src == b && self.dst == a)
    }
}

/// Capability: the record can be moved to a terminal, non-destructive state.
pub trait Archivable {
    /// Transition to historical. Returns false if already archived.
    fn archive(&mut self, tick: u64) -> bool;
}

impl Archivable for Relationship {
    fn archive(&mut self, tick: u64) -> bool {
        if self.status == RelationshipStatus::Historical {
            return false;
        }
        self.status = RelationshipStatus::Historical;
        self.updated_at = tick;
        true
    }
}
