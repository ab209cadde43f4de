//! The entity graph: canonical store of entities and relationships.
//!
//! Pure storage plus query primitives. Nothing in here knows about
//! templates, systems or pressures; those read the graph through these
//! queries and write to it through the tick's mutation buffer.

pub mod components;
pub mod entity;
pub mod relationship;

pub use entity::{CanAct, Entity, ProminenceRung, Temporal, PROMINENCE_MAX};
pub use relationship::{Archivable, Relationship, RelationshipStatus};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use crate::ids::{EntityId, RelationshipId};
use components::group_components;

/// Per-kind relationship totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub active: usize,
    pub historical: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.active + self.historical
    }
}

/// The world graph.
#[derive(Clone, Debug, Default)]
pub struct EntityGraph {
    entities: BTreeMap<EntityId, Entity>,
    relationships: BTreeMap<RelationshipId, Relationship>,
    adjacency: BTreeMap<EntityId, Vec<RelationshipId>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // === Storage ===

    /// Insert an entity. Returns false if the id is already taken.
    pub fn add_entity(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.adjacency.entry(entity.id).or_default();
        self.entities.insert(entity.id, entity);
        true
    }

    /// Insert a relationship. Returns false if the id is taken or an endpoint is missing.
    pub fn add_relationship(&mut self, relationship: Relationship) -> bool {
        if self.relationships.contains_key(&relationship.id)
            || !self.entities.contains_key(&relationship.src)
            || !self.entities.contains_key(&relationship.dst)
        {
            return false;
        }
        let id = relationship.id;
        self.adjacency.entry(relationship.src).or_default().push(id);
        if relationship.dst != relationship.src {
            self.adjacency.entry(relationship.dst).or_default().push(id);
        }
        self.relationships.insert(id, relationship);
        true
    }

    /// Move a relationship to historical. Returns false if unknown or already archived.
    pub fn archive_relationship(&mut self, id: RelationshipId, tick: u64) -> bool {
        match self.relationships.get_mut(&id) {
            Some(rel) => rel.archive(tick),
            None => false,
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    pub fn relationship_mut(&mut self, id: RelationshipId) -> Option<&mut Relationship> {
        self.relationships.get_mut(&id)
    }

    /// All entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All relationships in id order, active and historical.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// One past the largest entity id in the graph.
    pub fn next_entity_id(&self) -> u64 {
        self.entities.keys().next_back().map_or(0, |id| id.0 + 1)
    }

    /// One past the largest relationship id in the graph.
    pub fn next_relationship_id(&self) -> u64 {
        self.relationships.keys().next_back().map_or(0, |id| id.0 + 1)
    }

    // === Queries ===

    pub fn by_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    pub fn by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.values().filter(move |e| e.has_tag(tag))
    }

    /// Every relationship touching `id`, active or not.
    pub fn relationships_of(&self, id: EntityId) -> impl Iterator<Item = &Relationship> {
        self.adjacency.get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationships.get(rid))
    }

    /// Active relationships touching `id`, optionally restricted to one kind.
    pub fn active_relationships_of<'a>(&'a self, id: EntityId, kind: Option<&'a str>) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships_of(id)
            .filter(move |r| r.is_active() && kind.map_or(true, |k| r.kind == k))
    }

    /// Distinct entities reachable over one active edge (either direction).
    pub fn neighbors(&self, id: EntityId, kind: Option<&str>) -> Vec<EntityId> {
        let set: BTreeSet<EntityId> = self.active_relationships_of(id, kind)
            .filter_map(|r| r.other(id))
            .filter(|other| *other != id)
            .collect();
        set.into_iter().collect()
    }

    /// Number of active relationships touching `id`.
    pub fn active_degree(&self, id: EntityId) -> usize {
        self.active_relationships_of(id, None).count()
    }

    /// Active relationships of `kind` joining `a` and `b` in either direction.
    pub fn relationships_between<'a>(&'a self, a: EntityId, b: EntityId, kind: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.active_relationships_of(a, Some(kind))
            .filter(move |r| r.joins(a, b))
    }

    pub fn has_active_between(&self, a: EntityId, b: EntityId, kind: &str) -> bool {
        self.relationships_between(a, b, kind).next().is_some()
    }

    /// Active/historical totals per relationship kind.
    pub fn counts_by_kind(&self) -> BTreeMap<String, KindCounts> {
        let mut counts: BTreeMap<String, KindCounts> = BTreeMap::new();
        for rel in self.relationships.values() {
            let entry = counts.entry(rel.kind.clone()).or_default();
            if rel.is_active() {
                entry.active += 1;
            } else {
                entry.historical += 1;
            }
        }
        counts
    }

    // === Connectivity ===

    /// Members of the component containing `id` over active edges of `kind` (BFS).
    pub fn component_of(&self, kind: &str, id: EntityId) -> Vec<EntityId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(id);
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current, Some(kind)) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// All components over active edges of `kind`, including singletons of
    /// entities that have ever carried an edge of that kind.
    pub fn components(&self, kind: &str) -> Vec<Vec<EntityId>> {
        self.components_of_size(kind, 1)
    }

    /// Components of `kind` with at least two members (alliance/war blocs).
    pub fn blocs(&self, kind: &str) -> Vec<Vec<EntityId>> {
        self.components_of_size(kind, 2)
    }

    fn components_of_size(&self, kind: &str, min_size: usize) -> Vec<Vec<EntityId>> {
        let mut nodes = BTreeSet::new();
        let mut edges = Vec::new();
        for rel in self.relationships.values().filter(|r| r.kind == kind) {
            nodes.insert(rel.src);
            nodes.insert(rel.dst);
            if rel.is_active() {
                edges.push((rel.src, rel.dst));
            }
        }
        let nodes: Vec<EntityId> = nodes.into_iter().collect();
        group_components(&nodes, &edges, min_size)
    }

    /// Whether linking `a` and `b` with `kind` would produce a component larger than `cap`.
    pub fn would_exceed_cap(&self, kind: &str, a: EntityId, b: EntityId, cap: usize) -> bool {
        let comp_a = self.component_of(kind, a);
        if comp_a.binary_search(&b).is_ok() {
            return comp_a.len() > cap;
        }
        let comp_b = self.component_of(kind, b);
        comp_a.len() + comp_b.len() > cap
    }
}
