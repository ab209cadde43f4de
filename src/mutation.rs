//! Graph mutations and the per-unit output buffer.
//!
//! Templates, systems, actions and era entries never touch the live graph.
//! They read the tick-start snapshot and describe their changes as
//! `Mutation`s inside a `UnitOutput`; the orchestrator applies every output
//! after all units have run, so changes become visible on the next tick.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::UnitFault;
use crate::events::HistoryEvent;
use crate::graph::{Entity, EntityGraph, Relationship};
use crate::ids::{EntityId, IdGenerators, RelationshipId};
use crate::pressure::{DiscreteModification, ModificationSource};

// =============================================================================
// REFERENCES
// =============================================================================

/// How a mutation spec names an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityRef {
    /// The acting entity of an action.
    Actor,
    /// The selected target of a template or action.
    Target,
    /// The candidate a system is processing.
    Subject,
    /// An entity created earlier in the same batch (`$name`).
    Created(String),
}

impl TryFrom<String> for EntityRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "actor" => Ok(EntityRef::Actor),
            "target" | "$target" => Ok(EntityRef::Target),
            "subject" | "self" => Ok(EntityRef::Subject),
            other => match other.strip_prefix('$') {
                Some(name) if !name.is_empty() => Ok(EntityRef::Created(name.to_string())),
                _ => Err(format!("'{}' is not an entity reference (actor, target, subject or $name)", other)),
            },
        }
    }
}

impl From<EntityRef> for String {
    fn from(value: EntityRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Actor => f.write_str("actor"),
            EntityRef::Target => f.write_str("target"),
            EntityRef::Subject => f.write_str("subject"),
            EntityRef::Created(name) => write!(f, "${}", name),
        }
    }
}

/// Entities bound while instantiating one batch.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    pub actor: Option<EntityId>,
    pub target: Option<EntityId>,
    pub subject: Option<EntityId>,
    pub created: BTreeMap<String, EntityId>,
}

impl Bindings {
    pub fn resolve(&self, reference: &EntityRef) -> Result<EntityId, UnitFault> {
        let found = match reference {
            EntityRef::Actor => self.actor,
            EntityRef::Target => self.target,
            EntityRef::Subject => self.subject,
            EntityRef::Created(name) => self.created.get(name).copied(),
        };
        found.ok_or_else(|| UnitFault::UnresolvedReference(reference.to_string()))
    }
}

// =============================================================================
// SPECS (configuration side)
// =============================================================================

fn default_prominence() -> f64 {
    1.0
}

/// Blueprint for an entity created by a template, action or system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    /// Batch-local name, referenced elsewhere as `$name`.
    #[serde(rename = "ref")]
    pub reference: String,
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    /// Fixed name; `{n}` is replaced with the new entity's number.
    #[serde(default)]
    pub name: Option<String>,
    /// Pool to draw a name from when `name` is absent.
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_prominence")]
    pub prominence: f64,
    #[serde(default)]
    pub culture: Option<String>,
    /// Copy the culture of this entity when `culture` is absent.
    #[serde(default)]
    pub inherit_culture_from: Option<EntityRef>,
}

impl EntitySpec {
    /// Build the entity for this spec with a freshly allocated id.
    pub fn build(
        &self,
        id: EntityId,
        default_status: Option<&str>,
        bindings: &Bindings,
        snapshot: &EntityGraph,
        tick: u64,
        rng: &mut impl Rng,
    ) -> Entity {
        let name = match (&self.name, self.names.is_empty()) {
            (Some(fixed), _) => fixed.replace("{n}", &id.0.to_string()),
            (None, false) => self.names[rng.gen_range(0..self.names.len())].clone(),
            (None, true) => format!("{} {}", if self.subtype.is_empty() { &self.kind } else { &self.subtype }, id.0),
        };
        let status = self.status.clone()
            .or_else(|| default_status.map(str::to_string))
            .unwrap_or_default();

        let mut entity = Entity::new(id, self.kind.clone(), self.subtype.clone(), name, tick)
            .with_status(status)
            .with_prominence(self.prominence);
        for tag in &self.tags {
            entity.tags.insert(tag.clone());
        }
        entity.culture = self.culture.clone().or_else(|| {
            let source = self.inherit_culture_from.as_ref()?;
            let source_id = bindings.resolve(source).ok()?;
            snapshot.entity(source_id)?.culture.clone()
        });
        entity
    }
}

/// Blueprint for a relationship between two referenced entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    pub kind: String,
    pub src: EntityRef,
    pub dst: EntityRef,
    #[serde(default)]
    pub strength: Option<f64>,
}

/// A configured change, with entity references still symbolic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MutationSpec {
    AddTag { entity: EntityRef, tag: String },
    RemoveTag { entity: EntityRef, tag: String },
    SetStatus { entity: EntityRef, status: String },
    AdjustProminence { entity: EntityRef, delta: f64 },
    CreateEntity { entity: EntitySpec },
    FormRelationship { relationship: RelationshipSpec },
    /// Archive active relationships of `kind` touching `src` (and `dst` if given).
    ArchiveRelationships { kind: String, src: EntityRef, #[serde(default)] dst: Option<EntityRef> },
}

impl MutationSpec {
    pub fn referenced_kinds(&self) -> (Vec<&str>, Vec<&str>) {
        match self {
            MutationSpec::CreateEntity { entity } => (vec![entity.kind.as_str()], Vec::new()),
            MutationSpec::FormRelationship { relationship } => (Vec::new(), vec![relationship.kind.as_str()]),
            MutationSpec::ArchiveRelationships { kind, .. } => (Vec::new(), vec![kind.as_str()]),
            _ => (Vec::new(), Vec::new()),
        }
    }

    pub fn referenced_tags(&self) -> Vec<&str> {
        match self {
            MutationSpec::AddTag { tag, .. } | MutationSpec::RemoveTag { tag, .. } => vec![tag.as_str()],
            MutationSpec::CreateEntity { entity } => entity.tags.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// References this spec reads, in order.
    pub fn references(&self) -> Vec<&EntityRef> {
        match self {
            MutationSpec::AddTag { entity, .. }
            | MutationSpec::RemoveTag { entity, .. }
            | MutationSpec::SetStatus { entity, .. }
            | MutationSpec::AdjustProminence { entity, .. } => vec![entity],
            MutationSpec::CreateEntity { entity } => entity.inherit_culture_from.iter().collect(),
            MutationSpec::FormRelationship { relationship } => vec![&relationship.src, &relationship.dst],
            MutationSpec::ArchiveRelationships { src, dst, .. } => {
                let mut refs = vec![src];
                refs.extend(dst.iter());
                refs
            }
        }
    }

    /// Name this spec binds, if it creates an entity.
    pub fn defines(&self) -> Option<&str> {
        match self {
            MutationSpec::CreateEntity { entity } => Some(entity.reference.trim_start_matches('$')),
            _ => None,
        }
    }
}

// =============================================================================
// RESOLVED MUTATIONS
// =============================================================================

/// A concrete change to the graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    AddTag { entity: EntityId, tag: String },
    RemoveTag { entity: EntityId, tag: String },
    SetStatus { entity: EntityId, status: String },
    AdjustProminence { entity: EntityId, delta: f64 },
    EndEntity { entity: EntityId },
    CreateEntity(Entity),
    FormRelationship(Relationship),
    ArchiveRelationship { id: RelationshipId },
    SetStrength { id: RelationshipId, strength: f64 },
}

/// Everything one template/system/action/era entry produced in a tick.
#[derive(Clone, Debug)]
pub struct UnitOutput {
    pub source: ModificationSource,
    pub mutations: Vec<Mutation>,
    pub modifications: Vec<DiscreteModification>,
    pub events: Vec<HistoryEvent>,
    /// Modifications (by index) that only count if the relationship forms.
    pub contingent: Vec<(usize, RelationshipId)>,
}

impl UnitOutput {
    pub fn new(source: ModificationSource) -> Self {
        Self {
            source,
            mutations: Vec::new(),
            modifications: Vec::new(),
            events: Vec::new(),
            contingent: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.modifications.is_empty() && self.events.is_empty()
    }

    /// Record pressure changes attributed to this unit's source.
    pub fn add_pressure_changes(&mut self, changes: &BTreeMap<String, f64>) {
        for (pressure, delta) in changes {
            self.modifications.push(DiscreteModification {
                pressure_id: pressure.clone(),
                delta: *delta,
                source: self.source.clone(),
            });
        }
    }

    /// Like `add_pressure_changes`, but the changes are dropped if any of
    /// `relationships` is refused when the output is applied.
    pub fn add_pressure_changes_if_formed(&mut self, changes: &BTreeMap<String, f64>, relationships: &[RelationshipId]) {
        let start = self.modifications.len();
        self.add_pressure_changes(changes);
        for index in start..self.modifications.len() {
            self.contingent.extend(relationships.iter().map(|id| (index, *id)));
        }
    }

    /// Remove modifications that depended on a refused relationship.
    pub fn drop_contingent(&mut self, rejected: &[RelationshipId]) -> usize {
        let void: BTreeSet<usize> = self.contingent.iter()
            .filter(|(_, id)| rejected.contains(id))
            .map(|(index, _)| *index)
            .collect();
        if void.is_empty() {
            return 0;
        }
        let mut index = 0;
        self.modifications.retain(|_| {
            let keep = !void.contains(&index);
            index += 1;
            keep
        });
        self.contingent.clear();
        void.len()
    }
}

/// Defaults needed while building entities.
pub trait KindDefaults {
    fn default_status(&self, kind: &str) -> Option<&str>;
}

/// Resolve specs against bindings and the snapshot, appending to `out`.
///
/// Created entities and relationships get ids immediately; their ids are
/// returned so the caller can list them on the narrating event.
pub fn resolve_specs(
    specs: &[MutationSpec],
    bindings: &mut Bindings,
    snapshot: &EntityGraph,
    defaults: &impl KindDefaults,
    ids: &mut IdGenerators,
    tick: u64,
    rng: &mut impl Rng,
    out: &mut Vec<Mutation>,
) -> Result<Created, UnitFault> {
    let mut created = Created::default();
    for spec in specs {
        match spec {
            MutationSpec::AddTag { entity, tag } => {
                let entity = bindings.resolve(entity)?;
                out.push(Mutation::AddTag { entity, tag: tag.clone() });
            }
            MutationSpec::RemoveTag { entity, tag } => {
                let entity = bindings.resolve(entity)?;
                out.push(Mutation::RemoveTag { entity, tag: tag.clone() });
            }
            MutationSpec::SetStatus { entity, status } => {
                let entity = bindings.resolve(entity)?;
                out.push(Mutation::SetStatus { entity, status: status.clone() });
            }
            MutationSpec::AdjustProminence { entity, delta } => {
                let entity = bindings.resolve(entity)?;
                out.push(Mutation::AdjustProminence { entity, delta: *delta });
            }
            MutationSpec::CreateEntity { entity: spec } => {
                let id = ids.next_entity();
                let entity = spec.build(id, defaults.default_status(&spec.kind), bindings, snapshot, tick, rng);
                bindings.created.insert(spec.reference.trim_start_matches('$').to_string(), id);
                created.entities.push(id);
                out.push(Mutation::CreateEntity(entity));
            }
            MutationSpec::FormRelationship { relationship } => {
                let src = bindings.resolve(&relationship.src)?;
                let dst = bindings.resolve(&relationship.dst)?;
                let id = ids.next_relationship();
                let mut rel = Relationship::new(id, src, dst, relationship.kind.clone(), tick);
                rel.strength = relationship.strength;
                created.relationships.push(id);
                out.push(Mutation::FormRelationship(rel));
            }
            MutationSpec::ArchiveRelationships { kind, src, dst } => {
                let src = bindings.resolve(src)?;
                let dst = match dst {
                    Some(r) => Some(bindings.resolve(r)?),
                    None => None,
                };
                for rel in snapshot.active_relationships_of(src, Some(kind.as_str())) {
                    if dst.map_or(true, |d| rel.joins(src, d)) {
                        created.archived.push(rel.id);
                        out.push(Mutation::ArchiveRelationship { id: rel.id });
                    }
                }
            }
        }
    }
    Ok(created)
}

/// Ids produced while resolving one list of specs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Created {
    pub entities: Vec<EntityId>,
    pub relationships: Vec<RelationshipId>,
    pub archived: Vec<RelationshipId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct NoDefaults;
    impl KindDefaults for NoDefaults {
        fn default_status(&self, _kind: &str) -> Option<&str> {
            Some("active")
        }
    }

    #[test]
    fn test_entity_ref_parsing() {
        assert_eq!(EntityRef::try_from("actor".to_string()), Ok(EntityRef::Actor));
        assert_eq!(EntityRef::try_from("$target".to_string()), Ok(EntityRef::Target));
        assert_eq!(EntityRef::try_from("$colony".to_string()), Ok(EntityRef::Created("colony".into())));
        assert!(EntityRef::try_from("colony".to_string()).is_err());
        assert!(EntityRef::try_from("$".to_string()).is_err());
        assert_eq!(String::from(EntityRef::Created("x".into())), "$x");
    }

    #[test]
    fn test_resolve_creates_and_links() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "location", "region", "Vale", 0).with_culture("reed"));
        let specs: Vec<MutationSpec> = serde_json::from_str(r#"[
            {"op":"createEntity","entity":{"ref":"colony","kind":"location","subtype":"colony","name":"Colony {n}","inheritCultureFrom":"target"}},
            {"op":"formRelationship","relationship":{"kind":"adjacent_to","src":"$colony","dst":"target","strength":0.5}},
            {"op":"addTag","entity":"$colony","tag":"frontier"}
        ]"#).unwrap();

        let mut ids = IdGenerators::new();
        ids.entity = crate::ids::IdGenerator::starting_at(1);
        let mut bindings = Bindings { target: Some(EntityId(0)), ..Bindings::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut out = Vec::new();
        let created = resolve_specs(&specs, &mut bindings, &graph, &NoDefaults, &mut ids, 4, &mut rng, &mut out).unwrap();

        assert_eq!(created.entities, vec![EntityId(1)]);
        assert_eq!(created.relationships, vec![RelationshipId(0)]);
        assert_eq!(out.len(), 3);
        match &out[0] {
            Mutation::CreateEntity(e) => {
                assert_eq!(e.name, "Colony 1");
                assert_eq!(e.status, "active");
                assert_eq!(e.culture.as_deref(), Some("reed"));
                assert_eq!(e.created_at, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[2], Mutation::AddTag { entity: EntityId(1), tag: "frontier".into() });
    }

    #[test]
    fn test_unbound_reference_faults() {
        let graph = EntityGraph::new();
        let specs = vec![MutationSpec::AddTag { entity: EntityRef::Actor, tag: "x".into() }];
        let mut ids = IdGenerators::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut out = Vec::new();
        let err = resolve_specs(&specs, &mut Bindings::default(), &graph, &NoDefaults, &mut ids, 0, &mut rng, &mut out)
            .unwrap_err();
        assert_eq!(err, UnitFault::UnresolvedReference("actor".into()));
    }
}
