//! Templates: applicability-gated, weighted batch generators.
//!
//! A template creates a pre-connected cluster of entities and relationships
//! around an optional target, may chain follow-up templates through `then`,
//! and attributes its pressure changes to its own id.

pub mod instantiate;

pub use instantiate::{eligible_templates, fire_templates, instantiate};

use std::collections::{BTreeMap, BTreeSet};
use serde::Deserialize;

use crate::mutation::{EntitySpec, MutationSpec, RelationshipSpec};
use crate::predicate::{EntityFilter, Predicate};

fn default_weight() -> f64 {
    1.0
}

/// What a template builds, in instantiation order: entities, then
/// relationships, then any further mutations.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationSpec {
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
    #[serde(default)]
    pub mutations: Vec<MutationSpec>,
}

impl CreationSpec {
    pub fn specs(&self) -> Vec<MutationSpec> {
        let entities = self.entities.iter().cloned().map(|entity| MutationSpec::CreateEntity { entity });
        let relationships = self.relationships.iter().cloned().map(|relationship| MutationSpec::FormRelationship { relationship });
        entities.chain(relationships).chain(self.mutations.iter().cloned()).collect()
    }
}

/// Configured template.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDef {
    pub id: String,
    #[serde(default)]
    pub applicability: Predicate,
    /// Existing entity the batch attaches to; the template is ineligible
    /// while nothing matches.
    #[serde(default)]
    pub target: Option<EntityFilter>,
    #[serde(default = "default_weight")]
    pub base_weight: f64,
    #[serde(default, alias = "creationSpec")]
    pub creation: CreationSpec,
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
    /// Follow-up templates instantiated into the same batch.
    #[serde(default)]
    pub then: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Reads names bound by a parent batch, so it only runs through `then`.
    #[serde(skip)]
    pub follow_up_only: bool,
}

impl TemplateDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            applicability: Predicate::Always,
            target: None,
            base_weight: 1.0,
            creation: CreationSpec::default(),
            pressure_changes: BTreeMap::new(),
            then: Vec::new(),
            description: None,
            follow_up_only: false,
        }
    }
}

/// First cycle in the `then` graph, as the id path that closes it.
pub fn find_cycle(templates: &[TemplateDef]) -> Option<Vec<String>> {
    let edges: BTreeMap<&str, &[String]> = templates.iter()
        .map(|t| (t.id.as_str(), t.then.as_slice()))
        .collect();
    let mut done: BTreeSet<&str> = BTreeSet::new();

    for template in templates {
        let mut path: Vec<&str> = Vec::new();
        if let Some(cycle) = visit(template.id.as_str(), &edges, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    id: &'a str,
    edges: &BTreeMap<&'a str, &'a [String]>,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|p| *p == id) {
        let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
        cycle.push(id.to_string());
        return Some(cycle);
    }
    if done.contains(id) {
        return None;
    }
    path.push(id);
    for next in edges.get(id).copied().unwrap_or_default() {
        if let Some(cycle) = visit(next.as_str(), edges, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(id);
    None
}
