//! Simulation setup: seed graph loading and pre-flight checks.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::{PersistenceError, SimulationError};
use crate::graph::{Entity, EntityGraph, Relationship};
use crate::ids::{IdGenerator, IdGenerators};
use crate::templates::find_cycle;
use crate::time::{is_era_entity, ERA_CURRENT, ERA_FUTURE, ERA_KIND};

/// The initial world: `{entities: [...], relationships: [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl SeedGraph {
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build the graph, rejecting duplicate ids and dangling endpoints.
    pub fn into_graph(self) -> Result<EntityGraph, SimulationError> {
        let mut graph = EntityGraph::new();
        for entity in self.entities {
            let id = entity.id;
            if !graph.add_entity(entity) {
                return Err(SimulationError::InvalidSeedGraph(format!("duplicate entity id {}", id)));
            }
        }
        let mut seen = BTreeSet::new();
        for rel in self.relationships {
            if !seen.insert(rel.id) {
                return Err(SimulationError::InvalidSeedGraph(format!("duplicate relationship id {}", rel.id)));
            }
            for endpoint in [rel.src, rel.dst] {
                if !graph.contains(endpoint) {
                    return Err(SimulationError::InvalidSeedGraph(format!(
                        "relationship {} references unknown entity {}", rel.id, endpoint,
                    )));
                }
            }
            graph.add_relationship(rel);
        }
        Ok(graph)
    }
}

/// Check the configuration against the seed and build the starting graph.
///
/// Era entities are put in step with the era list: the first era's entity
/// becomes `current`, later eras' entities `future`. Id generators start
/// after the highest seed ids.
pub fn initialize(config: &SimulationConfig, seed: SeedGraph) -> Result<(EntityGraph, IdGenerators), SimulationError> {
    let Some(first) = config.eras.first() else {
        return Err(SimulationError::NoEras);
    };
    if let Some(cycle) = find_cycle(&config.templates) {
        return Err(SimulationError::CyclicTemplateInvocation(cycle));
    }

    let mut graph = seed.into_graph()?;
    if graph.by_kind(ERA_KIND).next().is_none() {
        return Err(SimulationError::MissingEraEntities);
    }

    let era_entities: Vec<_> = graph.by_kind(ERA_KIND).map(|e| e.id).collect();
    for id in era_entities {
        let Some(entity) = graph.entity_mut(id) else { continue };
        if is_era_entity(entity, &first.id) {
            entity.status = ERA_CURRENT.to_string();
        } else if entity.status.is_empty() && config.eras.iter().any(|era| is_era_entity(entity, &era.id)) {
            entity.status = ERA_FUTURE.to_string();
        }
    }

    let ids = IdGenerators {
        entity: IdGenerator::starting_at(graph.next_entity_id()),
        relationship: IdGenerator::starting_at(graph.next_relationship_id()),
    };
    info!(
        entities = graph.entity_count(),
        relationships = graph.relationship_count(),
        eras = config.eras.len(),
        templates = config.templates.len(),
        systems = config.systems.len(),
        "world initialized"
    );
    Ok((graph, ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EntityId, RelationshipId};
    use crate::templates::TemplateDef;
    use crate::time::EraDef;

    fn config() -> SimulationConfig {
        SimulationConfig {
            eras: vec![EraDef::new("dawn"), EraDef::new("dusk")],
            ..SimulationConfig::default()
        }
    }

    fn seed() -> SeedGraph {
        SeedGraph {
            entities: vec![
                Entity::new(EntityId(0), "era", "dawn", "dawn", 0),
                Entity::new(EntityId(1), "era", "dusk", "dusk", 0),
                Entity::new(EntityId(5), "location", "region", "Greyvale", 0),
            ],
            relationships: Vec::new(),
        }
    }

    #[test]
    fn test_initialize_sets_era_statuses_and_ids() {
        let (graph, ids) = initialize(&config(), seed()).unwrap();
        assert_eq!(graph.entity(EntityId(0)).unwrap().status, "current");
        assert_eq!(graph.entity(EntityId(1)).unwrap().status, "future");
        assert_eq!(ids.entity.peek(), 6);
        assert_eq!(ids.relationship.peek(), 0);
    }

    #[test]
    fn test_preflight_errors() {
        let empty = SimulationConfig::default();
        assert_eq!(initialize(&empty, seed()).unwrap_err(), SimulationError::NoEras);

        let mut no_eras = seed();
        no_eras.entities.retain(|e| e.kind != "era");
        assert_eq!(initialize(&config(), no_eras).unwrap_err(), SimulationError::MissingEraEntities);

        let mut cyclic = config();
        let mut a = TemplateDef::new("a");
        a.then = vec!["b".into()];
        let mut b = TemplateDef::new("b");
        b.then = vec!["a".into()];
        cyclic.templates = vec![a, b];
        assert!(matches!(initialize(&cyclic, seed()), Err(SimulationError::CyclicTemplateInvocation(_))));
    }

    #[test]
    fn test_dangling_relationship_rejected() {
        let mut bad = seed();
        bad.relationships.push(Relationship::new(RelationshipId(0), EntityId(5), EntityId(9), "adjacent_to", 0));
        assert!(matches!(initialize(&config(), bad), Err(SimulationError::InvalidSeedGraph(_))));
    }

    #[test]
    fn test_seed_json_defaults() {
        let seed = SeedGraph::from_json(r#"{
            "entities": [{"id": 0, "kind": "era", "name": "dawn"}, {"id": 1, "kind": "npc"}],
            "relationships": [{"id": 0, "src": 1, "dst": 0, "kind": "born_in"}]
        }"#).unwrap();
        assert_eq!(seed.entities[1].prominence, 1.0);
        assert!(seed.relationships[0].is_active());
    }
}
