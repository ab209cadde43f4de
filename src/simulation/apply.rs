//! Committing buffered unit output to the live graph.
//!
//! Mutations land in the order they were produced. Relationship formation
//! is checked against component caps on the live graph, so two units that
//! each fit on the snapshot cannot jointly break a cap.

use tracing::debug;

use crate::config::SimulationConfig;
use crate::events::EventKind;
use crate::graph::{EntityGraph, PROMINENCE_MAX};
use crate::ids::RelationshipId;
use crate::mutation::{Mutation, UnitOutput};

/// What happened while applying one unit's output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Relationships refused because of a cap or a missing endpoint.
    pub rejected: Vec<RelationshipId>,
    /// Mutations that named entities or relationships that do not exist.
    pub skipped: usize,
    /// Pressure changes dropped with their refused relationships.
    pub voided: usize,
}

/// Apply `out.mutations` to `graph`, then strip refused relationships
/// from the output's events and drop the pressure changes that hung on them.
pub fn apply_output(graph: &mut EntityGraph, config: &SimulationConfig, out: &mut UnitOutput, tick: u64) -> ApplyReport {
    let mut report = ApplyReport::default();
    for mutation in out.mutations.drain(..) {
        if apply_mutation(graph, config, mutation, tick, &mut report) {
            report.applied += 1;
        }
    }

    if !report.rejected.is_empty() {
        let rejected = &report.rejected;
        out.events.retain(|event| match &event.kind {
            EventKind::RelationshipFormed { relationship, .. } => !rejected.contains(relationship),
            _ => true,
        });
        for event in &mut out.events {
            event.relationships_created.retain(|id| !rejected.contains(id));
        }
        report.voided = out.drop_contingent(&report.rejected);
    }
    report
}

fn apply_mutation(graph: &mut EntityGraph, config: &SimulationConfig, mutation: Mutation, tick: u64, report: &mut ApplyReport) -> bool {
    match mutation {
        Mutation::AddTag { entity, tag } => {
            let Some(e) = graph.entity_mut(entity) else { return skip(report) };
            for conflict in config.conflicting_tags(&tag) {
                e.tags.remove(conflict);
            }
            e.tags.insert(tag);
            e.updated_at = tick;
        }
        Mutation::RemoveTag { entity, tag } => {
            let Some(e) = graph.entity_mut(entity) else { return skip(report) };
            if e.tags.remove(&tag) {
                e.updated_at = tick;
            }
        }
        Mutation::SetStatus { entity, status } => {
            let Some(e) = graph.entity_mut(entity) else { return skip(report) };
            if config.is_terminal_status(&e.kind, &status) && e.temporal.end_tick.is_none() {
                e.temporal.end_tick = Some(tick);
            }
            e.status = status;
            e.updated_at = tick;
        }
        Mutation::AdjustProminence { entity, delta } => {
            let Some(e) = graph.entity_mut(entity) else { return skip(report) };
            e.prominence = (e.prominence + delta).clamp(0.0, PROMINENCE_MAX);
        }
        Mutation::EndEntity { entity } => {
            let Some(e) = graph.entity_mut(entity) else { return skip(report) };
            if e.temporal.end_tick.is_none() {
                e.temporal.end_tick = Some(tick);
                e.updated_at = tick;
            }
        }
        Mutation::CreateEntity(mut entity) => {
            entity.prominence = entity.prominence.clamp(0.0, PROMINENCE_MAX);
            let id = entity.id;
            if !graph.add_entity(entity) {
                debug!(tick, entity = %id, "entity id already taken");
                return skip(report);
            }
        }
        Mutation::FormRelationship(rel) => {
            if let Some(cap) = config.max_component_size(&rel.kind) {
                if graph.contains(rel.src) && graph.contains(rel.dst) && graph.would_exceed_cap(&rel.kind, rel.src, rel.dst, cap) {
                    debug!(tick, relationship = %rel.id, kind = %rel.kind, cap, "relationship rejected by component cap");
                    report.rejected.push(rel.id);
                    return false;
                }
            }
            let id = rel.id;
            if !graph.add_relationship(rel) {
                debug!(tick, relationship = %id, "relationship endpoints missing");
                report.rejected.push(id);
                return false;
            }
        }
        Mutation::ArchiveRelationship { id } => {
            if !graph.archive_relationship(id, tick) {
                return false;
            }
        }
        Mutation::SetStrength { id, strength } => {
            let Some(rel) = graph.relationship_mut(id) else { return skip(report) };
            if !rel.is_active() {
                return false;
            }
            rel.strength = Some(strength);
            rel.updated_at = tick;
        }
    }
    true
}

fn skip(report: &mut ApplyReport) -> bool {
    report.skipped += 1;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RelationshipKindDef, TagDef};
    use crate::events::HistoryEvent;
    use crate::graph::{Entity, Relationship};
    use crate::ids::EntityId;
    use crate::pressure::ModificationSource;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.relationship_kinds.push(RelationshipKindDef {
            kind: "allied_with".into(),
            max_component_size: Some(2),
            ..RelationshipKindDef::default()
        });
        config.tag_registry.push(TagDef {
            tag: "cleansed".into(),
            conflicts_with: vec!["corrupted".into()],
            ..TagDef::default()
        });
        config
    }

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        for i in 0..3 {
            graph.add_entity(Entity::new(EntityId(i), "faction", "", format!("F{}", i), 0).with_tag("corrupted"));
        }
        graph
    }

    fn formed(id: u64, src: u64, dst: u64) -> (Mutation, HistoryEvent) {
        let rel = Relationship::new(RelationshipId(id), EntityId(src), EntityId(dst), "allied_with", 1);
        let event = HistoryEvent::new(1, EventKind::RelationshipFormed {
            relationship: rel.id,
            kind: rel.kind.clone(),
            src: rel.src,
            dst: rel.dst,
            cause: "pact".into(),
        }, "pact").with_created(Vec::new(), vec![rel.id]);
        (Mutation::FormRelationship(rel), event)
    }

    #[test]
    fn test_cap_checked_against_live_graph() {
        let config = config();
        let mut graph = graph();
        let mut out = UnitOutput::new(ModificationSource::SystemId("pacts".into()));
        for (m, e) in [formed(0, 0, 1), formed(1, 1, 2)] {
            out.mutations.push(m);
            out.events.push(e);
        }

        let report = apply_output(&mut graph, &config, &mut out, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, vec![RelationshipId(1)]);
        assert!(graph.relationship(RelationshipId(1)).is_none());
        assert_eq!(out.events.len(), 1);
        assert!(graph.components("allied_with").iter().all(|c| c.len() <= 2));
    }

    #[test]
    fn test_refused_formation_voids_its_pressure_changes() {
        let config = config();
        let mut graph = graph();
        let mut out = UnitOutput::new(ModificationSource::SystemId("pacts".into()));
        let changes = std::collections::BTreeMap::from([("tension".to_string(), 1.0)]);
        for (m, e) in [formed(0, 0, 1), formed(1, 1, 2)] {
            let Mutation::FormRelationship(rel) = &m else { unreachable!() };
            let id = rel.id;
            out.mutations.push(m);
            out.events.push(e);
            out.add_pressure_changes_if_formed(&changes, &[id]);
        }
        out.add_pressure_changes(&changes);

        let report = apply_output(&mut graph, &config, &mut out, 1);
        assert_eq!(report.rejected, vec![RelationshipId(1)]);
        assert_eq!(report.voided, 1);
        assert_eq!(out.modifications.len(), 2);
        assert_eq!(out.modifications.iter().map(|m| m.delta).sum::<f64>(), 2.0);
    }

    #[test]
    fn test_conflicting_tag_replaced_and_terminal_status_ends() {
        let mut config = config();
        config.entity_kinds.push(crate::config::EntityKindDef {
            kind: "faction".into(),
            terminal_statuses: vec!["fallen".into()],
            ..Default::default()
        });
        let mut graph = graph();
        let mut out = UnitOutput::new(ModificationSource::SystemId("rites".into()));
        out.mutations.push(Mutation::AddTag { entity: EntityId(0), tag: "cleansed".into() });
        out.mutations.push(Mutation::SetStatus { entity: EntityId(1), status: "fallen".into() });
        out.mutations.push(Mutation::AdjustProminence { entity: EntityId(2), delta: 9.0 });
        out.mutations.push(Mutation::RemoveTag { entity: EntityId(42), tag: "x".into() });

        let report = apply_output(&mut graph, &config, &mut out, 4);
        assert_eq!(report.skipped, 1);
        let e0 = graph.entity(EntityId(0)).unwrap();
        assert!(e0.has_tag("cleansed") && !e0.has_tag("corrupted"));
        assert_eq!(graph.entity(EntityId(1)).unwrap().temporal.end_tick, Some(4));
        assert_eq!(graph.entity(EntityId(2)).unwrap().prominence, PROMINENCE_MAX);
    }
}
