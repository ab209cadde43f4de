//! War cleanup: wars with no live occurrence behind them are archived.

use serde::Deserialize;

use crate::config::References;
use crate::graph::{Entity, Relationship};
use crate::mutation::{Mutation, UnitOutput};
use super::connection::archived_event;
use super::SystemEnv;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarCleanup {
    pub war_kind: String,
    pub occurrence_kind: String,
    pub participation_kind: String,
    /// Occurrence statuses that count as live; empty means any non-ended.
    pub active_statuses: Vec<String>,
}

impl Default for WarCleanup {
    fn default() -> Self {
        Self {
            war_kind: "at_war_with".to_string(),
            occurrence_kind: "occurrence".to_string(),
            participation_kind: "participant_in".to_string(),
            active_statuses: Vec::new(),
        }
    }
}

impl WarCleanup {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.relationship_kinds.push(&self.war_kind);
        refs.relationship_kinds.push(&self.participation_kind);
        refs.entity_kinds.push(&self.occurrence_kind);
    }

    fn is_live(&self, occurrence: &Entity) -> bool {
        occurrence.kind == self.occurrence_kind
            && !occurrence.is_ended()
            && (self.active_statuses.is_empty() || self.active_statuses.contains(&occurrence.status))
    }

    /// Whether a live occurrence links both sides of the war.
    fn is_backed(&self, env: &SystemEnv<'_>, war: &Relationship) -> bool {
        let graph = env.ctx.snapshot;
        let theirs = graph.neighbors(war.dst, Some(&self.participation_kind));
        graph.neighbors(war.src, Some(&self.participation_kind))
            .into_iter()
            .filter(|id| theirs.binary_search(id).is_ok())
            .filter_map(|id| graph.entity(id))
            .any(|occurrence| self.is_live(occurrence))
    }

    pub fn run(&self, env: &SystemEnv<'_>) -> UnitOutput {
        let mut out = env.output();
        for war in env.ctx.snapshot.relationships().filter(|r| r.is_active() && r.kind == self.war_kind) {
            if self.is_backed(env, war) {
                continue;
            }
            out.mutations.push(Mutation::ArchiveRelationship { id: war.id });
            out.events.push(archived_event(env, war, "ends"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::config::SimulationConfig;
    use crate::graph::EntityGraph;
    use crate::ids::{EntityId, RelationshipId};
    use crate::simulation::context::TickContext;
    use crate::time::EraDef;

    #[test]
    fn test_unbacked_war_archived() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "faction", "", "Iron Pact", 0));
        graph.add_entity(Entity::new(EntityId(1), "faction", "", "Salt Kings", 0));
        graph.add_entity(Entity::new(EntityId(2), "faction", "", "Moss Clan", 0));
        graph.add_entity(Entity::new(EntityId(3), "occurrence", "war", "Salt War", 0).with_status("active"));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(0), EntityId(1), "at_war_with", 0));
        graph.add_relationship(Relationship::new(RelationshipId(1), EntityId(0), EntityId(2), "at_war_with", 0));
        graph.add_relationship(Relationship::new(RelationshipId(2), EntityId(0), EntityId(3), "participant_in", 0));
        graph.add_relationship(Relationship::new(RelationshipId(3), EntityId(1), EntityId(3), "participant_in", 0));

        let config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("e");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 12 };
        let env = SystemEnv { id: "war_cleanup", description: None, ctx: &ctx, modifier: 1.0 };

        let out = WarCleanup::default().run(&env);
        assert_eq!(out.mutations, vec![Mutation::ArchiveRelationship { id: RelationshipId(1) }]);
        assert_eq!(out.events[0].relationships_removed, vec![RelationshipId(1)]);
    }
}
