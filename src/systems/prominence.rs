//! Built-in prominence dynamics.
//!
//! Every tick each entity loses `decayRate / (1 + degree)` and is pulled
//! toward the mean prominence of its neighbors by `reflectedGlory`. Rung
//! crossings are narrated once the tick's mutations have landed.

use crate::events::{EventKind, HistoryEvent};
use crate::graph::{Entity, EntityGraph};
use crate::mutation::{Mutation, UnitOutput};
use crate::pressure::ModificationSource;
use crate::simulation::context::TickContext;
use crate::time::ERA_KIND;

/// Unit id used for prominence output and logging.
pub const PROMINENCE_UNIT: &str = "prominence";

fn in_scope(ctx: &TickContext<'_>, entity: &Entity) -> bool {
    let kinds = &ctx.config.settings.prominence.kinds;
    !entity.is_ended() && entity.kind != ERA_KIND && (kinds.is_empty() || kinds.contains(&entity.kind))
}

/// Prominence change for one entity, before clamping.
pub fn prominence_delta(graph: &EntityGraph, entity: &Entity, decay_rate: f64, glory: f64) -> f64 {
    let degree = graph.active_degree(entity.id);
    let decay = decay_rate / (1.0 + degree as f64);

    let neighbors: Vec<f64> = graph.neighbors(entity.id, None)
        .into_iter()
        .filter_map(|id| graph.entity(id))
        .filter(|n| n.kind != ERA_KIND)
        .map(|n| n.prominence)
        .collect();
    let reflected = if neighbors.is_empty() {
        0.0
    } else {
        let mean = neighbors.iter().sum::<f64>() / neighbors.len() as f64;
        glory * (mean - entity.prominence)
    };
    reflected - decay
}

/// Adjustments for every entity in scope, read from the snapshot.
pub fn run_prominence(ctx: &TickContext<'_>) -> Option<UnitOutput> {
    let settings = &ctx.config.settings.prominence;
    if !settings.enabled {
        return None;
    }
    let mut out = UnitOutput::new(ModificationSource::SystemId(PROMINENCE_UNIT.to_string()));
    for entity in ctx.snapshot.entities().filter(|e| in_scope(ctx, e)) {
        let delta = prominence_delta(ctx.snapshot, entity, settings.decay_rate, settings.reflected_glory);
        if delta != 0.0 {
            out.mutations.push(Mutation::AdjustProminence { entity: entity.id, delta });
        }
    }
    Some(out)
}

/// One `prominenceShifted` event per entity whose rung differs from the snapshot.
pub fn rung_shifts(before: &EntityGraph, after: &EntityGraph, tick: u64) -> Vec<HistoryEvent> {
    let mut events = Vec::new();
    for entity in after.entities().filter(|e| e.kind != ERA_KIND) {
        let Some(old) = before.entity(entity.id) else { continue };
        let (from, to) = (old.rung(), entity.rung());
        if from == to {
            continue;
        }
        let rising = to > from;
        let description = format!(
            "{} {} from {} to {}",
            entity.label(),
            if rising { "rises" } else { "falls" },
            from,
            to,
        );
        events.push(HistoryEvent::new(tick, EventKind::ProminenceShifted { entity: entity.id, from, to, rising }, description));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::config::SimulationConfig;
    use crate::graph::{ProminenceRung, Relationship};
    use crate::ids::{EntityId, RelationshipId};
    use crate::time::EraDef;

    #[test]
    fn test_decay_softened_by_degree() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "npc", "", "Hermit", 0).with_prominence(2.0));
        graph.add_entity(Entity::new(EntityId(1), "npc", "", "Queen", 0).with_prominence(4.0));
        graph.add_entity(Entity::new(EntityId(2), "npc", "", "Page", 0).with_prominence(2.0));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(1), EntityId(2), "serves", 0));

        let hermit = graph.entity(EntityId(0)).unwrap();
        assert!((prominence_delta(&graph, hermit, 0.02, 0.05) + 0.02).abs() < 1e-12);

        // Page: decay 0.01, pulled up by 0.05 * (4 - 2).
        let page = graph.entity(EntityId(2)).unwrap();
        assert!((prominence_delta(&graph, page, 0.02, 0.05) - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_run_skips_eras_and_disabled() {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "era", "dawn", "Dawn", 0));
        graph.add_entity(Entity::new(EntityId(1), "npc", "", "Ilse", 0));
        let mut config = SimulationConfig::default();
        let pressures = BTreeMap::new();
        let era = EraDef::new("dawn");
        {
            let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
            let out = run_prominence(&ctx).unwrap();
            assert_eq!(out.mutations.len(), 1);
            assert!(matches!(out.mutations[0], Mutation::AdjustProminence { entity: EntityId(1), .. }));
        }
        config.settings.prominence.enabled = false;
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        assert!(run_prominence(&ctx).is_none());
    }

    #[test]
    fn test_rung_shift_events() {
        let mut before = EntityGraph::new();
        before.add_entity(Entity::new(EntityId(0), "npc", "", "Vey", 0).with_prominence(1.95));
        let mut after = before.clone();
        if let Some(e) = after.entity_mut(EntityId(0)) {
            e.prominence = 2.05;
        }
        let events = rung_shifts(&before, &after, 8);
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::ProminenceShifted { from, to, rising, .. } => {
                assert_eq!((*from, *to, *rising), (ProminenceRung::Marginal, ProminenceRung::Recognized, true));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
