//! Actions: entity-scoped choices made by prominent actors.
//!
//! Each tick every actor that passes `CanAct` gets one roll against
//! `settings.actionRate`. An actor that acts picks one applicable action by
//! era-scaled weight and, when the action needs one, a target. Actions
//! flagged `settingAct` are reserved for actors of at least recognized
//! standing. At most `settings.actionBudget` actions happen per tick.

use std::collections::BTreeMap;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::config::References;
use crate::error::UnitFault;
use crate::events::types::render;
use crate::events::{EventKind, HistoryEvent};
use crate::graph::{CanAct, Entity};
use crate::ids::{EntityId, IdGenerators};
use crate::mutation::{resolve_specs, Bindings, MutationSpec, UnitOutput};
use crate::pressure::ModificationSource;
use crate::predicate::{EntityFilter, Predicate};
use crate::sampling::{chance, weighted_index};
use crate::simulation::context::{TickContext, UnitRun};
use crate::time::ERA_KIND;

fn default_weight() -> f64 {
    1.0
}

/// Who an action is aimed at.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default)]
    pub filter: EntityFilter,
    /// Only neighbors of the actor over this relationship kind.
    #[serde(default)]
    pub via: Option<String>,
    /// Skip targets already linked to the actor by this relationship kind.
    #[serde(default)]
    pub exclude_linked: Option<String>,
}

impl TargetSpec {
    /// Valid targets for `actor`, in id order.
    pub fn candidates(&self, ctx: &TickContext<'_>, actor: &Entity) -> Vec<EntityId> {
        let graph = ctx.snapshot;
        let pool: Vec<&Entity> = match &self.via {
            Some(kind) => graph.neighbors(actor.id, Some(kind))
                .into_iter()
                .filter_map(|id| graph.entity(id))
                .collect(),
            None => graph.entities().collect(),
        };
        pool.into_iter()
            .filter(|e| e.id != actor.id && self.filter.matches(e))
            .filter(|e| {
                self.exclude_linked.as_deref()
                    .map_or(true, |kind| !graph.has_active_between(actor.id, e.id, kind))
            })
            .map(|e| e.id)
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Resolved with `actor` and, if present, `target` bound.
    #[serde(default)]
    pub mutations: Vec<MutationSpec>,
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
}

/// Configured action.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    pub id: String,
    #[serde(default)]
    pub actor: EntityFilter,
    #[serde(default)]
    pub target: Option<TargetSpec>,
    #[serde(default)]
    pub applicability: Predicate,
    #[serde(default = "default_weight")]
    pub base_weight: f64,
    #[serde(default)]
    pub outcome: Outcome,
    /// Creates artifacts, rules or occurrences.
    #[serde(default)]
    pub setting_act: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ActionDef {
    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        refs.filter(&self.actor);
        if let Some(target) = &self.target {
            refs.filter(&target.filter);
            refs.relationship_kinds.extend(target.via.as_deref());
            refs.relationship_kinds.extend(target.exclude_linked.as_deref());
        }
        refs.predicate(&self.applicability);
        refs.mutations(&self.outcome.mutations);
        refs.pressure_changes(&self.outcome.pressure_changes);
    }

    fn allows(&self, actor: &Entity) -> bool {
        self.actor.matches(actor) && (!self.setting_act || actor.can_perform_setting_acts())
    }
}

/// Entities allowed to act this tick, in id order.
pub fn actors<'a>(ctx: &TickContext<'a>) -> impl Iterator<Item = &'a Entity> + 'a {
    let min = ctx.config.settings.min_actor_prominence;
    ctx.snapshot.entities().filter(move |e| e.kind != ERA_KIND && e.can_act(min))
}

/// Roll every actor and perform up to the action budget.
pub fn run_actions(ctx: &TickContext<'_>, ids: &mut IdGenerators, rng: &mut impl Rng) -> Vec<UnitRun> {
    let settings = &ctx.config.settings;
    let mut runs = Vec::new();
    if settings.action_budget == 0 || ctx.config.actions.is_empty() {
        return runs;
    }

    let eval = ctx.eval();
    let open: Vec<(&ActionDef, f64)> = ctx.config.actions.iter()
        .map(|a| (a, a.base_weight * ctx.era.action_modifier(&a.id)))
        .filter(|(a, weight)| *weight > 0.0 && a.applicability.evaluate(&eval))
        .collect();
    if open.is_empty() {
        return runs;
    }

    for actor in actors(ctx) {
        if runs.len() >= settings.action_budget {
            break;
        }
        if !chance(settings.action_rate, rng) {
            continue;
        }

        let mut options = Vec::new();
        let mut weights = Vec::new();
        for (action, weight) in &open {
            if !action.allows(actor) {
                continue;
            }
            let targets = match &action.target {
                Some(spec) => {
                    let found = spec.candidates(ctx, actor);
                    if found.is_empty() {
                        continue;
                    }
                    Some(found)
                }
                None => None,
            };
            options.push((*action, targets));
            weights.push(*weight);
        }
        let Some(pick) = weighted_index(&weights, rng) else { continue };
        let (action, targets) = &options[pick];
        let target = targets.as_ref().map(|t| t[rng.gen_range(0..t.len())]);

        debug!(tick = ctx.tick, action = %action.id, actor = %actor.id, "action performed");
        runs.push(UnitRun {
            unit: action.id.clone(),
            result: perform(action, actor, target, ctx, ids, rng),
        });
    }
    runs
}

/// Resolve one action's outcome for a chosen actor and target.
pub fn perform(
    action: &ActionDef,
    actor: &Entity,
    target: Option<EntityId>,
    ctx: &TickContext<'_>,
    ids: &mut IdGenerators,
    rng: &mut impl Rng,
) -> Result<UnitOutput, UnitFault> {
    let mut out = UnitOutput::new(ModificationSource::ActionId(action.id.clone()));
    let mut bindings = Bindings { actor: Some(actor.id), target, ..Bindings::default() };
    let created = resolve_specs(&action.outcome.mutations, &mut bindings, ctx.snapshot, ctx.config, ids, ctx.tick, rng, &mut out.mutations)?;
    out.add_pressure_changes_if_formed(&action.outcome.pressure_changes, &created.relationships);

    let actor_label = actor.label();
    let target_label = match target {
        Some(id) => Some(
            ctx.snapshot.entity(id)
                .map(|e| e.label())
                .ok_or_else(|| UnitFault::MissingEntity(id.to_string()))?,
        ),
        None => None,
    };
    let description = match &action.description {
        Some(text) => {
            let mut vars = vec![("actor", actor_label.as_str())];
            if let Some(label) = &target_label {
                vars.push(("target", label.as_str()));
            }
            render(text, &vars)
        }
        None => {
            let verb = action.id.replace('_', " ");
            match &target_label {
                Some(label) => format!("{} performs {} on {}", actor_label, verb, label),
                None => format!("{} performs {}", actor_label, verb),
            }
        }
    };

    out.events.push(
        HistoryEvent::new(ctx.tick, EventKind::ActionPerformed { action_id: action.id.clone(), actor: actor.id, target }, description)
            .with_created(created.entities, created.relationships)
            .with_removed(created.archived),
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use crate::config::SimulationConfig;
    use crate::graph::{EntityGraph, Relationship};
    use crate::ids::RelationshipId;
    use crate::mutation::Mutation;
    use crate::pressure::DiscreteModification;
    use crate::time::EraDef;

    fn config(action_rate: f64) -> SimulationConfig {
        let json = format!(r#"{{
            "entityKinds": [{{"kind": "npc"}}, {{"kind": "artifact"}}],
            "relationshipKinds": [{{"kind": "rival_of"}}, {{"kind": "holds"}}, {{"kind": "knows"}}],
            "pressures": [{{"id": "conflict", "initialValue": 0}}],
            "actions": [
                {{
                    "id": "declare_rivalry",
                    "actor": {{"kind": "npc"}},
                    "target": {{"filter": {{"kind": "npc"}}, "via": "knows", "excludeLinked": "rival_of"}},
                    "outcome": {{
                        "mutations": [{{"op": "formRelationship", "relationship": {{"kind": "rival_of", "src": "actor", "dst": "target"}}}}],
                        "pressureChanges": {{"conflict": 2}}
                    }},
                    "description": "{{actor}} turns on {{target}}"
                }},
                {{
                    "id": "forge_relic",
                    "actor": {{"kind": "npc"}},
                    "settingAct": true,
                    "outcome": {{
                        "mutations": [
                            {{"op": "createEntity", "entity": {{"ref": "$relic", "kind": "artifact", "name": "Relic {{n}}"}}}},
                            {{"op": "formRelationship", "relationship": {{"kind": "holds", "src": "actor", "dst": "$relic"}}}}
                        ]
                    }}
                }}
            ],
            "settings": {{"actionRate": {}, "actionBudget": 4}}
        }}"#, action_rate);
        let report = SimulationConfig::from_json(&json).unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        report.config
    }

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "npc", "", "Aldric", 0).with_prominence(1.5));
        graph.add_entity(Entity::new(EntityId(1), "npc", "", "Brisa", 0).with_prominence(1.2));
        graph.add_entity(Entity::new(EntityId(2), "npc", "", "Forgotten One", 0).with_prominence(0.4));
        graph.add_relationship(Relationship::new(RelationshipId(0), EntityId(0), EntityId(1), "knows", 0));
        graph
    }

    #[test]
    fn test_marginal_actors_only_rival() {
        let config = config(1.0);
        let graph = graph();
        let pressures = BTreeMap::new();
        let era = EraDef::new("age");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 6 };
        let mut ids = IdGenerators::new();

        let runs = run_actions(&ctx, &mut ids, &mut ChaCha8Rng::seed_from_u64(9));
        // The forgotten npc may not act; the setting act needs recognized standing.
        assert_eq!(runs.len(), 2);
        for run in &runs {
            assert_eq!(run.unit, "declare_rivalry");
            let out = run.result.as_ref().unwrap();
            assert_eq!(out.modifications, vec![DiscreteModification {
                pressure_id: "conflict".into(),
                delta: 2.0,
                source: ModificationSource::ActionId("declare_rivalry".into()),
            }]);
            assert!(matches!(out.mutations[0], Mutation::FormRelationship(_)));
        }
        assert_eq!(runs[0].result.as_ref().unwrap().events[0].description, "Aldric turns on Brisa");
    }

    #[test]
    fn test_setting_act_needs_recognized_actor() {
        let config = config(1.0);
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "npc", "", "Seer", 0).with_prominence(2.5));
        let pressures = BTreeMap::new();
        let era = EraDef::new("age");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 6 };
        let mut ids = IdGenerators::new();
        ids.entity = crate::ids::IdGenerator::starting_at(1);

        let runs = run_actions(&ctx, &mut ids, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].unit, "forge_relic");
        let out = runs[0].result.as_ref().unwrap();
        assert_eq!(out.events[0].entities_created, vec![EntityId(1)]);
    }

    #[test]
    fn test_refused_rivalry_voids_action_pressure() {
        let mut config = config(1.0);
        for kind in config.relationship_kinds.iter_mut().filter(|k| k.kind == "rival_of") {
            kind.max_component_size = Some(1);
        }
        let mut graph = graph();
        let pressures = BTreeMap::new();
        let era = EraDef::new("age");
        let snapshot = graph.clone();
        let ctx = TickContext { config: &config, snapshot: &snapshot, pressures: &pressures, era: &era, tick: 6 };
        let mut ids = IdGenerators::new();
        ids.relationship = crate::ids::IdGenerator::starting_at(1);
        let action = config.actions.iter().find(|a| a.id == "declare_rivalry").unwrap();
        let actor = snapshot.entity(EntityId(0)).unwrap();

        let mut out = perform(action, actor, Some(EntityId(1)), &ctx, &mut ids, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();
        assert_eq!(out.modifications.len(), 1);
        let report = crate::simulation::apply::apply_output(&mut graph, &config, &mut out, 6);
        assert_eq!(report.rejected, vec![RelationshipId(1)]);
        assert!(out.modifications.is_empty());
        assert!(out.events[0].relationships_created.is_empty());
    }

    #[test]
    fn test_zero_rate_means_no_actions() {
        let config = config(0.0);
        let graph = graph();
        let pressures = BTreeMap::new();
        let era = EraDef::new("age");
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 6 };
        assert!(run_actions(&ctx, &mut IdGenerators::new(), &mut ChaCha8Rng::seed_from_u64(9)).is_empty());
    }
}
