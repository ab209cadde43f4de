//! Template selection and instantiation.

use rand::Rng;
use tracing::debug;

use crate::error::UnitFault;
use crate::events::types::render;
use crate::events::{EventKind, HistoryEvent};
use crate::ids::IdGenerators;
use crate::mutation::{resolve_specs, Bindings, Mutation, UnitOutput};
use crate::pressure::{DiscreteModification, ModificationSource};
use crate::sampling::sample_without_replacement;
use crate::simulation::context::{TickContext, UnitRun};
use super::TemplateDef;

/// Templates that may fire this tick with their effective weights.
///
/// A template is eligible when its era-scaled weight is positive, its
/// applicability holds on the snapshot and, if it names a target filter,
/// at least one entity matches. Follow-up-only templates never are.
pub fn eligible_templates<'a>(ctx: &TickContext<'a>) -> Vec<(&'a TemplateDef, f64)> {
    let eval = ctx.eval();
    ctx.config.templates.iter()
        .filter(|t| !t.follow_up_only)
        .filter_map(|t| {
            let weight = t.base_weight * ctx.era.template_modifier(&t.id);
            if weight <= 0.0 || !t.applicability.evaluate(&eval) {
                return None;
            }
            if let Some(filter) = &t.target {
                filter.select(ctx.snapshot).next()?;
            }
            Some((t, weight))
        })
        .collect()
}

/// Sample up to the template budget and instantiate each pick.
pub fn fire_templates(ctx: &TickContext<'_>, ids: &mut IdGenerators, rng: &mut impl Rng) -> Vec<UnitRun> {
    let eligible = eligible_templates(ctx);
    let budget = ctx.config.settings.template_budget;
    let picks = sample_without_replacement(eligible, budget, rng);
    picks.into_iter()
        .map(|template| {
            debug!(tick = ctx.tick, template = %template.id, "template fired");
            UnitRun {
                unit: template.id.clone(),
                result: instantiate(template, ctx, ids, rng),
            }
        })
        .collect()
}

/// Build one template's batch, including its `then` follow-ups.
pub fn instantiate(
    template: &TemplateDef,
    ctx: &TickContext<'_>,
    ids: &mut IdGenerators,
    rng: &mut impl Rng,
) -> Result<UnitOutput, UnitFault> {
    let mut bindings = Bindings::default();
    if let Some(filter) = &template.target {
        let candidates: Vec<_> = filter.select(ctx.snapshot).map(|e| e.id).collect();
        if candidates.is_empty() {
            return Err(UnitFault::Invalid(format!("template '{}' has no target candidates", template.id)));
        }
        bindings.target = Some(candidates[rng.gen_range(0..candidates.len())]);
    }

    let mut out = UnitOutput::new(ModificationSource::TemplateId(template.id.clone()));
    instantiate_into(template, ctx, &mut bindings, ids, rng, &mut out)?;
    Ok(out)
}

fn instantiate_into(
    template: &TemplateDef,
    ctx: &TickContext<'_>,
    bindings: &mut Bindings,
    ids: &mut IdGenerators,
    rng: &mut impl Rng,
    out: &mut UnitOutput,
) -> Result<(), UnitFault> {
    let first_new = out.mutations.len();
    let specs = template.creation.specs();
    let created = resolve_specs(&specs, bindings, ctx.snapshot, ctx.config, ids, ctx.tick, rng, &mut out.mutations)?;

    for (pressure, delta) in &template.pressure_changes {
        out.modifications.push(DiscreteModification {
            pressure_id: pressure.clone(),
            delta: *delta,
            source: ModificationSource::TemplateId(template.id.clone()),
        });
    }

    let target_label = bindings.target
        .and_then(|id| ctx.snapshot.entity(id))
        .map(|e| e.label());
    let new_names: Vec<String> = out.mutations[first_new..].iter()
        .filter_map(|m| match m {
            Mutation::CreateEntity(e) => Some(e.label()),
            _ => None,
        })
        .collect();
    let description = match &template.description {
        Some(text) => {
            let mut vars: Vec<(&str, &str)> = Vec::new();
            if let Some(label) = &target_label {
                vars.push(("target", label.as_str()));
            }
            for (name, id) in &bindings.created {
                if let Some(Mutation::CreateEntity(e)) = out.mutations.iter().find(|m| matches!(m, Mutation::CreateEntity(e) if e.id == *id)) {
                    vars.push((name.as_str(), e.name.as_str()));
                }
            }
            render(text, &vars)
        }
        None => describe(&template.id, target_label.as_deref(), &new_names),
    };

    let event = HistoryEvent::new(
        ctx.tick,
        EventKind::TemplateFired { template_id: template.id.clone(), target: bindings.target },
        description,
    )
    .with_created(created.entities, created.relationships)
    .with_removed(created.archived);
    out.events.push(event);

    for follow_up in &template.then {
        let next = ctx.config.template(follow_up)
            .ok_or_else(|| UnitFault::Invalid(format!("follow-up template '{}' not found", follow_up)))?;
        instantiate_into(next, ctx, bindings, ids, rng, out)?;
    }
    Ok(())
}

fn describe(template: &str, target: Option<&str>, created: &[String]) -> String {
    let mut text = template.replace('_', " ");
    if let Some(target) = target {
        text.push_str(&format!(" at {}", target));
    }
    if !created.is_empty() {
        text.push_str(&format!(": {}", created.join(", ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use crate::config::SimulationConfig;
    use crate::graph::{Entity, EntityGraph};
    use crate::ids::{EntityId, IdGenerator};
    use crate::time::EraDef;

    fn config() -> SimulationConfig {
        let report = SimulationConfig::from_json(r#"{
            "entityKinds": [{"kind": "location", "subtypes": ["region", "colony"], "defaultStatus": "thriving"}],
            "relationshipKinds": [{"kind": "adjacent_to"}],
            "pressures": [{"id": "resource_availability", "initialValue": 15}],
            "templates": [
                {
                    "id": "colony_founding",
                    "applicability": "resource_availability > -20",
                    "target": {"kind": "location", "subtype": "region"},
                    "creation": {
                        "entities": [{"ref": "$colony", "kind": "location", "subtype": "colony", "name": "Colony {n}"}],
                        "relationships": [{"kind": "adjacent_to", "src": "$colony", "dst": "target"}]
                    },
                    "pressureChanges": {"resource_availability": -25},
                    "then": ["outpost"],
                    "description": "{colony} is founded beside {target}"
                },
                {
                    "id": "outpost",
                    "creation": {
                        "entities": [{"ref": "$outpost", "kind": "location", "subtype": "colony"}],
                        "relationships": [{"kind": "adjacent_to", "src": "$outpost", "dst": "$colony"}]
                    },
                    "pressureChanges": {"resource_availability": -1}
                }
            ]
        }"#).unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        report.config
    }

    fn region_graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.add_entity(Entity::new(EntityId(0), "location", "region", "Greyvale", 0));
        graph
    }

    #[test]
    fn test_eligibility_follows_pressure_gate() {
        let config = config();
        let graph = region_graph();
        let era = EraDef::new("expansion");
        let mut pressures = BTreeMap::new();
        pressures.insert("resource_availability".to_string(), -10.0);
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        let ids: Vec<&str> = eligible_templates(&ctx).iter().map(|(t, _)| t.id.as_str()).collect();
        assert_eq!(ids, vec!["colony_founding"]);

        pressures.insert("resource_availability".to_string(), -20.0);
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        assert!(eligible_templates(&ctx).is_empty());
    }

    #[test]
    fn test_child_needing_parent_names_only_runs_as_follow_up() {
        let config = config();
        assert!(config.template("outpost").unwrap().follow_up_only);
        assert!(!config.template("colony_founding").unwrap().follow_up_only);

        let graph = region_graph();
        let era = EraDef::new("expansion");
        let mut pressures = BTreeMap::new();
        for value in [15.0, -30.0] {
            pressures.insert("resource_availability".to_string(), value);
            let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
            assert!(eligible_templates(&ctx).iter().all(|(t, _)| t.id != "outpost"));
        }
    }

    #[test]
    fn test_era_modifier_zero_excludes() {
        let config = config();
        let graph = region_graph();
        let mut era = EraDef::new("famine");
        era.template_weight_modifiers.insert("colony_founding".into(), 0.0);
        let pressures: BTreeMap<String, f64> = [("resource_availability".to_string(), 15.0)].into_iter().collect();
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 0 };
        assert!(eligible_templates(&ctx).is_empty());
    }

    #[test]
    fn test_instantiate_with_follow_up() {
        let config = config();
        let graph = region_graph();
        let era = EraDef::new("expansion");
        let pressures: BTreeMap<String, f64> = [("resource_availability".to_string(), 15.0)].into_iter().collect();
        let ctx = TickContext { config: &config, snapshot: &graph, pressures: &pressures, era: &era, tick: 5 };
        let mut ids = IdGenerators::new();
        ids.entity = IdGenerator::starting_at(1);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let template = config.template("colony_founding").unwrap();
        let out = instantiate(template, &ctx, &mut ids, &mut rng).unwrap();

        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].description, "Colony 1 is founded beside Greyvale");
        assert_eq!(out.events[0].entities_created, vec![EntityId(1)]);
        assert_eq!(out.events[1].entities_created, vec![EntityId(2)]);
        let sources: Vec<&str> = out.modifications.iter().map(|m| m.source.id()).collect();
        assert_eq!(sources, vec!["colony_founding", "outpost"]);
        let statuses: Vec<&str> = out.mutations.iter().filter_map(|m| match m {
            Mutation::CreateEntity(e) => Some(e.status.as_str()),
            _ => None,
        }).collect();
        assert_eq!(statuses, vec!["thriving", "thriving"]);
    }
}
