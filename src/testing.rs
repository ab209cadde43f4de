//! Shared fixtures: a small colony world used by unit, scenario and
//! property tests.
//!
//! The world has two eras and four regions. Of its two pressures,
//! `resource_availability` is moved by templates alone:
//!
//! | Unit                | Effect                                              |
//! |---------------------|-----------------------------------------------------|
//! | `colony_founding`   | −25, needs `resource_availability > -20`            |
//! | `bountiful_harvest` | +30, needs `resource_availability <= -20`           |
//! | `cleansing_fades`   | isolation decay of `cleansed`, window 3, first era  |
//! | `open_trade`        | action linking two locations by `trades_with` (cap 4) |

use std::collections::BTreeMap;

use crate::actions::{ActionDef, Outcome, TargetSpec};
use crate::config::{EngineSettings, EntityKindDef, RelationshipKindDef, SimulationConfig, TagDef};
use crate::graph::{Entity, Relationship};
use crate::ids::{EntityId, RelationshipId};
use crate::mutation::{EntityRef, EntitySpec, MutationSpec, RelationshipSpec};
use crate::predicate::{CompareOp, EntityFilter, Predicate};
use crate::pressure::{FeedbackTerm, PressureDef};
use crate::simulation::SeedGraph;
use crate::systems::{IsolationDecay, SystemDef, SystemKind};
use crate::templates::{CreationSpec, TemplateDef};
use crate::time::{EraDef, ExitCondition};

pub const RESOURCE: &str = "resource_availability";
pub const FOUNDING_THRESHOLD: f64 = -20.0;
pub const FOUNDING_DELTA: f64 = -25.0;
pub const HARVEST_DELTA: f64 = 30.0;
pub const CLEANSED_WINDOW: u32 = 3;
pub const FIRST_ERA_TICKS: u64 = 40;
pub const TRADE_CAP: usize = 4;

/// Isolated cleansed region.
pub const GREYVALE: EntityId = EntityId(2);
/// Cleansed region with a cleansed neighbor (Birchmoor).
pub const ASHFORD: EntityId = EntityId(3);
pub const BIRCHMOOR: EntityId = EntityId(4);
pub const DUSKMERE: EntityId = EntityId(5);

fn pressure_gate(op: CompareOp) -> Predicate {
    Predicate::Pressure { pressure: RESOURCE.to_string(), op, value: FOUNDING_THRESHOLD }
}

fn region() -> EntityFilter {
    EntityFilter { subtype: Some("region".into()), ..EntityFilter::of_kind("location") }
}

fn colony_founding() -> TemplateDef {
    let mut template = TemplateDef::new("colony_founding");
    template.applicability = pressure_gate(CompareOp::Gt);
    template.target = Some(region());
    template.creation = CreationSpec {
        entities: vec![EntitySpec {
            reference: "$colony".into(),
            kind: "location".into(),
            subtype: "colony".into(),
            name: Some("Colony {n}".into()),
            names: Vec::new(),
            status: None,
            tags: Vec::new(),
            prominence: 1.0,
            culture: None,
            inherit_culture_from: Some(EntityRef::Target),
        }],
        relationships: vec![RelationshipSpec {
            kind: "adjacent_to".into(),
            src: EntityRef::Created("colony".into()),
            dst: EntityRef::Target,
            strength: None,
        }],
        mutations: Vec::new(),
    };
    template.pressure_changes = BTreeMap::from([(RESOURCE.to_string(), FOUNDING_DELTA)]);
    template.description = Some("{colony} is founded beside {target}".into());
    template
}

fn bountiful_harvest() -> TemplateDef {
    let mut template = TemplateDef::new("bountiful_harvest");
    template.applicability = pressure_gate(CompareOp::Le);
    template.pressure_changes = BTreeMap::from([(RESOURCE.to_string(), HARVEST_DELTA)]);
    template.description = Some("The granaries fill after a bountiful harvest".into());
    template
}

fn open_trade() -> ActionDef {
    ActionDef {
        id: "open_trade".into(),
        actor: EntityFilter::of_kind("location"),
        target: Some(TargetSpec {
            filter: EntityFilter::of_kind("location"),
            via: None,
            exclude_linked: Some("trades_with".into()),
        }),
        applicability: Predicate::Always,
        base_weight: 1.0,
        outcome: Outcome {
            mutations: vec![MutationSpec::FormRelationship {
                relationship: RelationshipSpec {
                    kind: "trades_with".into(),
                    src: EntityRef::Actor,
                    dst: EntityRef::Target,
                    strength: Some(0.6),
                },
            }],
            pressure_changes: BTreeMap::new(),
        },
        setting_act: false,
        description: Some("{actor} opens a trade road to {target}".into()),
    }
}

/// The colony world configuration.
pub fn colony_config() -> SimulationConfig {
    let mut settling = EraDef::new("age_of_settling");
    settling.name = Some("The Age of Settling".into());
    settling.system_weight_modifiers.insert("cleansing_fades".into(), 0.0);

    let founding = EraDef {
        name: Some("The Age of Founding".into()),
        exit: ExitCondition { max_ticks: Some(FIRST_ERA_TICKS), ..ExitCondition::default() },
        ..EraDef::new("age_of_founding")
    };

    let mut trade_volume = PressureDef::new("trade_volume", 0.0).with_homeostasis(0.0, 0.1);
    trade_volume.positive_feedback.push(FeedbackTerm::relationships("trades_with", 0.5));

    SimulationConfig {
        entity_kinds: vec![EntityKindDef {
            kind: "location".into(),
            subtypes: vec!["region".into(), "colony".into()],
            statuses: vec!["thriving".into(), "abandoned".into()],
            terminal_statuses: vec!["abandoned".into()],
            default_status: Some("thriving".into()),
        }],
        relationship_kinds: vec![
            RelationshipKindDef { kind: "adjacent_to".into(), max_component_size: None, description: None },
            RelationshipKindDef { kind: "trades_with".into(), max_component_size: Some(TRADE_CAP), description: None },
        ],
        tag_registry: vec![TagDef { tag: "cleansed".into(), category: Some("ward".into()), conflicts_with: Vec::new() }],
        templates: vec![colony_founding(), bountiful_harvest()],
        systems: vec![SystemDef {
            id: "cleansing_fades".into(),
            kind: SystemKind::IsolationDecay(IsolationDecay {
                tag: "cleansed".into(),
                relationship_kind: "adjacent_to".into(),
                candidates: EntityFilter::of_kind("location"),
                window: CLEANSED_WINDOW,
            }),
            description: Some("The wards of {subject} fade without kin to sustain them".into()),
        }],
        actions: vec![open_trade()],
        pressures: vec![PressureDef::new(RESOURCE, 15.0), trade_volume],
        eras: vec![founding, settling],
        settings: EngineSettings {
            ticks: 60,
            template_budget: 2,
            action_budget: 4,
            progress_interval: 0,
            ..EngineSettings::default()
        },
    }
}

/// Two era entities, four regions, and adjacency Ashford–Birchmoor–Duskmere.
pub fn colony_seed() -> SeedGraph {
    let region = |id: u64, name: &str, prominence: f64| {
        Entity::new(EntityId(id), "location", "region", name, 0)
            .with_status("thriving")
            .with_prominence(prominence)
    };
    SeedGraph {
        entities: vec![
            Entity::new(EntityId(0), "era", "age_of_founding", "age_of_founding", 0),
            Entity::new(EntityId(1), "era", "age_of_settling", "age_of_settling", 0),
            region(GREYVALE.0, "Greyvale", 2.5).with_tag("cleansed"),
            region(ASHFORD.0, "Ashford", 3.0).with_tag("cleansed"),
            region(BIRCHMOOR.0, "Birchmoor", 1.5).with_tag("cleansed"),
            region(DUSKMERE.0, "Duskmere", 1.2),
        ],
        relationships: vec![
            Relationship::new(RelationshipId(0), ASHFORD, BIRCHMOOR, "adjacent_to", 0),
            Relationship::new(RelationshipId(1), BIRCHMOOR, DUSKMERE, "adjacent_to", 0),
        ],
    }
}
