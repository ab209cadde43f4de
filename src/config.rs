//! Simulation configuration: one immutable value injected at construction.
//!
//! The JSON document is read section by section and construct by construct.
//! A construct that fails to deserialize or references something undeclared
//! is dropped with a `ConfigError`; everything else still loads.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::warn;

use crate::actions::ActionDef;
use crate::error::ConfigError;
use crate::graph::ProminenceRung;
use crate::mutation::{KindDefaults, MutationSpec};
use crate::predicate::{EntityFilter, Predicate};
use crate::pressure::{FeedbackMatcher, FeedbackOrdering, PressureDef};
use crate::systems::SystemDef;
use crate::templates::TemplateDef;
use crate::time::{EraDef, ERA_KIND};

// =============================================================================
// REGISTRIES
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKindDef {
    pub kind: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    /// Entering one of these sets `temporal.endTick`.
    #[serde(default)]
    pub terminal_statuses: Vec<String>,
    #[serde(default)]
    pub default_status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipKindDef {
    pub kind: String,
    /// Largest connected component this kind may form.
    #[serde(default)]
    pub max_component_size: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDef {
    #[serde(alias = "id")]
    pub tag: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
}

// =============================================================================
// ENGINE SETTINGS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProminenceSettings {
    pub enabled: bool,
    /// Base loss per tick, divided by (1 + active degree).
    pub decay_rate: f64,
    /// Pull toward the mean prominence of neighbors.
    pub reflected_glory: f64,
    /// Kinds the dynamics apply to; empty means every kind except eras.
    pub kinds: Vec<String>,
}

impl Default for ProminenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_rate: 0.02,
            reflected_glory: 0.05,
            kinds: Vec::new(),
        }
    }
}

/// Engine-wide knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Ticks simulated by `Simulation::run`.
    pub ticks: u64,
    /// Maximum template firings per tick.
    pub template_budget: usize,
    /// Maximum actions per tick.
    pub action_budget: usize,
    /// Chance an eligible actor acts in a tick.
    pub action_rate: f64,
    pub min_actor_prominence: ProminenceRung,
    pub feedback_ordering: FeedbackOrdering,
    pub prominence: ProminenceSettings,
    /// |delta| at or above which a `pressureChanged` event is logged.
    pub pressure_event_threshold: f64,
    /// Ticks between progress log lines; 0 disables them.
    pub progress_interval: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ticks: 200,
            template_budget: 3,
            action_budget: 8,
            action_rate: 0.25,
            min_actor_prominence: ProminenceRung::Marginal,
            feedback_ordering: FeedbackOrdering::BeforeDiscrete,
            prominence: ProminenceSettings::default(),
            pressure_event_threshold: 10.0,
            progress_interval: 100,
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Raw configuration document; constructs are parsed individually.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default)]
    pub entity_kinds: Vec<Value>,
    #[serde(default)]
    pub relationship_kinds: Vec<Value>,
    #[serde(default)]
    pub tag_registry: Vec<Value>,
    #[serde(default, alias = "generators")]
    pub templates: Vec<Value>,
    #[serde(default)]
    pub systems: Vec<Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub pressures: Vec<Value>,
    #[serde(default)]
    pub eras: Vec<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
}

/// A loaded configuration plus everything that was dropped from it.
#[derive(Clone, Debug)]
pub struct LoadReport {
    pub config: SimulationConfig,
    pub errors: Vec<ConfigError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The validated, immutable configuration.
#[derive(Clone, Debug, Default)]
pub struct SimulationConfig {
    pub entity_kinds: Vec<EntityKindDef>,
    pub relationship_kinds: Vec<RelationshipKindDef>,
    pub tag_registry: Vec<TagDef>,
    pub templates: Vec<TemplateDef>,
    pub systems: Vec<SystemDef>,
    pub actions: Vec<ActionDef>,
    pub pressures: Vec<PressureDef>,
    pub eras: Vec<EraDef>,
    pub settings: EngineSettings,
}

impl SimulationConfig {
    /// Parse a JSON document. Only an unreadable document is an error;
    /// per-construct problems are listed in the report.
    pub fn from_json(json: &str) -> Result<LoadReport, ConfigError> {
        let document: ConfigDocument = serde_json::from_str(json)
            .map_err(|e| ConfigError::MalformedDocument(e.to_string()))?;
        Ok(Self::from_document(document))
    }

    pub fn load(path: &Path) -> Result<LoadReport, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::MalformedDocument(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn from_document(document: ConfigDocument) -> LoadReport {
        let mut errors = Vec::new();

        let entity_kinds = dedup("entityKinds", parse_section("entityKinds", document.entity_kinds, &mut errors), |k: &EntityKindDef| &k.kind, &mut errors);
        let relationship_kinds = dedup("relationshipKinds", parse_section("relationshipKinds", document.relationship_kinds, &mut errors), |k: &RelationshipKindDef| &k.kind, &mut errors);
        let tag_registry = dedup("tagRegistry", parse_section("tagRegistry", document.tag_registry, &mut errors), |t: &TagDef| &t.tag, &mut errors);
        let pressures = dedup("pressures", parse_section("pressures", document.pressures, &mut errors), |p: &PressureDef| &p.id, &mut errors);
        let templates = dedup("templates", parse_section("templates", document.templates, &mut errors), |t: &TemplateDef| &t.id, &mut errors);
        let systems = dedup("systems", parse_section("systems", document.systems, &mut errors), |s: &SystemDef| &s.id, &mut errors);
        let actions = dedup("actions", parse_section("actions", document.actions, &mut errors), |a: &ActionDef| &a.id, &mut errors);
        let eras = dedup("eras", parse_section("eras", document.eras, &mut errors), |e: &EraDef| &e.id, &mut errors);

        let settings = match document.settings {
            None | Some(Value::Null) => EngineSettings::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                errors.push(ConfigError::MalformedConstruct { section: "settings", index: 0, reason: e.to_string() });
                EngineSettings::default()
            }),
        };

        let validator = Validator {
            entity_kinds: entity_kinds.iter().map(|k| k.kind.clone()).collect(),
            relationship_kinds: relationship_kinds.iter().map(|k| k.kind.clone()).collect(),
            tags: tag_registry.iter().map(|t| t.tag.clone()).collect(),
            pressures: pressures.iter().map(|p| p.id.clone()).collect(),
        };

        let pressures = pressures.into_iter()
            .map(|p| validator.check_pressure(p, &mut errors))
            .collect();
        let templates = validator.check_templates(templates, &mut errors);
        let systems = systems.into_iter()
            .filter(|s| validator.check_system(s, &mut errors))
            .collect();
        let actions = actions.into_iter()
            .filter(|a| validator.check_action(a, &mut errors))
            .collect();
        let eras = eras.into_iter()
            .filter(|e| validator.check_era(e, &mut errors))
            .collect();

        for error in &errors {
            warn!(%error, "configuration construct dropped or degraded");
        }

        LoadReport {
            config: SimulationConfig {
                entity_kinds,
                relationship_kinds,
                tag_registry,
                templates,
                systems,
                actions,
                pressures,
                eras,
                settings,
            },
            errors,
        }
    }

    // === Lookups ===

    pub fn template(&self, id: &str) -> Option<&TemplateDef> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn entity_kind(&self, kind: &str) -> Option<&EntityKindDef> {
        self.entity_kinds.iter().find(|k| k.kind == kind)
    }

    pub fn relationship_kind(&self, kind: &str) -> Option<&RelationshipKindDef> {
        self.relationship_kinds.iter().find(|k| k.kind == kind)
    }

    pub fn max_component_size(&self, kind: &str) -> Option<usize> {
        self.relationship_kind(kind).and_then(|k| k.max_component_size)
    }

    pub fn is_terminal_status(&self, kind: &str, status: &str) -> bool {
        self.entity_kind(kind).map_or(false, |k| k.terminal_statuses.iter().any(|s| s == status))
    }

    /// Tags that cannot coexist with `tag`, declared in either direction.
    pub fn conflicting_tags(&self, tag: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for def in &self.tag_registry {
            if def.tag == tag {
                out.extend(def.conflicts_with.iter().map(String::as_str));
            } else if def.conflicts_with.iter().any(|c| c == tag) {
                out.push(def.tag.as_str());
            }
        }
        out.sort();
        out.dedup();
        out
    }
}

impl KindDefaults for SimulationConfig {
    fn default_status(&self, kind: &str) -> Option<&str> {
        self.entity_kind(kind).and_then(|k| k.default_status.as_deref())
    }
}

fn parse_section<T: DeserializeOwned>(section: &'static str, items: Vec<Value>, errors: &mut Vec<ConfigError>) -> Vec<T> {
    items.into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                errors.push(ConfigError::MalformedConstruct { section, index, reason: e.to_string() });
                None
            }
        })
        .collect()
}

/// Keep the first construct for each id.
fn dedup<T>(section: &'static str, items: Vec<T>, id: impl Fn(&T) -> &String, errors: &mut Vec<ConfigError>) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.into_iter()
        .filter(|item| {
            let key = id(item).clone();
            if seen.insert(key.clone()) {
                true
            } else {
                errors.push(ConfigError::DuplicateId { section, id: key });
                false
            }
        })
        .collect()
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Names a construct refers to.
#[derive(Debug, Default)]
pub struct References<'a> {
    pub entity_kinds: Vec<&'a str>,
    pub relationship_kinds: Vec<&'a str>,
    pub tags: Vec<&'a str>,
    pub pressures: Vec<&'a str>,
}

impl<'a> References<'a> {
    pub fn predicate(&mut self, predicate: &'a Predicate) {
        self.entity_kinds.extend(predicate.referenced_kinds());
        self.tags.extend(predicate.referenced_tags());
        self.pressures.extend(predicate.referenced_pressures());
    }

    pub fn filter(&mut self, filter: &'a EntityFilter) {
        self.entity_kinds.extend(filter.kind.as_deref());
        self.tags.extend(filter.tags().map(String::as_str));
    }

    pub fn mutations(&mut self, specs: &'a [MutationSpec]) {
        for spec in specs {
            let (entity_kinds, relationship_kinds) = spec.referenced_kinds();
            self.entity_kinds.extend(entity_kinds);
            self.relationship_kinds.extend(relationship_kinds);
            self.tags.extend(spec.referenced_tags());
        }
    }

    pub fn pressure_changes(&mut self, changes: &'a BTreeMap<String, f64>) {
        self.pressures.extend(changes.keys().map(String::as_str));
    }

    fn normalize(&mut self) {
        for list in [&mut self.entity_kinds, &mut self.relationship_kinds, &mut self.tags, &mut self.pressures] {
            list.sort();
            list.dedup();
        }
    }
}

/// Check that every symbolic reference is bound before it is used.
///
/// `bound` starts with what the caller provides (`actor`, `target`,
/// `subject`, inherited `$names`); each entity creation adds its name.
pub fn check_bindings(owner: &str, specs: &[MutationSpec], bound: &mut BTreeSet<String>, errors: &mut Vec<ConfigError>) -> bool {
    let before = errors.len();
    for spec in specs {
        for reference in spec.references() {
            let key = reference.to_string();
            if !bound.contains(&key) {
                errors.push(ConfigError::UnresolvedReference { owner: owner.to_string(), reference: key });
            }
        }
        if let Some(name) = spec.defines() {
            bound.insert(format!("${}", name));
        }
    }
    errors.len() == before
}

struct Validator {
    entity_kinds: BTreeSet<String>,
    relationship_kinds: BTreeSet<String>,
    /// Empty means tags are free-form.
    tags: BTreeSet<String>,
    pressures: BTreeSet<String>,
}

impl Validator {
    fn check(&self, owner: &str, mut refs: References<'_>, errors: &mut Vec<ConfigError>) -> bool {
        refs.normalize();
        let before = errors.len();
        for kind in refs.entity_kinds {
            if kind != ERA_KIND && !self.entity_kinds.contains(kind) {
                errors.push(ConfigError::UnknownEntityKind { owner: owner.to_string(), kind: kind.to_string() });
            }
        }
        for kind in refs.relationship_kinds {
            if !self.relationship_kinds.contains(kind) {
                errors.push(ConfigError::UnknownRelationshipKind { owner: owner.to_string(), kind: kind.to_string() });
            }
        }
        if !self.tags.is_empty() {
            for tag in refs.tags {
                if !self.tags.contains(tag) {
                    errors.push(ConfigError::UnknownTag { owner: owner.to_string(), tag: tag.to_string() });
                }
            }
        }
        for pressure in refs.pressures {
            if !self.pressures.contains(pressure) {
                errors.push(ConfigError::UnknownPressure { owner: owner.to_string(), pressure: pressure.to_string() });
            }
        }
        errors.len() == before
    }

    /// Pressures always load; bad feedback terms degrade to zero.
    fn check_pressure(&self, mut pressure: PressureDef, errors: &mut Vec<ConfigError>) -> PressureDef {
        let id = pressure.id.clone();
        for (index, term) in pressure.terms_mut().enumerate() {
            let problem = match &term.matcher {
                FeedbackMatcher::Malformed(reason) => Some(reason.clone()),
                FeedbackMatcher::Entities(filter) => {
                    let mut refs = References::default();
                    refs.filter(filter);
                    let mut local = Vec::new();
                    if self.check(&format!("pressure '{}'", id), refs, &mut local) {
                        None
                    } else {
                        Some(local.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))
                    }
                }
                FeedbackMatcher::Relationships(m) => {
                    if self.relationship_kinds.contains(&m.kind) {
                        None
                    } else {
                        Some(format!("unknown relationship kind '{}'", m.kind))
                    }
                }
            };
            if let Some(reason) = problem {
                term.mark_malformed(reason.clone());
                errors.push(ConfigError::MalformedFeedback { pressure: id.clone(), index, reason });
            }
        }
        pressure
    }

    fn check_templates(&self, templates: Vec<TemplateDef>, errors: &mut Vec<ConfigError>) -> Vec<TemplateDef> {
        let all_ids: BTreeSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        let mut valid: BTreeSet<String> = BTreeSet::new();
        let mut follow_up_only: BTreeSet<String> = BTreeSet::new();

        for template in &templates {
            let owner = format!("template '{}'", template.id);
            let mut refs = References::default();
            refs.predicate(&template.applicability);
            if let Some(target) = &template.target {
                refs.filter(target);
            }
            let specs = template.creation.specs();
            refs.mutations(&specs);
            refs.pressure_changes(&template.pressure_changes);
            let mut ok = self.check(&owner, refs, errors);

            let mut bound = inherited_bindings(template, &templates);
            ok &= check_bindings(&owner, &specs, &mut bound, errors);

            let mut own: BTreeSet<String> = template.target.iter().map(|_| "target".to_string()).collect();
            if !check_bindings(&owner, &specs, &mut own, &mut Vec::new()) {
                follow_up_only.insert(template.id.clone());
            }

            for next in &template.then {
                if !all_ids.contains(next.as_str()) {
                    errors.push(ConfigError::UnknownTemplate { owner: owner.clone(), template: next.clone() });
                    ok = false;
                }
            }
            if ok {
                valid.insert(template.id.clone());
            }
        }

        // A template whose follow-up was dropped cannot fire as configured.
        loop {
            let broken: Vec<(String, String)> = templates.iter()
                .filter(|t| valid.contains(&t.id))
                .filter_map(|t| t.then.iter().find(|n| all_ids.contains(n.as_str()) && !valid.contains(*n)).map(|n| (t.id.clone(), n.clone())))
                .collect();
            if broken.is_empty() {
                break;
            }
            for (id, next) in broken {
                errors.push(ConfigError::UnknownTemplate { owner: format!("template '{}'", id), template: next });
                valid.remove(&id);
            }
        }

        templates.into_iter()
            .filter(|t| valid.contains(&t.id))
            .map(|mut t| {
                t.follow_up_only = follow_up_only.contains(&t.id);
                t
            })
            .collect()
    }

    fn check_system(&self, system: &SystemDef, errors: &mut Vec<ConfigError>) -> bool {
        let owner = format!("system '{}'", system.id);
        let mut refs = References::default();
        system.kind.collect_references(&mut refs);
        let ok = self.check(&owner, refs, errors);
        let mut bound: BTreeSet<String> = ["subject".to_string()].into_iter().collect();
        let bound_ok = check_bindings(&owner, system.kind.mutation_specs(), &mut bound, errors);
        ok && bound_ok
    }

    fn check_action(&self, action: &ActionDef, errors: &mut Vec<ConfigError>) -> bool {
        let owner = format!("action '{}'", action.id);
        let mut refs = References::default();
        action.collect_references(&mut refs);
        let ok = self.check(&owner, refs, errors);
        let mut bound: BTreeSet<String> = ["actor".to_string()].into_iter().collect();
        if action.target.is_some() {
            bound.insert("target".to_string());
        }
        let bound_ok = check_bindings(&owner, &action.outcome.mutations, &mut bound, errors);
        ok && bound_ok
    }

    fn check_era(&self, era: &EraDef, errors: &mut Vec<ConfigError>) -> bool {
        let mut refs = References::default();
        if let Some(condition) = &era.exit.condition {
            refs.predicate(condition);
        }
        refs.pressure_changes(&era.entry_effects.pressure_changes);
        for change in &era.entry_effects.tag_changes {
            refs.filter(&change.filter);
            refs.tags.extend(change.add_tags.iter().chain(change.remove_tags.iter()).map(String::as_str));
        }
        self.check(&format!("era '{}'", era.id), refs, errors)
    }
}

/// References a follow-up template may use: `target` and `$names` bound by
/// any template that (transitively) invokes it.
fn inherited_bindings(template: &TemplateDef, templates: &[TemplateDef]) -> BTreeSet<String> {
    let mut bound = BTreeSet::new();
    if template.target.is_some() {
        bound.insert("target".to_string());
    }
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut frontier: Vec<&str> = vec![template.id.as_str()];
    while let Some(child) = frontier.pop() {
        for parent in templates.iter().filter(|t| t.then.iter().any(|n| n == child)) {
            if !visited.insert(parent.id.as_str()) {
                continue;
            }
            if parent.target.is_some() {
                bound.insert("target".to_string());
            }
            for spec in parent.creation.specs() {
                if let Some(name) = spec.defines() {
                    bound.insert(format!("${}", name));
                }
            }
            frontier.push(parent.id.as_str());
        }
    }
    bound
}
