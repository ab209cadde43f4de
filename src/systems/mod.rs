//! Systems: per-tick rules that mutate what already exists.
//!
//! | Type | Scans | Effect |
//! |------|-------|--------|
//! | `thresholdTrigger` | Filtered candidates | Configured mutations when the trigger holds |
//! | `connectionEvolution` | Relationships of a kind | Strength drift, archiving, new links via shared neighbors |
//! | `decay` | Relationships of a kind | Strength loss, archiving under a floor |
//! | `isolationDecay` | Tagged entities | Tag removed after a run of isolated evaluations |
//! | `progression` | Entities in a state machine | Status advance, bounded recovery, entry cascades |
//! | `contagion` | Tagged entities | Tag spreads to susceptible neighbors |
//! | `warCleanup` | War relationships | Archived when no live occurrence backs them |
//!
//! Every system reads the tick snapshot and returns a buffered `UnitOutput`.

pub mod connection;
pub mod contagion;
pub mod decay;
pub mod isolation;
pub mod progression;
pub mod prominence;
pub mod threshold;
pub mod war;

pub use connection::{ConnectionEvolution, Formation};
pub use contagion::Contagion;
pub use decay::RelationshipDecay;
pub use isolation::IsolationDecay;
pub use progression::{Progression, Recovery, StateEffects};
pub use threshold::{NeighborCondition, ThresholdTrigger};
pub use war::WarCleanup;

use rand::Rng;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::config::References;
use crate::error::UnitFault;
use crate::events::types::render;
use crate::ids::IdGenerators;
use crate::mutation::{MutationSpec, UnitOutput};
use crate::pressure::ModificationSource;
use crate::simulation::context::{SystemMemory, TickContext, UnitRun};

/// The configured rule of a system.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "systemType", content = "config", rename_all = "camelCase")]
pub enum SystemKind {
    ThresholdTrigger(ThresholdTrigger),
    ConnectionEvolution(ConnectionEvolution),
    Decay(RelationshipDecay),
    IsolationDecay(IsolationDecay),
    Progression(Progression),
    Contagion(Contagion),
    WarCleanup(WarCleanup),
}

impl SystemKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SystemKind::ThresholdTrigger(_) => "thresholdTrigger",
            SystemKind::ConnectionEvolution(_) => "connectionEvolution",
            SystemKind::Decay(_) => "decay",
            SystemKind::IsolationDecay(_) => "isolationDecay",
            SystemKind::Progression(_) => "progression",
            SystemKind::Contagion(_) => "contagion",
            SystemKind::WarCleanup(_) => "warCleanup",
        }
    }

    pub fn collect_references<'a>(&'a self, refs: &mut References<'a>) {
        match self {
            SystemKind::ThresholdTrigger(s) => s.collect_references(refs),
            SystemKind::ConnectionEvolution(s) => s.collect_references(refs),
            SystemKind::Decay(s) => refs.relationship_kinds.push(&s.relationship_kind),
            SystemKind::IsolationDecay(s) => s.collect_references(refs),
            SystemKind::Progression(s) => s.collect_references(refs),
            SystemKind::Contagion(s) => s.collect_references(refs),
            SystemKind::WarCleanup(s) => s.collect_references(refs),
        }
    }

    /// Symbolic mutations this rule instantiates per subject.
    pub fn mutation_specs(&self) -> &[MutationSpec] {
        match self {
            SystemKind::ThresholdTrigger(s) => &s.mutations,
            _ => &[],
        }
    }
}

/// Configured system: `{id, systemType, config}`.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemDef {
    pub id: String,
    pub kind: SystemKind,
    /// Narrative template; `{subject}` and other rule-specific names are filled in.
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSystemDef {
    id: String,
    system_type: String,
    #[serde(default = "empty_object")]
    config: Value,
    #[serde(default)]
    description: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl<'de> Deserialize<'de> for SystemDef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSystemDef::deserialize(deserializer)?;
        let tagged = serde_json::json!({ "systemType": raw.system_type, "config": raw.config });
        let kind = SystemKind::deserialize(tagged)
            .map_err(|e| serde::de::Error::custom(format!("system '{}': {}", raw.id, e)))?;
        Ok(SystemDef { id: raw.id, kind, description: raw.description })
    }
}

/// What a system sees while running.
#[derive(Clone, Copy, Debug)]
pub struct SystemEnv<'a> {
    pub id: &'a str,
    pub description: Option<&'a str>,
    pub ctx: &'a TickContext<'a>,
    /// Era weight modifier for this system.
    pub modifier: f64,
}

impl<'a> SystemEnv<'a> {
    /// Configured probability scaled by the era modifier, clamped to [0, 1].
    pub fn probability(&self, base: f64) -> f64 {
        (base * self.modifier).clamp(0.0, 1.0)
    }

    pub fn output(&self) -> UnitOutput {
        UnitOutput::new(ModificationSource::SystemId(self.id.to_string()))
    }

    /// Configured description with `vars` filled in, or `fallback`.
    pub fn describe(&self, vars: &[(&str, &str)], fallback: impl FnOnce() -> String) -> String {
        match self.description {
            Some(text) => render(text, vars),
            None => fallback(),
        }
    }
}

/// Run one system against the tick snapshot.
pub fn run_system(
    def: &SystemDef,
    env: &SystemEnv<'_>,
    memory: &mut SystemMemory,
    ids: &mut IdGenerators,
    rng: &mut impl Rng,
) -> Result<UnitOutput, UnitFault> {
    match &def.kind {
        SystemKind::ThresholdTrigger(s) => s.run(env, ids, rng),
        SystemKind::ConnectionEvolution(s) => Ok(s.run(env, ids, rng)),
        SystemKind::Decay(s) => Ok(s.run(env)),
        SystemKind::IsolationDecay(s) => Ok(s.run(env, memory)),
        SystemKind::Progression(s) => s.run(env, memory, rng),
        SystemKind::Contagion(s) => Ok(s.run(env, rng)),
        SystemKind::WarCleanup(s) => Ok(s.run(env)),
    }
}

/// Run every system enabled in the current era, in configuration order.
///
/// Each system works on a scratch copy of the memory that is kept only if
/// the system succeeds.
pub fn run_systems(
    ctx: &TickContext<'_>,
    memory: &mut SystemMemory,
    ids: &mut IdGenerators,
    rng: &mut impl Rng,
) -> Vec<UnitRun> {
    let mut runs = Vec::new();
    for def in &ctx.config.systems {
        let modifier = ctx.era.system_modifier(&def.id);
        if modifier <= 0.0 {
            continue;
        }
        let env = SystemEnv { id: &def.id, description: def.description.as_deref(), ctx, modifier };
        let mut scratch = memory.clone();
        let result = run_system(def, &env, &mut scratch, ids, rng);
        if result.is_ok() {
            *memory = scratch;
        }
        if let Ok(out) = &result {
            if !out.is_empty() {
                debug!(tick = ctx.tick, system = %def.id, kind = def.kind.type_name(), events = out.events.len(), "system applied");
            }
        }
        runs.push(UnitRun { unit: def.id.clone(), result });
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_def_parses_config_block() {
        let def: SystemDef = serde_json::from_str(r#"{
            "id": "cleansing_fades",
            "systemType": "isolationDecay",
            "config": {"tag": "cleansed", "relationshipKind": "adjacent_to", "window": 2},
            "description": "{subject} loses its cleansing"
        }"#).unwrap();
        assert_eq!(def.kind.type_name(), "isolationDecay");
        match def.kind {
            SystemKind::IsolationDecay(s) => assert_eq!(s.window, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_system_type_rejected() {
        let err = serde_json::from_str::<SystemDef>(r#"{"id": "x", "systemType": "teleport"}"#).unwrap_err();
        assert!(err.to_string().contains("system 'x'"));
    }

    #[test]
    fn test_config_defaults_when_block_missing() {
        let def: SystemDef = serde_json::from_str(r#"{"id": "wars", "systemType": "warCleanup"}"#).unwrap();
        match def.kind {
            SystemKind::WarCleanup(s) => assert_eq!(s.war_kind, "at_war_with"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
