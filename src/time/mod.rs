//! Eras: an ordered, forward-only phase machine.
//!
//! The scheduler starts in the first era and evaluates the current era's
//! exit condition at the start of every tick. At most one transition
//! happens per tick and the last era never exits.

pub mod timeline;

pub use timeline::{EraSpan, Timeline};

use std::collections::BTreeMap;
use serde::Deserialize;
use tracing::info;

use crate::events::{EventKind, HistoryEvent};
use crate::graph::{Entity, EntityGraph};
use crate::ids::IdGenerators;
use crate::mutation::{Mutation, UnitOutput};
use crate::predicate::{EntityFilter, EvalContext, Predicate};
use crate::pressure::ModificationSource;

/// Entity kind that mirrors eras inside the graph.
pub const ERA_KIND: &str = "era";

pub const ERA_FUTURE: &str = "future";
pub const ERA_CURRENT: &str = "current";
pub const ERA_PAST: &str = "past";

/// When an era hands over to the next one.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitCondition {
    /// Leave after this many ticks regardless of state.
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// `condition` is only considered after this many ticks.
    #[serde(default)]
    pub min_ticks: u64,
    #[serde(default)]
    pub condition: Option<Predicate>,
}

/// Tag edits applied once to every entity matching `filter`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagChange {
    pub filter: EntityFilter,
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub remove_tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryEffects {
    #[serde(default)]
    pub pressure_changes: BTreeMap<String, f64>,
    #[serde(default)]
    pub tag_changes: Vec<TagChange>,
}

/// Configured era.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template_weight_modifiers: BTreeMap<String, f64>,
    #[serde(default)]
    pub system_weight_modifiers: BTreeMap<String, f64>,
    #[serde(default)]
    pub action_weight_modifiers: BTreeMap<String, f64>,
    #[serde(default, alias = "exitCondition")]
    pub exit: ExitCondition,
    #[serde(default)]
    pub entry_effects: EntryEffects,
}

impl EraDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn template_modifier(&self, id: &str) -> f64 {
        self.template_weight_modifiers.get(id).copied().unwrap_or(1.0)
    }

    pub fn system_modifier(&self, id: &str) -> f64 {
        self.system_weight_modifiers.get(id).copied().unwrap_or(1.0)
    }

    pub fn action_modifier(&self, id: &str) -> f64 {
        self.action_weight_modifiers.get(id).copied().unwrap_or(1.0)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Whether `entity` is the graph mirror of era `id`.
pub fn is_era_entity(entity: &Entity, id: &str) -> bool {
    entity.kind == ERA_KIND && (entity.name == id || entity.subtype == id)
}

/// Tracks the current era and the spans of past ones.
#[derive(Clone, Debug, PartialEq)]
pub struct EraScheduler {
    index: usize,
    timeline: Timeline,
}

impl EraScheduler {
    /// Start in the first era at tick 0. `None` when no eras are configured.
    pub fn start(eras: &[EraDef]) -> Option<Self> {
        let first = eras.first()?;
        let mut timeline = Timeline::new();
        timeline.begin(EraSpan::new(first.id.clone(), 0, 0));
        Some(Self { index: 0, timeline })
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn current<'a>(&self, eras: &'a [EraDef]) -> &'a EraDef {
        &eras[self.index.min(eras.len().saturating_sub(1))]
    }

    /// Whether the current era's exit condition holds at `ctx.tick`.
    pub fn exit_due(&self, eras: &[EraDef], ctx: &EvalContext<'_>) -> bool {
        if self.index + 1 >= eras.len() {
            return false;
        }
        let era = &eras[self.index];
        let elapsed = self.timeline.current().map_or(0, |span| span.duration(ctx.tick));
        if era.exit.max_ticks.map_or(false, |max| elapsed >= max) {
            return true;
        }
        elapsed >= era.exit.min_ticks
            && era.exit.condition.as_ref().map_or(false, |c| c.evaluate(ctx))
    }

    /// Move to the next era at `tick`. Returns (from, to) indices.
    pub fn advance(&mut self, eras: &[EraDef], tick: u64) -> Option<(usize, usize)> {
        let next = self.index + 1;
        let era = eras.get(next)?;
        self.timeline.begin(EraSpan::new(era.id.clone(), next, tick));
        let from = self.index;
        self.index = next;
        info!(tick, from = %eras[from].id, to = %era.id, "era transition");
        Some((from, next))
    }
}

/// Build the buffered output of entering `to` from `from`.
///
/// Covers entry pressure changes, entry tag changes, the era entities'
/// status moves (creating the new era's entity if the graph lacks one) and
/// the transition event.
pub fn transition_output(
    from: &EraDef,
    to: &EraDef,
    order: usize,
    snapshot: &EntityGraph,
    ids: &mut IdGenerators,
    tick: u64,
) -> UnitOutput {
    let mut out = UnitOutput::new(ModificationSource::EraId(to.id.clone()));
    out.add_pressure_changes(&to.entry_effects.pressure_changes);

    for change in &to.entry_effects.tag_changes {
        for entity in change.filter.select(snapshot) {
            for tag in &change.add_tags {
                if !entity.has_tag(tag) {
                    out.mutations.push(Mutation::AddTag { entity: entity.id, tag: tag.clone() });
                }
            }
            for tag in &change.remove_tags {
                if entity.has_tag(tag) {
                    out.mutations.push(Mutation::RemoveTag { entity: entity.id, tag: tag.clone() });
                }
            }
        }
    }

    for entity in snapshot.by_kind(ERA_KIND).filter(|e| is_era_entity(e, &from.id)) {
        out.mutations.push(Mutation::SetStatus { entity: entity.id, status: ERA_PAST.to_string() });
    }

    let mut entities_created = Vec::new();
    let existing: Vec<&Entity> = snapshot.by_kind(ERA_KIND).filter(|e| is_era_entity(e, &to.id)).collect();
    if existing.is_empty() {
        let id = ids.next_entity();
        let entity = Entity::new(id, ERA_KIND, ERA_KIND, to.id.clone(), tick)
            .with_status(ERA_CURRENT)
            .with_prominence(2.0);
        out.mutations.push(Mutation::CreateEntity(entity));
        entities_created.push(id);
    } else {
        for entity in existing {
            out.mutations.push(Mutation::SetStatus { entity: entity.id, status: ERA_CURRENT.to_string() });
        }
    }

    let mut event = HistoryEvent::new(
        tick,
        EventKind::EraTransition { from_era: from.id.clone(), to_era: to.id.clone(), order },
        format!("The {} gives way to the {}", from.display_name(), to.display_name()),
    );
    event.entities_created = entities_created;
    out.events.push(event);
    out
}
