//! Entities: typed nodes of the knowledge graph, and their prominence ladder.

use std::collections::BTreeSet;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::ids::EntityId;

/// Upper bound of the continuous prominence scale.
pub const PROMINENCE_MAX: f64 = 5.0;

/// Ordered significance ladder. Continuous prominence maps onto rungs at
/// fixed cut points 1, 2, 3, 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProminenceRung {
    Forgotten,
    Marginal,
    Recognized,
    Renowned,
    Mythic,
}

impl ProminenceRung {
    pub fn all() -> &'static [ProminenceRung] {
        &[
            ProminenceRung::Forgotten,
            ProminenceRung::Marginal,
            ProminenceRung::Recognized,
            ProminenceRung::Renowned,
            ProminenceRung::Mythic,
        ]
    }

    /// Rung for a continuous prominence value.
    pub fn from_value(value: f64) -> Self {
        if value < 1.0 { ProminenceRung::Forgotten }
        else if value < 2.0 { ProminenceRung::Marginal }
        else if value < 3.0 { ProminenceRung::Recognized }
        else if value < 4.0 { ProminenceRung::Renowned }
        else { ProminenceRung::Mythic }
    }

    /// Lowest continuous value that maps onto this rung.
    pub fn floor(&self) -> f64 {
        match self {
            ProminenceRung::Forgotten => 0.0,
            ProminenceRung::Marginal => 1.0,
            ProminenceRung::Recognized => 2.0,
            ProminenceRung::Renowned => 3.0,
            ProminenceRung::Mythic => 4.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProminenceRung::Forgotten => "forgotten",
            ProminenceRung::Marginal => "marginal",
            ProminenceRung::Recognized => "recognized",
            ProminenceRung::Renowned => "renowned",
            ProminenceRung::Mythic => "mythic",
        }
    }
}

impl fmt::Display for ProminenceRung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifetime bookkeeping. `end_tick` is set once the entity reaches a terminal status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temporal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_tick: Option<u64>,
}

fn default_prominence() -> f64 {
    1.0
}

/// A node in the world graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_prominence")]
    pub prominence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub temporal: Temporal,
}

impl Entity {
    pub fn new(id: EntityId, kind: impl Into<String>, subtype: impl Into<String>, name: impl Into<String>, tick: u64) -> Self {
        Self {
            id,
            kind: kind.into(),
            subtype: subtype.into(),
            name: name.into(),
            status: String::new(),
            tags: BTreeSet::new(),
            prominence: 1.0,
            culture: None,
            created_at: tick,
            updated_at: tick,
            temporal: Temporal::default(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_prominence(mut self, prominence: f64) -> Self {
        self.prominence = prominence.clamp(0.0, PROMINENCE_MAX);
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn rung(&self) -> ProminenceRung {
        ProminenceRung::from_value(self.prominence)
    }

    /// Whether the entity has reached a terminal status.
    pub fn is_ended(&self) -> bool {
        self.temporal.end_tick.is_some()
    }

    /// Display label for narrative descriptions.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.kind, self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Capability: the entity may initiate actions.
pub trait CanAct {
    /// Eligible to act at all.
    fn can_act(&self, min_rung: ProminenceRung) -> bool;

    /// Eligible for setting acts (creating artifacts, rules, occurrences).
    fn can_perform_setting_acts(&self) -> bool;
}

impl CanAct for Entity {
    fn can_act(&self, min_rung: ProminenceRung) -> bool {
        !self.is_ended() && self.rung() >= min_rung
    }

    fn can_perform_setting_acts(&self) -> bool {
        !self.is_ended() && self.rung() >= ProminenceRung::Recognized
    }
}
