//! Replay trace: the per-tick decomposition of every pressure update.

use serde::{Serialize, Deserialize};

/// Where a discrete modification came from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModificationSource {
    TemplateId(String),
    SystemId(String),
    ActionId(String),
    EraId(String),
}

impl ModificationSource {
    /// Source category: `template`, `system`, `action` or `era`.
    pub fn category(&self) -> &'static str {
        match self {
            ModificationSource::TemplateId(_) => "template",
            ModificationSource::SystemId(_) => "system",
            ModificationSource::ActionId(_) => "action",
            ModificationSource::EraId(_) => "era",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ModificationSource::TemplateId(id)
            | ModificationSource::SystemId(id)
            | ModificationSource::ActionId(id)
            | ModificationSource::EraId(id) => id,
        }
    }
}

/// A single attributable delta applied to a pressure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscreteModification {
    pub pressure_id: String,
    pub delta: f64,
    pub source: ModificationSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub homeostatic_delta: f64,
    pub scaled_feedback: f64,
    pub feedback_total: f64,
    /// Sum of this tick's discrete modifications, in recorded order.
    pub raw_delta: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureRecord {
    pub id: String,
    pub previous_value: f64,
    pub new_value: f64,
    pub delta: f64,
    pub breakdown: Breakdown,
}

impl PressureRecord {
    /// Recompute the new value from the recorded parts.
    pub fn recomposed(&self) -> f64 {
        self.previous_value + self.breakdown.raw_delta + self.breakdown.homeostatic_delta + self.breakdown.scaled_feedback
    }
}

/// Everything that happened to pressures in one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureUpdate {
    pub tick: u64,
    pub pressures: Vec<PressureRecord>,
    pub discrete_modifications: Vec<DiscreteModification>,
}

impl PressureUpdate {
    pub fn record(&self, id: &str) -> Option<&PressureRecord> {
        self.pressures.iter().find(|r| r.id == id)
    }

    /// Modifications for one pressure, in recorded order.
    pub fn modifications_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DiscreteModification> + 'a {
        self.discrete_modifications.iter().filter(move |m| m.pressure_id == id)
    }

    /// Sum of modifications for `id`, folded in recorded order from zero.
    pub fn raw_delta_for(&self, id: &str) -> f64 {
        self.modifications_for(id).fold(0.0, |acc, m| acc + m.delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_as_tagged_object() {
        let m = DiscreteModification {
            pressure_id: "resource_availability".into(),
            delta: -25.0,
            source: ModificationSource::TemplateId("colony_founding".into()),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["pressureId"], "resource_availability");
        assert_eq!(json["source"]["templateId"], "colony_founding");

        let era = serde_json::to_value(ModificationSource::EraId("reckoning".into())).unwrap();
        assert_eq!(era["eraId"], "reckoning");
    }

    #[test]
    fn test_source_category() {
        assert_eq!(ModificationSource::ActionId("raid".into()).category(), "action");
        assert_eq!(ModificationSource::SystemId("decay".into()).id(), "decay");
    }
}
