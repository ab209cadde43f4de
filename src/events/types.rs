//! Event types: a tagged union carried directly in the log.

use serde::{Serialize, Deserialize};
use crate::graph::ProminenceRung;
use crate::ids::{EntityId, RelationshipId};

/// What happened. Serialized as `"type": "<camelCase variant>"` next to the
/// variant's own fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventKind {
    TemplateFired {
        template_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<EntityId>,
    },
    SystemApplied {
        system_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<EntityId>,
    },
    ActionPerformed {
        action_id: String,
        actor: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<EntityId>,
    },
    TagAdded {
        entity: EntityId,
        tag: String,
        cause: String,
    },
    TagRemoved {
        entity: EntityId,
        tag: String,
        cause: String,
    },
    StatusChanged {
        entity: EntityId,
        from: String,
        to: String,
        cause: String,
    },
    RelationshipFormed {
        relationship: RelationshipId,
        kind: String,
        src: EntityId,
        dst: EntityId,
        cause: String,
    },
    RelationshipArchived {
        relationship: RelationshipId,
        kind: String,
        src: EntityId,
        dst: EntityId,
        cause: String,
    },
    ProminenceShifted {
        entity: EntityId,
        from: ProminenceRung,
        to: ProminenceRung,
        rising: bool,
    },
    EraTransition {
        from_era: String,
        to_era: String,
        order: usize,
    },
    PressureChanged {
        pressure_id: String,
        previous_value: f64,
        new_value: f64,
    },
}

impl EventKind {
    /// The serialized `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::TemplateFired { .. } => "templateFired",
            EventKind::SystemApplied { .. } => "systemApplied",
            EventKind::ActionPerformed { .. } => "actionPerformed",
            EventKind::TagAdded { .. } => "tagAdded",
            EventKind::TagRemoved { .. } => "tagRemoved",
            EventKind::StatusChanged { .. } => "statusChanged",
            EventKind::RelationshipFormed { .. } => "relationshipFormed",
            EventKind::RelationshipArchived { .. } => "relationshipArchived",
            EventKind::ProminenceShifted { .. } => "prominenceShifted",
            EventKind::EraTransition { .. } => "eraTransition",
            EventKind::PressureChanged { .. } => "pressureChanged",
        }
    }

    /// Entities named by the variant's own fields.
    pub fn entities(&self) -> Vec<EntityId> {
        match self {
            EventKind::TemplateFired { target, .. } => target.iter().copied().collect(),
            EventKind::SystemApplied { subject, .. } => subject.iter().copied().collect(),
            EventKind::ActionPerformed { actor, target, .. } => {
                std::iter::once(*actor).chain(target.iter().copied()).collect()
            }
            EventKind::TagAdded { entity, .. }
            | EventKind::TagRemoved { entity, .. }
            | EventKind::StatusChanged { entity, .. }
            | EventKind::ProminenceShifted { entity, .. } => vec![*entity],
            EventKind::RelationshipFormed { src, dst, .. }
            | EventKind::RelationshipArchived { src, dst, .. } => vec![*src, *dst],
            EventKind::EraTransition { .. } | EventKind::PressureChanged { .. } => Vec::new(),
        }
    }
}

/// One entry of the history log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub tick: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    pub description: String,
    #[serde(default)]
    pub entities_created: Vec<EntityId>,
    #[serde(default)]
    pub relationships_created: Vec<RelationshipId>,
    #[serde(default)]
    pub relationships_removed: Vec<RelationshipId>,
}

impl HistoryEvent {
    pub fn new(tick: u64, kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            tick,
            kind,
            description: description.into(),
            entities_created: Vec::new(),
            relationships_created: Vec::new(),
            relationships_removed: Vec::new(),
        }
    }

    pub fn with_created(mut self, entities: Vec<EntityId>, relationships: Vec<RelationshipId>) -> Self {
        self.entities_created = entities;
        self.relationships_created = relationships;
        self
    }

    pub fn with_removed(mut self, relationships: Vec<RelationshipId>) -> Self {
        self.relationships_removed = relationships;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Every entity this event involves, deduplicated, in id order.
    pub fn participants(&self) -> Vec<EntityId> {
        let mut ids = self.kind.entities();
        ids.extend(self.entities_created.iter().copied());
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Fill `{name}` placeholders in a configured description.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = HistoryEvent::new(
            7,
            EventKind::TemplateFired { template_id: "colony_founding".into(), target: Some(EntityId(3)) },
            "A colony is founded",
        ).with_created(vec![EntityId(9)], vec![RelationshipId(4)]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "templateFired");
        assert_eq!(json["templateId"], "colony_founding");
        assert_eq!(json["target"], 3);
        assert_eq!(json["entitiesCreated"][0], 9);
        assert_eq!(json["relationshipsCreated"][0], 4);

        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, event.kind);
        assert_eq!(back.entities_created, event.entities_created);
    }

    #[test]
    fn test_type_names_match_tags() {
        let kinds = vec![
            EventKind::RelationshipArchived {
                relationship: RelationshipId(1),
                kind: "at_war_with".into(),
                src: EntityId(0),
                dst: EntityId(1),
                cause: "war_cleanup".into(),
            },
            EventKind::PressureChanged { pressure_id: "harmony".into(), previous_value: 1.0, new_value: 12.0 },
            EventKind::ProminenceShifted {
                entity: EntityId(2),
                from: ProminenceRung::Marginal,
                to: ProminenceRung::Recognized,
                rising: true,
            },
        ];
        for kind in kinds {
            let json = serde_json::to_value(HistoryEvent::new(0, kind.clone(), "")).unwrap();
            assert_eq!(json["type"], kind.type_name());
        }
    }

    #[test]
    fn test_participants_deduplicated() {
        let event = HistoryEvent::new(
            1,
            EventKind::ActionPerformed { action_id: "found_shrine".into(), actor: EntityId(5), target: Some(EntityId(2)) },
            "",
        ).with_created(vec![EntityId(5), EntityId(8)], Vec::new());
        assert_eq!(event.participants(), vec![EntityId(2), EntityId(5), EntityId(8)]);
    }

    #[test]
    fn test_render_placeholders() {
        let text = render("{subject} loses {tag}", &[("subject", "Ashford"), ("tag", "cleansed")]);
        assert_eq!(text, "Ashford loses cleansed");
    }
}
