//! Chronicle: the append-only event log with indexing.

use std::collections::BTreeMap;
use crate::ids::EntityId;
use super::types::HistoryEvent;

/// All events in the order they were recorded.
#[derive(Clone, Debug, Default)]
pub struct Chronicle {
    events: Vec<HistoryEvent>,
    /// Positions in `events`, keyed by tick.
    by_tick: BTreeMap<u64, Vec<usize>>,
    /// Positions in `events`, keyed by participating entity.
    by_entity: BTreeMap<EntityId, Vec<usize>>,
}

impl Chronicle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild indexes over an existing list (e.g. loaded from disk).
    pub fn from_events(events: Vec<HistoryEvent>) -> Self {
        let mut chronicle = Self::new();
        for event in events {
            chronicle.record(event);
        }
        chronicle
    }

    pub fn record(&mut self, event: HistoryEvent) {
        let index = self.events.len();
        self.by_tick.entry(event.tick).or_default().push(index);
        for id in event.participants() {
            self.by_entity.entry(id).or_default().push(index);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn events_at(&self, tick: u64) -> Vec<&HistoryEvent> {
        self.by_tick.get(&tick)
            .map(|ix| ix.iter().map(|i| &self.events[*i]).collect())
            .unwrap_or_default()
    }

    pub fn events_for(&self, entity: EntityId) -> Vec<&HistoryEvent> {
        self.by_entity.get(&entity)
            .map(|ix| ix.iter().map(|i| &self.events[*i]).collect())
            .unwrap_or_default()
    }

    /// Events with `start <= tick < end`.
    pub fn events_in_range(&self, start: u64, end: u64) -> Vec<&HistoryEvent> {
        self.by_tick.range(start..end)
            .flat_map(|(_, ix)| ix.iter().map(|i| &self.events[*i]))
            .collect()
    }

    pub fn count_by_type(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.type_name()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventKind;

    fn fired(tick: u64, template: &str, target: u64) -> HistoryEvent {
        HistoryEvent::new(
            tick,
            EventKind::TemplateFired { template_id: template.into(), target: Some(EntityId(target)) },
            format!("{} fired", template),
        )
    }

    #[test]
    fn test_chronicle_record_and_query() {
        let mut chronicle = Chronicle::new();
        chronicle.record(fired(0, "colony_founding", 1));
        chronicle.record(fired(0, "shrine_raising", 2));
        chronicle.record(fired(3, "colony_founding", 1).with_created(vec![EntityId(7)], Vec::new()));

        assert_eq!(chronicle.len(), 3);
        assert_eq!(chronicle.events_at(0).len(), 2);
        assert!(chronicle.events_at(1).is_empty());
        assert_eq!(chronicle.events_for(EntityId(1)).len(), 2);
        assert_eq!(chronicle.events_for(EntityId(7)).len(), 1);
        assert_eq!(chronicle.events_in_range(1, 10).len(), 1);
        assert_eq!(chronicle.count_by_type()["templateFired"], 3);
    }

    #[test]
    fn test_rebuild_from_events() {
        let events = vec![fired(2, "a", 4), fired(5, "b", 4)];
        let chronicle = Chronicle::from_events(events.clone());
        assert_eq!(chronicle.events(), events.as_slice());
        assert_eq!(chronicle.events_for(EntityId(4)).len(), 2);
    }
}
