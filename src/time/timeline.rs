//! Era timeline: the spans of ticks each era occupied.

use serde::{Serialize, Deserialize};

/// One era's occupancy of the tick line. `end_tick` is exclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraSpan {
    pub id: String,
    pub order: usize,
    pub start_tick: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_tick: Option<u64>,
}

impl EraSpan {
    pub fn new(id: impl Into<String>, order: usize, start_tick: u64) -> Self {
        Self { id: id.into(), order, start_tick, end_tick: None }
    }

    pub fn close(&mut self, tick: u64) {
        self.end_tick = Some(tick);
    }

    pub fn is_active(&self) -> bool {
        self.end_tick.is_none()
    }

    /// Ticks covered so far, or in total once closed.
    pub fn duration(&self, now: u64) -> u64 {
        self.end_tick.unwrap_or(now).saturating_sub(self.start_tick)
    }

    pub fn contains(&self, tick: u64) -> bool {
        tick >= self.start_tick && self.end_tick.map_or(true, |end| tick < end)
    }
}

/// Ordered sequence of era spans. Only ever appended to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub spans: Vec<EraSpan>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new span, closing the active one at the same tick.
    pub fn begin(&mut self, span: EraSpan) {
        if let Some(current) = self.spans.last_mut() {
            if current.is_active() {
                current.close(span.start_tick);
            }
        }
        self.spans.push(span);
    }

    pub fn current(&self) -> Option<&EraSpan> {
        self.spans.last().filter(|s| s.is_active())
    }

    pub fn era_at(&self, tick: u64) -> Option<&EraSpan> {
        self.spans.iter().find(|s| s.contains(tick))
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_lifecycle() {
        let mut span = EraSpan::new("expansion", 0, 0);
        assert!(span.is_active());
        assert_eq!(span.duration(7), 7);
        span.close(12);
        assert!(!span.is_active());
        assert_eq!(span.duration(40), 12);
        assert!(span.contains(11));
        assert!(!span.contains(12));
    }

    #[test]
    fn test_timeline_closes_previous() {
        let mut timeline = Timeline::new();
        timeline.begin(EraSpan::new("expansion", 0, 0));
        timeline.begin(EraSpan::new("conflict", 1, 30));

        assert_eq!(timeline.spans[0].end_tick, Some(30));
        assert_eq!(timeline.current().map(|s| s.id.as_str()), Some("conflict"));
        assert_eq!(timeline.era_at(29).map(|s| s.order), Some(0));
        assert_eq!(timeline.era_at(30).map(|s| s.order), Some(1));
        assert_eq!(timeline.len(), 2);
    }
}
