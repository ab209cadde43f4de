//! Evaluation metrics for a finished (or paused) run.
//!
//! Covers the prominence distribution against its calibration targets,
//! event variety, relationship totals, pressure ranges and era spans.
//! The targets are reported, never enforced.

use std::collections::BTreeMap;

use crate::events::EventKind;
use crate::graph::{KindCounts, ProminenceRung};
use crate::time::{EraSpan, ERA_KIND};
use super::engine::Simulation;

/// Calibration targets for the prominence distribution.
pub const MYTHIC_SHARE_TARGET: (f64, f64) = (0.20, 0.25);
pub const FORGOTTEN_SHARE_TARGET: (f64, f64) = (0.15, 0.20);
pub const RISE_FALL_TARGET: (f64, f64) = (1.5, 2.0);

/// Observed span of one pressure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureRange {
    pub min: f64,
    pub max: f64,
    pub final_value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationMetrics {
    pub ticks: u64,
    pub entity_count: usize,
    pub ended_entities: usize,
    pub unit_faults: usize,

    // Prominence
    pub rung_distribution: BTreeMap<ProminenceRung, usize>,
    pub rises: usize,
    pub falls: usize,

    // Narrative
    pub event_counts: BTreeMap<&'static str, usize>,
    pub event_type_entropy: f64,

    // Graph
    pub relationship_counts: BTreeMap<String, KindCounts>,

    // Pressures and eras
    pub pressure_ranges: BTreeMap<String, PressureRange>,
    pub era_spans: Vec<EraSpan>,
}

impl SimulationMetrics {
    pub fn compute(sim: &Simulation) -> Self {
        let graph = sim.graph();
        let chronicle = sim.chronicle();

        let mut rung_distribution: BTreeMap<ProminenceRung, usize> =
            ProminenceRung::all().iter().map(|r| (*r, 0)).collect();
        let mut entity_count = 0;
        let mut ended_entities = 0;
        for entity in graph.entities().filter(|e| e.kind != ERA_KIND) {
            entity_count += 1;
            if entity.is_ended() {
                ended_entities += 1;
            }
            *rung_distribution.entry(entity.rung()).or_insert(0) += 1;
        }

        let (mut rises, mut falls) = (0, 0);
        for event in chronicle.events() {
            if let EventKind::ProminenceShifted { rising, .. } = event.kind {
                if rising { rises += 1 } else { falls += 1 }
            }
        }

        let event_counts = chronicle.count_by_type();
        let event_type_entropy = entropy(&event_counts);

        let mut pressure_ranges: BTreeMap<String, PressureRange> = BTreeMap::new();
        for update in sim.pressure_updates() {
            for record in &update.pressures {
                pressure_ranges.entry(record.id.clone())
                    .and_modify(|r| {
                        r.min = r.min.min(record.new_value);
                        r.max = r.max.max(record.new_value);
                        r.final_value = record.new_value;
                    })
                    .or_insert(PressureRange {
                        min: record.previous_value.min(record.new_value),
                        max: record.previous_value.max(record.new_value),
                        final_value: record.new_value,
                    });
            }
        }

        Self {
            ticks: sim.current_tick(),
            entity_count,
            ended_entities,
            unit_faults: sim.unit_faults(),
            rung_distribution,
            rises,
            falls,
            event_counts,
            event_type_entropy,
            relationship_counts: graph.counts_by_kind(),
            pressure_ranges,
            era_spans: sim.timeline().spans.clone(),
        }
    }

    /// Share of non-era entities on `rung`.
    pub fn rung_share(&self, rung: ProminenceRung) -> f64 {
        if self.entity_count == 0 {
            return 0.0;
        }
        self.rung_distribution.get(&rung).copied().unwrap_or(0) as f64 / self.entity_count as f64
    }

    /// Rises per fall; `None` until something has fallen.
    pub fn rise_fall_ratio(&self) -> Option<f64> {
        (self.falls > 0).then(|| self.rises as f64 / self.falls as f64)
    }

    pub fn total_events(&self) -> usize {
        self.event_counts.values().sum()
    }

    pub fn report(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Simulation Report ===\n\n");
        s.push_str(&format!("  Ticks:                  {}\n", self.ticks));
        s.push_str(&format!("  Entities:               {} ({} ended)\n", self.entity_count, self.ended_entities));
        s.push_str(&format!("  Events:                 {}\n", self.total_events()));
        s.push_str(&format!("  Unit faults:            {}\n\n", self.unit_faults));

        s.push_str("--- Prominence ---\n");
        for (rung, count) in &self.rung_distribution {
            s.push_str(&format!("  {:<12} {:>6} ({:.1}%)\n", rung.name(), count, self.rung_share(*rung) * 100.0));
        }
        s.push_str(&format!("  Mythic share:           {:.1}% {}\n",
            self.rung_share(ProminenceRung::Mythic) * 100.0,
            target_note(self.rung_share(ProminenceRung::Mythic), MYTHIC_SHARE_TARGET, true)));
        s.push_str(&format!("  Forgotten share:        {:.1}% {}\n",
            self.rung_share(ProminenceRung::Forgotten) * 100.0,
            target_note(self.rung_share(ProminenceRung::Forgotten), FORGOTTEN_SHARE_TARGET, true)));
        match self.rise_fall_ratio() {
            Some(ratio) => s.push_str(&format!("  Rise:fall ratio:        {:.2} {}\n", ratio, target_note(ratio, RISE_FALL_TARGET, false))),
            None => s.push_str(&format!("  Rise:fall ratio:        n/a ({} rises, no falls)\n", self.rises)),
        }

        s.push_str("\n--- Narrative ---\n");
        s.push_str(&format!("  Event type entropy:     {:.2} bits\n", self.event_type_entropy));
        for (kind, count) in &self.event_counts {
            s.push_str(&format!("  {:<22} {}\n", kind, count));
        }

        s.push_str("\n--- Relationships (active / historical) ---\n");
        for (kind, counts) in &self.relationship_counts {
            s.push_str(&format!("  {:<22} {} / {}\n", kind, counts.active, counts.historical));
        }

        s.push_str("\n--- Pressures (min / max / final) ---\n");
        for (id, range) in &self.pressure_ranges {
            s.push_str(&format!("  {:<22} {:.1} / {:.1} / {:.1}\n", id, range.min, range.max, range.final_value));
        }

        s.push_str("\n--- Eras ---\n");
        for span in &self.era_spans {
            match span.end_tick {
                Some(end) => s.push_str(&format!("  {}. {:<20} ticks {}..{}\n", span.order + 1, span.id, span.start_tick, end)),
                None => s.push_str(&format!("  {}. {:<20} ticks {}..\n", span.order + 1, span.id, span.start_tick)),
            }
        }
        s
    }
}

fn target_note(value: f64, (low, high): (f64, f64), percent: bool) -> String {
    let verdict = if value < low { "below" } else if value > high { "above" } else { "within" };
    if percent {
        format!("({} target {:.0}-{:.0}%)", verdict, low * 100.0, high * 100.0)
    } else {
        format!("({} target {:.1}-{:.1})", verdict, low, high)
    }
}

/// Shannon entropy of the event type distribution, in bits.
pub fn entropy(counts: &BTreeMap<&'static str, usize>) -> f64 {
    let total: usize = counts.values().sum();
    if total == 0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &count in counts.values() {
        let p = count as f64 / total as f64;
        if p > 0.0 {
            entropy -= p * p.log2();
        }
    }
    entropy
}
