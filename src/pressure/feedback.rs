//! Feedback terms: coefficients multiplied by a count over the graph.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::graph::{EntityGraph, RelationshipStatus};
use crate::predicate::EntityFilter;

/// Counts relationships of one kind, active unless stated otherwise.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMatch {
    pub kind: String,
    #[serde(default)]
    pub status: Option<RelationshipStatus>,
}

/// What a feedback term counts.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedbackMatcher {
    Entities(EntityFilter),
    Relationships(RelationshipMatch),
    /// Kept so the term can be reported every tick; always counts zero.
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum MatcherShape {
    Entities(EntityFilter),
    Relationships(RelationshipMatch),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermShape {
    match_predicate: MatcherShape,
    coefficient: f64,
}

/// One `{matchPredicate, coefficient}` entry of a pressure.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackTerm {
    pub coefficient: f64,
    pub matcher: FeedbackMatcher,
}

impl FeedbackTerm {
    pub fn entities(filter: EntityFilter, coefficient: f64) -> Self {
        Self { coefficient, matcher: FeedbackMatcher::Entities(filter) }
    }

    pub fn relationships(kind: impl Into<String>, coefficient: f64) -> Self {
        Self {
            coefficient,
            matcher: FeedbackMatcher::Relationships(RelationshipMatch { kind: kind.into(), status: None }),
        }
    }

    pub fn malformed_reason(&self) -> Option<&str> {
        match &self.matcher {
            FeedbackMatcher::Malformed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn mark_malformed(&mut self, reason: impl Into<String>) {
        self.matcher = FeedbackMatcher::Malformed(reason.into());
    }

    /// Matching count, or `None` when the term is malformed.
    pub fn count(&self, graph: &EntityGraph) -> Option<usize> {
        match &self.matcher {
            FeedbackMatcher::Entities(filter) => Some(filter.count(graph)),
            FeedbackMatcher::Relationships(m) => {
                let wanted = m.status.unwrap_or(RelationshipStatus::Active);
                Some(graph.relationships().filter(|r| r.kind == m.kind && r.status == wanted).count())
            }
            FeedbackMatcher::Malformed(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for FeedbackTerm {
    /// Never fails: an unreadable term becomes `Malformed` so the owning
    /// pressure still loads.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let coefficient = value.get("coefficient").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(match TermShape::deserialize(&value) {
            Ok(TermShape { match_predicate, coefficient }) => FeedbackTerm {
                coefficient,
                matcher: match match_predicate {
                    MatcherShape::Entities(f) => FeedbackMatcher::Entities(f),
                    MatcherShape::Relationships(r) => FeedbackMatcher::Relationships(r),
                },
            },
            Err(err) => FeedbackTerm { coefficient, matcher: FeedbackMatcher::Malformed(err.to_string()) },
        })
    }
}
