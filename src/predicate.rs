//! Applicability predicates and entity filters.
//!
//! Predicates gate templates, actions, systems and era exits. They are
//! written either as tagged JSON objects or as compact expressions such as
//! `"resource_availability > -20 && harmony <= 5"`.

use std::collections::BTreeMap;
use std::fmt;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::graph::{Entity, EntityGraph, ProminenceRung};

// =============================================================================
// COMPARISON
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

// =============================================================================
// ENTITY FILTER
// =============================================================================

/// Selects entities by kind, subtype, status, tags and prominence.
///
/// Ended entities are excluded unless `include_ended` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, alias = "has_tag", alias = "hasTag", deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub has_tags: Vec<String>,
    #[serde(default, alias = "lacks_tag", alias = "lacksTag", deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub lacks_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_prominence: Option<ProminenceRung>,
    #[serde(default)]
    pub include_ended: bool,
}

/// A tag list written either as `"cleansed"` or `["cleansed", ...]`.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Tags::deserialize(deserializer)? {
        Tags::One(tag) => vec![tag],
        Tags::Many(tags) => tags,
    })
}

impl EntityFilter {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self { kind: Some(kind.into()), ..Self::default() }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.has_tags.push(tag.into());
        self
    }

    pub fn without_tag(mut self, tag: impl Into<String>) -> Self {
        self.lacks_tags.push(tag.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.statuses.push(status.into());
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.include_ended && entity.is_ended() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &entity.kind != kind {
                return false;
            }
        }
        if let Some(subtype) = &self.subtype {
            if &entity.subtype != subtype {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&entity.status) {
            return false;
        }
        if !self.has_tags.iter().all(|t| entity.has_tag(t)) {
            return false;
        }
        if self.lacks_tags.iter().any(|t| entity.has_tag(t)) {
            return false;
        }
        if let Some(min) = self.min_prominence {
            if entity.rung() < min {
                return false;
            }
        }
        true
    }

    /// Matching entities in id order.
    pub fn select<'a>(&'a self, graph: &'a EntityGraph) -> impl Iterator<Item = &'a Entity> + 'a {
        graph.entities().filter(move |e| self.matches(e))
    }

    pub fn count(&self, graph: &EntityGraph) -> usize {
        self.select(graph).count()
    }

    /// Every tag this filter mentions.
    pub fn tags(&self) -> impl Iterator<Item = &String> {
        self.has_tags.iter().chain(self.lacks_tags.iter())
    }
}

// =============================================================================
// PREDICATE
// =============================================================================

/// Everything a predicate may read. Always built from the tick-start snapshot.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    pub graph: &'a EntityGraph,
    pub pressures: &'a BTreeMap<String, f64>,
    pub era: &'a str,
    pub tick: u64,
}

/// A boolean condition over pressures, the graph and the current era.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Predicate {
    Always,
    Pressure { pressure: String, op: CompareOp, value: f64 },
    EntityCount { filter: EntityFilter, op: CompareOp, value: f64 },
    TagPresent { tag: String },
    TagAbsent { tag: String },
    Era { eras: Vec<String> },
    Tick { op: CompareOp, value: f64 },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::Always
    }
}

impl Predicate {
    pub fn pressure(pressure: impl Into<String>, op: CompareOp, value: f64) -> Self {
        Predicate::Pressure { pressure: pressure.into(), op, value }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Pressure { pressure, op, value } => ctx.pressures
                .get(pressure)
                .map_or(false, |current| op.apply(*current, *value)),
            Predicate::EntityCount { filter, op, value } => {
                op.apply(filter.count(ctx.graph) as f64, *value)
            }
            Predicate::TagPresent { tag } => ctx.graph.by_tag(tag).any(|e| !e.is_ended()),
            Predicate::TagAbsent { tag } => !ctx.graph.by_tag(tag).any(|e| !e.is_ended()),
            Predicate::Era { eras } => eras.iter().any(|e| e == ctx.era),
            Predicate::Tick { op, value } => op.apply(ctx.tick as f64, *value),
            Predicate::All { of } => of.iter().all(|p| p.evaluate(ctx)),
            Predicate::Any { of } => of.iter().any(|p| p.evaluate(ctx)),
            Predicate::Not { predicate } => !predicate.evaluate(ctx),
        }
    }

    /// Visit this predicate and all nested predicates.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        visit(self);
        match self {
            Predicate::All { of } | Predicate::Any { of } => {
                for p in of {
                    p.walk(visit);
                }
            }
            Predicate::Not { predicate } => predicate.walk(visit),
            _ => {}
        }
    }

    pub fn referenced_pressures(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |p| {
            if let Predicate::Pressure { pressure, .. } = p {
                out.push(pressure.as_str());
            }
        });
        out
    }

    pub fn referenced_tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |p| match p {
            Predicate::TagPresent { tag } | Predicate::TagAbsent { tag } => out.push(tag.as_str()),
            Predicate::EntityCount { filter, .. } => out.extend(filter.tags().map(|t| t.as_str())),
            _ => {}
        });
        out
    }

    pub fn referenced_kinds(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |p| {
            if let Predicate::EntityCount { filter, .. } = p {
                if let Some(kind) = &filter.kind {
                    out.push(kind.as_str());
                }
            }
        });
        out
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => write!(f, "always"),
            Predicate::Pressure { pressure, op, value } => write!(f, "{} {} {}", pressure, op.symbol(), value),
            Predicate::EntityCount { filter, op, value } => {
                write!(f, "count({}) {} {}", filter.kind.as_deref().unwrap_or("*"), op.symbol(), value)
            }
            Predicate::TagPresent { tag } => write!(f, "any has '{}'", tag),
            Predicate::TagAbsent { tag } => write!(f, "none has '{}'", tag),
            Predicate::Era { eras } => write!(f, "era in [{}]", eras.join(", ")),
            Predicate::Tick { op, value } => write!(f, "tick {} {}", op.symbol(), value),
            Predicate::All { of } => {
                let parts: Vec<String> = of.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" && "))
            }
            Predicate::Any { of } => {
                let parts: Vec<String> = of.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" || "))
            }
            Predicate::Not { predicate } => write!(f, "!{}", predicate),
        }
    }
}

/// Structured form, deserialized from tagged JSON objects.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum PredicateNode {
    Always,
    Pressure { pressure: String, op: CompareOp, value: f64 },
    EntityCount { filter: EntityFilter, op: CompareOp, value: f64 },
    TagPresent { tag: String },
    TagAbsent { tag: String },
    Era { eras: Vec<String> },
    Tick { op: CompareOp, value: f64 },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl From<PredicateNode> for Predicate {
    fn from(node: PredicateNode) -> Self {
        match node {
            PredicateNode::Always => Predicate::Always,
            PredicateNode::Pressure { pressure, op, value } => Predicate::Pressure { pressure, op, value },
            PredicateNode::EntityCount { filter, op, value } => Predicate::EntityCount { filter, op, value },
            PredicateNode::TagPresent { tag } => Predicate::TagPresent { tag },
            PredicateNode::TagAbsent { tag } => Predicate::TagAbsent { tag },
            PredicateNode::Era { eras } => Predicate::Era { eras },
            PredicateNode::Tick { op, value } => Predicate::Tick { op, value },
            PredicateNode::All { of } => Predicate::All { of },
            PredicateNode::Any { of } => Predicate::Any { of },
            PredicateNode::Not { predicate } => Predicate::Not { predicate },
        }
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(expr) => parse_expression(&expr)
                .map_err(|reason| de::Error::custom(format!("malformed expression '{}': {}", expr, reason))),
            other => PredicateNode::deserialize(other)
                .map(Predicate::from)
                .map_err(de::Error::custom),
        }
    }
}

/// Parse `name op number [&& name op number ...]` into pressure comparisons.
pub fn parse_expression(expr: &str) -> Result<Predicate, String> {
    let clauses: Vec<&str> = expr.split("&&").map(str::trim).collect();
    if clauses.iter().any(|c| c.is_empty()) {
        return Err("empty clause".to_string());
    }

    let mut parsed = Vec::with_capacity(clauses.len());
    for clause in clauses {
        parsed.push(parse_comparison(clause)?);
    }
    if parsed.len() == 1 {
        Ok(parsed.remove(0))
    } else {
        Ok(Predicate::All { of: parsed })
    }
}

fn parse_comparison(clause: &str) -> Result<Predicate, String> {
    // Two-character operators first so ">=" is not read as ">".
    const OPS: [(&str, CompareOp); 6] = [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];

    for (symbol, op) in OPS {
        if let Some(pos) = clause.find(symbol) {
            let name = clause[..pos].trim();
            let number = clause[pos + symbol.len()..].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(format!("invalid pressure name '{}'", name));
            }
            let value: f64 = number.parse()
                .map_err(|_| format!("'{}' is not a number", number))?;
            if name == "tick" {
                return Ok(Predicate::Tick { op, value });
            }
            return Ok(Predicate::pressure(name, op, value));
        }
    }
    Err(format!("no comparison operator in '{}'", clause))
}
