//! Error types.
//!
//! | Type | Raised When | Effect |
//! |------|-------------|--------|
//! | `ConfigError` | A construct in the configuration is invalid | That construct is dropped, the rest loads |
//! | `UnitFault` | One template/system/action fails mid-tick | That unit is skipped for the tick |
//! | `SimulationError` | The run cannot start safely | Nothing is simulated |
//! | `PersistenceError` | A seed or output file cannot be read or written | The caller decides |

use thiserror::Error;

/// A problem with one configuration construct.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// The document itself is not valid JSON for the config shape.
    #[error("configuration document is malformed: {0}")]
    MalformedDocument(String),

    /// A construct could not be deserialized.
    #[error("{section} entry #{index} is malformed: {reason}")]
    MalformedConstruct {
        section: &'static str,
        index: usize,
        reason: String,
    },

    /// Two constructs in the same section share an id.
    #[error("duplicate {section} id '{id}'")]
    DuplicateId { section: &'static str, id: String },

    /// An entity kind is referenced but never declared.
    #[error("{owner} references unknown entity kind '{kind}'")]
    UnknownEntityKind { owner: String, kind: String },

    /// A relationship kind is referenced but never declared.
    #[error("{owner} references unknown relationship kind '{kind}'")]
    UnknownRelationshipKind { owner: String, kind: String },

    /// A tag is referenced but missing from a non-empty tag registry.
    #[error("{owner} references unregistered tag '{tag}'")]
    UnknownTag { owner: String, tag: String },

    /// A pressure is referenced but never declared.
    #[error("{owner} references unknown pressure '{pressure}'")]
    UnknownPressure { owner: String, pressure: String },

    /// A template follow-up names a template that does not exist.
    #[error("{owner} invokes unknown template '{template}'")]
    UnknownTemplate { owner: String, template: String },

    /// A `$name` reference does not resolve inside its template or action.
    #[error("{owner} uses unresolved reference '{reference}'")]
    UnresolvedReference { owner: String, reference: String },

    /// A feedback term could not be interpreted; it will contribute zero.
    #[error("pressure '{pressure}' feedback term #{index} is malformed: {reason}")]
    MalformedFeedback {
        pressure: String,
        index: usize,
        reason: String,
    },
}

/// A runtime failure inside one unit of work.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum UnitFault {
    #[error("entity {0} not found")]
    MissingEntity(String),

    #[error("reference '{0}' did not resolve")]
    UnresolvedReference(String),

    #[error("state machine {machine}: status '{status}' is not a known state")]
    UnknownState { machine: String, status: String },

    #[error("{0}")]
    Invalid(String),
}

/// A condition that prevents the run from starting.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SimulationError {
    #[error("no eras are configured")]
    NoEras,

    #[error("seed graph has no entity of kind 'era'")]
    MissingEraEntities,

    #[error("cyclic template invocation: {}", .0.join(" -> "))]
    CyclicTemplateInvocation(Vec<String>),

    #[error("seed graph is inconsistent: {0}")]
    InvalidSeedGraph(String),
}

/// Reading or writing seed graphs and simulation output.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SimulationError::CyclicTemplateInvocation(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "cyclic template invocation: a -> b -> a");

        let err = ConfigError::UnknownEntityKind { owner: "template 'x'".into(), kind: "ship".into() };
        assert_eq!(err.to_string(), "template 'x' references unknown entity kind 'ship'");
    }
}
