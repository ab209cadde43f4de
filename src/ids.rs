//! Identifier newtypes and their monotonic generators.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// ID TYPES
// =============================================================================

/// Macro to generate newtype ID wrappers with common derives and a prefixed Display.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(EntityId, "e");
define_id!(RelationshipId, "r");

// =============================================================================
// ID GENERATOR
// =============================================================================

/// Monotonic ID generator for a specific ID type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Start from a specific value (used after loading a seed graph).
    pub fn starting_at(start: u64) -> Self {
        Self { next: start }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Value the next call to `next_id` will return.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Collection of ID generators for everything the engine allocates.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdGenerators {
    pub entity: IdGenerator,
    pub relationship: IdGenerator,
}

impl IdGenerators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_entity(&mut self) -> EntityId { EntityId(self.entity.next_id()) }
    pub fn next_relationship(&mut self) -> RelationshipId { RelationshipId(self.relationship.next_id()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_monotonic() {
        let mut ids = IdGenerators::new();
        assert_eq!(ids.next_entity(), EntityId(0));
        assert_eq!(ids.next_entity(), EntityId(1));
        assert_eq!(ids.next_relationship(), RelationshipId(0));
        assert_eq!(ids.entity.peek(), 2);
    }

    #[test]
    fn test_display_prefix() {
        assert_eq!(EntityId(12).to_string(), "e12");
        assert_eq!(RelationshipId(3).to_string(), "r3");
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&EntityId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
