//! Typed row identifiers
//!
//! Every stored entity (quizzes, questions, rooms, participants, users) is
//! identified by a UUID. The identifier is tagged with the entity it refers
//! to so a participant id can never be passed where a room id is expected.

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use derive_where::derive_where;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// Marker for the external user collaborator (authentication is out of scope)
#[derive(Debug)]
pub enum User {}

/// A unique identifier for a row of type `T`
#[derive_where(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(DeserializeFromStr, SerializeDisplay)]
pub struct Id<T> {
    uuid: Uuid,
    #[derive_where(skip)]
    marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Creates a new random identifier
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Wraps an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            marker: PhantomData,
        }
    }

    /// Returns the underlying UUID
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl<T> Default for Id<T> {
    /// Creates a new random identifier (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.uuid.fmt(f)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::from_str(s)?))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    struct Row;

    #[test]
    fn test_id_new_is_unique() {
        let a: Id<Row> = Id::new();
        let b: Id<Row> = Id::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_display_and_parse() {
        let id: Id<Row> = Id::new();
        let parsed: Id<Row> = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_serializes_as_string() {
        let uuid = Uuid::from_u128(0x1234);
        let id: Id<Row> = Id::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn test_id_deserialization_error() {
        let result: Result<Id<Row>, _> = serde_json::from_str("\"not-a-uuid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_id_is_copy_without_row_bounds() {
        // Row implements nothing, yet the id is still Copy + Hash
        let id: Id<Row> = Id::new();
        let copy = id;
        let mut set = std::collections::HashSet::new();
        set.insert(id);
        assert!(set.contains(&copy));
    }
}
