//! Nickname validation
//!
//! Participants pick their own nickname when joining. Names are trimmed,
//! length-limited, filtered for inappropriate content and must be unique
//! within a room.

use rustrict::CensorStr;
use serde::Serialize;
use thiserror::Error;

use crate::{constants::nickname::MAX_LENGTH, model::Participant};

/// Errors that can occur during nickname validation
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested name is already in use by another participant
    #[error("name already in-use")]
    Used,
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

/// Validates a requested nickname against the room's existing participants
///
/// # Returns
///
/// The cleaned nickname on success.
///
/// # Errors
///
/// * `Error::TooLong` - Name exceeds `MAX_LENGTH` bytes
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::Sinful` - Name contains inappropriate content
/// * `Error::Used` - Name is already taken in this room
pub fn validate(name: &str, existing: &[Participant]) -> Result<String, Error> {
    if name.len() > MAX_LENGTH {
        return Err(Error::TooLong);
    }
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    if existing.iter().any(|p| p.nickname == name) {
        return Err(Error::Used);
    }
    Ok(name.to_owned())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::id::Id;
    use web_time::SystemTime;

    fn existing(name: &str) -> Vec<Participant> {
        vec![Participant::new(
            Id::new(),
            Id::new(),
            name.to_string(),
            SystemTime::now(),
        )]
    }

    #[test]
    fn test_valid_name() {
        assert_eq!(validate("Alice", &[]), Ok("Alice".to_string()));
    }

    #[test]
    fn test_whitespace_trimming() {
        assert_eq!(validate("  Bob  ", &[]), Ok("Bob".to_string()));
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(validate("", &[]), Err(Error::Empty));
        assert_eq!(validate("   ", &[]), Err(Error::Empty));
    }

    #[test]
    fn test_too_long() {
        let long = "a".repeat(MAX_LENGTH + 1);
        assert_eq!(validate(&long, &[]), Err(Error::TooLong));
        let max = "a".repeat(MAX_LENGTH);
        assert!(validate(&max, &[]).is_ok());
    }

    #[test]
    fn test_inappropriate_content() {
        assert_eq!(validate("fuck", &[]), Err(Error::Sinful));
    }

    #[test]
    fn test_duplicate_in_room() {
        assert_eq!(validate("Carol", &existing("Carol")), Err(Error::Used));
        assert_eq!(validate(" Carol ", &existing("Carol")), Err(Error::Used));
        assert!(validate("carol", &existing("Carol")).is_ok());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Used.to_string(), "name already in-use");
        assert_eq!(Error::Empty.to_string(), "name cannot be empty");
    }
}
