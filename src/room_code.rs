//! Room code generation and parsing
//!
//! Participants join a room by typing a short code shown on the host's
//! screen. Codes are a fixed number of characters drawn from an alphabet
//! without look-alike glyphs, and parse case-insensitively so a code read
//! aloud or typed in lowercase still resolves.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::room::{CODE_ALPHABET, CODE_LENGTH};

/// A join code identifying exactly one room
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct RoomCode([u8; CODE_LENGTH]);

/// Reasons a string is not a room code
#[derive(Error, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The code has the wrong number of characters
    #[error("room code must be {} characters long", CODE_LENGTH)]
    Length,
    /// The code contains a character outside the code alphabet
    #[error("room code contains an invalid character")]
    Character,
}

impl RoomCode {
    /// Creates a new random room code
    pub fn new() -> Self {
        let mut code = [0; CODE_LENGTH];
        for c in &mut code {
            *c = CODE_ALPHABET[fastrand::usize(..CODE_ALPHABET.len())];
        }
        Self(code)
    }

    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        // only ASCII from CODE_ALPHABET is ever stored
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Default for RoomCode {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomCode {
    type Err = Error;

    /// Parses a room code, ignoring surrounding whitespace and letter case
    ///
    /// # Errors
    ///
    /// Returns `Error::Length` if the trimmed input is not exactly
    /// `CODE_LENGTH` characters, or `Error::Character` if any character
    /// falls outside the code alphabet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != CODE_LENGTH {
            return Err(Error::Length);
        }
        let mut code = [0; CODE_LENGTH];
        for (slot, c) in code.iter_mut().zip(s.bytes()) {
            let c = c.to_ascii_uppercase();
            if !CODE_ALPHABET.contains(&c) {
                return Err(Error::Character);
            }
            *slot = c;
        }
        Ok(Self(code))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_new_uses_alphabet() {
        for _ in 0..100 {
            let code = RoomCode::new();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|c| CODE_ALPHABET.contains(&c)));
        }
    }

    #[test]
    fn test_room_code_parse_case_insensitive() {
        let code = RoomCode::from_str(" abc234 ").unwrap();
        assert_eq!(code.to_string(), "ABC234");
    }

    #[test]
    fn test_room_code_wrong_length() {
        assert_eq!(RoomCode::from_str("ABC"), Err(Error::Length));
        assert_eq!(RoomCode::from_str(""), Err(Error::Length));
        assert_eq!(RoomCode::from_str("ABCDEFG"), Err(Error::Length));
    }

    #[test]
    fn test_room_code_invalid_character() {
        // 0 and O are excluded from the alphabet
        assert_eq!(RoomCode::from_str("ABC0DE"), Err(Error::Character));
        assert_eq!(RoomCode::from_str("ABCODE"), Err(Error::Character));
        assert_eq!(RoomCode::from_str("AB-CDE"), Err(Error::Character));
    }

    #[test]
    fn test_room_code_multibyte_input_rejected() {
        assert!(RoomCode::from_str("ÄBCDE").is_err());
    }

    #[test]
    fn test_room_code_serialization() {
        let code = RoomCode::from_str("HJK789").unwrap();
        let serialized = serde_json::to_string(&code).unwrap();
        assert_eq!(serialized, "\"HJK789\"");

        let deserialized: RoomCode = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_room_code_deserialization_error() {
        let result: Result<RoomCode, _> = serde_json::from_str("\"1\"");
        assert!(result.is_err());
    }
}
