//! Configuration constants for the quiz room engine
//!
//! This module contains the hard limits and constraints used throughout
//! the engine to ensure data integrity and provide consistent boundaries
//! for quizzes, rooms and participants.

/// Quiz-wide limits
pub mod quiz {
    /// Maximum number of questions allowed in a single quiz
    pub const MAX_QUESTION_COUNT: usize = 100;
    /// Maximum length of a quiz title in characters
    pub const MAX_TITLE_LENGTH: usize = 200;
}

/// Question limits
pub mod question {
    /// Minimum length of a question prompt
    pub const MIN_TEXT_LENGTH: usize = 1;
    /// Maximum length of a question prompt
    pub const MAX_TEXT_LENGTH: usize = 500;
    /// Minimum time limit in seconds for answering a question
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum time limit in seconds for answering a question
    pub const MAX_TIME_LIMIT: u64 = 240;
    /// Minimum number of answer options per question
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of answer options per question
    pub const MAX_OPTION_COUNT: usize = 8;
    /// Maximum base points a question may award
    pub const MAX_POINTS: u64 = 10_000;
}

/// Answer option limits
pub mod answer_option {
    /// Maximum length of answer option text in characters
    pub const MAX_TEXT_LENGTH: usize = 200;
}

/// Room limits
pub mod room {
    /// Number of characters in a room code
    pub const CODE_LENGTH: usize = 6;
    /// Characters a room code is drawn from (no 0/O or 1/I look-alikes)
    pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    /// Maximum number of participants allowed in a single room
    pub const MAX_PARTICIPANT_COUNT: usize = 1000;
    /// Number of attempts made to find an unused room code
    pub const CODE_ATTEMPTS: usize = 16;
}

/// Nickname limits
pub mod nickname {
    /// Maximum length of a nickname in bytes
    pub const MAX_LENGTH: usize = 30;
}

/// Bounds for the runtime tuning in [`crate::config::Options`], in milliseconds
pub mod timing {
    /// Upper bound for the reveal window shown after an answer
    pub const MAX_REVEAL_WINDOW: u64 = 10_000;
    /// Upper bound for the submission grace window after a reset
    pub const MAX_RESET_GRACE: u64 = 2_000;
    /// Upper bound for the delay before an automatic finish
    pub const MAX_COMPLETION_GRACE: u64 = 10_000;
    /// Lower bound for the countdown tick period
    pub const MIN_TICK: u64 = 100;
    /// Upper bound for the countdown tick period
    pub const MAX_TICK: u64 = 5_000;
}

/// Notification channel limits
pub mod notify {
    /// Events buffered per room before slow subscribers start lagging
    pub const CHANNEL_CAPACITY: usize = 256;
}

/// Session actor limits
pub mod actor {
    /// Commands queued for an actor before senders wait
    pub const INBOX_CAPACITY: usize = 32;
}
