//! Stored rows: rooms, participants and answers
//!
//! These are the records the storage collaborator persists and the
//! notification collaborator reports changes for. Rooms and participants
//! carry a row `version` that storage bumps on every write; reconcilers use
//! it to discard stale or redelivered notifications.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::SystemTime;

use crate::{
    id::{Id, User},
    mode::{self, ModeStrategy},
    quiz::{Question, Quiz},
    room_code::RoomCode,
};

/// How a room plays
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A single participant playing against the clock
    #[display("solo")]
    Solo,
    /// Lockstep play where the display follows the fastest participant
    #[display("multiplayer")]
    Multiplayer,
    /// Self-paced play with free navigation and a shared time budget
    #[display("practice")]
    Practice,
}

impl Mode {
    /// The lifecycle rules for this mode
    pub fn strategy(self) -> &'static dyn ModeStrategy {
        match self {
            Mode::Solo => &mode::Solo,
            Mode::Multiplayer => &mode::Multiplayer,
            Mode::Practice => &mode::Practice,
        }
    }
}

/// Room lifecycle status; the declaration order is the only legal order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepting participants, not yet started
    #[display("waiting")]
    Waiting,
    /// Questions are being played
    #[display("playing")]
    Playing,
    /// Game over; read-only from here on
    #[display("finished")]
    Finished,
}

/// One play session of a quiz
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRoom {
    /// Identifier of the room row
    pub id: Id<GameRoom>,
    /// Join code, unique across rooms
    pub code: RoomCode,
    /// The quiz being played
    pub quiz_id: Id<Quiz>,
    /// The user who created the room and controls it
    pub host_id: Id<User>,
    /// How the room plays
    pub mode: Mode,
    /// Lifecycle status
    pub status: Status,
    /// Index of the question the host's screen shows
    pub display_pointer: usize,
    /// When play began
    pub started_at: Option<SystemTime>,
    /// When the practice clock began (practice rooms only)
    pub practice_started_at: Option<SystemTime>,
    /// Total practice time budget fixed at start (practice rooms only)
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    pub practice_budget: Option<Duration>,
    /// When the room finished
    pub finished_at: Option<SystemTime>,
    /// Row version, bumped by storage on every write
    pub version: u64,
}

impl GameRoom {
    /// A fresh room in `waiting`
    pub fn new(code: RoomCode, quiz_id: Id<Quiz>, host_id: Id<User>, mode: Mode) -> Self {
        Self {
            id: Id::new(),
            code,
            quiz_id,
            host_id,
            mode,
            status: Status::Waiting,
            display_pointer: 0,
            started_at: None,
            practice_started_at: None,
            practice_budget: None,
            finished_at: None,
            version: 0,
        }
    }

    /// Remaining practice budget at `now`, or `None` outside a started practice room
    pub fn practice_remaining(&self, now: SystemTime) -> Option<Duration> {
        let started = self.practice_started_at?;
        let budget = self.practice_budget?;
        let elapsed = now.duration_since(started).unwrap_or_default();
        Some(budget.saturating_sub(elapsed))
    }
}

/// A user taking part in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Identifier of the participant row
    pub id: Id<Participant>,
    /// The room this participant belongs to
    pub room_id: Id<GameRoom>,
    /// The user behind this participant
    pub user_id: Id<User>,
    /// Display name, unique within the room
    pub nickname: String,
    /// Cached total score; authoritative value is the sum of answer points
    pub score: u64,
    /// Index of the question this participant is on
    pub pointer: usize,
    /// Whether this participant has completed the quiz
    pub finished: bool,
    /// When the participant joined
    pub joined_at: SystemTime,
    /// Row version, bumped by storage on every write
    pub version: u64,
}

impl Participant {
    /// A fresh participant at the first question
    pub fn new(
        room_id: Id<GameRoom>,
        user_id: Id<User>,
        nickname: String,
        joined_at: SystemTime,
    ) -> Self {
        Self {
            id: Id::new(),
            room_id,
            user_id,
            nickname,
            score: 0,
            pointer: 0,
            finished: false,
            joined_at,
            version: 0,
        }
    }
}

/// A participant's response to one question
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The room the answer was given in
    pub room_id: Id<GameRoom>,
    /// Who answered
    pub participant_id: Id<Participant>,
    /// Which question was answered
    pub question_id: Id<Question>,
    /// Position of the chosen option
    pub option: usize,
    /// Whether the chosen option is the correct one
    pub correct: bool,
    /// Points earned by this answer
    pub points: u64,
    /// Time taken from the question becoming current to the submission
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub answer_time: Duration,
}
