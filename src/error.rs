//! Errors surfaced by room and session operations
//!
//! Every failure falls into one of a few categories that decide how a
//! client reacts: validation problems are shown to the user, missing or
//! unjoinable rooms send the client away, illegal transitions are rejected
//! and logged, and persistence failures roll back the optimistic update so
//! the user can retry. Stale notifications are not errors at all; the
//! reconciler drops them (see [`crate::sync::Disposition`]).

use log::warn;
use serde::Serialize;
use thiserror::Error;

use crate::{model::Status, names, room_code, store::StoreError};

/// Input that was rejected before anything was written
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The room code is malformed
    #[error("invalid room code: {0}")]
    RoomCode(#[from] room_code::Error),
    /// The nickname was rejected
    #[error("invalid nickname: {0}")]
    Nickname(#[from] names::Error),
    /// The quiz is not playable
    #[error("invalid quiz: {0}")]
    Quiz(String),
    /// The session timing options are out of bounds
    #[error("invalid options: {0}")]
    Options(String),
    /// The room cannot take more participants
    #[error("room is full")]
    RoomFull,
    /// The room cannot start without participants
    #[error("room has no participants")]
    NoParticipants,
    /// The selected option does not exist on the current question
    #[error("no option at position {0}")]
    Option(usize),
    /// The requested question index is outside the quiz
    #[error("no question at index {0}")]
    Question(usize),
    /// The acting user is not the room's host
    #[error("only the host may do this")]
    NotHost,
}

/// The kind of row that could not be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
pub enum Missing {
    /// A room, by id or code
    #[display("room")]
    Room,
    /// A quiz
    #[display("quiz")]
    Quiz,
    /// A participant
    #[display("participant")]
    Participant,
}

/// A room lifecycle action, for transition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
pub enum Action {
    /// `waiting -> playing`
    #[display("start")]
    Start,
    /// Moving the display pointer
    #[display("advance")]
    Advance,
    /// Submitting or revising an answer
    #[display("answer")]
    Answer,
    /// Moving between questions
    #[display("navigate")]
    Navigate,
    /// Declaring a participant or room finished
    #[display("finish")]
    Finish,
}

/// Errors returned by room and session operations
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Rejected input; shown to the user, not retried
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A referenced row does not exist
    #[error("{0} not found")]
    NotFound(Missing),
    /// The room exists but no longer accepts participants
    #[error("room is {0} and cannot be joined")]
    NotJoinable(Status),
    /// The action is illegal in the room's current status
    #[error("cannot {action} while room is {status}")]
    Transition {
        /// Status the room was in
        status: Status,
        /// The rejected action
        action: Action,
    },
    /// A write failed; optimistic local changes were rolled back
    #[error("write failed: {0}")]
    Persistence(#[from] StoreError),
}

/// How a client should treat an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Show to the user; retrying the same input will fail again
    Validation,
    /// Redirect away from the room
    NotFound,
    /// Rejected at the boundary; local state is unchanged
    Transition,
    /// Report to the acting client; the action may be retried
    Persistence,
}

impl Error {
    /// Rejects `action` in a room that is `status`, logging the rejection
    pub fn transition(status: Status, action: Action) -> Self {
        warn!("rejected {action} while room is {status}");
        Error::Transition { status, action }
    }

    /// Classifies this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) | Error::NotJoinable(_) => ErrorKind::NotFound,
            Error::Transition { .. } => ErrorKind::Transition,
            Error::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Whether retrying the same action may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence)
    }
}

impl From<names::Error> for Error {
    fn from(e: names::Error) -> Self {
        Error::Validation(e.into())
    }
}

impl From<room_code::Error> for Error {
    fn from(e: room_code::Error) -> Self {
        Error::Validation(e.into())
    }
}

/// Result alias for room and session operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::from(names::Error::Empty).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::NotFound(Missing::Room).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::NotJoinable(Status::Playing).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::Transition {
                status: Status::Finished,
                action: Action::Start
            }
            .kind(),
            ErrorKind::Transition
        );
        assert_eq!(
            Error::from(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_transition_constructor() {
        let _ = env_logger::builder().is_test(true).try_init();
        let error = Error::transition(Status::Finished, Action::Navigate);
        assert_eq!(
            error,
            Error::Transition {
                status: Status::Finished,
                action: Action::Navigate
            }
        );
        assert_eq!(error.to_string(), "cannot navigate while room is finished");
    }

    #[test]
    fn test_only_persistence_is_retryable() {
        assert!(Error::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!Error::NotJoinable(Status::Finished).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::NotJoinable(Status::Playing).to_string(),
            "room is playing and cannot be joined"
        );
        assert_eq!(
            Error::Transition {
                status: Status::Finished,
                action: Action::Answer
            }
            .to_string(),
            "cannot answer while room is finished"
        );
        assert_eq!(
            Error::from(room_code::Error::Length).to_string(),
            "invalid room code: room code must be 6 characters long"
        );
        assert_eq!(Error::NotFound(Missing::Quiz).to_string(), "quiz not found");
    }
}
