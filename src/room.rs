//! Room lifecycle
//!
//! A room moves `waiting -> playing -> finished` and never back. Every
//! transition here reads the current row, checks the move is legal, and
//! writes the whole row once; when the write fails nothing else has
//! changed, so callers never observe a half-applied transition.

use garde::Validate;
use log::{info, warn};
use web_time::SystemTime;

use crate::{
    constants,
    error::{Action, Error, Missing, Result, ValidationError},
    id::{Id, User},
    mode::Completion,
    model::{GameRoom, Mode, Participant, Status},
    names,
    quiz::Quiz,
    room_code::RoomCode,
    store::{Store, StoreError},
};

/// Why a room is being finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum FinishReason {
    /// The mode's completion predicate held
    #[display("{_0:?}")]
    Completed(Completion),
    /// The host ended the room
    #[display("ended by host")]
    Host(Id<User>),
}

/// Room-level transitions over a storage collaborator
#[derive(Debug)]
pub struct RoomStateMachine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> RoomStateMachine<'a, S> {
    /// Creates a state machine writing through `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads a room by id
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the room does not exist.
    pub fn room(&self, id: Id<GameRoom>) -> Result<GameRoom> {
        self.store.room(id)?.ok_or(Error::NotFound(Missing::Room))
    }

    /// Loads a quiz by id
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the quiz does not exist.
    pub fn quiz(&self, id: Id<Quiz>) -> Result<Quiz> {
        self.store.quiz(id)?.ok_or(Error::NotFound(Missing::Quiz))
    }

    /// Resolves a typed room code to its room
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed code and
    /// `Error::NotFound` if no room has it.
    pub fn lookup(&self, code: &str) -> Result<GameRoom> {
        let code = code.parse::<RoomCode>()?;
        self.store
            .room_by_code(&code)?
            .ok_or(Error::NotFound(Missing::Room))
    }

    /// Binds a quiz to a new room in `waiting`
    ///
    /// The quiz is validated first. Room codes are random; a collision with
    /// an existing room is retried with a fresh code.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - The quiz does not exist
    /// * `Error::Validation` - The quiz is not playable
    /// * `Error::Persistence` - Storage failed, or no free code was found
    pub fn create_room(&self, quiz_id: Id<Quiz>, host: Id<User>, mode: Mode) -> Result<GameRoom> {
        let quiz = self.quiz(quiz_id)?;
        quiz.validate()
            .map_err(|report| ValidationError::Quiz(report.to_string()))?;

        for _ in 0..constants::room::CODE_ATTEMPTS {
            match self
                .store
                .create_room(GameRoom::new(RoomCode::new(), quiz_id, host, mode))
            {
                Ok(room) => {
                    info!("created {mode} room {} for quiz {quiz_id}", room.code);
                    return Ok(room);
                }
                Err(StoreError::CodeTaken) => {}
                Err(e) => return Err(e.into()),
            }
        }
        warn!("no free room code after {} attempts", constants::room::CODE_ATTEMPTS);
        Err(StoreError::CodeTaken.into())
    }

    /// Adds a user to a waiting room
    ///
    /// Joining twice returns the existing participant.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - Malformed code, rejected nickname, or full room
    /// * `Error::NotFound` - No room has the code
    /// * `Error::NotJoinable` - The room is no longer waiting
    /// * `Error::Persistence` - Storage failed
    pub fn join(
        &self,
        code: &str,
        user: Id<User>,
        nickname: &str,
        now: SystemTime,
    ) -> Result<(GameRoom, Participant)> {
        let room = self.lookup(code)?;
        if room.status != Status::Waiting {
            return Err(Error::NotJoinable(room.status));
        }
        if let Some(existing) = self.store.participant_for_user(room.id, user)? {
            return Ok((room, existing));
        }

        let participants = self.store.participants(room.id)?;
        if participants.len() >= room.mode.strategy().capacity() {
            return Err(ValidationError::RoomFull.into());
        }
        let nickname = names::validate(nickname, &participants)?;

        let participant = self
            .store
            .create_participant(Participant::new(room.id, user, nickname, now))?;
        info!("{} joined room {}", participant.nickname, room.code);
        Ok((room, participant))
    }

    /// Reattaches a user to the participant they already hold, in any status
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the room or the user's participant does
    /// not exist.
    pub fn resume(&self, code: &str, user: Id<User>) -> Result<(GameRoom, Participant)> {
        let room = self.lookup(code)?;
        let participant = self
            .store
            .participant_for_user(room.id, user)?
            .ok_or(Error::NotFound(Missing::Participant))?;
        Ok((room, participant))
    }

    /// Starts play: `waiting -> playing`
    ///
    /// Resets the display pointer and stamps the start time. Practice rooms
    /// also stamp the practice clock and fix the time budget to the sum of
    /// the quiz's time limits.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - `host` does not own the room, or nobody joined
    /// * `Error::Transition` - The room is not waiting
    /// * `Error::Persistence` - The write failed; the room is unchanged
    pub fn start(&self, room_id: Id<GameRoom>, host: Id<User>, now: SystemTime) -> Result<GameRoom> {
        let room = self.room(room_id)?;
        if room.host_id != host {
            return Err(ValidationError::NotHost.into());
        }
        if room.status != Status::Waiting {
            return Err(Error::transition(room.status, Action::Start));
        }
        if self.store.participants(room.id)?.is_empty() {
            return Err(ValidationError::NoParticipants.into());
        }
        let quiz = self.quiz(room.quiz_id)?;

        let mut next = room;
        next.status = Status::Playing;
        next.display_pointer = 0;
        next.started_at = Some(now);
        if next.mode == Mode::Practice {
            next.practice_started_at = Some(now);
            next.practice_budget = Some(quiz.total_budget());
        }

        let room = self.store.update_room(&next)?;
        info!("room {} started", room.code);
        Ok(room)
    }

    /// Moves the display pointer forward to `target`
    ///
    /// A target at or behind the current display pointer leaves the room
    /// as it is.
    ///
    /// # Errors
    ///
    /// * `Error::Transition` - The room is not playing
    /// * `Error::Validation` - `target` is past the last question
    /// * `Error::Persistence` - The write failed; the room is unchanged
    pub fn advance_display(&self, room_id: Id<GameRoom>, target: usize) -> Result<GameRoom> {
        let room = self.room(room_id)?;
        if room.status != Status::Playing {
            return Err(Error::transition(room.status, Action::Advance));
        }
        if target <= room.display_pointer {
            return Ok(room);
        }
        if target >= self.quiz(room.quiz_id)?.len() {
            return Err(ValidationError::Question(target).into());
        }

        let mut next = room;
        next.display_pointer = target;
        let room = self.store.update_room(&next)?;
        info!("room {} now displays question {target}", room.code);
        Ok(room)
    }

    /// Evaluates the room's completion predicate
    ///
    /// Only playing rooms can complete; for any other status this returns
    /// `None`.
    pub fn check_completion(&self, room_id: Id<GameRoom>, now: SystemTime) -> Result<Option<Completion>> {
        let room = self.room(room_id)?;
        if room.status != Status::Playing {
            return Ok(None);
        }
        let total = self.quiz(room.quiz_id)?.len();
        let participants = self.store.participants(room.id)?;
        Ok(room
            .mode
            .strategy()
            .completion(&room, &participants, total, now))
    }

    /// Ends the room: `playing -> finished`, or `waiting -> finished` when
    /// the host closes it before play
    ///
    /// Every participant's cached score is first reconciled to the sum of
    /// its answers. Finishing a finished room is a no-op.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - A host finish by someone other than the host
    /// * `Error::Transition` - Automatic completion of a room that is not playing
    /// * `Error::Persistence` - A write failed; the room is not finished
    pub fn finish(
        &self,
        room_id: Id<GameRoom>,
        reason: FinishReason,
        now: SystemTime,
    ) -> Result<GameRoom> {
        let room = self.room(room_id)?;
        if room.status == Status::Finished {
            return Ok(room);
        }
        match reason {
            FinishReason::Host(user) if user != room.host_id => {
                return Err(ValidationError::NotHost.into());
            }
            FinishReason::Completed(_) if room.status != Status::Playing => {
                return Err(Error::transition(room.status, Action::Finish));
            }
            _ => {}
        }

        self.reconcile_scores(room.id)?;

        let mut next = room;
        next.status = Status::Finished;
        next.finished_at = Some(now);
        let room = self.store.update_room(&next)?;
        info!("room {} finished: {reason}", room.code);
        Ok(room)
    }

    /// Rewrites every cached score that differs from its answer total
    fn reconcile_scores(&self, room_id: Id<GameRoom>) -> Result<()> {
        for participant in self.store.participants(room_id)? {
            let total = self.store.total_points(participant.id)?;
            if participant.score != total {
                self.store.set_score(participant.id, total)?;
            }
        }
        Ok(())
    }
}
