//! The storage collaborator
//!
//! Quizzes, rooms, participants and answers live in shared storage that
//! every client reads and writes. The engine only relies on the contract in
//! [`Store`]: rows are written whole, last write wins, every room and
//! participant write bumps that row's version, and every such write is
//! published on the room's notification channel. [`MemoryStore`] is an
//! in-process implementation of that contract.

use std::sync::{Arc, Mutex, MutexGuard};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::{
    id::{Id, User},
    model::{Answer, GameRoom, Participant},
    notify::{ChangeEvent, Hub, Kind, Notifier},
    quiz::Quiz,
    room_code::RoomCode,
    scoring,
};

/// Errors reported by storage writes and reads
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Storage could not be reached or refused the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// Another room already holds the requested code
    #[error("room code is already in use")]
    CodeTaken,
    /// The row being updated does not exist
    #[error("row does not exist")]
    MissingRow,
}

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations the engine needs
///
/// Reads return `Ok(None)` for absent rows; only writes to absent rows are
/// errors.
pub trait Store: Send + Sync {
    /// Retrieves a quiz with its questions in order and options by position
    fn quiz(&self, id: Id<Quiz>) -> StoreResult<Option<Quiz>>;

    /// Creates a room
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CodeTaken` if another room uses the same code.
    fn create_room(&self, room: GameRoom) -> StoreResult<GameRoom>;

    /// Retrieves a room by id
    fn room(&self, id: Id<GameRoom>) -> StoreResult<Option<GameRoom>>;

    /// Retrieves a room by its join code
    fn room_by_code(&self, code: &RoomCode) -> StoreResult<Option<GameRoom>>;

    /// Overwrites a room row, returning it with its new version
    fn update_room(&self, room: &GameRoom) -> StoreResult<GameRoom>;

    /// Creates a participant
    fn create_participant(&self, participant: Participant) -> StoreResult<Participant>;

    /// Retrieves a participant by id
    fn participant(&self, id: Id<Participant>) -> StoreResult<Option<Participant>>;

    /// Retrieves the participant a user holds in a room
    fn participant_for_user(
        &self,
        room: Id<GameRoom>,
        user: Id<User>,
    ) -> StoreResult<Option<Participant>>;

    /// Overwrites a participant row, returning it with its new version
    fn update_participant(&self, participant: &Participant) -> StoreResult<Participant>;

    /// Writes only the cached score of a participant
    fn set_score(&self, id: Id<Participant>, score: u64) -> StoreResult<Participant>;

    /// Lists a room's participants by score, highest first, then by join time
    fn participants(&self, room: Id<GameRoom>) -> StoreResult<Vec<Participant>>;

    /// Creates or replaces the answer for `(participant, question)`
    fn upsert_answer(&self, answer: Answer) -> StoreResult<Answer>;

    /// Lists a participant's answers
    fn answers(&self, participant: Id<Participant>) -> StoreResult<Vec<Answer>>;

    /// Lists every answer given in a room
    fn room_answers(&self, room: Id<GameRoom>) -> StoreResult<Vec<Answer>>;

    /// Sum of points over a participant's answers
    fn total_points(&self, participant: Id<Participant>) -> StoreResult<u64> {
        Ok(scoring::authoritative_score(&self.answers(participant)?))
    }
}

#[derive(Debug, Default)]
struct Tables {
    quizzes: Vec<Quiz>,
    rooms: Vec<GameRoom>,
    participants: Vec<Participant>,
    answers: Vec<Answer>,
    failing_writes: usize,
    failing_participant_writes: usize,
}

impl Tables {
    /// Consumes one injected write failure, if any are pending
    fn check_write(&mut self) -> StoreResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Like [`Tables::check_write`], for failures that only hit participant rows
    fn check_participant_write(&mut self) -> StoreResult<()> {
        if self.failing_participant_writes > 0 {
            self.failing_participant_writes -= 1;
            return Err(StoreError::Unavailable(
                "injected participant write failure".to_string(),
            ));
        }
        self.check_write()
    }
}

/// In-memory storage that publishes its writes to a [`Hub`]
///
/// Clones share the same tables and hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    hub: Hub,
}

impl MemoryStore {
    /// Creates an empty store with its own hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store publishing to `hub`
    pub fn with_hub(hub: Hub) -> Self {
        Self {
            tables: Arc::default(),
            hub,
        }
    }

    /// The hub this store publishes to
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Adds or replaces a quiz, normalizing its option order
    pub fn insert_quiz(&self, mut quiz: Quiz) -> StoreResult<()> {
        quiz.normalize();
        let mut tables = self.lock()?;
        tables.quizzes.retain(|q| q.id != quiz.id);
        tables.quizzes.push(quiz);
        Ok(())
    }

    /// Makes the next `count` writes fail with `StoreError::Unavailable`
    pub fn fail_writes(&self, count: usize) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.failing_writes = count;
        }
    }

    /// Makes the next `count` participant row updates fail while other
    /// writes go through
    pub fn fail_participant_writes(&self, count: usize) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.failing_participant_writes = count;
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write_participant<F>(&self, id: Id<Participant>, write: F) -> StoreResult<Participant>
    where
        F: FnOnce(&mut Participant),
    {
        let stored = {
            let mut tables = self.lock()?;
            tables.check_participant_write()?;
            let row = tables
                .participants
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(StoreError::MissingRow)?;
            let version = row.version + 1;
            write(row);
            row.version = version;
            row.clone()
        };
        self.hub
            .publish(ChangeEvent::participant(Kind::Update, &stored));
        Ok(stored)
    }
}

impl Store for MemoryStore {
    fn quiz(&self, id: Id<Quiz>) -> StoreResult<Option<Quiz>> {
        Ok(self.lock()?.quizzes.iter().find(|q| q.id == id).cloned())
    }

    fn create_room(&self, mut room: GameRoom) -> StoreResult<GameRoom> {
        {
            let mut tables = self.lock()?;
            tables.check_write()?;
            if tables.rooms.iter().any(|r| r.code == room.code) {
                return Err(StoreError::CodeTaken);
            }
            room.version = 1;
            tables.rooms.push(room.clone());
        }
        self.hub.publish(ChangeEvent::room(Kind::Insert, &room));
        Ok(room)
    }

    fn room(&self, id: Id<GameRoom>) -> StoreResult<Option<GameRoom>> {
        Ok(self.lock()?.rooms.iter().find(|r| r.id == id).cloned())
    }

    fn room_by_code(&self, code: &RoomCode) -> StoreResult<Option<GameRoom>> {
        Ok(self.lock()?.rooms.iter().find(|r| r.code == *code).cloned())
    }

    fn update_room(&self, room: &GameRoom) -> StoreResult<GameRoom> {
        let stored = {
            let mut tables = self.lock()?;
            tables.check_write()?;
            let row = tables
                .rooms
                .iter_mut()
                .find(|r| r.id == room.id)
                .ok_or(StoreError::MissingRow)?;
            let version = row.version + 1;
            *row = GameRoom {
                version,
                ..room.clone()
            };
            row.clone()
        };
        self.hub.publish(ChangeEvent::room(Kind::Update, &stored));
        Ok(stored)
    }

    fn create_participant(&self, mut participant: Participant) -> StoreResult<Participant> {
        {
            let mut tables = self.lock()?;
            tables.check_write()?;
            participant.version = 1;
            tables.participants.push(participant.clone());
        }
        self.hub
            .publish(ChangeEvent::participant(Kind::Insert, &participant));
        Ok(participant)
    }

    fn participant(&self, id: Id<Participant>) -> StoreResult<Option<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    fn participant_for_user(
        &self,
        room: Id<GameRoom>,
        user: Id<User>,
    ) -> StoreResult<Option<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .find(|p| p.room_id == room && p.user_id == user)
            .cloned())
    }

    fn update_participant(&self, participant: &Participant) -> StoreResult<Participant> {
        self.write_participant(participant.id, |row| {
            *row = participant.clone();
        })
    }

    fn set_score(&self, id: Id<Participant>, score: u64) -> StoreResult<Participant> {
        self.write_participant(id, |row| row.score = score)
    }

    fn participants(&self, room: Id<GameRoom>) -> StoreResult<Vec<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .filter(|p| p.room_id == room)
            .sorted_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)))
            .cloned()
            .collect_vec())
    }

    fn upsert_answer(&self, answer: Answer) -> StoreResult<Answer> {
        let mut tables = self.lock()?;
        tables.check_write()?;
        let key = |a: &Answer| (a.participant_id, a.question_id);
        match tables.answers.iter_mut().find(|a| key(a) == key(&answer)) {
            Some(row) => *row = answer.clone(),
            None => tables.answers.push(answer.clone()),
        }
        Ok(answer)
    }

    fn answers(&self, participant: Id<Participant>) -> StoreResult<Vec<Answer>> {
        Ok(self
            .lock()?
            .answers
            .iter()
            .filter(|a| a.participant_id == participant)
            .cloned()
            .collect_vec())
    }

    fn room_answers(&self, room: Id<GameRoom>) -> StoreResult<Vec<Answer>> {
        Ok(self
            .lock()?
            .answers
            .iter()
            .filter(|a| a.room_id == room)
            .cloned()
            .collect_vec())
    }
}
