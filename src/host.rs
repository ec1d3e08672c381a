//! The host's dashboard session
//!
//! The host owns the room row. Its session starts and ends play, and
//! watches participant changes to move the shared display pointer after
//! the fastest participant and to end the room once the mode's completion
//! predicate holds.

use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use web_time::SystemTime;

use crate::{
    TruncatedVec,
    actor::Reducer,
    config::Options,
    error::{Result, ValidationError},
    id::{Id, User},
    leaderboard::{Leaderboard, Standing, Summary},
    mode::Completion,
    model::{GameRoom, Mode, Participant, Status},
    notify::{Change, ChangeEvent},
    quiz::Quiz,
    room::{FinishReason, RoomStateMachine},
    store::Store,
    sync::{Conflict, Disposition},
};

/// Standings shown on the dashboard
const STANDINGS_LIMIT: usize = 50;

/// Timers the host session schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// The practice budget should have run out
    BudgetExpired,
    /// The completion grace delay is over
    CompletionGrace,
}

/// Actions the host's dashboard can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCommand {
    /// Start play
    Start,
    /// End the room now
    End,
    /// Refetch room and participants
    Refresh,
}

/// What the dashboard renders
#[derive(Debug, Clone, Serialize)]
pub struct HostView {
    /// The room row
    pub room: GameRoom,
    /// Leading standings
    pub standings: TruncatedVec<Standing>,
    /// Recap, once the room finished
    pub summary: Option<Summary>,
}

/// The host's client session
pub struct HostSession<S> {
    store: S,
    options: Options,
    host: Id<User>,
    quiz: Quiz,
    room: GameRoom,
    participants: Vec<Participant>,
    versions: HashMap<Id<Participant>, u64>,
    completion_pending: bool,
    summary: Option<Summary>,
}

impl<S: Store> HostSession<S> {
    /// Creates a room for `quiz_id` and opens its dashboard
    ///
    /// # Errors
    ///
    /// See [`RoomStateMachine::create_room`].
    pub fn create(
        store: S,
        options: Options,
        quiz_id: Id<Quiz>,
        host: Id<User>,
        mode: Mode,
    ) -> Result<Self> {
        let options = options.checked()?;
        let machine = RoomStateMachine::new(&store);
        let room = machine.create_room(quiz_id, host, mode)?;
        let quiz = machine.quiz(quiz_id)?;
        Ok(Self {
            store,
            options,
            host,
            quiz,
            room,
            participants: Vec::new(),
            versions: HashMap::new(),
            completion_pending: false,
            summary: None,
        })
    }

    /// Reopens the dashboard of an existing room
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - `host` does not own the room, or the code is malformed
    /// * `Error::NotFound` - No room has the code
    pub fn resume<F>(
        store: S,
        options: Options,
        code: &str,
        host: Id<User>,
        now: SystemTime,
        mut schedule: F,
    ) -> Result<Self>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let options = options.checked()?;
        let machine = RoomStateMachine::new(&store);
        let room = machine.lookup(code)?;
        if room.host_id != host {
            return Err(ValidationError::NotHost.into());
        }
        let quiz = machine.quiz(room.quiz_id)?;

        let mut session = Self {
            store,
            options,
            host,
            quiz,
            room,
            participants: Vec::new(),
            versions: HashMap::new(),
            completion_pending: false,
            summary: None,
        };
        session.refetch()?;
        match session.room.status {
            Status::Playing => {
                if let Some(remaining) = session.room.practice_remaining(now) {
                    schedule(AlarmMessage::BudgetExpired.into(), remaining);
                }
                session.evaluate(now, &mut schedule)?;
            }
            Status::Finished => session.load_summary(),
            Status::Waiting => {}
        }
        Ok(session)
    }

    /// The room as last seen
    pub fn room(&self) -> &GameRoom {
        &self.room
    }

    /// Participants as last fetched, by score
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// The dashboard view
    pub fn view(&self) -> HostView {
        HostView {
            room: self.room.clone(),
            standings: Leaderboard::new(&self.participants).top(STANDINGS_LIMIT),
            summary: self.summary.clone(),
        }
    }

    /// Starts play
    ///
    /// In practice rooms this also arms the budget timer.
    ///
    /// # Errors
    ///
    /// See [`RoomStateMachine::start`].
    pub fn start<F>(&mut self, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let room = RoomStateMachine::new(&self.store).start(self.room.id, self.host, now)?;
        if let Some(budget) = room.practice_budget {
            schedule(AlarmMessage::BudgetExpired.into(), budget);
        }
        self.adopt(room);
        Ok(())
    }

    /// Ends the room now, from `waiting` or `playing`
    ///
    /// # Errors
    ///
    /// See [`RoomStateMachine::finish`].
    pub fn end(&mut self, now: SystemTime) -> Result<()> {
        self.finish(FinishReason::Host(self.host), now)
    }

    /// Reconciles one change notification
    ///
    /// Participant changes may move the display pointer or complete the
    /// room.
    ///
    /// # Errors
    ///
    /// Returns the error of a display pointer or finish write the event
    /// triggered; the event itself is applied.
    pub fn notify<F>(
        &mut self,
        event: ChangeEvent,
        now: SystemTime,
        mut schedule: F,
    ) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if event.room_id != self.room.id {
            return Ok(Disposition::Ignored(Conflict::ForeignRoom));
        }
        match event.change {
            Change::Room {
                status,
                display_pointer,
                ..
            } => {
                if event.version <= self.room.version {
                    return Ok(Disposition::Ignored(Conflict::StaleVersion));
                }
                if status < self.room.status || display_pointer < self.room.display_pointer {
                    debug!("ignoring backward room event v{}", event.version);
                    return Ok(Disposition::Ignored(Conflict::Regression));
                }
                let room = RoomStateMachine::new(&self.store).room(self.room.id)?;
                self.adopt(room);
                Ok(Disposition::Applied { reset: false })
            }
            Change::Participant { id, .. } => {
                if event.version <= self.versions.get(&id).copied().unwrap_or_default() {
                    return Ok(Disposition::Ignored(Conflict::StaleVersion));
                }
                self.versions.insert(id, event.version);
                self.refetch()?;
                self.evaluate(now, &mut schedule)?;
                Ok(Disposition::Applied { reset: false })
            }
        }
    }

    /// Refetches room and participants after events were lost
    ///
    /// # Errors
    ///
    /// Returns an error if a read or a triggered write fails.
    pub fn recover<F>(&mut self, now: SystemTime, mut schedule: F) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let room = RoomStateMachine::new(&self.store).room(self.room.id)?;
        self.adopt(room);
        self.refetch()?;
        self.evaluate(now, &mut schedule)?;
        Ok(Disposition::Applied { reset: false })
    }

    /// Handles an alarm scheduled by this session
    ///
    /// # Errors
    ///
    /// Returns the error of a finish write the alarm triggered.
    pub fn alarm<F>(&mut self, message: AlarmMessage, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let completion = RoomStateMachine::new(&self.store).check_completion(self.room.id, now)?;
        match (message, completion) {
            (AlarmMessage::CompletionGrace, completion) => {
                self.completion_pending = false;
                if let Some(completion) = completion {
                    self.finish(FinishReason::Completed(completion), now)?;
                }
            }
            (AlarmMessage::BudgetExpired, Some(completion)) => {
                self.finish(FinishReason::Completed(completion), now)?;
            }
            (AlarmMessage::BudgetExpired, None) => {
                // woke early; wait for the rest of the budget
                let room = RoomStateMachine::new(&self.store).room(self.room.id)?;
                if room.status == Status::Playing {
                    if let Some(remaining) = room.practice_remaining(now) {
                        schedule(AlarmMessage::BudgetExpired.into(), remaining);
                    }
                }
            }
        }
        Ok(())
    }

    /// Moves the display pointer and checks completion
    fn evaluate<F>(&mut self, now: SystemTime, schedule: &mut F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.room.status != Status::Playing {
            return Ok(());
        }
        let strategy = self.room.mode.strategy();
        if let Some(target) = strategy.next_display_pointer(
            self.room.display_pointer,
            &self.participants,
            self.quiz.len(),
        ) {
            let room = RoomStateMachine::new(&self.store).advance_display(self.room.id, target)?;
            self.adopt(room);
        }

        match RoomStateMachine::new(&self.store).check_completion(self.room.id, now)? {
            Some(Completion::AllFinished) if self.completion_pending => {}
            Some(completion) if completion.deferred() => {
                self.completion_pending = true;
                debug!("room {} complete, finishing after grace", self.room.code);
                schedule(
                    AlarmMessage::CompletionGrace.into(),
                    self.options.completion_grace,
                );
            }
            Some(completion) => self.finish(FinishReason::Completed(completion), now)?,
            None => {}
        }
        Ok(())
    }

    fn finish(&mut self, reason: FinishReason, now: SystemTime) -> Result<()> {
        let room = RoomStateMachine::new(&self.store).finish(self.room.id, reason, now)?;
        self.adopt(room);
        self.refetch()
    }

    /// Takes a room row read or written by this session
    fn adopt(&mut self, room: GameRoom) {
        if room.version <= self.room.version {
            return;
        }
        let finished = room.status == Status::Finished && self.room.status != Status::Finished;
        self.room = room;
        if finished {
            info!("dashboard of room {} closed", self.room.code);
            self.completion_pending = false;
            self.load_summary();
        }
    }

    fn refetch(&mut self) -> Result<()> {
        let participants = self.store.participants(self.room.id)?;
        for participant in &participants {
            let version = self.versions.entry(participant.id).or_default();
            *version = (*version).max(participant.version);
        }
        self.participants = participants;
        Ok(())
    }

    fn load_summary(&mut self) {
        match Summary::load(&self.store, self.room.id) {
            Ok(summary) => self.summary = Some(summary),
            Err(e) => warn!("recap of room {} not loaded: {e}", self.room.code),
        }
    }
}

impl<S: Store + 'static> Reducer for HostSession<S> {
    type Command = HostCommand;
    type Reply = Result<()>;
    type Snapshot = HostView;

    fn handle_command<F>(&mut self, command: HostCommand, now: SystemTime, schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        match command {
            HostCommand::Start => self.start(now, schedule),
            HostCommand::End => self.end(now),
            HostCommand::Refresh => self.recover(now, schedule).map(|_| ()),
        }
    }

    fn handle_event<F>(&mut self, event: ChangeEvent, now: SystemTime, schedule: F) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        self.notify(event, now, schedule)
    }

    fn handle_lag<F>(&mut self, now: SystemTime, schedule: F) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        self.recover(now, schedule)
    }

    fn handle_alarm<F>(&mut self, alarm: crate::AlarmMessage, now: SystemTime, schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        match alarm {
            crate::AlarmMessage::Host(message) => self.alarm(message, now, schedule),
            crate::AlarmMessage::Participant(_) => Ok(()),
        }
    }

    fn snapshot(&self) -> HostView {
        self.view()
    }
}
