//! Participant sessions and event reconciliation
//!
//! A [`ParticipantSession`] owns one participant's view of a room: which
//! question is on screen, whether it was answered, how much time is left,
//! and the room's standings. It is driven by three inputs, user commands,
//! change notifications and its own alarms, and keeps the view consistent
//! with storage despite duplicate, late or out-of-order notifications.
//!
//! Notifications are filtered by row version before anything else: an
//! event is applied only if its version is strictly greater than the last
//! one applied for that row. What survives is then checked against the
//! forward-only rules for room status and pointers.
//!
//! Moving to a different question performs a per-question reset and starts
//! a new epoch. Alarms carry the epoch that scheduled them, so a reset
//! implicitly cancels every timer belonging to the previous question.

use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use web_time::SystemTime;

use crate::{
    actor::Reducer,
    config::Options,
    error::{Action, Error, Missing, Result, ValidationError},
    id::{Id, User},
    leaderboard::Leaderboard,
    mode::{ModeStrategy, TimerPolicy},
    model::{Answer, GameRoom, Participant, Status},
    notify::{Change, ChangeEvent},
    progress::Progress,
    quiz::{Question, Quiz},
    room::{FinishReason, RoomStateMachine},
    store::Store,
};

/// Timers a participant session schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Refresh the countdown of the question shown in `epoch`
    Tick {
        /// Epoch of the question the tick belongs to
        epoch: u64,
    },
    /// The post-reset grace window is over; accept answers
    GraceElapsed {
        /// Epoch of the reset that opened the window
        epoch: u64,
    },
    /// The correctness reveal is over; move to the next question
    RevealElapsed {
        /// Epoch of the answered question
        epoch: u64,
    },
    /// The question's time limit ran out
    TimeUp {
        /// Epoch of the timed question
        epoch: u64,
    },
    /// The practice budget should have run out
    BudgetElapsed,
    /// The completion grace delay is over; check whether the room is done
    CompletionGrace,
}

/// The question currently on a participant's screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    /// Index of the question within the quiz
    pub index: usize,
    /// Position of the selected option
    pub selected: Option<usize>,
    /// Whether an answer was recorded
    pub answered: bool,
    /// Whether correctness is being shown
    pub revealed: bool,
    /// Correctness of the recorded answer
    pub correct: Option<bool>,
    /// Points the recorded answer earned
    pub points: u64,
    /// Time left on the active countdown
    pub remaining: Duration,
    /// Whether answers are accepted right now
    pub accepting: bool,
    /// When the question became current for this participant
    pub shown_at: SystemTime,
}

/// Everything a participant's view renders from
#[derive(Debug, Clone)]
pub struct LocalState {
    /// Last applied room row
    pub room: GameRoom,
    /// Last applied own participant row
    pub me: Participant,
    /// Own progress; may run ahead of `me` while a write is outstanding
    pub progress: Progress,
    /// The question on screen, if any
    pub question: Option<QuestionView>,
    /// Everyone in the room, by score
    pub participants: Vec<Participant>,
    /// Incremented by every per-question reset
    pub epoch: u64,
}

/// Why a notification was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The event belongs to a different room
    ForeignRoom,
    /// The row version was already applied
    StaleVersion,
    /// The event would move status or a pointer backwards
    Regression,
}

/// What the reconciler did with a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event was applied; `reset` tells whether a per-question reset ran
    Applied {
        /// Whether the question on screen was reset
        reset: bool,
    },
    /// The event was dropped
    Ignored(Conflict),
}

/// User actions a participant's view can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Answer the current question with the option at this position
    Submit(usize),
    /// Skip the rest of the reveal and move on
    Advance,
    /// Jump to a question (practice only)
    Navigate(usize),
    /// Declare this participant finished (practice only)
    Finish,
    /// Refetch room, own row and participants
    Refresh,
}

/// One participant's client session
pub struct ParticipantSession<S> {
    store: S,
    options: Options,
    quiz: Quiz,
    state: LocalState,
    versions: HashMap<Id<Participant>, u64>,
}

impl<S: Store> ParticipantSession<S> {
    /// Joins a waiting room and opens a session for the new participant
    ///
    /// # Errors
    ///
    /// See [`RoomStateMachine::join`].
    pub fn join<F>(
        store: S,
        options: Options,
        code: &str,
        user: Id<User>,
        nickname: &str,
        now: SystemTime,
        mut schedule: F,
    ) -> Result<Self>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let options = options.checked()?;
        let (room, me) = RoomStateMachine::new(&store).join(code, user, nickname, now)?;
        Self::attach(store, options, room, me, now, &mut schedule)
    }

    /// Reopens the session of a user who already joined, in any room status
    ///
    /// A playing room is entered at the participant's stored pointer, or at
    /// the room's display pointer if that is further along.
    ///
    /// # Errors
    ///
    /// See [`RoomStateMachine::resume`].
    pub fn resume<F>(
        store: S,
        options: Options,
        code: &str,
        user: Id<User>,
        now: SystemTime,
        mut schedule: F,
    ) -> Result<Self>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let options = options.checked()?;
        let (room, me) = RoomStateMachine::new(&store).resume(code, user)?;
        Self::attach(store, options, room, me, now, &mut schedule)
    }

    fn attach<F>(
        store: S,
        options: Options,
        room: GameRoom,
        me: Participant,
        now: SystemTime,
        schedule: &mut F,
    ) -> Result<Self>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let quiz = RoomStateMachine::new(&store).quiz(room.quiz_id)?;
        let participants = store.participants(room.id)?;
        let progress = Progress::of(&me, quiz.len());
        let status = room.status;

        let mut session = Self {
            store,
            options,
            quiz,
            state: LocalState {
                room,
                me,
                progress,
                question: None,
                participants: Vec::new(),
                epoch: 0,
            },
            versions: HashMap::new(),
        };
        session
            .versions
            .insert(session.state.me.id, session.state.me.version);
        session.record_participants(participants);
        if status == Status::Playing {
            session.begin(now, schedule);
        }
        Ok(session)
    }

    /// The current view
    pub fn state(&self) -> &LocalState {
        &self.state
    }

    /// The quiz being played
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    /// Standings of everyone in the room
    pub fn leaderboard(&self) -> Leaderboard {
        Leaderboard::new(&self.state.participants)
    }

    fn strategy(&self) -> &'static dyn ModeStrategy {
        self.state.room.mode.strategy()
    }

    fn transition(&self, action: Action) -> Error {
        Error::transition(self.state.room.status, action)
    }

    /// Answers the current question
    ///
    /// Submissions during the post-reset grace window, after the countdown
    /// ran out, or for an already answered question in a mode without
    /// revisable answers are dropped without error. A repeat for an answered
    /// question still retries a score write that failed before.
    ///
    /// # Errors
    ///
    /// * `Error::Transition` - The room is not playing or nothing is on screen
    /// * `Error::Validation` - No option has position `option`
    /// * `Error::Persistence` - The answer write failed; the view is rolled
    ///   back so the submission can be retried. Or the answer was saved but
    ///   the cached score was not; submitting again retries the score write
    pub fn submit<F>(&mut self, option: usize, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing {
            return Err(self.transition(Action::Answer));
        }
        let Some(view) = self.state.question.clone() else {
            return Err(self.transition(Action::Answer));
        };
        let question = self
            .quiz
            .question(view.index)
            .ok_or(ValidationError::Question(view.index))?;
        let correct = question
            .is_correct(option)
            .ok_or(ValidationError::Option(option))?;
        let strategy = self.strategy();

        if !view.accepting {
            debug!("dropping submission for question {} during grace", view.index);
            return Ok(());
        }
        if view.answered && !strategy.revisable_answers() {
            // the answer is saved; a repeat only retries a failed score write
            return self.refresh_score();
        }

        let elapsed = now.duration_since(view.shown_at).unwrap_or_default();
        let remaining = match strategy.timer() {
            TimerPolicy::PerQuestion => question.time_limit.saturating_sub(elapsed),
            TimerPolicy::SharedBudget => self
                .state
                .room
                .practice_remaining(now)
                .unwrap_or_default(),
        };
        if remaining.is_zero() {
            debug!("dropping late submission for question {}", view.index);
            return Ok(());
        }

        let points = strategy
            .scoring()
            .points(question.points, correct, remaining, question.time_limit);
        let answer = Answer {
            room_id: self.state.room.id,
            participant_id: self.state.me.id,
            question_id: question.id,
            option,
            correct,
            points,
            answer_time: elapsed,
        };
        let reveal = !strategy.revisable_answers();

        let previous = self.state.question.replace(QuestionView {
            selected: Some(option),
            answered: true,
            revealed: reveal,
            correct: Some(correct),
            points,
            remaining,
            ..view
        });
        if let Err(e) = self.store.upsert_answer(answer) {
            warn!("answer to question {} not saved: {e}", view.index);
            self.state.question = previous;
            return Err(e.into());
        }
        let refreshed = self.refresh_score();
        if let Err(e) = &refreshed {
            warn!("score of {} not saved: {e}", self.state.me.nickname);
        }

        if reveal {
            schedule(
                AlarmMessage::RevealElapsed {
                    epoch: self.state.epoch,
                }
                .into(),
                self.options.reveal_window,
            );
        }
        refreshed
    }

    /// Moves to the next question once the current one was answered or ran
    /// out of time
    ///
    /// In practice mode this navigates to the next question.
    ///
    /// # Errors
    ///
    /// * `Error::Transition` - The room is not playing, or the current
    ///   question is still open
    /// * `Error::Persistence` - The pointer write failed; progress is rolled back
    pub fn advance<F>(&mut self, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing {
            return Err(self.transition(Action::Advance));
        }
        let Some(view) = self.state.question.as_ref() else {
            return Err(self.transition(Action::Advance));
        };
        if self.strategy().free_navigation() {
            let next = view.index + 1;
            return self.navigate(next, now, schedule);
        }
        if !view.answered && !view.remaining.is_zero() {
            return Err(self.transition(Action::Advance));
        }

        let before = self.state.progress;
        self.state.progress.advance();
        if let Err(e) = self.write_me() {
            warn!("pointer of {} not saved: {e}", self.state.me.nickname);
            self.state.progress = before;
            return Err(e);
        }
        self.settle(now, &mut schedule);
        Ok(())
    }

    /// Shows the question at `index` (practice only)
    ///
    /// Navigation is free in both directions; the stored pointer records
    /// the furthest question visited and never decreases.
    ///
    /// # Errors
    ///
    /// * `Error::Transition` - Not a practice room, not playing, or this
    ///   participant already finished
    /// * `Error::Validation` - `index` is outside the quiz
    /// * `Error::Persistence` - The pointer write failed; nothing changed
    pub fn navigate<F>(&mut self, index: usize, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing
            || !self.strategy().free_navigation()
            || self.state.progress.is_finished()
        {
            return Err(self.transition(Action::Navigate));
        }
        if index >= self.quiz.len() {
            return Err(ValidationError::Question(index).into());
        }
        if self.state.question.as_ref().map(|q| q.index) == Some(index) {
            return Ok(());
        }

        let before = self.state.progress;
        if self.state.progress.raise_to(index) {
            if let Err(e) = self.write_me() {
                warn!("pointer of {} not saved: {e}", self.state.me.nickname);
                self.state.progress = before;
                return Err(e);
            }
        }
        self.reset(index, now, &mut schedule);
        Ok(())
    }

    /// Declares this participant finished (practice only)
    ///
    /// The first participant to finish ends the room for everyone.
    ///
    /// # Errors
    ///
    /// * `Error::Transition` - Not a practice room, or the room is not playing
    /// * `Error::Persistence` - A write failed; calling again retries
    pub fn finish<F>(&mut self, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing || !self.strategy().free_navigation() {
            return Err(self.transition(Action::Finish));
        }
        if !self.state.progress.is_finished() {
            let before = self.state.progress;
            self.state.progress.finish();
            if let Err(e) = self.write_me() {
                warn!("finish of {} not saved: {e}", self.state.me.nickname);
                self.state.progress = before;
                return Err(e);
            }
            info!("{} finished practice", self.state.me.nickname);
        }
        self.state.question = None;
        self.state.epoch += 1;
        self.complete(now, &mut schedule)
    }

    /// Reconciles one change notification into the local view
    ///
    /// # Errors
    ///
    /// Returns an error only when a read needed to apply a status change
    /// fails; the event is then not applied and a later one (or
    /// [`Self::recover`]) will bring the view up to date.
    pub fn notify<F>(
        &mut self,
        event: ChangeEvent,
        now: SystemTime,
        mut schedule: F,
    ) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if event.room_id != self.state.room.id {
            return Ok(Disposition::Ignored(Conflict::ForeignRoom));
        }
        match event.change {
            Change::Room {
                status,
                display_pointer,
                ..
            } => {
                if event.version <= self.state.room.version {
                    debug!("ignoring stale room event v{}", event.version);
                    return Ok(Disposition::Ignored(Conflict::StaleVersion));
                }
                self.apply_room(status, display_pointer, event.version, now, &mut schedule)
            }
            Change::Participant {
                id,
                pointer,
                score,
                finished,
                ..
            } => {
                if event.version <= self.versions.get(&id).copied().unwrap_or_default() {
                    debug!("ignoring stale participant event v{}", event.version);
                    return Ok(Disposition::Ignored(Conflict::StaleVersion));
                }
                self.versions.insert(id, event.version);

                let mut reset = false;
                if id == self.state.me.id {
                    let me = &mut self.state.me;
                    me.version = event.version;
                    me.score = score;
                    me.finished |= finished;
                    me.pointer = me.pointer.max(pointer);
                    reset = self.adopt_own_pointer(pointer, finished, now, &mut schedule);
                }
                self.refetch_participants();
                Ok(Disposition::Applied { reset })
            }
        }
    }

    /// Refetches the room, own row and participant list after events were lost
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails; the view is left as it was.
    pub fn recover<F>(&mut self, now: SystemTime, mut schedule: F) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let room = RoomStateMachine::new(&self.store).room(self.state.room.id)?;
        let me = self
            .store
            .participant(self.state.me.id)?
            .ok_or(Error::NotFound(Missing::Participant))?;
        let participants = self.store.participants(room.id)?;
        self.record_participants(participants);

        let mut reset = false;
        if me.version > self.state.me.version {
            let (pointer, finished) = (me.pointer, me.finished);
            self.versions.insert(me.id, me.version);
            self.state.me = me;
            reset |= self.adopt_own_pointer(pointer, finished, now, &mut schedule);
        }
        if room.version > self.state.room.version {
            if let Disposition::Applied { reset: r } = self.apply_room(
                room.status,
                room.display_pointer,
                room.version,
                now,
                &mut schedule,
            )? {
                reset |= r;
            }
        }
        Ok(Disposition::Applied { reset })
    }

    /// Handles an alarm scheduled by this session
    ///
    /// Alarms from an earlier epoch are ignored.
    ///
    /// # Errors
    ///
    /// Returns the error of the write the alarm triggered, if any.
    pub fn alarm<F>(&mut self, message: AlarmMessage, now: SystemTime, mut schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let current = self.state.epoch;
        match message {
            AlarmMessage::Tick { epoch }
            | AlarmMessage::GraceElapsed { epoch }
            | AlarmMessage::RevealElapsed { epoch }
            | AlarmMessage::TimeUp { epoch }
                if epoch != current =>
            {
                debug!("ignoring {message:?}, current epoch is {current}");
                Ok(())
            }
            AlarmMessage::Tick { epoch } => self.tick(epoch, now, &mut schedule),
            AlarmMessage::GraceElapsed { .. } => {
                if let Some(view) = self.state.question.as_mut() {
                    view.accepting = !view.remaining.is_zero();
                }
                Ok(())
            }
            AlarmMessage::RevealElapsed { .. } => {
                if self.state.question.as_ref().is_some_and(|q| q.answered) {
                    self.advance(now, &mut schedule)
                } else {
                    Ok(())
                }
            }
            AlarmMessage::TimeUp { .. } => {
                let Some(view) = self.state.question.as_mut() else {
                    return Ok(());
                };
                if view.answered {
                    return Ok(());
                }
                debug!("question {} timed out", view.index);
                view.remaining = Duration::ZERO;
                view.accepting = false;
                self.advance(now, &mut schedule)
            }
            AlarmMessage::BudgetElapsed | AlarmMessage::CompletionGrace => {
                self.complete(now, &mut schedule)
            }
        }
    }

    fn tick<F>(&mut self, epoch: u64, now: SystemTime, schedule: &mut F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing {
            return Ok(());
        }
        let timer = self.strategy().timer();
        let remaining = match timer {
            TimerPolicy::PerQuestion => {
                let Some(view) = self.state.question.as_ref() else {
                    return Ok(());
                };
                let limit = self
                    .quiz
                    .question(view.index)
                    .map(|q| q.time_limit)
                    .unwrap_or_default();
                limit.saturating_sub(now.duration_since(view.shown_at).unwrap_or_default())
            }
            TimerPolicy::SharedBudget => self
                .state
                .room
                .practice_remaining(now)
                .unwrap_or_default(),
        };

        if let Some(view) = self.state.question.as_mut() {
            view.remaining = remaining;
            if remaining.is_zero() {
                view.accepting = false;
            }
        }
        if !remaining.is_zero() {
            schedule(AlarmMessage::Tick { epoch }.into(), self.options.tick);
        } else if timer == TimerPolicy::SharedBudget {
            return self.complete(now, schedule);
        }
        Ok(())
    }

    /// Finishes the room if its completion predicate holds
    fn complete<F>(&mut self, now: SystemTime, schedule: &mut F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.room.status != Status::Playing {
            return Ok(());
        }
        let machine = RoomStateMachine::new(&self.store);
        let Some(completion) = machine.check_completion(self.state.room.id, now)? else {
            return Ok(());
        };
        let room = machine.finish(self.state.room.id, FinishReason::Completed(completion), now)?;
        if room.version > self.state.room.version {
            self.apply_room(
                room.status,
                room.display_pointer,
                room.version,
                now,
                schedule,
            )?;
        }
        Ok(())
    }

    fn apply_room<F>(
        &mut self,
        status: Status,
        display_pointer: usize,
        version: u64,
        now: SystemTime,
        schedule: &mut F,
    ) -> Result<Disposition>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let previous = self.state.room.status;
        if status < previous {
            debug!("ignoring room event moving {previous} back to {status}");
            return Ok(Disposition::Ignored(Conflict::Regression));
        }

        if status > previous {
            let mut fresh = RoomStateMachine::new(&self.store).room(self.state.room.id)?;
            fresh.version = fresh.version.max(version);
            self.state.room = fresh;
            let reset = match self.state.room.status {
                Status::Playing => self.begin(now, schedule),
                Status::Finished => {
                    self.end();
                    false
                }
                Status::Waiting => false,
            };
            return Ok(Disposition::Applied { reset });
        }

        self.state.room.version = version;
        if display_pointer < self.state.room.display_pointer {
            debug!(
                "ignoring display pointer {display_pointer} behind {}",
                self.state.room.display_pointer
            );
            return Ok(Disposition::Ignored(Conflict::Regression));
        }
        if display_pointer == self.state.room.display_pointer {
            return Ok(Disposition::Applied { reset: false });
        }
        self.state.room.display_pointer = display_pointer;
        let reset = self.follow(now, schedule);
        Ok(Disposition::Applied { reset })
    }

    /// Enters a playing room; returns whether a question was reset
    fn begin<F>(&mut self, now: SystemTime, schedule: &mut F) -> bool
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if !self.strategy().free_navigation() {
            if self.state.progress.is_finished() {
                self.park(schedule);
                return false;
            }
            return self.follow(now, schedule);
        }

        if let Some(remaining) = self.state.room.practice_remaining(now) {
            schedule(AlarmMessage::BudgetElapsed.into(), remaining);
        }
        if self.state.progress.is_finished() {
            return false;
        }
        let last = self.quiz.len().saturating_sub(1);
        self.reset(self.state.progress.pointer().min(last), now, schedule);
        true
    }

    /// Leaves play once the room finished
    fn end(&mut self) {
        self.state.question = None;
        self.state.epoch += 1;
        self.refetch_participants();
        info!(
            "{} sees room {} finished",
            self.state.me.nickname, self.state.room.code
        );
    }

    /// Catches up with the room's display pointer and shows the question
    /// at this participant's pointer; returns whether a question was reset
    fn follow<F>(&mut self, now: SystemTime, schedule: &mut F) -> bool
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.strategy().free_navigation() || self.state.room.status != Status::Playing {
            return false;
        }
        if self.state.progress.raise_to(self.state.room.display_pointer) {
            // the local view follows the room even if this write is lost;
            // the next own-row write carries the raised pointer
            if let Err(e) = self.write_me() {
                warn!("raised pointer of {} not saved: {e}", self.state.me.nickname);
            }
        }
        self.settle(now, schedule)
    }

    /// Brings the question on screen in line with own progress; returns
    /// whether a question was reset
    fn settle<F>(&mut self, now: SystemTime, schedule: &mut F) -> bool
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.state.progress.is_finished() {
            if self.state.question.is_some() {
                self.park(schedule);
            }
            return false;
        }
        let pointer = self.state.progress.pointer();
        if self.state.question.as_ref().map(|q| q.index) == Some(pointer) {
            return false;
        }
        self.reset(pointer, now, schedule);
        true
    }

    /// Applies a newer pointer for this participant seen in storage
    fn adopt_own_pointer<F>(
        &mut self,
        pointer: usize,
        finished: bool,
        now: SystemTime,
        schedule: &mut F,
    ) -> bool
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        if self.strategy().free_navigation() {
            self.state.progress.raise_to(pointer);
            if finished {
                self.state.progress.finish();
                self.state.question = None;
            }
            return false;
        }
        if pointer < self.state.progress.pointer() {
            debug!("own pointer {pointer} is behind local progress");
            return false;
        }
        self.state.progress.raise_to(pointer);
        if self.state.room.status != Status::Playing {
            return false;
        }
        self.settle(now, schedule)
    }

    /// Clears the screen after this participant's last question and waits
    /// for the room to complete
    fn park<F>(&mut self, schedule: &mut F)
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        self.state.question = None;
        self.state.epoch += 1;
        info!("{} reached the end of the quiz", self.state.me.nickname);
        schedule(
            AlarmMessage::CompletionGrace.into(),
            self.options.completion_grace,
        );
    }

    /// Per-question reset: clears the selection, answered and reveal flags,
    /// reloads the countdown and opens a grace window before accepting input
    fn reset<F>(&mut self, index: usize, now: SystemTime, schedule: &mut F)
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        let Some(question) = self.quiz.question(index) else {
            return;
        };
        let strategy = self.strategy();
        let time_limit = question.time_limit;
        let question_id = question.id;

        self.state.epoch += 1;
        let epoch = self.state.epoch;

        let remaining = match strategy.timer() {
            TimerPolicy::PerQuestion => time_limit,
            TimerPolicy::SharedBudget => self
                .state
                .room
                .practice_remaining(now)
                .unwrap_or_default(),
        };
        let previous = if strategy.revisable_answers() {
            self.previous_answer(question_id)
        } else {
            None
        };
        let grace = self.options.reset_grace;

        self.state.question = Some(QuestionView {
            index,
            selected: previous.as_ref().map(|a| a.option),
            answered: previous.is_some(),
            revealed: false,
            correct: previous.as_ref().map(|a| a.correct),
            points: previous.as_ref().map_or(0, |a| a.points),
            remaining,
            accepting: grace.is_zero() && !remaining.is_zero(),
            shown_at: now,
        });
        debug!(
            "{} reset to question {index} (epoch {epoch})",
            self.state.me.nickname
        );

        if !grace.is_zero() {
            schedule(AlarmMessage::GraceElapsed { epoch }.into(), grace);
        }
        schedule(AlarmMessage::Tick { epoch }.into(), self.options.tick);
        if strategy.timer() == TimerPolicy::PerQuestion {
            schedule(AlarmMessage::TimeUp { epoch }.into(), time_limit);
        }
    }

    fn previous_answer(&self, question_id: Id<Question>) -> Option<Answer> {
        match self.store.answers(self.state.me.id) {
            Ok(answers) => answers.into_iter().find(|a| a.question_id == question_id),
            Err(e) => {
                warn!("could not load previous answers: {e}");
                None
            }
        }
    }

    /// Writes own progress (and cached score) to storage
    fn write_me(&mut self) -> Result<()> {
        let mut row = self.state.me.clone();
        self.state.progress.write_to(&mut row);
        let stored = self.store.update_participant(&row)?;
        self.record_me(stored);
        Ok(())
    }

    /// Refreshes the cached score from the answer rows
    fn refresh_score(&mut self) -> Result<()> {
        let total = self.store.total_points(self.state.me.id)?;
        if total == self.state.me.score {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state.me.score, total);
        if let Err(e) = self.write_me() {
            self.state.me.score = previous;
            return Err(e);
        }
        Ok(())
    }

    fn record_me(&mut self, stored: Participant) {
        self.versions.insert(stored.id, stored.version);
        if let Some(entry) = self
            .state
            .participants
            .iter_mut()
            .find(|p| p.id == stored.id)
        {
            *entry = stored.clone();
        }
        self.state.me = stored;
    }

    /// Replaces the participant list
    ///
    /// Row versions are only taken from applied events and own writes, so a
    /// refetch never hides an event that is still in flight.
    fn record_participants(&mut self, participants: Vec<Participant>) {
        self.state.participants = participants;
    }

    /// Reloads the participant list; the list is display-only, so a failed
    /// read keeps the previous one
    fn refetch_participants(&mut self) {
        match self.store.participants(self.state.room.id) {
            Ok(participants) => self.record_participants(participants),
            Err(e) => warn!("participant list not refreshed: {e}"),
        }
    }
}

impl<S: Store + 'static> Reducer for ParticipantSession<S> {
    type Command = Command;
    type Reply = Result<()>;
    type Snapshot = LocalState;

    fn handle_command<F>(&mut self, command: Command, now: SystemTime, schedule: F) -> Result<()>
    where
        F: FnMut(crate::AlarmMessage, Duration),
    {
        match command {
            Command::Submit(option) => self.submit(option, now, schedule),
            Command::Advance => self.advance(now, schedule),
            Command::Navigate(index) => self.navigate(index, now, schedule),
            Command::Finish => self.finish(now, schedule),
            Command::Refresh => self.recover(now, schedule).map(|_| ()),
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
            crate::AlarmMessage::Participant(message) => self.alarm(message, now, schedule),
            crate::AlarmMessage::Host(_) => Ok(()),
        }
    }

    fn snapshot(&self) -> LocalState {
        self.state.clone()
    }
}
