//! Runs a session as a task
//!
//! A session is a [`Reducer`]: it folds user commands, change
//! notifications and its own alarms into local state, one at a time. The
//! actor owns the reducer, serializes those three inputs with `select!`,
//! arms the timers the reducer asks for and publishes a snapshot after
//! every step. Dropping every [`Handle`] stops the task, its timers and its
//! subscription.

use std::time::Duration;

use derive_where::derive_where;
use log::{debug, warn};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinSet,
    time::Instant,
};
use web_time::SystemTime;

use crate::{
    AlarmMessage, constants,
    error::Result,
    notify::{ChangeEvent, Delivery, Subscription},
    sync::Disposition,
};

/// A session driven by an actor
pub trait Reducer: Send + 'static {
    /// User actions
    type Command: Send + 'static;
    /// What a command answers with
    type Reply: Send + 'static;
    /// The state views render from
    type Snapshot: Clone + Send + Sync + 'static;

    /// Applies one user action
    fn handle_command<F>(&mut self, command: Self::Command, now: SystemTime, schedule: F) -> Self::Reply
    where
        F: FnMut(AlarmMessage, Duration);

    /// Reconciles one change notification
    ///
    /// # Errors
    ///
    /// Returns an error if a read or write the event triggered failed.
    fn handle_event<F>(&mut self, event: ChangeEvent, now: SystemTime, schedule: F) -> Result<Disposition>
    where
        F: FnMut(AlarmMessage, Duration);

    /// Catches up after notifications were dropped
    ///
    /// # Errors
    ///
    /// Returns an error if a read failed.
    fn handle_lag<F>(&mut self, now: SystemTime, schedule: F) -> Result<Disposition>
    where
        F: FnMut(AlarmMessage, Duration);

    /// Handles an alarm this reducer scheduled
    ///
    /// # Errors
    ///
    /// Returns an error if a write the alarm triggered failed.
    fn handle_alarm<F>(&mut self, alarm: AlarmMessage, now: SystemTime, schedule: F) -> Result<()>
    where
        F: FnMut(AlarmMessage, Duration);

    /// The current view
    fn snapshot(&self) -> Self::Snapshot;
}

/// Wall clock of an actor
///
/// Time is measured as a tokio [`Instant`] offset from a fixed origin, so
/// paused test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: SystemTime,
    anchor: Instant,
}

impl Clock {
    /// A clock reading the current time
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// A clock that reads `origin` now
    pub fn starting_at(origin: SystemTime) -> Self {
        Self {
            origin,
            anchor: Instant::now(),
        }
    }

    /// The current time
    pub fn now(&self) -> SystemTime {
        self.origin + self.anchor.elapsed()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// The actor is gone
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("session actor has stopped")]
pub struct Stopped;

struct Request<R: Reducer> {
    command: R::Command,
    reply: oneshot::Sender<R::Reply>,
}

/// Talks to a running actor
#[derive_where(Clone)]
pub struct Handle<R: Reducer> {
    commands: mpsc::Sender<Request<R>>,
    snapshots: watch::Receiver<R::Snapshot>,
}

impl<R: Reducer> Handle<R> {
    /// Sends a command and waits for its reply
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] if the actor is no longer running.
    pub async fn send(&self, command: R::Command) -> std::result::Result<R::Reply, Stopped> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| Stopped)?;
        receiver.await.map_err(|_| Stopped)
    }

    /// The latest published view
    pub fn snapshot(&self) -> R::Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits until a newer view is published
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] if the actor stopped first.
    pub async fn changed(&mut self) -> std::result::Result<(), Stopped> {
        self.snapshots.changed().await.map_err(|_| Stopped)
    }
}

/// Spawns an actor driving `reducer` with notifications from `subscription`
///
/// Must be called within a tokio runtime.
pub fn spawn<R: Reducer>(reducer: R, subscription: Subscription, clock: Clock) -> Handle<R> {
    let (commands, inbox) = mpsc::channel(constants::actor::INBOX_CAPACITY);
    let (publisher, snapshots) = watch::channel(reducer.snapshot());
    tokio::spawn(run(reducer, subscription, clock, inbox, publisher));
    Handle {
        commands,
        snapshots,
    }
}

async fn run<R: Reducer>(
    mut reducer: R,
    mut subscription: Subscription,
    clock: Clock,
    mut inbox: mpsc::Receiver<Request<R>>,
    publisher: watch::Sender<R::Snapshot>,
) {
    let room = subscription.room_id();
    let mut timers = JoinSet::new();
    let mut listening = true;

    loop {
        let mut pending: Vec<(AlarmMessage, Duration)> = Vec::new();
        let schedule = |alarm, delay| pending.push((alarm, delay));

        tokio::select! {
            request = inbox.recv() => {
                let Some(Request { command, reply }) = request else {
                    break;
                };
                let result = reducer.handle_command(command, clock.now(), schedule);
                if reply.send(result).is_err() {
                    debug!("reply dropped by caller");
                }
            }
            delivery = subscription.recv(), if listening => match delivery {
                Delivery::Event(event) => {
                    report(reducer.handle_event(event, clock.now(), schedule));
                }
                Delivery::Lagged(missed) => {
                    warn!("missed {missed} notifications for room {room}, refetching");
                    report(reducer.handle_lag(clock.now(), schedule));
                }
                Delivery::Closed => {
                    warn!("notifications for room {room} closed");
                    listening = false;
                }
            },
            Some(joined) = timers.join_next() => match joined {
                Ok(alarm) => report(reducer.handle_alarm(alarm, clock.now(), schedule)),
                Err(e) => warn!("timer failed: {e}"),
            },
        }

        for (alarm, delay) in pending {
            timers.spawn(async move {
                tokio::time::sleep(delay).await;
                alarm
            });
        }
        publisher.send_replace(reducer.snapshot());
    }

    debug!("actor for room {room} stopped");
}

fn report<T>(result: Result<T>) {
    if let Err(e) = result {
        warn!("session step failed: {e}");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{
        config::Options,
        host::{HostCommand, HostSession},
        id::Id,
        model::{Mode, Status},
        notify::{Hub, Notifier},
        quiz,
        room::RoomStateMachine,
        store::{MemoryStore, Store},
        sync::{Command, ParticipantSession},
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn store_with(hub: Hub, questions: usize) -> (MemoryStore, Id<quiz::Quiz>) {
        let store = MemoryStore::with_hub(hub);
        let quiz = quiz::fixtures::quiz(questions);
        let id = quiz.id;
        store.insert_quiz(quiz).unwrap();
        (store, id)
    }

    async fn settle(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiplayer_round_trip() {
        init();
        let clock = Clock::new();
        let (store, quiz_id) = store_with(Hub::new(), 2);

        let host = HostSession::create(
            store.clone(),
            Options::default(),
            quiz_id,
            Id::new(),
            Mode::Multiplayer,
        )
        .unwrap();
        let room = host.room().clone();
        let host = spawn(host, store.hub().subscribe(room.id), clock);

        let ada = ParticipantSession::join(
            store.clone(),
            Options::default(),
            room.code.as_str(),
            Id::new(),
            "Ada",
            clock.now(),
            |_, _| {},
        )
        .unwrap();
        let ada = spawn(ada, store.hub().subscribe(room.id), clock);

        host.send(HostCommand::Start).await.unwrap().unwrap();
        settle(500).await;
        let state = ada.snapshot();
        assert_eq!(state.room.status, Status::Playing);
        assert_eq!(state.question.as_ref().map(|q| q.index), Some(0));
        assert!(state.question.is_some_and(|q| q.accepting));

        ada.send(Command::Submit(0)).await.unwrap().unwrap();
        // reveal, then the next question and its grace window
        settle(2500).await;
        let state = ada.snapshot();
        assert_eq!(state.question.as_ref().map(|q| q.index), Some(1));
        assert_eq!(host.snapshot().room.display_pointer, 1);

        ada.send(Command::Submit(0)).await.unwrap().unwrap();
        settle(5000).await;

        let view = host.snapshot();
        assert_eq!(view.room.status, Status::Finished);
        let summary = view.summary.unwrap();
        assert_eq!(summary.questions.iter().map(|q| q.correct).sum::<usize>(), 2);

        let state = ada.snapshot();
        assert_eq!(state.room.status, Status::Finished);
        assert!(state.question.is_none());
        assert_eq!(state.me.score, summary.participants[0].total);
        assert!(state.me.score > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lag_recovers_participant_list() {
        init();
        let clock = Clock::new();
        let (store, quiz_id) = store_with(Hub::with_capacity(2), 3);
        let room = RoomStateMachine::new(&store)
            .create_room(quiz_id, Id::new(), Mode::Multiplayer)
            .unwrap();

        let ada = ParticipantSession::join(
            store.clone(),
            Options::default(),
            room.code.as_str(),
            Id::new(),
            "Ada",
            clock.now(),
            |_, _| {},
        )
        .unwrap();
        let ada = spawn(ada, store.hub().subscribe(room.id), clock);

        // the actor has not run yet, so these overflow its buffer
        for name in ["Bob", "Cy", "Dee", "Eve", "Fay"] {
            RoomStateMachine::new(&store)
                .join(room.code.as_str(), Id::new(), name, clock.now())
                .unwrap();
        }
        settle(10).await;

        assert_eq!(ada.snapshot().participants.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_practice_commands() {
        init();
        let clock = Clock::new();
        let (store, quiz_id) = store_with(Hub::new(), 3);
        let machine = RoomStateMachine::new(&store);
        let room = machine
            .create_room(quiz_id, Id::new(), Mode::Practice)
            .unwrap();

        let ada = ParticipantSession::join(
            store.clone(),
            Options::default(),
            room.code.as_str(),
            Id::new(),
            "Ada",
            clock.now(),
            |_, _| {},
        )
        .unwrap();
        let mut ada = spawn(ada, store.hub().subscribe(room.id), clock);

        machine.start(room.id, room.host_id, clock.now()).unwrap();
        ada.changed().await.unwrap();
        settle(500).await;

        ada.send(Command::Navigate(2)).await.unwrap().unwrap();
        assert_eq!(ada.snapshot().question.map(|q| q.index), Some(2));
        assert_eq!(ada.snapshot().progress.pointer(), 2);

        let error = ada.send(Command::Navigate(7)).await.unwrap().unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Validation);

        ada.send(Command::Finish).await.unwrap().unwrap();
        settle(10).await;
        let stored = store.room(room.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Finished);
        assert_eq!(ada.snapshot().room.status, Status::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_stops_actor() {
        init();
        let clock = Clock::new();
        let (store, quiz_id) = store_with(Hub::new(), 1);
        let room = RoomStateMachine::new(&store)
            .create_room(quiz_id, Id::new(), Mode::Solo)
            .unwrap();
        let ada = ParticipantSession::join(
            store.clone(),
            Options::default(),
            room.code.as_str(),
            Id::new(),
            "Ada",
            clock.now(),
            |_, _| {},
        )
        .unwrap();

        let handle = spawn(ada, store.hub().subscribe(room.id), clock);
        let other = handle.clone();
        assert_eq!(store.hub().room_count(), 1);

        drop(handle);
        settle(10).await;
        assert_eq!(store.hub().room_count(), 1);

        drop(other);
        settle(10).await;
        assert_eq!(store.hub().room_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_paused_time() {
        let origin = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = Clock::starting_at(origin);
        assert_eq!(clock.now(), origin);
        settle(1500).await;
        assert_eq!(clock.now(), origin + Duration::from_millis(1500));
    }
}
