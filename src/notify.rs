//! Room-scoped change notifications
//!
//! Every write storage makes to a room or participant row is fanned out to
//! the clients subscribed to that room. Events carry the row's version and
//! a snapshot of the fields clients reconcile on (status, pointers, score),
//! so a receiver never needs to know which write produced them. Delivery is
//! at-least-once and unordered across rows; receivers filter by version.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::{
    constants,
    id::{Id, User},
    model::{GameRoom, Participant, Status},
};

/// Which kind of row an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    /// A `GameRoom` row
    Room,
    /// A `Participant` row
    Participant,
}

/// Whether the row was created or changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// The row was created
    Insert,
    /// An existing row was written
    Update,
}

/// The fields of the affected row that clients reconcile on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Change {
    /// Room row snapshot
    Room {
        /// Affected room
        id: Id<GameRoom>,
        /// Lifecycle status after the write
        status: Status,
        /// Display pointer after the write
        display_pointer: usize,
    },
    /// Participant row snapshot
    Participant {
        /// Affected participant
        id: Id<Participant>,
        /// The user behind the participant
        user_id: Id<User>,
        /// Question pointer after the write
        pointer: usize,
        /// Cached score after the write
        score: u64,
        /// Finished flag after the write
        finished: bool,
    },
}

/// A change to one row of a room, as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Room the row belongs to; also the channel the event is sent on
    pub room_id: Id<GameRoom>,
    /// Created or changed
    pub kind: Kind,
    /// Row version after the write
    pub version: u64,
    /// Snapshot of the changed fields
    pub change: Change,
}

impl ChangeEvent {
    /// Describes a write to a room row
    pub fn room(kind: Kind, room: &GameRoom) -> Self {
        Self {
            room_id: room.id,
            kind,
            version: room.version,
            change: Change::Room {
                id: room.id,
                status: room.status,
                display_pointer: room.display_pointer,
            },
        }
    }

    /// Describes a write to a participant row
    pub fn participant(kind: Kind, participant: &Participant) -> Self {
        Self {
            room_id: participant.room_id,
            kind,
            version: participant.version,
            change: Change::Participant {
                id: participant.id,
                user_id: participant.user_id,
                pointer: participant.pointer,
                score: participant.score,
                finished: participant.finished,
            },
        }
    }

    /// The kind of row this event describes
    pub fn entity(&self) -> Entity {
        match self.change {
            Change::Room { .. } => Entity::Room,
            Change::Participant { .. } => Entity::Participant,
        }
    }

    /// Converts the event to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// What a subscription yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The next change event
    Event(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped
    Lagged(u64),
    /// The channel is gone; no further events will arrive
    Closed,
}

/// The notification collaborator: per-room publish/subscribe
pub trait Notifier: Send + Sync {
    /// Delivers `event` to every current subscriber of its room
    fn publish(&self, event: ChangeEvent);

    /// Subscribes to `room`; dropping the subscription unsubscribes
    fn subscribe(&self, room: Id<GameRoom>) -> Subscription;
}

type Channels = HashMap<Id<GameRoom>, broadcast::Sender<ChangeEvent>>;

/// In-process notifier with one broadcast channel per room
///
/// Channels are created on first subscription and dropped once the last
/// subscriber leaves. Events published to a room nobody listens to are
/// discarded.
#[derive(Debug, Clone)]
pub struct Hub {
    channels: Arc<Mutex<Channels>>,
    capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::with_capacity(constants::notify::CHANNEL_CAPACITY)
    }
}

impl Hub {
    /// Creates a hub with the default per-room buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hub buffering at most `capacity` events per room
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of rooms with at least one subscriber
    pub fn room_count(&self) -> usize {
        self.channels.lock().map_or(0, |channels| channels.len())
    }
}

impl Notifier for Hub {
    fn publish(&self, event: ChangeEvent) {
        let Ok(channels) = self.channels.lock() else {
            log::warn!("notification hub is poisoned, dropping event");
            return;
        };
        if let Some(sender) = channels.get(&event.room_id) {
            // no receivers left is not an error for a broadcast
            let _ = sender.send(event);
        }
    }

    fn subscribe(&self, room: Id<GameRoom>) -> Subscription {
        let receiver = match self.channels.lock() {
            Ok(mut channels) => channels
                .entry(room)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe(),
            Err(_) => {
                log::warn!("notification hub is poisoned, subscription for {room} is closed");
                broadcast::channel(1).1
            }
        };
        Subscription {
            room,
            receiver: Some(receiver),
            channels: Arc::clone(&self.channels),
        }
    }
}

/// A live subscription to one room's events
#[derive(Debug)]
pub struct Subscription {
    room: Id<GameRoom>,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
    channels: Arc<Mutex<Channels>>,
}

impl Subscription {
    /// The room this subscription listens to
    pub fn room_id(&self) -> Id<GameRoom> {
        self.room
    }

    /// Returns the next delivery if one is already buffered
    pub fn try_next(&mut self) -> Option<Delivery> {
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(TryRecvError::Closed) => Some(Delivery::Closed),
        }
    }

    /// Waits for the next delivery
    pub async fn recv(&mut self) -> Delivery {
        let Some(receiver) = self.receiver.as_mut() else {
            return Delivery::Closed;
        };
        match receiver.recv().await {
            Ok(event) => Delivery::Event(event),
            Err(RecvError::Lagged(n)) => Delivery::Lagged(n),
            Err(RecvError::Closed) => Delivery::Closed,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut channels) = self.channels.lock() else {
            return;
        };
        drop(self.receiver.take());
        if channels
            .get(&self.room)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&self.room);
        }
    }
}
