//! # Quiz Room Library
//!
//! This library provides the core of a live quiz room: a host binds a quiz
//! to a room, participants join with a short room code, and everyone moves
//! through the questions either in lockstep (solo and multiplayer) or
//! freely against a shared time budget (practice).
//!
//! Clients never talk to each other. Each one runs a session (a
//! [`host::HostSession`] or a [`sync::ParticipantSession`]) that writes its
//! own rows to a [`store::Store`] and reconciles the change events the
//! store publishes through a [`notify::Notifier`]. Sessions can be driven
//! directly or as tokio tasks through [`actor::spawn`].

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod constants;

pub mod actor;
pub mod config;
pub mod error;
pub mod host;
pub mod id;
pub mod leaderboard;
pub mod mode;
pub mod model;
pub mod names;
pub mod notify;
pub mod progress;
pub mod quiz;
pub mod room;
pub mod room_code;
pub mod scoring;
pub mod store;
pub mod sync;

/// Alarm messages for timed events in either kind of session
///
/// Sessions hand these to their scheduler together with a delay and get
/// them back once the delay is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::From, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Participant session alarms
    Participant(sync::AlarmMessage),
    /// Host session alarms
    Host(host::AlarmMessage),
}

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// This structure is useful for displaying a limited number of items while
/// still showing the total count. For example, showing "10 participants"
/// but only listing the first 5 standings.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_vec_new() {
        let data = vec![1, 2, 3, 4, 5];
        let truncated = TruncatedVec::new(data.into_iter(), 3, 5);

        assert_eq!(truncated.exact_count(), 5);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_new_limit_larger_than_items() {
        let data = vec![1, 2, 3];
        let truncated = TruncatedVec::new(data.into_iter(), 5, 3);

        assert_eq!(truncated.exact_count(), 3);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_serializes_count() {
        let truncated = TruncatedVec::new(["Ada", "Bob"].into_iter(), 1, 2);
        let json = serde_json::to_string(&truncated).unwrap();
        assert_eq!(json, r#"{"exact_count":2,"items":["Ada"]}"#);
    }

    #[test]
    fn test_alarm_message_wraps_session_alarms() {
        let alarm = AlarmMessage::from(sync::AlarmMessage::Tick { epoch: 3 });
        assert_eq!(alarm, AlarmMessage::Participant(sync::AlarmMessage::Tick { epoch: 3 }));

        let json = serde_json::to_string(&AlarmMessage::from(host::AlarmMessage::CompletionGrace))
            .unwrap();
        assert_eq!(json, r#"{"Host":"CompletionGrace"}"#);
    }
}
