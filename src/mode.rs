//! Per-mode lifecycle rules
//!
//! Solo, multiplayer and practice rooms share one reconciliation core and
//! differ only in the policies captured here: how answers are scored, which
//! clock runs, whether the host's display pointer follows the participants,
//! and when the room as a whole is done.

use web_time::SystemTime;

use crate::{
    constants,
    id::Id,
    model::{GameRoom, Mode, Participant},
    progress,
    scoring::Scoring,
};

/// Which countdown a client runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPolicy {
    /// A countdown per question, seeded from its time limit when it becomes current
    PerQuestion,
    /// One room-wide budget counting down from the practice start
    SharedBudget,
}

/// Why a room is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every participant reached the end of the quiz
    AllFinished,
    /// A practice participant declared themselves finished
    FirstFinisher(Id<Participant>),
    /// The practice time budget ran out
    BudgetElapsed,
}

impl Completion {
    /// Whether the finish waits for the completion grace delay so the
    /// final state can render
    pub fn deferred(&self) -> bool {
        matches!(self, Completion::AllFinished)
    }
}

/// Lifecycle rules for one play mode
pub trait ModeStrategy: Sync {
    /// The mode these rules implement
    fn mode(&self) -> Mode;

    /// How correct answers are turned into points
    fn scoring(&self) -> Scoring;

    /// Which countdown participants run
    fn timer(&self) -> TimerPolicy;

    /// Maximum number of participants a room may hold
    fn capacity(&self) -> usize {
        constants::room::MAX_PARTICIPANT_COUNT
    }

    /// Whether participants may move between questions at will
    fn free_navigation(&self) -> bool {
        false
    }

    /// Whether a submitted answer may be replaced
    fn revisable_answers(&self) -> bool {
        false
    }

    /// Where the display pointer should move, given the participants'
    /// pointers, or `None` to leave it at `current`
    ///
    /// Never returns a value at or below `current`.
    fn next_display_pointer(
        &self,
        current: usize,
        participants: &[Participant],
        total: usize,
    ) -> Option<usize>;

    /// Checks the room-wide completion predicate
    fn completion(
        &self,
        room: &GameRoom,
        participants: &[Participant],
        total: usize,
        now: SystemTime,
    ) -> Option<Completion>;
}

/// Follows `pointer`, capped at the last question, if it is ahead of `current`
fn follow(current: usize, pointer: Option<usize>, total: usize) -> Option<usize> {
    let target = pointer?.min(total.checked_sub(1)?);
    (target > current).then_some(target)
}

/// One participant against the clock
#[derive(Debug, Clone, Copy)]
pub struct Solo;

/// Lockstep play following the fastest participant
#[derive(Debug, Clone, Copy)]
pub struct Multiplayer;

/// Self-paced play under a shared time budget
#[derive(Debug, Clone, Copy)]
pub struct Practice;

impl ModeStrategy for Solo {
    fn mode(&self) -> Mode {
        Mode::Solo
    }

    fn scoring(&self) -> Scoring {
        Scoring::Timed
    }

    fn timer(&self) -> TimerPolicy {
        TimerPolicy::PerQuestion
    }

    fn capacity(&self) -> usize {
        1
    }

    fn next_display_pointer(
        &self,
        current: usize,
        participants: &[Participant],
        total: usize,
    ) -> Option<usize> {
        follow(current, participants.first().map(|p| p.pointer), total)
    }

    fn completion(
        &self,
        _room: &GameRoom,
        participants: &[Participant],
        total: usize,
        _now: SystemTime,
    ) -> Option<Completion> {
        progress::all_complete(participants, total).then_some(Completion::AllFinished)
    }
}

impl ModeStrategy for Multiplayer {
    fn mode(&self) -> Mode {
        Mode::Multiplayer
    }

    fn scoring(&self) -> Scoring {
        Scoring::Timed
    }

    fn timer(&self) -> TimerPolicy {
        TimerPolicy::PerQuestion
    }

    fn next_display_pointer(
        &self,
        current: usize,
        participants: &[Participant],
        total: usize,
    ) -> Option<usize> {
        follow(current, progress::fastest(participants), total)
    }

    fn completion(
        &self,
        _room: &GameRoom,
        participants: &[Participant],
        total: usize,
        _now: SystemTime,
    ) -> Option<Completion> {
        progress::all_complete(participants, total).then_some(Completion::AllFinished)
    }
}

impl ModeStrategy for Practice {
    fn mode(&self) -> Mode {
        Mode::Practice
    }

    fn scoring(&self) -> Scoring {
        Scoring::Flat
    }

    fn timer(&self) -> TimerPolicy {
        TimerPolicy::SharedBudget
    }

    fn free_navigation(&self) -> bool {
        true
    }

    fn revisable_answers(&self) -> bool {
        true
    }

    fn next_display_pointer(
        &self,
        _current: usize,
        _participants: &[Participant],
        _total: usize,
    ) -> Option<usize> {
        None
    }

    fn completion(
        &self,
        room: &GameRoom,
        participants: &[Participant],
        _total: usize,
        now: SystemTime,
    ) -> Option<Completion> {
        if let Some(first) = progress::finishers(participants).first() {
            return Some(Completion::FirstFinisher(first.id));
        }
        match room.practice_remaining(now) {
            Some(remaining) if remaining.is_zero() => Some(Completion::BudgetElapsed),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::room_code::RoomCode;

    fn participants(pointers: &[usize]) -> Vec<Participant> {
        pointers
            .iter()
            .map(|&pointer| {
                let mut p =
                    Participant::new(Id::new(), Id::new(), "Ada".to_string(), SystemTime::now());
                p.pointer = pointer;
                p
            })
            .collect()
    }

    fn room(mode: Mode) -> GameRoom {
        GameRoom::new(RoomCode::new(), Id::new(), Id::new(), mode)
    }

    #[test]
    fn test_multiplayer_follows_fastest() {
        let strategy = Mode::Multiplayer.strategy();
        let ps = participants(&[2, 3, 1]);
        assert_eq!(strategy.next_display_pointer(0, &ps, 5), Some(3));
        assert_eq!(strategy.next_display_pointer(2, &ps, 5), Some(3));
    }

    #[test]
    fn test_multiplayer_never_moves_backwards() {
        let strategy = Mode::Multiplayer.strategy();
        let ps = participants(&[2, 3, 1]);
        assert_eq!(strategy.next_display_pointer(3, &ps, 5), None);
        assert_eq!(strategy.next_display_pointer(4, &ps, 5), None);
    }

    #[test]
    fn test_display_pointer_capped_at_last_question() {
        let strategy = Mode::Multiplayer.strategy();
        let ps = participants(&[3, 1]);
        assert_eq!(strategy.next_display_pointer(1, &ps, 3), Some(2));
        assert_eq!(strategy.next_display_pointer(2, &ps, 3), None);
    }

    #[test]
    fn test_solo_tracks_single_participant() {
        let strategy = Mode::Solo.strategy();
        assert_eq!(strategy.capacity(), 1);
        assert_eq!(
            strategy.next_display_pointer(0, &participants(&[1]), 4),
            Some(1)
        );
        assert_eq!(strategy.next_display_pointer(0, &[], 4), None);
    }

    #[test]
    fn test_practice_has_no_display_pointer() {
        let strategy = Mode::Practice.strategy();
        assert_eq!(
            strategy.next_display_pointer(0, &participants(&[4]), 5),
            None
        );
        assert!(strategy.free_navigation());
        assert!(strategy.revisable_answers());
        assert_eq!(strategy.scoring(), Scoring::Flat);
        assert_eq!(strategy.timer(), TimerPolicy::SharedBudget);
    }

    #[test]
    fn test_multiplayer_completion_requires_everyone() {
        let strategy = Mode::Multiplayer.strategy();
        let now = SystemTime::now();
        let r = room(Mode::Multiplayer);
        assert_eq!(strategy.completion(&r, &participants(&[3, 2]), 3, now), None);
        assert_eq!(
            strategy.completion(&r, &participants(&[3, 3]), 3, now),
            Some(Completion::AllFinished)
        );
        assert_eq!(strategy.completion(&r, &[], 3, now), None);
    }

    #[test]
    fn test_practice_first_finisher_ends_room() {
        let strategy = Mode::Practice.strategy();
        let mut ps = participants(&[0, 1]);
        ps[1].finished = true;
        let finisher = ps[1].id;
        assert_eq!(
            strategy.completion(&room(Mode::Practice), &ps, 5, SystemTime::now()),
            Some(Completion::FirstFinisher(finisher))
        );
    }

    #[test]
    fn test_practice_budget_elapsed() {
        let strategy = Mode::Practice.strategy();
        let mut r = room(Mode::Practice);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        r.practice_started_at = Some(start);
        r.practice_budget = Some(Duration::from_secs(40));
        let ps = participants(&[1, 2]);

        assert_eq!(
            strategy.completion(&r, &ps, 2, start + Duration::from_secs(39)),
            None
        );
        assert_eq!(
            strategy.completion(&r, &ps, 2, start + Duration::from_secs(40)),
            Some(Completion::BudgetElapsed)
        );
    }

    #[test]
    fn test_only_all_finished_is_deferred() {
        assert!(Completion::AllFinished.deferred());
        assert!(!Completion::BudgetElapsed.deferred());
        assert!(!Completion::FirstFinisher(Id::new()).deferred());
    }
}
