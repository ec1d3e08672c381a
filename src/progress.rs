//! Per-participant question pointers
//!
//! A participant's pointer only ever moves forward. It advances by one when
//! an answered question's reveal window closes or an unanswered question
//! times out, and it can be raised to catch up with the room (multiplayer)
//! or to record the furthest question visited (practice). Reaching the
//! question count completes the quiz for that participant.

use itertools::Itertools;

use crate::model::Participant;

/// Forward-only progress through a quiz of `total` questions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pointer: usize,
    finished: bool,
    total: usize,
}

impl Progress {
    /// Progress at the first question
    pub fn new(total: usize) -> Self {
        Self {
            pointer: 0,
            finished: total == 0,
            total,
        }
    }

    /// Progress as recorded on a participant row
    pub fn of(participant: &Participant, total: usize) -> Self {
        let pointer = participant.pointer.min(total);
        Self {
            pointer,
            finished: participant.finished || pointer == total,
            total,
        }
    }

    /// Index of the question this participant is on
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Whether the participant has completed the quiz
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of questions in the quiz
    pub fn total(&self) -> usize {
        self.total
    }

    /// Moves to the next question
    ///
    /// Returns the new pointer, or `None` if the participant was already
    /// past the last question. Reaching `total` marks the participant
    /// finished.
    pub fn advance(&mut self) -> Option<usize> {
        if self.pointer >= self.total {
            return None;
        }
        self.pointer += 1;
        if self.pointer == self.total {
            self.finished = true;
        }
        Some(self.pointer)
    }

    /// Raises the pointer to `target`, never lowering it
    ///
    /// Returns `true` if the pointer moved.
    pub fn raise_to(&mut self, target: usize) -> bool {
        let target = target.min(self.total);
        if target <= self.pointer {
            return false;
        }
        self.pointer = target;
        if self.pointer == self.total {
            self.finished = true;
        }
        true
    }

    /// Declares the participant finished without moving the pointer
    ///
    /// Returns `true` if this changed anything.
    pub fn finish(&mut self) -> bool {
        !std::mem::replace(&mut self.finished, true)
    }

    /// Copies this progress onto a participant row
    pub fn write_to(&self, participant: &mut Participant) {
        participant.pointer = participant.pointer.max(self.pointer);
        participant.finished |= self.finished;
    }
}

/// The furthest pointer among `participants`
pub fn fastest<'a, I>(participants: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a Participant>,
{
    participants.into_iter().map(|p| p.pointer).max()
}

/// Whether every participant has reached the end of a `total`-question quiz
///
/// An empty room is never complete.
pub fn all_complete(participants: &[Participant], total: usize) -> bool {
    !participants.is_empty() && participants.iter().all(|p| p.pointer >= total)
}

/// Participants that have declared themselves finished
pub fn finishers(participants: &[Participant]) -> Vec<&Participant> {
    participants.iter().filter(|p| p.finished).collect_vec()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::id::Id;
    use web_time::SystemTime;

    fn participant(pointer: usize) -> Participant {
        let mut p = Participant::new(Id::new(), Id::new(), "Ada".to_string(), SystemTime::now());
        p.pointer = pointer;
        p
    }

    #[test]
    fn test_advance_until_finished() {
        let mut progress = Progress::new(2);
        assert_eq!(progress.advance(), Some(1));
        assert!(!progress.is_finished());
        assert_eq!(progress.advance(), Some(2));
        assert!(progress.is_finished());
        assert_eq!(progress.advance(), None);
        assert_eq!(progress.pointer(), 2);
    }

    #[test]
    fn test_raise_never_lowers() {
        let mut progress = Progress::new(5);
        assert!(progress.raise_to(3));
        assert!(!progress.raise_to(1));
        assert!(!progress.raise_to(3));
        assert_eq!(progress.pointer(), 3);
    }

    #[test]
    fn test_raise_clamps_to_total() {
        let mut progress = Progress::new(4);
        assert!(progress.raise_to(10));
        assert_eq!(progress.pointer(), 4);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut progress = Progress::new(4);
        assert!(progress.finish());
        assert!(!progress.finish());
        assert_eq!(progress.pointer(), 0);
    }

    #[test]
    fn test_of_participant_row() {
        let mut p = participant(2);
        let progress = Progress::of(&p, 2);
        assert!(progress.is_finished());

        p.pointer = 1;
        let progress = Progress::of(&p, 3);
        assert!(!progress.is_finished());
        assert_eq!(progress.total(), 3);
    }

    #[test]
    fn test_write_to_keeps_row_monotonic() {
        let mut p = participant(3);
        let mut progress = Progress::new(5);
        progress.advance();
        progress.write_to(&mut p);
        assert_eq!(p.pointer, 3);
    }

    #[test]
    fn test_fastest_participant() {
        let participants = [participant(2), participant(3), participant(1)];
        assert_eq!(fastest(&participants), Some(3));
        assert_eq!(fastest(&Vec::<Participant>::new()), None);
    }

    #[test]
    fn test_all_complete() {
        let participants = vec![participant(3), participant(3)];
        assert!(all_complete(&participants, 3));

        let participants = vec![participant(3), participant(2)];
        assert!(!all_complete(&participants, 3));

        assert!(!all_complete(&[], 3));
    }

    #[test]
    fn test_finishers() {
        let mut done = participant(1);
        done.finished = true;
        let participants = vec![participant(0), done];
        assert_eq!(finishers(&participants).len(), 1);
    }
}
