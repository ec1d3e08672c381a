//! Standings and end-of-game recap
//!
//! Standings are derived from participant rows, so they are exactly as
//! fresh as the last participant list a session fetched. Tied scores share
//! a position. The recap is computed from answer rows, which are the
//! authoritative record of what every participant earned.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    TruncatedVec,
    error::Result,
    id::Id,
    model::{Answer, GameRoom, Participant},
    quiz::Quiz,
    room::RoomStateMachine,
    store::Store,
};

/// One row of the standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// The ranked participant
    pub participant_id: Id<Participant>,
    /// Their nickname
    pub nickname: String,
    /// Their score
    pub score: u64,
    /// 1-indexed position; tied scores share the higher position
    pub position: usize,
}

/// Score information for a participant
///
/// Contains the participant's current score and their position in the
/// standings.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ScoreMessage {
    /// Total points earned by the participant
    pub points: u64,
    /// Current position in the standings (1-indexed)
    pub position: usize,
}

/// Participants ranked by score
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    standings: Vec<Standing>,
}

impl Leaderboard {
    /// Ranks `participants` by score, highest first
    ///
    /// Participants with equal scores keep their join order and share a
    /// position, so scores `[300, 200, 200, 100]` rank `1, 2, 2, 4`.
    pub fn new(participants: &[Participant]) -> Self {
        let sorted = participants
            .iter()
            .sorted_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)))
            .collect_vec();

        let mut standings: Vec<Standing> = Vec::with_capacity(sorted.len());
        for (index, participant) in sorted.into_iter().enumerate() {
            let position = match standings.last() {
                Some(last) if last.score == participant.score => last.position,
                _ => index + 1,
            };
            standings.push(Standing {
                participant_id: participant.id,
                nickname: participant.nickname.clone(),
                score: participant.score,
                position,
            });
        }
        Self { standings }
    }

    /// All standings in rank order
    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    /// The first `limit` standings, with the total count
    pub fn top(&self, limit: usize) -> TruncatedVec<Standing> {
        TruncatedVec::new(self.standings.iter().cloned(), limit, self.standings.len())
    }

    /// Score and position of one participant
    pub fn score(&self, id: Id<Participant>) -> Option<ScoreMessage> {
        self.standings
            .iter()
            .find(|s| s.participant_id == id)
            .map(|s| ScoreMessage {
                points: s.score,
                position: s.position,
            })
    }
}

/// How one question went across the room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuestionStats {
    /// Participants who answered correctly
    pub correct: usize,
    /// Participants who answered at all
    pub answered: usize,
}

/// One participant's points, question by question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recap {
    /// The participant
    pub participant_id: Id<Participant>,
    /// Their nickname
    pub nickname: String,
    /// Points per question in quiz order; unanswered questions earn 0
    pub points: Vec<u64>,
    /// Sum of `points`
    pub total: u64,
}

/// End-of-game statistics for a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Per-question statistics in quiz order
    pub questions: Vec<QuestionStats>,
    /// Per-participant points, highest total first
    pub participants: Vec<Recap>,
}

impl Summary {
    /// Builds the recap of `answers` given by `participants` to `quiz`
    ///
    /// Answers to questions outside the quiz are ignored.
    pub fn new(quiz: &Quiz, participants: &[Participant], answers: &[Answer]) -> Self {
        let index_of = |answer: &Answer| {
            quiz.questions
                .iter()
                .position(|q| q.id == answer.question_id)
        };

        let mut questions = vec![QuestionStats::default(); quiz.len()];
        for (index, answer) in answers.iter().filter_map(|a| Some((index_of(a)?, a))) {
            let stats = &mut questions[index];
            stats.answered += 1;
            stats.correct += usize::from(answer.correct);
        }

        let participants = participants
            .iter()
            .map(|participant| {
                let mut points = vec![0; quiz.len()];
                for answer in answers.iter().filter(|a| a.participant_id == participant.id) {
                    if let Some(index) = index_of(answer) {
                        points[index] = answer.points;
                    }
                }
                Recap {
                    participant_id: participant.id,
                    nickname: participant.nickname.clone(),
                    total: points.iter().sum(),
                    points,
                }
            })
            .sorted_by(|a, b| b.total.cmp(&a.total))
            .collect_vec();

        Self {
            questions,
            participants,
        }
    }

    /// Loads the recap of a room from storage
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the room or its quiz is missing, or a
    /// persistence error if a read fails.
    pub fn load<S: Store + ?Sized>(store: &S, room_id: Id<GameRoom>) -> Result<Self> {
        let machine = RoomStateMachine::new(store);
        let room = machine.room(room_id)?;
        let quiz = machine.quiz(room.quiz_id)?;
        let participants = store.participants(room.id)?;
        let answers = store.room_answers(room.id)?;
        Ok(Self::new(&quiz, &participants, &answers))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use web_time::SystemTime;

    use super::*;
    use crate::quiz::fixtures;

    fn participant(name: &str, score: u64, joined: u64) -> Participant {
        let mut p = Participant::new(
            Id::new(),
            Id::new(),
            name.to_string(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(joined),
        );
        p.score = score;
        p
    }

    fn answer(participant: &Participant, quiz: &Quiz, index: usize, points: u64) -> Answer {
        Answer {
            room_id: participant.room_id,
            participant_id: participant.id,
            question_id: quiz.questions[index].id,
            option: if points > 0 { 0 } else { 1 },
            correct: points > 0,
            points,
            answer_time: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_ties_share_positions() {
        let participants = [
            participant("Dee", 100, 4),
            participant("Bob", 200, 2),
            participant("Ada", 300, 1),
            participant("Cy", 200, 3),
        ];
        let leaderboard = Leaderboard::new(&participants);

        let ranked = leaderboard
            .standings()
            .iter()
            .map(|s| (s.nickname.as_str(), s.position))
            .collect_vec();
        assert_eq!(ranked, vec![("Ada", 1), ("Bob", 2), ("Cy", 2), ("Dee", 4)]);
    }

    #[test]
    fn test_score_message() {
        let participants = [participant("Ada", 300, 1), participant("Bob", 200, 2)];
        let leaderboard = Leaderboard::new(&participants);

        assert_eq!(
            leaderboard.score(participants[1].id),
            Some(ScoreMessage {
                points: 200,
                position: 2
            })
        );
        assert_eq!(leaderboard.score(Id::new()), None);
    }

    #[test]
    fn test_top_truncates() {
        let participants = (0..5)
            .map(|i| participant(&format!("P{i}"), i * 10, i))
            .collect_vec();
        let top = Leaderboard::new(&participants).top(2);
        assert_eq!(top.exact_count(), 5);
        assert_eq!(top.items().len(), 2);
        assert_eq!(top.items()[0].nickname, "P4");
    }

    #[test]
    fn test_empty_leaderboard() {
        let leaderboard = Leaderboard::new(&[]);
        assert!(leaderboard.standings().is_empty());
    }

    #[test]
    fn test_summary() {
        let quiz = fixtures::quiz(2);
        let ada = participant("Ada", 0, 1);
        let bob = participant("Bob", 0, 2);
        let answers = vec![
            answer(&ada, &quiz, 0, 100),
            answer(&ada, &quiz, 1, 0),
            answer(&bob, &quiz, 1, 75),
        ];

        let summary = Summary::new(&quiz, &[ada.clone(), bob.clone()], &answers);
        assert_eq!(
            summary.questions,
            vec![
                QuestionStats {
                    correct: 1,
                    answered: 1
                },
                QuestionStats {
                    correct: 1,
                    answered: 2
                },
            ]
        );
        assert_eq!(summary.participants[0].nickname, "Ada");
        assert_eq!(summary.participants[0].points, vec![100, 0]);
        assert_eq!(summary.participants[1].points, vec![0, 75]);
        assert_eq!(summary.participants[1].total, 75);
    }
}
