//! Quiz content: questions and their answer options
//!
//! Quizzes are authored elsewhere and handed to the engine through the
//! storage collaborator. The engine only reads them, but validates them
//! before a room is bound to one, so that every question it plays has a
//! usable time limit and exactly one correct option.

use std::time::Duration;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{constants, id::Id};

type ValidationResult = garde::Result;

/// Validates the time limit for answering a question
fn validate_time_limit(val: &Duration) -> ValidationResult {
    let bounds = constants::question::MIN_TIME_LIMIT..=constants::question::MAX_TIME_LIMIT;
    if bounds.contains(&val.as_secs()) && val.subsec_nanos() == 0 {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "time_limit must be a whole number of seconds in [{},{}]",
            bounds.start(),
            bounds.end()
        )))
    }
}

/// Validates that exactly one option is marked correct
fn validate_single_correct(options: &[AnswerOption]) -> ValidationResult {
    match options.iter().filter(|o| o.correct).count() {
        1 => Ok(()),
        n => Err(garde::Error::new(format!(
            "exactly one option must be correct, found {n}"
        ))),
    }
}

/// Validates that option positions are a permutation of `0..len`
fn validate_positions(options: &[AnswerOption]) -> ValidationResult {
    if options
        .iter()
        .map(|o| o.position)
        .sorted()
        .eq(0..options.len())
    {
        Ok(())
    } else {
        Err(garde::Error::new("option positions must be 0..len"))
    }
}

fn validate_options(options: &[AnswerOption]) -> ValidationResult {
    validate_single_correct(options)?;
    validate_positions(options)
}

/// A complete quiz: an ordered list of questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Quiz {
    /// Identifier of the quiz row
    #[garde(skip)]
    pub id: Id<Quiz>,
    /// Title shown in the lobby
    #[garde(length(max = constants::quiz::MAX_TITLE_LENGTH))]
    pub title: String,
    /// Questions in play order
    #[garde(length(min = 1, max = constants::quiz::MAX_QUESTION_COUNT), dive)]
    pub questions: Vec<Question>,
}

/// A single multiple choice question
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Identifier of the question row
    #[garde(skip)]
    pub id: Id<Question>,
    /// The prompt shown to participants
    #[garde(length(min = constants::question::MIN_TEXT_LENGTH, max = constants::question::MAX_TEXT_LENGTH))]
    pub text: String,
    /// Points awarded for a correct answer before any speed adjustment
    #[garde(range(min = 1, max = constants::question::MAX_POINTS))]
    pub points: u64,
    /// Time participants have to answer
    #[garde(custom(|v, _| validate_time_limit(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_limit: Duration,
    /// Answer options, ordered by position
    #[garde(
        length(min = constants::question::MIN_OPTION_COUNT, max = constants::question::MAX_OPTION_COUNT),
        custom(|v, _| validate_options(v)),
        dive
    )]
    pub options: Vec<AnswerOption>,
}

/// One selectable answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AnswerOption {
    /// Text of the option
    #[garde(length(min = 1, max = constants::answer_option::MAX_TEXT_LENGTH))]
    pub text: String,
    /// Whether this is the correct option
    #[garde(skip)]
    pub correct: bool,
    /// Display position of the option within its question
    #[garde(skip)]
    pub position: usize,
}

impl Quiz {
    /// Returns the number of questions in this quiz
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks if this quiz contains any questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Returns the question at `index`, if any
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Total time budget of a practice session: the sum of every time limit
    pub fn total_budget(&self) -> Duration {
        self.questions.iter().map(|q| q.time_limit).sum()
    }

    /// Sorts every question's options by position
    ///
    /// Storage hands quizzes out in this normalized order, so option
    /// indices used by answers are positions.
    pub fn normalize(&mut self) {
        for question in &mut self.questions {
            question.options.sort_by_key(|o| o.position);
        }
    }
}

impl Question {
    /// Returns whether the option at `position` is the correct one
    ///
    /// Returns `None` when no option has that position.
    pub fn is_correct(&self, position: usize) -> Option<bool> {
        self.options
            .iter()
            .find(|o| o.position == position)
            .map(|o| o.correct)
    }

    /// Position of the correct option
    pub fn correct_position(&self) -> Option<usize> {
        self.options.iter().find(|o| o.correct).map(|o| o.position)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A question worth `points` with a `seconds` time limit whose correct
    /// option is at position 0
    pub fn question(points: u64, seconds: u64) -> Question {
        Question {
            id: Id::new(),
            text: "What is the capital of France?".to_string(),
            points,
            time_limit: Duration::from_secs(seconds),
            options: vec![
                AnswerOption {
                    text: "Paris".to_string(),
                    correct: true,
                    position: 0,
                },
                AnswerOption {
                    text: "Lyon".to_string(),
                    correct: false,
                    position: 1,
                },
                AnswerOption {
                    text: "Nice".to_string(),
                    correct: false,
                    position: 2,
                },
            ],
        }
    }

    /// A quiz of `count` questions worth 100 points with 20 second limits
    pub fn quiz(count: usize) -> Quiz {
        Quiz {
            id: Id::new(),
            title: "Geography".to_string(),
            questions: (0..count).map(|_| question(100, 20)).collect(),
        }
    }
}
