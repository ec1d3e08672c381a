//! Points for answers
//!
//! Timed modes reward speed: a correct answer earns between half and all of
//! the question's points, linear in the fraction of the time limit that was
//! still left. Practice mode has no per-question clock, so a correct answer
//! always earns the full points. Wrong answers earn nothing in every mode.

use std::time::Duration;

use crate::model::Answer;

/// How a mode turns a correct answer into points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    /// Speed-weighted: 50% to 100% of the base points
    Timed,
    /// Full base points regardless of time
    Flat,
}

impl Scoring {
    /// Calculates the points earned by one submission
    ///
    /// For `Timed` scoring this is
    /// `floor(base * (0.5 + 0.5 * clamp(remaining / time_limit, 0, 1)))`,
    /// evaluated exactly in integer milliseconds. A zero time limit counts
    /// as a full time fraction.
    ///
    /// # Arguments
    ///
    /// * `base_points` - Points the question awards for a correct answer
    /// * `correct` - Whether the selected option is the correct one
    /// * `remaining` - Time left on the question's countdown at submission
    /// * `time_limit` - The question's full time limit
    pub fn points(
        self,
        base_points: u64,
        correct: bool,
        remaining: Duration,
        time_limit: Duration,
    ) -> u64 {
        if !correct {
            return 0;
        }
        match self {
            Scoring::Flat => base_points,
            Scoring::Timed => {
                let limit = time_limit.as_millis();
                if limit == 0 {
                    return base_points;
                }
                let remaining = remaining.as_millis().min(limit);
                let points = u128::from(base_points) * (limit + remaining) / (2 * limit);
                u64::try_from(points).unwrap_or(base_points)
            }
        }
    }
}

/// The authoritative score: the sum of points over a participant's answers
pub fn authoritative_score<'a, I>(answers: I) -> u64
where
    I: IntoIterator<Item = &'a Answer>,
{
    answers.into_iter().map(|a| a.points).sum()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::id::Id;

    const LIMIT: Duration = Duration::from_secs(20);

    #[test]
    fn test_timed_full_time_left() {
        assert_eq!(Scoring::Timed.points(100, true, LIMIT, LIMIT), 100);
    }

    #[test]
    fn test_timed_no_time_left() {
        assert_eq!(Scoring::Timed.points(100, true, Duration::ZERO, LIMIT), 50);
    }

    #[test]
    fn test_timed_incorrect_earns_nothing() {
        for secs in [0, 7, 20] {
            assert_eq!(
                Scoring::Timed.points(100, false, Duration::from_secs(secs), LIMIT),
                0
            );
        }
    }

    #[test]
    fn test_timed_floors_partial_points() {
        // 100 * (0.5 + 0.5 * 3/20) = 57.5
        assert_eq!(
            Scoring::Timed.points(100, true, Duration::from_secs(3), LIMIT),
            57
        );
        // 100 * (0.5 + 0.5 * 6/20) = 65 exactly
        assert_eq!(
            Scoring::Timed.points(100, true, Duration::from_secs(6), LIMIT),
            65
        );
    }

    #[test]
    fn test_timed_clamps_remaining_above_limit() {
        assert_eq!(
            Scoring::Timed.points(100, true, Duration::from_secs(45), LIMIT),
            100
        );
    }

    #[test]
    fn test_timed_zero_limit_awards_full() {
        assert_eq!(
            Scoring::Timed.points(80, true, Duration::ZERO, Duration::ZERO),
            80
        );
    }

    #[test]
    fn test_flat_ignores_time() {
        assert_eq!(Scoring::Flat.points(100, true, Duration::ZERO, LIMIT), 100);
        assert_eq!(Scoring::Flat.points(100, false, LIMIT, LIMIT), 0);
    }

    #[test]
    fn test_authoritative_score_sums_points() {
        let answer = |points: u64| Answer {
            room_id: Id::new(),
            participant_id: Id::new(),
            question_id: Id::new(),
            option: 0,
            correct: points > 0,
            points,
            answer_time: Duration::from_secs(1),
        };
        let answers = [answer(100), answer(0), answer(57)];
        assert_eq!(authoritative_score(&answers), 157);
        assert_eq!(authoritative_score(&Vec::<Answer>::new()), 0);
    }
}
