//! Runtime tuning for client sessions
//!
//! Hard limits live in [`crate::constants`]; this module holds the knobs a
//! deployment may adjust, such as how long the correctness reveal stays on
//! screen before auto-advance. Options are deserialized from the host's
//! configuration and validated with `garde` before use.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{constants::timing, error::ValidationError};

type ValidationResult = garde::Result;

/// Checks that a duration, in milliseconds, falls within `[MIN, MAX]`
fn validate_millis<const MIN: u64, const MAX: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    let millis = u64::try_from(val.as_millis()).unwrap_or(u64::MAX);
    if (MIN..=MAX).contains(&millis) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN}ms,{MAX}ms]",
        )))
    }
}

/// Timing options shared by participant and host sessions
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// How long correctness is shown after a submission before auto-advance
    #[garde(custom(|v, _| validate_millis::<0, { timing::MAX_REVEAL_WINDOW }>("reveal_window", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub reveal_window: Duration,
    /// Submission is suppressed for this long after a per-question reset
    #[garde(custom(|v, _| validate_millis::<0, { timing::MAX_RESET_GRACE }>("reset_grace", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub reset_grace: Duration,
    /// Delay between the completion predicate holding and the automatic finish
    #[garde(custom(|v, _| validate_millis::<0, { timing::MAX_COMPLETION_GRACE }>("completion_grace", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub completion_grace: Duration,
    /// Period of the countdown tick
    #[garde(custom(|v, _| validate_millis::<{ timing::MIN_TICK }, { timing::MAX_TICK }>("tick", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub tick: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reveal_window: Duration::from_secs(2),
            reset_grace: Duration::from_millis(300),
            completion_grace: Duration::from_millis(1500),
            tick: Duration::from_secs(1),
        }
    }
}

impl Options {
    /// Returns these options if every field is within bounds
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Options` carrying the validation report.
    pub fn checked(self) -> Result<Self, ValidationError> {
        self.validate()
            .map_err(|report| ValidationError::Options(report.to_string()))?;
        Ok(self)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn test_tick_too_short() {
        let options = Options {
            tick: Duration::from_millis(10),
            ..Options::default()
        };
        assert!(options.validate().is_err());
        assert!(matches!(
            options.checked(),
            Err(ValidationError::Options(report)) if report.contains("tick")
        ));
    }

    #[test]
    fn test_reveal_window_too_long() {
        let options = Options {
            reveal_window: Duration::from_secs(60),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: Options = serde_json::from_str(r#"{"reveal_window": 500}"#).unwrap();
        assert_eq!(options.reveal_window, Duration::from_millis(500));
        assert_eq!(options.tick, Duration::from_secs(1));
    }

    #[test]
    fn test_serializes_as_milliseconds() {
        let json = serde_json::to_value(Options::default()).unwrap();
        assert_eq!(json["tick"], 1000);
        assert_eq!(json["reset_grace"], 300);
    }
}
