//! In-game calendar days.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An in-game integer date, independent of wall-clock time.
///
/// World days order lots (FIFO acquisition day) and adjustments. They are
/// never negative.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorldDay(i32);

impl WorldDay {
    /// Validating constructor for caller-supplied values.
    pub fn new(day: i32) -> DomainResult<Self> {
        if day < 0 {
            return Err(DomainError::validation(
                "worldDay must be greater than or equal to 0",
            ));
        }
        Ok(Self(day))
    }

    /// Clamp an untrusted value to the valid range (used when applying
    /// inbound events, where rejection is not an option).
    pub fn clamped(day: i32) -> Self {
        Self(day.max(0))
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for WorldDay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_days() {
        assert!(WorldDay::new(-1).is_err());
        assert_eq!(WorldDay::new(0).unwrap().value(), 0);
    }

    #[test]
    fn clamps_instead_of_failing() {
        assert_eq!(WorldDay::clamped(-7), WorldDay::new(0).unwrap());
        assert_eq!(WorldDay::clamped(12).value(), 12);
    }
}
