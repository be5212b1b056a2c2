//! Die shapes and roll results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced when describing dice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DieError {
    /// A die must have at least one face.
    #[error("a die needs at least one side, got {0}")]
    NoSides(u32),
}

/// A single die with a fixed number of faces, numbered `1..=sides`.
///
/// # Example
///
/// ```
/// use fray_dice::Die;
///
/// assert_eq!(Die::D20.sides(), 20);
/// assert_eq!(Die::new(6).unwrap().to_string(), "d6");
/// assert!(Die::new(0).is_err());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Die(u32);

impl Die {
    /// The twenty-sided die used for initiative and attack rolls.
    pub const D20: Die = Die(20);
    /// The percentile die used for flee attempts.
    pub const D100: Die = Die(100);

    /// Creates a die with the given number of sides.
    ///
    /// # Errors
    ///
    /// Returns [`DieError::NoSides`] when `sides` is zero.
    pub const fn new(sides: u32) -> Result<Self, DieError> {
        if sides == 0 {
            return Err(DieError::NoSides(sides));
        }
        Ok(Self(sides))
    }

    /// Returns the number of faces.
    #[must_use]
    pub const fn sides(self) -> u32 {
        self.0
    }

    /// Clamps an arbitrary value onto the faces of this die.
    #[must_use]
    pub fn clamp(self, value: u32) -> u32 {
        value.clamp(1, self.0)
    }
}

impl fmt::Display for Die {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// A natural roll together with the modifier applied to it.
///
/// Rules care about both parts: a natural 20 on a d20 is a critical no matter
/// what the modifier is, while hit checks compare the modified total.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    die: Die,
    natural: u32,
    modifier: i32,
}

impl Roll {
    /// Records a natural roll on `die` with a flat modifier.
    ///
    /// The natural value is clamped onto the die's faces.
    #[must_use]
    pub fn new(die: Die, natural: u32, modifier: i32) -> Self {
        Self {
            die,
            natural: die.clamp(natural),
            modifier,
        }
    }

    /// The die that was rolled.
    #[must_use]
    pub const fn die(&self) -> Die {
        self.die
    }

    /// The face that came up.
    #[must_use]
    pub const fn natural(&self) -> u32 {
        self.natural
    }

    /// The flat modifier added to the face.
    #[must_use]
    pub const fn modifier(&self) -> i32 {
        self.modifier
    }

    /// Natural face plus modifier.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn total(&self) -> i32 {
        (self.natural as i32).saturating_add(self.modifier)
    }

    /// True when the highest face came up.
    #[must_use]
    pub const fn is_natural_max(&self) -> bool {
        self.natural == self.die.sides()
    }

    /// True when a 1 came up.
    #[must_use]
    pub const fn is_natural_min(&self) -> bool {
        self.natural == 1
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {} = {}", self.natural, self.modifier, self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod die_tests {
        use super::*;

        #[test]
        fn zero_sides_rejected() {
            assert_eq!(Die::new(0), Err(DieError::NoSides(0)));
        }

        #[test]
        fn clamp_keeps_value_on_faces() {
            assert_eq!(Die::D20.clamp(0), 1);
            assert_eq!(Die::D20.clamp(25), 20);
            assert_eq!(Die::D20.clamp(7), 7);
        }

        #[test]
        fn display_uses_dice_notation() {
            assert_eq!(Die::D100.to_string(), "d100");
        }
    }

    mod roll_tests {
        use super::*;

        #[test]
        fn total_adds_negative_modifier() {
            let roll = Roll::new(Die::D20, 4, -2);
            assert_eq!(roll.total(), 2);
        }

        #[test]
        fn total_saturates_at_the_bounds() {
            assert_eq!(Roll::new(Die::D20, 20, i32::MAX).total(), i32::MAX);
            assert_eq!(Roll::new(Die::D20, 1, i32::MIN).total(), i32::MIN + 1);
        }

        #[test]
        fn natural_extremes() {
            assert!(Roll::new(Die::D20, 20, -5).is_natural_max());
            assert!(Roll::new(Die::D20, 1, 10).is_natural_min());
            assert!(!Roll::new(Die::D20, 19, 1).is_natural_max());
        }

        #[test]
        fn out_of_range_natural_is_clamped() {
            let roll = Roll::new(Die::D20, 40, 0);
            assert_eq!(roll.natural(), 20);
        }

        #[test]
        fn display_shows_breakdown() {
            assert_eq!(Roll::new(Die::D20, 15, 3).to_string(), "15 + 3 = 18");
        }

        #[test]
        fn roll_survives_json() {
            let roll = Roll::new(Die::D20, 17, -1);
            let json = serde_json::to_string(&roll).unwrap();
            let back: Roll = serde_json::from_str(&json).unwrap();
            assert_eq!(back, roll);
            assert_eq!(back.total(), 16);
        }
    }
}
