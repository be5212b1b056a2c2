//! # Fray Dice
//!
//! Deterministic dice rolling for the Fray combat core.
//!
//! Every random decision in a fight (initiative, to-hit, flee attempts) goes
//! through the [`Dice`] trait. Production code uses [`SeededDice`], a ChaCha8
//! stream that can be replayed from its seed; tests use [`ScriptedDice`] to
//! force exact natural rolls.
//!
//! ## Quick Start
//!
//! ```
//! use fray_dice::{Dice, Die, Roll, SeededDice};
//!
//! let mut dice = SeededDice::new(42);
//! let natural = dice.roll(Die::D20);
//! assert!((1..=20).contains(&natural));
//!
//! let roll = Roll::new(Die::D20, natural, 3);
//! assert_eq!(roll.total(), natural as i32 + 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod die;
pub mod roller;

pub use die::{Die, DieError, Roll};
pub use roller::{Dice, ScriptedDice, SeededDice};
