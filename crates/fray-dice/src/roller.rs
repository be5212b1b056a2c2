//! Dice rollers.
//!
//! [`SeededDice`] wraps a ChaCha8 stream so a fight can be replayed from its
//! seed. [`ScriptedDice`] serves a fixed queue of faces first and falls back
//! to a seeded stream once the script runs dry.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::die::Die;

/// Source of die faces.
///
/// Implementations must always return a value in `1..=die.sides()`.
pub trait Dice: Send {
    /// Rolls one die and returns the face that came up.
    fn roll(&mut self, die: Die) -> u32;
}

impl<D: Dice + ?Sized> Dice for Box<D> {
    fn roll(&mut self, die: Die) -> u32 {
        (**self).roll(die)
    }
}

/// Deterministic dice backed by a seeded ChaCha8 RNG.
///
/// # Example
///
/// ```
/// use fray_dice::{Dice, Die, SeededDice};
///
/// let mut a = SeededDice::new(7);
/// let mut b = SeededDice::new(7);
/// assert_eq!(a.roll(Die::D20), b.roll(Die::D20));
/// ```
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededDice {
    /// Creates dice that replay the stream for `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates dice from a random seed. The seed is kept for replay.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// The seed this stream was created from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Rewinds the stream to its first roll.
    pub fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}

impl Dice for SeededDice {
    fn roll(&mut self, die: Die) -> u32 {
        self.rng.gen_range(1..=die.sides())
    }
}

/// Dice that serve queued faces before falling back to a seeded stream.
///
/// Queued faces are clamped onto the rolled die, so a scripted `20` rolled
/// on a d6 comes up as `6`.
///
/// # Example
///
/// ```
/// use fray_dice::{Dice, Die, ScriptedDice};
///
/// let mut dice = ScriptedDice::new([20, 1]);
/// assert_eq!(dice.roll(Die::D20), 20);
/// assert_eq!(dice.roll(Die::D20), 1);
/// assert_eq!(dice.remaining(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    script: VecDeque<u32>,
    fallback: SeededDice,
}

impl ScriptedDice {
    /// Queues `faces` in order, with seed 0 as the fallback stream.
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self::with_fallback(faces, SeededDice::new(0))
    }

    /// Queues `faces` in order and uses `fallback` once they run out.
    pub fn with_fallback(faces: impl IntoIterator<Item = u32>, fallback: SeededDice) -> Self {
        Self {
            script: faces.into_iter().collect(),
            fallback,
        }
    }

    /// Appends more faces to the end of the script.
    pub fn push(&mut self, faces: impl IntoIterator<Item = u32>) {
        self.script.extend(faces);
    }

    /// Number of scripted faces not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self, die: Die) -> u32 {
        match self.script.pop_front() {
            Some(face) => die.clamp(face),
            None => self.fallback.roll(die),
        }
    }
}
