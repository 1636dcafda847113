//! Injectable randomness for review and stage outcomes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of uniform rolls in `[0, 1)`.
///
/// All randomized decisions of the scheduler go through this trait so a run
/// can be replayed from a seed or scripted roll by roll in tests.
pub trait Dice: Send {
    /// Next roll in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// True with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.roll() < p
    }

    /// Uniform integer in `[min, max]`.
    fn between(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        let span = (max - min) as f64;
        min + (self.roll() * (span + 1.0)).floor().min(span) as u64
    }
}

impl<D: Dice + ?Sized> Dice for Box<D> {
    fn roll(&mut self) -> f64 {
        (**self).roll()
    }
}

/// Pseudo-random dice backed by a seedable generator.
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    /// Reproducible dice.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Dice seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Dice for SeededDice {
    fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Dice that replay a fixed sequence of rolls, then repeat a fallback.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    rolls: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedDice {
    /// Replay `rolls`, then return 0.5 forever.
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            fallback: 0.5,
        }
    }

    /// Set the roll returned once the script runs out.
    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    /// Queue more rolls.
    pub fn push(&mut self, roll: f64) {
        self.rolls.push_back(roll);
    }

    /// Rolls not consumed yet.
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(self.fallback)
    }
}
