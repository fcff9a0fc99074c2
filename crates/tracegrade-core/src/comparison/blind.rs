//! Blind label assignment.
//!
//! The judge never sees which analysis is A and which is B. Each stage shows
//! the two outputs as `response_1` and `response_2`; [`BlindAssignment`] maps
//! labels back to true sides when the verdict is parsed.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracegrade_store::Side;

use crate::config::{ComparisonConfig, LabelPolicy};

/// A judge-facing response slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    First,
    Second,
}

impl Label {
    /// Key of this slot in the judge's JSON answer.
    pub fn key(&self) -> &'static str {
        match self {
            Label::First => "response_1",
            Label::Second => "response_2",
        }
    }
}

/// Which side occupies which slot. Pure and invertible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindAssignment {
    /// `true` when B is shown first.
    pub swapped: bool,
}

impl BlindAssignment {
    pub fn new(swapped: bool) -> Self {
        Self { swapped }
    }

    pub fn side_of(&self, label: Label) -> Side {
        match (label, self.swapped) {
            (Label::First, false) | (Label::Second, true) => Side::A,
            (Label::First, true) | (Label::Second, false) => Side::B,
        }
    }

    pub fn label_of(&self, side: Side) -> Label {
        match (side, self.swapped) {
            (Side::A, false) | (Side::B, true) => Label::First,
            (Side::A, true) | (Side::B, false) => Label::Second,
        }
    }

    /// Order `(a, b)` into `(first, second)` display slots.
    pub fn order<T>(&self, a: T, b: T) -> (T, T) {
        if self.swapped {
            (b, a)
        } else {
            (a, b)
        }
    }
}

/// Draws one assignment per stage according to the configured policy.
#[derive(Debug)]
pub struct LabelSource {
    policy: LabelPolicy,
    rng: Mutex<StdRng>,
}

impl LabelSource {
    pub fn new(policy: LabelPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &ComparisonConfig) -> Self {
        Self::new(config.label_policy, config.label_seed)
    }

    pub fn next(&self) -> BlindAssignment {
        match self.policy {
            LabelPolicy::Fixed => BlindAssignment::new(false),
            LabelPolicy::Randomized => {
                let swapped = match self.rng.lock() {
                    Ok(mut rng) => rng.gen_bool(0.5),
                    Err(poisoned) => poisoned.into_inner().gen_bool(0.5),
                };
                BlindAssignment::new(swapped)
            }
        }
    }
}
