//! Verdict on what the consumer observed

use super::kernels::{K_INIT_VAL1, K_SET_VAL2, SLOT_WORDS};
use crate::memory::{read_words, DevicePtr};
use crate::Result;
use std::fmt;

/// Values the consumer saw in slot 1 and slot 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub slot1: i32,
    pub slot2: i32,
}

impl Observation {
    pub fn new(slot1: i32, slot2: i32) -> Self {
        Self { slot1, slot2 }
    }

    /// Decode an output buffer laid out as `[slot1, slot2]`
    pub fn from_output(out: &DevicePtr) -> Result<Self> {
        let words = read_words(out, SLOT_WORDS)?;
        Ok(Self::new(words[0], words[1]))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(slot1={}, slot2={})", self.slot1, self.slot2)
    }
}

/// Outcome of [`check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The second write was visible while the first was still stale
    Violation,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }
}

/// Fail iff the consumer saw the new slot 2 alongside the stale slot 1.
///
/// Seeing neither write, or both, or only the first, are all consistent with
/// an ordering fence.
pub fn check(observation: &Observation) -> Verdict {
    if observation.slot1 == K_INIT_VAL1 && observation.slot2 == K_SET_VAL2 {
        Verdict::Violation
    } else {
        Verdict::Pass
    }
}
