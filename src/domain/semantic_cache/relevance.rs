//! Relevance threshold

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Minimum cosine similarity a stored entry needs to be served, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct MinRelevance(f32);

impl MinRelevance {
    pub const DEFAULT: f32 = 0.85;

    pub fn new(value: f32) -> Result<Self, DomainError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::invalid_argument(format!(
                "relevance must be within [0, 1], got {}",
                value
            )));
        }

        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Whether a similarity clears the threshold
    pub fn admits(&self, similarity: f32) -> bool {
        similarity >= self.0
    }
}

impl Default for MinRelevance {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<f32> for MinRelevance {
    type Error = DomainError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MinRelevance> for f32 {
    fn from(value: MinRelevance) -> Self {
        value.0
    }
}

impl fmt::Display for MinRelevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Threshold shared by every caller of one cache instance
///
/// Writers replace the whole value; readers observe either the old or the new
/// threshold, never a torn one. An explicit override always wins over a
/// persisted value restored later.
#[derive(Debug)]
pub struct SharedRelevance {
    bits: AtomicU32,
    overridden: AtomicBool,
}

impl SharedRelevance {
    pub fn new(initial: MinRelevance) -> Self {
        Self {
            bits: AtomicU32::new(initial.value().to_bits()),
            overridden: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> MinRelevance {
        MinRelevance(f32::from_bits(self.bits.load(Ordering::Acquire)))
    }

    /// Replace the threshold on explicit request
    pub fn set_override(&self, value: MinRelevance) {
        self.overridden.store(true, Ordering::Release);
        self.bits.store(value.value().to_bits(), Ordering::Release);
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden.load(Ordering::Acquire)
    }

    /// Adopt a persisted threshold unless one was set explicitly.
    /// Returns whether the value was taken.
    pub fn restore(&self, value: MinRelevance) -> bool {
        if self.is_overridden() {
            return false;
        }

        self.bits.store(value.value().to_bits(), Ordering::Release);
        true
    }
}
