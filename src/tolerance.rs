//! The convergence tolerance used when moving to a target position.

use crate::error::InvalidArgumentError;
use std::sync::atomic::{AtomicU64, Ordering};

/// How close, in mm, the stage must come to its target for a move to finish.
///
/// The value is shared by every clone of a [`Stage`](crate::Stage) and can be
/// changed while a move is in progress; the move uses whichever value is
/// current when it compares a position.
#[derive(Debug)]
pub struct Tolerance(AtomicU64);

impl Tolerance {
    /// The default tolerance: 0.002 mm.
    pub const DEFAULT: f64 = 0.002;
    /// The largest accepted tolerance: 1 mm.
    pub const MAX: f64 = 1.0;

    /// Create a tolerance with the default value.
    pub fn new() -> Self {
        Tolerance(AtomicU64::new(Tolerance::DEFAULT.to_bits()))
    }

    /// Get the current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set the value.
    ///
    /// Values outside `[0, 1]`, including NaN, are rejected and the current
    /// value is kept.
    pub fn set(&self, value: f64) -> Result<(), InvalidArgumentError> {
        if !(0.0..=Tolerance::MAX).contains(&value) {
            return Err(InvalidArgumentError::new("tolerance", value));
        }
        self.0.store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Whether `position` is strictly within the tolerance of `target`.
    pub fn converged(&self, position: f64, target: f64) -> bool {
        (position - target).abs() < self.get()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::new()
    }
}
