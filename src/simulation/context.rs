//! Evaluation context: the call stack of one top-level calculation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CalcResult, ExecutionError};
use crate::time::Period;

/// Stable identifier for a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationId(Uuid);

impl SimulationId {
    /// Create a new random simulation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SimulationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calculation in progress.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Frame {
    /// Variable name.
    pub name: String,
    /// Requested period.
    pub period: Period,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.period)
    }
}

/// Call stack and cache-invalidation set threaded through a recursive
/// evaluation.
///
/// The stack holds one frame per calculation in progress, the innermost
/// last. Frames caught in a spiral are recorded as invalidated; their cached
/// values are purged once the stack is empty again.
#[derive(Debug)]
pub struct EvalContext {
    stack: Vec<Frame>,
    invalidated: BTreeSet<Frame>,
    max_spiral_loops: usize,
}

impl EvalContext {
    /// An empty context tripping spirals after `max_spiral_loops` repeats.
    #[must_use]
    pub fn new(max_spiral_loops: usize) -> Self {
        Self {
            stack: Vec::new(),
            invalidated: BTreeSet::new(),
            max_spiral_loops,
        }
    }

    /// Enters a calculation.
    pub fn push(&mut self, name: &str, period: Period) {
        self.stack.push(Frame {
            name: name.to_string(),
            period,
        });
    }

    /// Leaves the innermost calculation.
    pub fn pop(&mut self) -> Option<Frame> {
        self.stack.pop()
    }

    /// Number of calculations in progress.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True between top-level calculations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Calculations in progress, outermost first.
    #[must_use]
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Marks a cached value for removal at the end of the calculation.
    pub fn invalidate(&mut self, name: &str, period: Period) {
        self.invalidated.insert(Frame {
            name: name.to_string(),
            period,
        });
    }

    /// Values to purge once the stack empties.
    #[must_use]
    pub fn invalidated(&self) -> &BTreeSet<Frame> {
        &self.invalidated
    }

    pub(crate) fn take_invalidated(&mut self) -> BTreeSet<Frame> {
        std::mem::take(&mut self.invalidated)
    }

    /// Checks the frame just pushed for `name` at `period` against the
    /// calculations already in progress.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Cycle` when the same variable is already
    /// being computed for the same period, and `ExecutionError::Spiral` when
    /// it is already being computed for `max_spiral_loops` other periods.
    /// Before reporting a spiral, every frame from the top of the stack down
    /// to the `max_spiral_loops + 1`-th earlier occurrence of `name` is
    /// invalidated.
    pub fn check_for_cycle(&mut self, name: &str, period: &Period) -> CalcResult<()> {
        let outer = &self.stack[..self.stack.len().saturating_sub(1)];
        let previous: Vec<&Period> = outer
            .iter()
            .filter(|frame| frame.name == name)
            .map(|frame| &frame.period)
            .collect();
        if previous.contains(&period) {
            return Err(ExecutionError::Cycle {
                variable: name.to_string(),
                period: *period,
            }
            .into());
        }
        if previous.len() < self.max_spiral_loops {
            return Ok(());
        }

        let stack = self
            .stack
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.invalidate_spiral(name);
        Err(ExecutionError::Spiral {
            variable: name.to_string(),
            period: *period,
            stack,
        }
        .into())
    }

    fn invalidate_spiral(&mut self, name: &str) {
        let mut seen = 0;
        for frame in self.stack.iter().rev() {
            self.invalidated.insert(frame.clone());
            if frame.name == name {
                seen += 1;
                if seen > self.max_spiral_loops {
                    break;
                }
            }
        }
    }
}
