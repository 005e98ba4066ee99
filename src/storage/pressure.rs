//! Memory-pressure policies deciding when holders spill to disk.

use std::fmt;

use sysinfo::System;

/// Decides whether a new array should be written to the disk tier.
pub trait MemoryPressure: fmt::Debug + Send + Sync {
    /// True when memory occupation has reached `max_occupation` (a fraction
    /// in `(0, 1]`).
    fn should_spill(&self, max_occupation: f64) -> bool;
}

/// Whole-system memory occupation, as reported by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryPressure;

impl SystemMemoryPressure {
    /// Fraction of system memory in use, if the platform reports it.
    #[must_use]
    pub fn occupation() -> Option<f64> {
        let mut sys = System::new();
        sys.refresh_memory();
        occupation(sys.total_memory(), sys.available_memory())
    }
}

#[allow(clippy::cast_precision_loss)]
fn occupation(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(1.0 - available.min(total) as f64 / total as f64)
}

impl MemoryPressure for SystemMemoryPressure {
    fn should_spill(&self, max_occupation: f64) -> bool {
        Self::occupation().is_some_and(|used| used >= max_occupation)
    }
}

/// A constant answer, for deterministic runs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedPressure(pub bool);

impl MemoryPressure for FixedPressure {
    fn should_spill(&self, _max_occupation: f64) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupation_from_totals() {
        let used = occupation(16_000, 4_000).unwrap();
        assert!((used - 0.75).abs() < 1e-9);
        assert_eq!(occupation(1_000, 2_000), Some(0.0));
        assert!(occupation(0, 0).is_none());
    }

    #[test]
    fn test_system_occupation_is_a_fraction() {
        if let Some(used) = SystemMemoryPressure::occupation() {
            assert!((0.0..=1.0).contains(&used));
            assert!(SystemMemoryPressure.should_spill(0.0));
        }
    }

    #[test]
    fn test_fixed_pressure() {
        assert!(FixedPressure(true).should_spill(0.95));
        assert!(!FixedPressure(false).should_spill(0.0));
    }
}
