//! Simulation configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Storage-tier policy. Without it every array stays in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory occupation (fraction of system memory) from which new arrays
    /// are written to disk.
    pub max_memory_occupation: f64,
    /// Variables always kept in memory.
    pub priority_variables: BTreeSet<String>,
    /// Variables never cached.
    pub variables_to_drop: BTreeSet<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_memory_occupation: 0.95,
            priority_variables: BTreeSet::new(),
            variables_to_drop: BTreeSet::new(),
        }
    }
}

impl MemoryConfig {
    /// Validate the policy.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an occupation outside
    /// `(0, 1]` or a variable listed both as priority and to drop.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.max_memory_occupation > 0.0 && self.max_memory_occupation <= 1.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "max_memory_occupation must be in (0, 1], got {}",
                    self.max_memory_occupation
                ),
            });
        }
        if let Some(name) = self
            .priority_variables
            .intersection(&self.variables_to_drop)
            .next()
        {
            return Err(ValidationError::InvalidConfig {
                reason: format!("variable '{name}' is both a priority and dropped"),
            });
        }
        Ok(())
    }
}

/// Knobs of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Occurrences of a variable on the call stack tolerated before the
    /// recursion is treated as a spiral.
    pub max_spiral_loops: usize,
    /// Record a full calculation trace.
    pub trace: bool,
    /// Skip caching variables blacklisted by the tax-benefit system.
    pub opt_out_cache: bool,
    /// Spill arrays to disk under memory pressure; `None` keeps everything
    /// in memory.
    pub memory: Option<MemoryConfig>,
    /// Root of the disk tier. A private temporary directory is used when
    /// unset.
    pub storage_dir: Option<PathBuf>,
    /// Keep disk files after the simulation is dropped.
    pub preserve_storage_dir: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_spiral_loops: 1,
            trace: false,
            opt_out_cache: false,
            memory: None,
            storage_dir: None,
            preserve_storage_dir: false,
        }
    }
}

impl SimulationConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed JSON or
    /// invalid values.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("failed to parse configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// This must be called before building a `Simulation`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` when a value is out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_spiral_loops == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_spiral_loops must be > 0".to_string(),
            });
        }
        if let Some(memory) = &self.memory {
            memory.validate()?;
        }
        Ok(())
    }
}
