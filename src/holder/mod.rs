//! Per-variable value caches.
//!
//! A [`Holder`] owns one variable's arrays for one population. Arrays are
//! keyed by exact period and live in memory, or on disk once the memory
//! pressure policy asks for it.

mod set_input;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CalcResult, ValidationError};
use crate::storage::{ArrayStorage, InMemoryStorage, MemoryPressure, OnDiskStorage};
use crate::time::{DateUnit, Period};
use crate::value::{Array, ValueType};
use crate::variable::{SetInputStrategy, Variable};

/// Footprint of a holder, as reported by `get_memory_usage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Cells per array (the population size).
    pub nb_cells_by_array: usize,
    /// Arrays held in memory.
    pub nb_arrays: usize,
    /// Bytes held in memory.
    pub total_nb_bytes: usize,
    /// Bytes per cell.
    pub cell_size: usize,
    /// Type of the stored cells.
    pub value_type: ValueType,
    /// Arrays spilled to the disk tier.
    pub nb_arrays_on_disk: usize,
    /// Number of `calculate` requests, when tracing is enabled.
    pub nb_requests: Option<usize>,
}

#[derive(Debug)]
struct DiskTier {
    storage: OnDiskStorage,
    pressure: Arc<dyn MemoryPressure>,
    max_memory_occupation: f64,
}

/// Value cache for one variable of one population.
#[derive(Debug)]
pub struct Holder {
    variable: Arc<Variable>,
    count: usize,
    entity_plural: String,
    memory: InMemoryStorage,
    disk: Option<DiskTier>,
    do_not_store: bool,
    opt_out_cache: bool,
}

impl Holder {
    /// Creates an in-memory holder for a population of `count` members.
    #[must_use]
    pub fn new(variable: Arc<Variable>, count: usize, entity_plural: impl Into<String>) -> Self {
        let is_eternal = variable.is_eternal();
        Self {
            variable,
            count,
            entity_plural: entity_plural.into(),
            memory: InMemoryStorage::new(is_eternal),
            disk: None,
            do_not_store: false,
            opt_out_cache: false,
        }
    }

    /// Enables spilling to `storage` whenever `pressure` reports that memory
    /// occupation reached `max_memory_occupation`.
    #[must_use]
    pub fn with_disk_storage(
        mut self,
        storage: OnDiskStorage,
        pressure: Arc<dyn MemoryPressure>,
        max_memory_occupation: f64,
    ) -> Self {
        self.disk = Some(DiskTier {
            storage,
            pressure,
            max_memory_occupation,
        });
        self
    }

    /// Computed values are never cached.
    #[must_use]
    pub const fn with_do_not_store(mut self, do_not_store: bool) -> Self {
        self.do_not_store = do_not_store;
        self
    }

    /// Computed values are not cached (cache blacklist opt-out).
    #[must_use]
    pub const fn with_opt_out_cache(mut self, opt_out: bool) -> Self {
        self.opt_out_cache = opt_out;
        self
    }

    /// The variable this holder caches.
    #[must_use]
    pub fn variable(&self) -> &Arc<Variable> {
        &self.variable
    }

    /// Number of cells in every stored array.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// An array of the variable default, one cell per entity member.
    #[must_use]
    pub fn default_array(&self) -> Array {
        self.variable.default_array(self.count)
    }

    /// Exact-period lookup, memory first, then disk.
    ///
    /// A neutralized variable always yields its default array.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when a disk file cannot be read.
    pub fn get_array(&self, period: &Period) -> CalcResult<Option<Array>> {
        if self.variable.is_neutralized() {
            return Ok(Some(self.default_array()));
        }
        if let Some(array) = self.memory.peek(period) {
            return Ok(Some(array.clone()));
        }
        match &self.disk {
            Some(disk) => Ok(disk.storage.get(period)?),
            None => Ok(None),
        }
    }

    /// True when an array is stored for exactly `period`.
    #[must_use]
    pub fn contains(&self, period: &Period) -> bool {
        self.memory.contains(period)
            || self
                .disk
                .as_ref()
                .is_some_and(|disk| disk.storage.contains(period))
    }

    /// Records an input value.
    ///
    /// Eternity periods are only accepted by eternal variables. When the
    /// variable declares a set-input strategy and `period` is at least as
    /// coarse as its definition period, the value is spread over the
    /// elementary subperiods; otherwise it is stored as is.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::PeriodMismatch` for an incompatible period,
    /// `ValidationError::InconsistentInput` when a divided total contradicts
    /// known values, and cast or length errors for unusable arrays.
    pub fn set_input(&mut self, period: &Period, array: Array) -> CalcResult<()> {
        let definition_period = self.variable.definition_period();
        if period.is_eternity() && definition_period != DateUnit::Eternity {
            return Err(ValidationError::PeriodMismatch {
                variable: self.variable.name().to_string(),
                period: *period,
                definition_period,
                hint: "Eternity periods are reserved to variables defined for eternity."
                    .to_string(),
            }
            .into());
        }
        if self.variable.is_neutralized() {
            warn!(
                variable = %self.variable.name(),
                period = %period,
                "ignoring input: variable is neutralized"
            );
            return Ok(());
        }
        let reshaped = definition_period != DateUnit::Eternity
            && period.unit().weight() >= definition_period.weight();
        match self.variable.set_input() {
            Some(SetInputStrategy::DispatchByPeriod) if reshaped => {
                set_input::dispatch_by_period(self, period, array)
            }
            Some(SetInputStrategy::DivideByPeriod) if reshaped => {
                set_input::divide_by_period(self, period, array)
            }
            _ => self.set(period, array),
        }
    }

    fn to_array(&self, value: Array) -> CalcResult<Array> {
        if value.len() != self.count {
            return Err(ValidationError::LengthMismatch {
                variable: self.variable.name().to_string(),
                entity_plural: self.entity_plural.clone(),
                expected: self.count,
                actual: value.len(),
            }
            .into());
        }
        Ok(value.cast(
            self.variable.name(),
            self.variable.value_type(),
            self.variable.possible_values(),
        )?)
    }

    fn check_period(&self, period: &Period) -> CalcResult<()> {
        let definition_period = self.variable.definition_period();
        if definition_period == DateUnit::Eternity {
            return Ok(());
        }
        if period.unit() != definition_period || period.size() != 1 {
            let name = self.variable.name();
            return Err(ValidationError::PeriodMismatch {
                variable: name.to_string(),
                period: *period,
                definition_period,
                hint: format!(
                    "Please adapt your input. If you are the maintainer of \"{name}\", you can \
                     consider adding it a set_input attribute to enable automatic period casting."
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Stores `value` for exactly `period`.
    ///
    /// The disk tier is only chosen when no array is already in memory for
    /// that period; an in-memory array is overwritten in place.
    ///
    /// # Errors
    ///
    /// Same as [`Holder::set_input`], plus storage failures.
    pub fn set(&mut self, period: &Period, value: Array) -> CalcResult<()> {
        let value = self.to_array(value)?;
        self.check_period(period)?;
        let spill = self.disk.as_ref().is_some_and(|disk| {
            !self.memory.contains(period) && disk.pressure.should_spill(disk.max_memory_occupation)
        });
        match &mut self.disk {
            Some(disk) if spill => {
                debug!(
                    variable = %self.variable.name(),
                    period = %period,
                    directory = %disk.storage.directory().display(),
                    "memory pressure: storing array on disk"
                );
                disk.storage.put(*period, value)?;
            }
            _ => self.memory.put(*period, value)?,
        }
        Ok(())
    }

    /// Caches a computed value, unless this variable opted out of caching.
    ///
    /// # Errors
    ///
    /// Same as [`Holder::set`].
    pub fn put_in_cache(&mut self, value: Array, period: &Period) -> CalcResult<()> {
        if self.do_not_store || self.opt_out_cache {
            return Ok(());
        }
        self.set(period, value)
    }

    /// Periods with a stored array, in either tier, in chronological order.
    #[must_use]
    pub fn get_known_periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self.memory.known_periods();
        if let Some(disk) = &self.disk {
            periods.extend(disk.storage.known_periods());
        }
        periods.sort();
        periods.dedup();
        periods
    }

    /// Latest known period starting no later than `period`.
    #[must_use]
    pub fn latest_known_period(&self, period: &Period) -> Option<Period> {
        self.get_known_periods()
            .into_iter()
            .filter(|known| known.start() <= period.start())
            .last()
    }

    /// Removes every array (`None`) or every array whose period lies within
    /// `period`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when a disk file cannot be removed.
    pub fn delete_arrays(&mut self, period: Option<&Period>) -> CalcResult<()> {
        self.memory.delete(period)?;
        if let Some(disk) = &mut self.disk {
            disk.storage.delete(period)?;
        }
        Ok(())
    }

    /// Memory footprint. `nb_requests` is filled in by the simulation.
    #[must_use]
    pub fn get_memory_usage(&self) -> MemoryUsage {
        let usage = self.memory.usage();
        MemoryUsage {
            nb_cells_by_array: self.count,
            nb_arrays: usage.nb_arrays,
            total_nb_bytes: usage.total_nb_bytes,
            cell_size: self.variable.value_type().cell_size(),
            value_type: self.variable.value_type(),
            nb_arrays_on_disk: self
                .disk
                .as_ref()
                .map_or(0, |disk| disk.storage.usage().nb_arrays),
            nb_requests: None,
        }
    }
}
