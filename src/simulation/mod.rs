//! The formula evaluator.
//!
//! A [`Simulation`] owns the populations of one run and computes variables
//! on demand: cached values are returned as is, otherwise the formula in
//! force is run against a [`Scope`] and its result is cached. Recursion goes
//! through an explicit [`EvalContext`] carrying the call stack used for
//! cycle and spiral detection.

mod builder;
mod config;
mod context;
mod scope;
mod tracer;

pub use builder::SimulationBuilder;
pub use config::{MemoryConfig, SimulationConfig};
pub use context::{EvalContext, Frame, SimulationId};
pub use scope::Scope;
pub use tracer::{FullTracer, TraceNode};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, debug_span, warn};

use crate::error::{CalcError, CalcResult, ExecutionError, ValidationError};
use crate::holder::{Holder, MemoryUsage};
use crate::population::{GroupPopulation, Population};
use crate::storage::{MemoryPressure, OnDiskStorage, StorageError};
use crate::system::TaxBenefitSystem;
use crate::time::{DateUnit, Period, PeriodCache, PeriodInput};
use crate::value::Array;
use crate::variable::{OutputStrategy, Variable};

/// Footprint of every holder of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationMemoryUsage {
    /// Sum over every variable.
    pub total_nb_bytes: usize,
    /// Per-variable footprint, for variables holding at least one array.
    pub by_variable: BTreeMap<String, MemoryUsage>,
}

/// One run of a tax-benefit system over a set of populations.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use microsim::{Array, Entity, Simulation, TaxBenefitSystem, Variable, ValueType};
/// use microsim::time::DateUnit;
///
/// let mut system = TaxBenefitSystem::new("demo", vec![Entity::person("person", "persons")]).unwrap();
/// system
///     .add_variable(Variable::builder("salary", "person", ValueType::Float, DateUnit::Month).build().unwrap())
///     .unwrap();
/// system
///     .add_variable(
///         Variable::builder("tax", "person", ValueType::Float, DateUnit::Month)
///             .formula_named("formula", |scope, period, _| Ok(scope.calculate("salary", period)?.scale(0.2)?))
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let mut simulation = Simulation::builder(Arc::new(system)).persons(2).build().unwrap();
/// simulation.set_input("salary", "2022-01", vec![1000.0, 2000.0]).unwrap();
/// assert_eq!(simulation.calculate("tax", "2022-01").unwrap(), Array::from(vec![200.0, 400.0]));
/// ```
#[derive(Debug)]
pub struct Simulation {
    id: SimulationId,
    system: Arc<TaxBenefitSystem>,
    config: SimulationConfig,
    persons: Population,
    groups: BTreeMap<String, GroupPopulation>,
    periods: PeriodCache,
    tracer: Option<FullTracer>,
    pressure: Arc<dyn MemoryPressure>,
    pending_invalidations: BTreeSet<Frame>,
    storage_root: Option<PathBuf>,
    // Declared last: holder directories are removed before their root.
    _storage_dir: Option<TempDir>,
}

impl Simulation {
    /// Shorthand for [`SimulationBuilder::new`].
    #[must_use]
    pub fn builder(system: Arc<TaxBenefitSystem>) -> SimulationBuilder {
        SimulationBuilder::new(system)
    }

    pub(crate) fn from_parts(
        system: Arc<TaxBenefitSystem>,
        config: SimulationConfig,
        persons: Population,
        groups: BTreeMap<String, GroupPopulation>,
        pressure: Arc<dyn MemoryPressure>,
    ) -> CalcResult<Self> {
        let id = SimulationId::new();
        let (storage_root, storage_dir) = match (&config.memory, &config.storage_dir) {
            (None, _) => (None, None),
            (Some(_), Some(dir)) => (Some(dir.clone()), None),
            (Some(_), None) if config.preserve_storage_dir => (
                Some(std::env::temp_dir().join(format!("microsim-{id}"))),
                None,
            ),
            (Some(_), None) => {
                let dir = tempfile::Builder::new()
                    .prefix("microsim-")
                    .tempdir()
                    .map_err(|e| StorageError::io(std::env::temp_dir(), e))?;
                (Some(dir.path().to_path_buf()), Some(dir))
            }
        };
        debug!(
            simulation = %id,
            system = %system.name(),
            persons = persons.count(),
            groups = groups.len(),
            "simulation created"
        );
        Ok(Self {
            id,
            tracer: config.trace.then(FullTracer::new),
            system,
            config,
            persons,
            groups,
            periods: PeriodCache::new(),
            pressure,
            pending_invalidations: BTreeSet::new(),
            storage_root,
            _storage_dir: storage_dir,
        })
    }

    /// Identifier used in logs and disk directories.
    #[must_use]
    pub const fn id(&self) -> SimulationId {
        self.id
    }

    /// The system being simulated.
    #[must_use]
    pub fn system(&self) -> &Arc<TaxBenefitSystem> {
        &self.system
    }

    /// Validated run settings.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The person population.
    #[must_use]
    pub const fn persons(&self) -> &Population {
        &self.persons
    }

    /// The population of group entity `entity`.
    #[must_use]
    pub fn group(&self, entity: &str) -> Option<&GroupPopulation> {
        self.groups.get(entity)
    }

    /// Every group population.
    pub fn groups(&self) -> impl Iterator<Item = &GroupPopulation> {
        self.groups.values()
    }

    /// The calculation trace, when tracing is enabled.
    #[must_use]
    pub const fn tracer(&self) -> Option<&FullTracer> {
        self.tracer.as_ref()
    }

    /// Directory holding the disk tier, when one is configured.
    #[must_use]
    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    /// Population of entity `key`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::EntityNotFound` for an unknown entity.
    pub fn population(&self, key: &str) -> CalcResult<&Population> {
        if self.persons.entity().key == key {
            return Ok(&self.persons);
        }
        self.groups
            .get(key)
            .map(GroupPopulation::population)
            .ok_or_else(|| entity_not_found(key))
    }

    fn population_mut(&mut self, key: &str) -> CalcResult<&mut Population> {
        if self.persons.entity().key == key {
            return Ok(&mut self.persons);
        }
        self.groups
            .get_mut(key)
            .map(GroupPopulation::population_mut)
            .ok_or_else(|| entity_not_found(key))
    }

    pub(crate) fn group_population(&self, key: &str) -> CalcResult<&GroupPopulation> {
        self.groups.get(key).ok_or_else(|| {
            if self.persons.entity().key == key {
                ValidationError::NotAGroup {
                    entity: key.to_string(),
                }
                .into()
            } else {
                entity_not_found(key)
            }
        })
    }

    /// Population `variable` is defined for.
    ///
    /// # Errors
    ///
    /// Fails for an unknown variable.
    pub fn get_variable_population(&self, variable: &str) -> CalcResult<&Population> {
        let variable = self.system.variable(variable)?;
        self.population(variable.entity())
    }

    /// Normalizes a period argument, memoizing string parses.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError` for an input that names no period.
    pub fn resolve_period(&mut self, period: impl Into<PeriodInput>) -> CalcResult<Period> {
        Ok(self.periods.resolve(period)?)
    }

    fn new_context(&self) -> EvalContext {
        EvalContext::new(self.config.max_spiral_loops)
    }

    /// Computes `variable` for `period`, or returns its cached value.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables, periods inconsistent with the variable's
    /// definition period, circular definitions and formula errors.
    pub fn calculate(&mut self, variable: &str, period: impl Into<PeriodInput>) -> CalcResult<Array> {
        let period = self.resolve_period(period)?;
        let _span = debug_span!("calculate", variable = %variable, period = %period).entered();
        let mut ctx = self.new_context();
        self.calculate_in(&mut ctx, variable, period)
    }

    /// Sums `variable` over the subperiods of `period` matching its
    /// definition period.
    ///
    /// # Errors
    ///
    /// Fails for eternal variables and for periods finer than the
    /// variable's definition period, plus the errors of
    /// [`Simulation::calculate`].
    pub fn calculate_add(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        let period = self.resolve_period(period)?;
        let _span = debug_span!("calculate_add", variable = %variable, period = %period).entered();
        let mut ctx = self.new_context();
        self.calculate_add_in(&mut ctx, variable, period)
    }

    /// Estimates a yearly `variable` over a month (a twelfth of the yearly
    /// value) or a year.
    ///
    /// # Errors
    ///
    /// Fails for non-yearly variables and for periods other than one month
    /// or one year, plus the errors of [`Simulation::calculate`].
    pub fn calculate_divide(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        let period = self.resolve_period(period)?;
        let _span =
            debug_span!("calculate_divide", variable = %variable, period = %period).entered();
        let mut ctx = self.new_context();
        self.calculate_divide_in(&mut ctx, variable, period)
    }

    /// Computes `variable` with the output strategy it declares: add,
    /// divide, or a plain calculation.
    ///
    /// # Errors
    ///
    /// Same as the strategy used.
    pub fn calculate_output(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        match self.system.variable(variable)?.calculate_output() {
            Some(OutputStrategy::Add) => self.calculate_add(variable, period),
            Some(OutputStrategy::Divide) => self.calculate_divide(variable, period),
            None => self.calculate(variable, period),
        }
    }

    pub(crate) fn calculate_in(
        &mut self,
        ctx: &mut EvalContext,
        name: &str,
        period: Period,
    ) -> CalcResult<Array> {
        if let Some(tracer) = &mut self.tracer {
            tracer.record_calculation_start(name, &period);
        }
        ctx.push(name, period);
        let result = self.calculate_frame(ctx, name, &period);
        ctx.pop();
        if let Some(tracer) = &mut self.tracer {
            if let Ok(value) = &result {
                tracer.record_calculation_result(value);
            }
            tracer.record_calculation_end();
        }
        if ctx.is_empty() {
            if let Err(err) = self.purge_invalidated(ctx) {
                if result.is_ok() {
                    return Err(err);
                }
                warn!(error = %err, "failed to purge invalidated cache entries");
            }
        }
        result
    }

    fn calculate_frame(
        &mut self,
        ctx: &mut EvalContext,
        name: &str,
        period: &Period,
    ) -> CalcResult<Array> {
        let variable = self.system.variable(name)?;
        check_period_consistency(&variable, period)?;
        if let Some(cached) = self.get_holder(name)?.get_array(period)? {
            return Ok(cached);
        }

        match ctx.check_for_cycle(name, period) {
            Ok(()) => {}
            Err(err) if err.is_spiral() => {
                warn!(
                    variable = %name,
                    period = %period,
                    error = %err,
                    "quasicircular definition: using the default value"
                );
                return Ok(self.get_holder(name)?.default_array());
            }
            Err(err) => return Err(err),
        }

        let array = match self.run_formula(ctx, &variable, period)? {
            Some(array) => array,
            None => self.fallback_value(&variable, period)?,
        };
        let array = self.cast_result(&variable, array)?;
        self.get_holder(name)?.put_in_cache(array.clone(), period)?;
        Ok(array)
    }

    fn run_formula(
        &mut self,
        ctx: &mut EvalContext,
        variable: &Arc<Variable>,
        period: &Period,
    ) -> CalcResult<Option<Array>> {
        let Some(formula) = variable.get_formula(Some(period)) else {
            return Ok(None);
        };
        let parameters = self.system.parameters().clone();
        debug!(variable = %variable.name(), period = %period, "running formula");
        let array = {
            let mut scope = Scope::new(self, ctx, variable.entity());
            formula(&mut scope, period, &parameters)?
        };

        let Some(mask_variable) = variable.defined_for() else {
            return Ok(Some(array));
        };
        let array = self.cast_result(variable, array)?;
        let mask = self.defined_for_mask(ctx, variable, mask_variable, period)?;
        let default = variable.default_array(array.len());
        Ok(Some(array.select(&mask, &default)?))
    }

    fn defined_for_mask(
        &mut self,
        ctx: &mut EvalContext,
        variable: &Variable,
        mask_variable: &str,
        period: &Period,
    ) -> CalcResult<Vec<bool>> {
        let mask_entity = self.system.variable(mask_variable)?.entity().to_string();
        let values = self.calculate_in(ctx, mask_variable, *period)?;
        let values = if mask_entity == variable.entity() {
            values
        } else {
            self.project_between(&mask_entity, variable.entity(), &values)?
        };
        values.truthiness()
    }

    /// Re-expresses an array of entity `from` for entity `to`.
    ///
    /// Group values are broadcast to members, person values are reduced
    /// with `any`, and group values reach nested groups through their
    /// containing entity.
    pub(crate) fn project_between(&self, from: &str, to: &str, values: &Array) -> CalcResult<Array> {
        let person = self.persons.entity().key.as_str();
        if to == person {
            return self.group_population(from)?.project(values, None);
        }
        if from == person {
            return self.group_population(to)?.any(values, None);
        }
        self.group_population(to)?
            .project_from(self.group_population(from)?, values)
    }

    fn fallback_value(&mut self, variable: &Variable, period: &Period) -> CalcResult<Array> {
        let carry_over = self.system.auto_carry_over_input_variables()
            && variable.calculate_output().is_none();
        let holder = self.get_holder(variable.name())?;
        if carry_over {
            if let Some(known) = holder.latest_known_period(period) {
                if let Some(array) = holder.get_array(&known)? {
                    debug!(
                        variable = %variable.name(),
                        period = %period,
                        from = %known,
                        "carrying over the latest known value"
                    );
                    return Ok(array);
                }
            }
        }
        Ok(holder.default_array())
    }

    fn cast_result(&self, variable: &Variable, array: Array) -> CalcResult<Array> {
        let population = self.population(variable.entity())?;
        if array.len() != population.count() {
            return Err(ValidationError::LengthMismatch {
                variable: variable.name().to_string(),
                entity_plural: population.entity().plural.clone(),
                expected: population.count(),
                actual: array.len(),
            }
            .into());
        }
        Ok(array.cast(
            variable.name(),
            variable.value_type(),
            variable.possible_values(),
        )?)
    }

    pub(crate) fn calculate_add_in(
        &mut self,
        ctx: &mut EvalContext,
        name: &str,
        period: Period,
    ) -> CalcResult<Array> {
        let variable = self.system.variable(name)?;
        let definition_period = variable.definition_period();
        if definition_period == DateUnit::Eternity {
            return Err(invalid_period(
                name,
                period,
                format!("eternal variables can't be summed over time, use calculate for \"{name}\""),
            ));
        }
        if period.unit().weight() < definition_period.weight() {
            return Err(invalid_period(
                name,
                period,
                format!(
                    "\"{name}\" can only be computed for {definition_period}-long periods. You \
                     can use the DIVIDE option to get an estimate of \"{name}\"."
                ),
            ));
        }
        let mut total: Option<Array> = None;
        for subperiod in period.subperiods(definition_period)? {
            let value = self.calculate_in(ctx, name, subperiod)?;
            total = Some(match total {
                Some(total) => total.add(&value)?,
                None => value,
            });
        }
        total.ok_or_else(|| CalcError::internal(format!("period {period} has no subperiods")))
    }

    pub(crate) fn calculate_divide_in(
        &mut self,
        ctx: &mut EvalContext,
        name: &str,
        period: Period,
    ) -> CalcResult<Array> {
        let variable = self.system.variable(name)?;
        if variable.definition_period() != DateUnit::Year {
            return Err(invalid_period(
                name,
                period,
                "only variables defined yearly can be divided over time".to_string(),
            ));
        }
        if period.size() != 1 {
            return Err(invalid_period(
                name,
                period,
                "the DIVIDE option can only be used for a one-year or a one-month requested period"
                    .to_string(),
            ));
        }
        match period.unit() {
            DateUnit::Month => self
                .calculate_in(ctx, name, period.this_year())?
                .div_scalar(12.0),
            DateUnit::Year => self.calculate_in(ctx, name, period),
            _ => Err(invalid_period(
                name,
                period,
                format!("unable to divide the value of \"{name}\" to match this period"),
            )),
        }
    }

    /// Records an input value for `period`.
    ///
    /// Inputs for periods starting after the variable's end date are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables and for the reasons given in
    /// [`Holder::set_input`].
    pub fn set_input(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
        value: impl Into<Array>,
    ) -> CalcResult<()> {
        let period = self.resolve_period(period)?;
        if let Some(end) = self.system.variable(variable)?.end() {
            if period.start() > end {
                debug!(variable = %variable, period = %period, "ignoring input past the variable's end");
                return Ok(());
            }
        }
        self.get_holder(variable)?.set_input(&period, value.into())
    }

    /// Value stored for exactly `period`, without computing anything.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables and storage errors.
    pub fn get_array(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Option<Array>> {
        let period = self.resolve_period(period)?;
        self.get_holder(variable)?.get_array(&period)
    }

    /// Periods for which `variable` has a stored value.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables.
    pub fn get_known_periods(&mut self, variable: &str) -> CalcResult<Vec<Period>> {
        Ok(self.get_holder(variable)?.get_known_periods())
    }

    /// Removes the stored values of `variable`, all of them or those within
    /// `period`.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables and storage errors.
    pub fn delete_arrays(&mut self, variable: &str, period: Option<&Period>) -> CalcResult<()> {
        self.get_holder(variable)?.delete_arrays(period)
    }

    /// Holder of `variable`, created on first use.
    ///
    /// # Errors
    ///
    /// Fails for unknown variables or entities, and when the disk tier
    /// directory cannot be created.
    pub fn get_holder(&mut self, variable: &str) -> CalcResult<&mut Holder> {
        let definition = self.system.variable(variable)?;
        let entity = definition.entity();
        if self.population(entity)?.get_holder(variable).is_none() {
            let holder = self.new_holder(&definition)?;
            self.population_mut(entity)?.insert_holder(holder);
        }
        self.population_mut(entity)?
            .get_holder_mut(variable)
            .ok_or_else(|| CalcError::internal(format!("holder for '{variable}' vanished")))
    }

    fn new_holder(&self, variable: &Arc<Variable>) -> CalcResult<Holder> {
        let population = self.population(variable.entity())?;
        let name = variable.name();
        let mut holder = Holder::new(
            Arc::clone(variable),
            population.count(),
            population.entity().plural.clone(),
        )
        .with_opt_out_cache(self.config.opt_out_cache && self.system.is_blacklisted(name));

        let (Some(memory), Some(root)) = (&self.config.memory, &self.storage_root) else {
            return Ok(holder);
        };
        holder = holder.with_do_not_store(memory.variables_to_drop.contains(name));
        if memory.priority_variables.contains(name) {
            return Ok(holder);
        }
        let directory = root.join(name);
        let existed = directory.is_dir();
        let mut storage = OnDiskStorage::new(
            &directory,
            variable.is_eternal(),
            self.config.preserve_storage_dir,
        )?;
        if existed {
            let restored = storage.restore()?;
            debug!(variable = %name, restored, "restored arrays from disk");
        }
        Ok(holder.with_disk_storage(
            storage,
            Arc::clone(&self.pressure),
            memory.max_memory_occupation,
        ))
    }

    /// Marks the cached value of `variable` for `period` for removal at the
    /// end of the current (or next) top-level calculation.
    pub fn invalidate_cache_entry(&mut self, variable: &str, period: Period) {
        self.pending_invalidations.insert(Frame {
            name: variable.to_string(),
            period,
        });
    }

    /// Removes every cached value marked invalid so far.
    ///
    /// # Errors
    ///
    /// Fails for storage errors.
    pub fn purge_cache_of_invalid_values(&mut self) -> CalcResult<()> {
        let mut ctx = self.new_context();
        self.purge_invalidated(&mut ctx)
    }

    fn purge_invalidated(&mut self, ctx: &mut EvalContext) -> CalcResult<()> {
        let mut frames = ctx.take_invalidated();
        frames.append(&mut self.pending_invalidations);
        if frames.is_empty() {
            return Ok(());
        }
        debug!(count = frames.len(), "purging invalidated cache entries");
        for frame in frames {
            self.get_holder(&frame.name)?
                .delete_arrays(Some(&frame.period))?;
        }
        Ok(())
    }

    /// Footprint of the holders of `variables`, or of every holder.
    #[must_use]
    pub fn get_memory_usage(&self, variables: Option<&[&str]>) -> SimulationMemoryUsage {
        let mut usage = SimulationMemoryUsage::default();
        let holders = self
            .persons
            .holders()
            .chain(self.groups.values().flat_map(|g| g.population().holders()));
        for holder in holders {
            let name = holder.variable().name();
            if variables.is_some_and(|wanted| !wanted.contains(&name)) {
                continue;
            }
            let mut holder_usage = holder.get_memory_usage();
            holder_usage.nb_requests = self.tracer.as_ref().map(|t| t.nb_requests(name));
            usage.total_nb_bytes += holder_usage.total_nb_bytes;
            usage.by_variable.insert(name.to_string(), holder_usage);
        }
        usage
    }
}

fn entity_not_found(key: &str) -> CalcError {
    ExecutionError::EntityNotFound {
        key: key.to_string(),
    }
    .into()
}

fn invalid_period(variable: &str, period: Period, reason: String) -> CalcError {
    ValidationError::InvalidCalculationPeriod {
        variable: variable.to_string(),
        period,
        reason,
    }
    .into()
}

fn check_period_consistency(variable: &Variable, period: &Period) -> CalcResult<()> {
    let definition_period = variable.definition_period();
    if definition_period == DateUnit::Eternity {
        return Ok(());
    }
    let name = variable.name();
    if period.unit() != definition_period {
        let hint = match definition_period {
            DateUnit::Year => format!(
                "You can use the DIVIDE option to get an estimate of \"{name}\" by dividing the \
                 yearly value by 12, or change the requested period to \"period.this_year\"."
            ),
            DateUnit::Month => format!(
                "You can use the ADD option to sum \"{name}\" over the requested period, or \
                 change the requested period to \"period.first_month\"."
            ),
            _ => format!(
                "You can use the ADD option to sum \"{name}\" over the requested period, or \
                 change the requested period to \"period.first_day\"."
            ),
        };
        return Err(invalid_period(
            name,
            *period,
            format!("\"{name}\" must be computed for a whole {definition_period}. {hint}"),
        ));
    }
    if period.size() != 1 {
        return Err(invalid_period(
            name,
            *period,
            format!(
                "\"{name}\" must be computed for a whole {definition_period}. You can use the \
                 ADD option to sum \"{name}\" over the requested period."
            ),
        ));
    }
    Ok(())
}
