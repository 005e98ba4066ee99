//! The view of a simulation a formula runs against.

use crate::error::{CalcResult, ExecutionError, ValidationError};
use crate::population::GroupPopulation;
use crate::time::{Period, PeriodInput};
use crate::value::{Array, Scalar};

use super::{EvalContext, Simulation};

/// A simulation bound to the population a formula computes for.
///
/// Calculations requested through a scope join the call stack of the
/// calculation that runs the formula, so cycles through them are detected.
pub struct Scope<'a> {
    sim: &'a mut Simulation,
    ctx: &'a mut EvalContext,
    entity: String,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, ctx: &'a mut EvalContext, entity: &str) -> Self {
        Self {
            sim,
            ctx,
            entity: entity.to_string(),
        }
    }

    /// Key of the entity this scope computes for.
    #[must_use]
    pub fn entity_key(&self) -> &str {
        &self.entity
    }

    /// Number of instances in the population.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sim.population(&self.entity).map_or(0, |p| p.count())
    }

    /// Identifiers of the entity members the formula runs over.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        self.sim
            .population(&self.entity)
            .map(|p| p.ids())
            .unwrap_or_default()
    }

    /// An array holding `value` for every instance.
    #[must_use]
    pub fn filled(&self, value: impl Into<Scalar>) -> Array {
        Array::filled(&value.into(), self.count())
    }

    /// Current depth of the call stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ctx.depth()
    }

    fn check_entity(&self, variable: &str, requested_for: &str) -> CalcResult<()> {
        let defined_for = self.sim.system().variable(variable)?.entity().to_string();
        if defined_for != requested_for {
            return Err(ExecutionError::EntityMismatch {
                variable: variable.to_string(),
                expected: defined_for,
                actual: requested_for.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn own_group(&self) -> CalcResult<&GroupPopulation> {
        self.sim.group_population(&self.entity)
    }

    fn check_person_scope(&self) -> CalcResult<()> {
        if self.sim.persons().entity().key != self.entity {
            return Err(ValidationError::InvalidSimulation {
                reason: format!("'{}' is not the person entity", self.entity),
            }
            .into());
        }
        Ok(())
    }

    /// Computes a variable of this scope's entity.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::EntityMismatch` for a variable of another
    /// entity, plus the errors of [`Simulation::calculate`].
    pub fn calculate(&mut self, variable: &str, period: impl Into<PeriodInput>) -> CalcResult<Array> {
        self.check_entity(variable, &self.entity)?;
        let period = self.sim.resolve_period(period)?;
        self.sim.calculate_in(self.ctx, variable, period)
    }

    /// Sums a variable of this scope's entity over `period`.
    ///
    /// # Errors
    ///
    /// Same as [`Simulation::calculate_add`].
    pub fn calculate_add(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        self.check_entity(variable, &self.entity)?;
        let period = self.sim.resolve_period(period)?;
        self.sim.calculate_add_in(self.ctx, variable, period)
    }

    /// Divides a yearly variable of this scope's entity.
    ///
    /// # Errors
    ///
    /// Same as [`Simulation::calculate_divide`].
    pub fn calculate_divide(
        &mut self,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        self.check_entity(variable, &self.entity)?;
        let period = self.sim.resolve_period(period)?;
        self.sim.calculate_divide_in(self.ctx, variable, period)
    }

    /// Marks a cached value for removal once the top-level calculation ends.
    pub fn invalidate_cache_entry(&mut self, variable: &str, period: Period) {
        self.ctx.invalidate(variable, period);
    }

    /// Computes a person variable for every member of this group scope.
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group or `variable` is not a person
    /// variable.
    pub fn members(&mut self, variable: &str, period: impl Into<PeriodInput>) -> CalcResult<Array> {
        self.own_group()?;
        let person = self.sim.persons().entity().key.clone();
        self.check_entity(variable, &person)?;
        let period = self.sim.resolve_period(period)?;
        self.sim.calculate_in(self.ctx, variable, period)
    }

    /// See [`GroupPopulation::sum`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group, and for the reasons given
    /// there.
    pub fn sum(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.sum(array, role)
    }

    /// See [`GroupPopulation::any`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn any(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.any(array, role)
    }

    /// See [`GroupPopulation::all`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn all(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.all(array, role)
    }

    /// See [`GroupPopulation::max`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn max(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.max(array, role)
    }

    /// See [`GroupPopulation::min`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn min(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.min(array, role)
    }

    /// See [`GroupPopulation::nb_persons`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn nb_persons(&self, role: Option<&str>) -> CalcResult<Array> {
        self.own_group()?.nb_persons(role)
    }

    /// See [`GroupPopulation::value_nth_person`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn value_nth_person(&self, n: usize, array: &Array, default: &Scalar) -> CalcResult<Array> {
        self.own_group()?.value_nth_person(n, array, default)
    }

    /// See [`GroupPopulation::value_from_person`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn value_from_person(&self, array: &Array, role: &str, default: &Scalar) -> CalcResult<Array> {
        self.own_group()?.value_from_person(array, role, default)
    }

    /// See [`GroupPopulation::value_from_first_person`].
    ///
    /// # Errors
    ///
    /// Fails when this scope is not a group.
    pub fn value_from_first_person(&self, array: &Array) -> CalcResult<Array> {
        self.own_group()?.value_from_first_person(array)
    }

    /// Broadcasts an array of `group` to the persons of this person scope.
    ///
    /// # Errors
    ///
    /// Fails when this scope is not the person scope or `group` is unknown.
    pub fn project(&self, group: &str, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.check_person_scope()?;
        self.sim.group_population(group)?.project(array, role)
    }

    /// Computes a variable of `group` and broadcasts it to the persons of
    /// this person scope.
    ///
    /// # Errors
    ///
    /// Fails when this scope is not the person scope, plus the errors of
    /// [`Simulation::calculate`].
    pub fn group_value(
        &mut self,
        group: &str,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        self.check_person_scope()?;
        self.check_entity(variable, group)?;
        let period = self.sim.resolve_period(period)?;
        let values = self.sim.calculate_in(self.ctx, variable, period)?;
        self.sim.group_population(group)?.project(&values, None)
    }

    /// Computes a variable of `container`, a group entity this group is
    /// nested within, and projects it onto this group scope.
    ///
    /// # Errors
    ///
    /// Fails when `container` does not contain this scope's entity, plus
    /// the errors of [`Simulation::calculate`].
    pub fn containing_value(
        &mut self,
        container: &str,
        variable: &str,
        period: impl Into<PeriodInput>,
    ) -> CalcResult<Array> {
        self.check_entity(variable, container)?;
        let period = self.sim.resolve_period(period)?;
        let values = self.sim.calculate_in(self.ctx, variable, period)?;
        self.sim.project_between(container, &self.entity, &values)
    }

    /// For every person, whether they hold `role` in `group`.
    ///
    /// # Errors
    ///
    /// Fails when this scope is not the person scope, `group` is unknown
    /// or `role` is not one of its roles.
    pub fn has_role(&self, group: &str, role: &str) -> CalcResult<Array> {
        self.check_person_scope()?;
        self.sim
            .persons()
            .has_role(self.sim.group_population(group)?, role)
    }

    /// See [`Population::get_rank`](crate::population::Population::get_rank).
    ///
    /// # Errors
    ///
    /// Fails when this scope is not the person scope or `group` is unknown.
    pub fn rank(&self, group: &str, criteria: &Array, condition: &Array) -> CalcResult<Array> {
        self.check_person_scope()?;
        self.sim
            .persons()
            .get_rank(self.sim.group_population(group)?, criteria, condition)
    }
}
