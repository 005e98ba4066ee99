//! Runtime populations and the operators between groups and their members.
//!
//! A [`Population`] is the set of instances of one entity in a simulation,
//! along with the holders caching that entity's variables. A
//! [`GroupPopulation`] adds the membership tables linking every person to
//! the group it belongs to and the role it holds there.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::entity::{Entity, Role};
use crate::error::{CalcResult, ExecutionError, ValidationError};
use crate::holder::Holder;
use crate::value::{Array, Scalar};

fn check_len(array: &Array, expected: usize) -> CalcResult<()> {
    if array.len() != expected {
        return Err(ValidationError::ShapeMismatch {
            left: array.len(),
            right: expected,
        }
        .into());
    }
    Ok(())
}

/// The instances of one entity.
#[derive(Debug)]
pub struct Population {
    entity: Arc<Entity>,
    ids: Vec<String>,
    holders: HashMap<String, Holder>,
}

impl Population {
    /// Creates a population with one instance per id.
    #[must_use]
    pub fn new(entity: Arc<Entity>, ids: Vec<String>) -> Self {
        Self {
            entity,
            ids,
            holders: HashMap::new(),
        }
    }

    /// Creates `count` instances identified by their index.
    #[must_use]
    pub fn with_count(entity: Arc<Entity>, count: usize) -> Self {
        Self::new(entity, (0..count).map(|i| i.to_string()).collect())
    }

    /// The entity every member belongs to.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Member identifiers, in array order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// An array holding `value` for every instance.
    #[must_use]
    pub fn filled_array(&self, value: impl Into<Scalar>) -> Array {
        Array::filled(&value.into(), self.count())
    }

    /// The holder of `variable`, if one was created.
    #[must_use]
    pub fn get_holder(&self, variable: &str) -> Option<&Holder> {
        self.holders.get(variable)
    }

    /// Mutable form of [`Population::get_holder`].
    pub fn get_holder_mut(&mut self, variable: &str) -> Option<&mut Holder> {
        self.holders.get_mut(variable)
    }

    /// Registers `holder` under its variable name, replacing any previous one.
    pub fn insert_holder(&mut self, holder: Holder) -> &mut Holder {
        match self.holders.entry(holder.variable().name().to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(holder);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(holder),
        }
    }

    /// Every holder created so far.
    pub fn holders(&self) -> impl Iterator<Item = &Holder> {
        self.holders.values()
    }

    /// For every person, whether they hold `role` (or one of its subroles) in
    /// `group`.
    ///
    /// # Errors
    ///
    /// Fails when this is not the person population of `group`, or when
    /// `role` is unknown to the group entity.
    pub fn has_role(&self, group: &GroupPopulation, role: &str) -> CalcResult<Array> {
        self.check_members_of(group)?;
        Ok(Array::Bool(group.role_mask(role)?))
    }

    /// Rank of every person inside their `group` by ascending `criteria`.
    ///
    /// Only persons satisfying `condition` are ranked; the others get `-1`.
    /// Ties keep the order of arrival in the group.
    ///
    /// # Errors
    ///
    /// Fails when the arrays do not have one cell per person, or when
    /// `criteria` is not numeric.
    pub fn get_rank(
        &self,
        group: &GroupPopulation,
        criteria: &Array,
        condition: &Array,
    ) -> CalcResult<Array> {
        self.check_members_of(group)?;
        check_len(criteria, self.count())?;
        check_len(condition, self.count())?;
        let criteria = criteria.to_floats()?;
        let condition = condition.truthiness()?;

        let mut by_group: Vec<Vec<usize>> = vec![Vec::new(); group.count()];
        for (person, &g) in group.members_entity_id().iter().enumerate() {
            if condition[person] {
                by_group[g].push(person);
            }
        }
        let mut ranks = vec![-1_i64; self.count()];
        for mut members in by_group {
            members.sort_by(|&a, &b| criteria[a].total_cmp(&criteria[b]));
            for (rank, person) in members.into_iter().enumerate() {
                ranks[person] = i64::try_from(rank).unwrap_or(i64::MAX);
            }
        }
        Ok(Array::Int(ranks))
    }

    fn check_members_of(&self, group: &GroupPopulation) -> CalcResult<()> {
        if !self.entity.is_person || group.nb_members() != self.count() {
            return Err(ValidationError::InvalidSimulation {
                reason: format!(
                    "'{}' are not the members of '{}'",
                    self.entity.plural,
                    group.entity().plural
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// A population of groups, with the membership of every person.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use microsim::{Array, Entity, Role};
/// use microsim::population::GroupPopulation;
///
/// let household = Arc::new(Entity::group(
///     "household",
///     "households",
///     vec![Role::new("parent").with_max(2), Role::new("child")],
/// ));
/// let households = GroupPopulation::new(
///     household,
///     vec!["h1".into(), "h2".into()],
///     vec![0, 0, 1],
///     vec!["parent".into(), "child".into(), "parent".into()],
/// )
/// .unwrap();
///
/// let salaries = Array::from(vec![1000.0, 300.0, 2000.0]);
/// assert_eq!(households.sum(&salaries, None).unwrap(), Array::from(vec![1300.0, 2000.0]));
/// assert_eq!(
///     households.sum(&salaries, Some("child")).unwrap(),
///     Array::from(vec![300.0, 0.0])
/// );
/// ```
#[derive(Debug)]
pub struct GroupPopulation {
    population: Population,
    members_entity_id: Vec<usize>,
    members_role: Vec<String>,
    members_position: OnceLock<Vec<usize>>,
}

impl GroupPopulation {
    /// Creates a group population.
    ///
    /// `members_entity_id[p]` is the index of the group person `p` belongs to
    /// and `members_role[p]` the role (or subrole) key they hold there.
    ///
    /// # Errors
    ///
    /// Fails when `entity` is not a group, the membership tables differ in
    /// length, a group index is out of range, a role is unknown, or a role
    /// holds more persons than its maximum.
    pub fn new(
        entity: Arc<Entity>,
        ids: Vec<String>,
        members_entity_id: Vec<usize>,
        members_role: Vec<String>,
    ) -> Result<Self, ValidationError> {
        if entity.is_person {
            return Err(ValidationError::NotAGroup {
                entity: entity.key.clone(),
            });
        }
        let invalid = |reason: String| ValidationError::InvalidSimulation { reason };
        if members_entity_id.len() != members_role.len() {
            return Err(invalid(format!(
                "'{}' has {} group indices but {} roles",
                entity.plural,
                members_entity_id.len(),
                members_role.len()
            )));
        }
        if let Some(&g) = members_entity_id.iter().find(|&&g| g >= ids.len()) {
            return Err(invalid(format!(
                "group index {g} is out of range for {} '{}'",
                ids.len(),
                entity.plural
            )));
        }
        if let Some(role) = members_role.iter().find(|r| !entity.knows_role(r)) {
            return Err(ValidationError::InvalidRole {
                entity: entity.key.clone(),
                role: role.clone(),
            });
        }

        let mut holders_by_role: HashMap<(usize, &str), usize> = HashMap::new();
        for (&g, held) in members_entity_id.iter().zip(&members_role) {
            let Some(role) = entity.roles.iter().find(|r| r.matches(held)) else {
                continue;
            };
            *holders_by_role.entry((g, role.key.as_str())).or_default() += 1;
            if held != &role.key {
                *holders_by_role.entry((g, held.as_str())).or_default() += 1;
            }
        }
        for ((g, key), count) in holders_by_role {
            let max = match entity.role(key) {
                Some(role) => role.max,
                None => Some(1),
            };
            if max.is_some_and(|max| count > max) {
                return Err(invalid(format!(
                    "{} '{}' holds {count} persons in role '{key}', more than allowed",
                    entity.key, ids[g]
                )));
            }
        }

        Ok(Self {
            population: Population::new(entity, ids),
            members_entity_id,
            members_role,
            members_position: OnceLock::new(),
        })
    }

    /// The group entity.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        self.population.entity()
    }

    /// Number of groups.
    #[must_use]
    pub fn count(&self) -> usize {
        self.population.count()
    }

    /// Number of persons across all groups.
    #[must_use]
    pub fn nb_members(&self) -> usize {
        self.members_entity_id.len()
    }

    /// The group-level population: ids and holders of the groups.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Mutable form of [`GroupPopulation::population`].
    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    /// Group index of every person.
    #[must_use]
    pub fn members_entity_id(&self) -> &[usize] {
        &self.members_entity_id
    }

    /// Role (or subrole) key of every person.
    #[must_use]
    pub fn members_role(&self) -> &[String] {
        &self.members_role
    }

    /// Position of every person within their group, in order of arrival.
    pub fn members_position(&self) -> &[usize] {
        self.members_position.get_or_init(|| {
            let mut seen = vec![0_usize; self.count()];
            self.members_entity_id
                .iter()
                .map(|&g| {
                    let position = seen[g];
                    seen[g] += 1;
                    position
                })
                .collect()
        })
    }

    fn resolve_role(&self, role: &str) -> CalcResult<Option<&Role>> {
        let entity = self.entity();
        if let Some(declared) = entity.role(role) {
            return Ok(Some(declared));
        }
        if entity.knows_role(role) {
            return Ok(None);
        }
        Err(ValidationError::InvalidRole {
            entity: entity.key.clone(),
            role: role.to_string(),
        }
        .into())
    }

    /// For every person, whether they hold `role` or one of its subroles.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRole` for an unknown role.
    pub fn role_mask(&self, role: &str) -> CalcResult<Vec<bool>> {
        Ok(match self.resolve_role(role)? {
            Some(declared) => self.members_role.iter().map(|h| declared.matches(h)).collect(),
            None => self.members_role.iter().map(|h| h == role).collect(),
        })
    }

    fn optional_mask(&self, role: Option<&str>) -> CalcResult<Option<Vec<bool>>> {
        role.map(|r| self.role_mask(r)).transpose()
    }

    fn check_members_array(&self, array: &Array) -> CalcResult<()> {
        check_len(array, self.nb_members())
    }

    fn check_group_array(&self, array: &Array) -> CalcResult<()> {
        check_len(array, self.count())
    }

    /// Per-group sum of person-level values. Persons not holding `role` add
    /// nothing.
    ///
    /// Float arrays sum to floats; int and bool arrays sum to ints.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch, an unknown role or non-numeric values.
    pub fn sum(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.check_members_array(array)?;
        let mask = self.optional_mask(role)?;
        let keep = |person: usize| mask.as_ref().map_or(true, |m| m[person]);
        if let Array::Float(values) = array {
            let mut totals = vec![0.0; self.count()];
            for (person, (&g, &v)) in self.members_entity_id.iter().zip(values).enumerate() {
                if keep(person) {
                    totals[g] += v;
                }
            }
            return Ok(Array::Float(totals));
        }
        let values: Vec<i64> = match array {
            Array::Int(values) => values.clone(),
            Array::Bool(values) => values.iter().map(|&v| i64::from(v)).collect(),
            other => {
                return Err(ValidationError::UnsupportedOperation {
                    operation: "sum",
                    left: other.value_type().name(),
                    right: "int",
                }
                .into())
            }
        };
        let mut totals = vec![0_i64; self.count()];
        for (person, (&g, &v)) in self.members_entity_id.iter().zip(&values).enumerate() {
            if keep(person) {
                totals[g] = totals[g].checked_add(v).ok_or_else(|| ExecutionError::Overflow {
                    operation: "sum",
                    entity: self.entity().plural.clone(),
                })?;
            }
        }
        Ok(Array::Int(totals))
    }

    /// Per-group logical OR.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch, an unknown role or date values.
    pub fn any(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.fold_bools(array, role, false, |acc, v| acc || v)
    }

    /// Per-group logical AND. Groups without matching members are `true`.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch, an unknown role or date values.
    pub fn all(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.fold_bools(array, role, true, |acc, v| acc && v)
    }

    fn fold_bools(
        &self,
        array: &Array,
        role: Option<&str>,
        neutral: bool,
        reducer: impl Fn(bool, bool) -> bool,
    ) -> CalcResult<Array> {
        self.check_members_array(array)?;
        let mask = self.optional_mask(role)?;
        let values = array.truthiness()?;
        let mut result = vec![neutral; self.count()];
        for (person, (&g, &v)) in self.members_entity_id.iter().zip(&values).enumerate() {
            if mask.as_ref().map_or(true, |m| m[person]) {
                result[g] = reducer(result[g], v);
            }
        }
        Ok(Array::Bool(result))
    }

    /// Folds the numeric values of every group's members with `reducer`,
    /// starting from `neutral`.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch, an unknown role or non-numeric values.
    pub fn reduce(
        &self,
        array: &Array,
        role: Option<&str>,
        neutral: f64,
        reducer: impl Fn(f64, f64) -> f64,
    ) -> CalcResult<Array> {
        self.check_members_array(array)?;
        let mask = self.optional_mask(role)?;
        let values = array.to_floats()?;
        let mut result = vec![neutral; self.count()];
        for (person, (&g, &v)) in self.members_entity_id.iter().zip(&values).enumerate() {
            if mask.as_ref().map_or(true, |m| m[person]) {
                result[g] = reducer(result[g], v);
            }
        }
        Ok(Array::Float(result))
    }

    /// Per-group maximum. Groups without matching members get `-inf`
    /// (`i64::MIN` for int arrays).
    ///
    /// # Errors
    ///
    /// Same as [`GroupPopulation::reduce`].
    pub fn max(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        if let Array::Int(values) = array {
            return self.fold_ints(values, role, i64::MIN, i64::max);
        }
        self.reduce(array, role, f64::NEG_INFINITY, f64::max)
    }

    /// Per-group minimum. Groups without matching members get `+inf`
    /// (`i64::MAX` for int arrays).
    ///
    /// # Errors
    ///
    /// Same as [`GroupPopulation::reduce`].
    pub fn min(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        if let Array::Int(values) = array {
            return self.fold_ints(values, role, i64::MAX, i64::min);
        }
        self.reduce(array, role, f64::INFINITY, f64::min)
    }

    fn fold_ints(
        &self,
        values: &[i64],
        role: Option<&str>,
        neutral: i64,
        reducer: impl Fn(i64, i64) -> i64,
    ) -> CalcResult<Array> {
        if values.len() != self.nb_members() {
            return Err(ValidationError::ShapeMismatch {
                left: values.len(),
                right: self.nb_members(),
            }
            .into());
        }
        let mask = self.optional_mask(role)?;
        let mut result = vec![neutral; self.count()];
        for (person, (&g, &v)) in self.members_entity_id.iter().zip(values).enumerate() {
            if mask.as_ref().map_or(true, |m| m[person]) {
                result[g] = reducer(result[g], v);
            }
        }
        Ok(Array::Int(result))
    }

    /// Number of persons per group, optionally only those holding `role`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRole` for an unknown role.
    pub fn nb_persons(&self, role: Option<&str>) -> CalcResult<Array> {
        let ones = Array::Int(vec![1; self.nb_members()]);
        self.sum(&ones, role)
    }

    /// For every group, the value of its `n`-th member (0-based), or
    /// `default` for groups with fewer members.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch or when `default` cannot be cast to the
    /// type of `array`.
    pub fn value_nth_person(&self, n: usize, array: &Array, default: &Scalar) -> CalcResult<Array> {
        self.check_members_array(array)?;
        let default = default.cast("value_nth_person", array.value_type(), &[])?;
        let mut result = Array::filled(&default, self.count());
        let pairs: Vec<(usize, usize)> = self
            .members_position()
            .iter()
            .zip(&self.members_entity_id)
            .enumerate()
            .filter(|(_, (&position, _))| position == n)
            .map(|(person, (_, &g))| (person, g))
            .collect();
        result.assign_from(array, &pairs)?;
        Ok(result)
    }

    /// For every group, the value of its first member.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch.
    pub fn value_from_first_person(&self, array: &Array) -> CalcResult<Array> {
        self.value_nth_person(0, array, &array.value_type().default_scalar())
    }

    /// For every group, the value of the person holding the unique `role`,
    /// or `default` when nobody holds it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonUniqueRole` when `role` may be held by
    /// several persons, and fails on a length mismatch or an unknown role.
    pub fn value_from_person(&self, array: &Array, role: &str, default: &Scalar) -> CalcResult<Array> {
        self.check_members_array(array)?;
        if let Some(declared) = self.resolve_role(role)? {
            if declared.max != Some(1) {
                return Err(ValidationError::NonUniqueRole {
                    entity: self.entity().key.clone(),
                    role: role.to_string(),
                }
                .into());
            }
        }
        let mask = self.role_mask(role)?;
        let default = default.cast("value_from_person", array.value_type(), &[])?;
        let mut result = Array::filled(&default, self.count());
        let pairs: Vec<(usize, usize)> = self
            .members_entity_id
            .iter()
            .enumerate()
            .filter(|(person, _)| mask[*person])
            .map(|(person, &g)| (person, g))
            .collect();
        result.assign_from(array, &pairs)?;
        Ok(result)
    }

    /// Broadcasts a group-level array to every member. With `role`, persons
    /// not holding it receive the type's zero value.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch or an unknown role.
    pub fn project(&self, array: &Array, role: Option<&str>) -> CalcResult<Array> {
        self.check_group_array(array)?;
        let projected = array.gather(&self.members_entity_id);
        match self.optional_mask(role)? {
            None => Ok(projected),
            Some(mask) => {
                let zeros = Array::filled(&array.value_type().default_scalar(), projected.len());
                projected.select(&mask, &zeros)
            }
        }
    }

    /// Projects an array of `container`, a group entity every group of this
    /// population is nested within, onto this population. Each group takes
    /// the value of the container of its first member.
    ///
    /// # Errors
    ///
    /// Fails when `container` is not declared as a containing entity, or on
    /// a length mismatch.
    pub fn project_from(&self, container: &Self, array: &Array) -> CalcResult<Array> {
        let entity = self.entity();
        if !entity.containing_entities.contains(&container.entity().key) {
            return Err(ValidationError::InvalidEntity {
                key: entity.key.clone(),
                reason: format!("'{}' is not a containing entity", container.entity().key),
            }
            .into());
        }
        if container.nb_members() != self.nb_members() {
            return Err(ValidationError::ShapeMismatch {
                left: container.nb_members(),
                right: self.nb_members(),
            }
            .into());
        }
        let per_person = container.project(array, None)?;
        self.value_from_first_person(&per_person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn household() -> Arc<Entity> {
        Arc::new(
            Entity::group(
                "household",
                "households",
                vec![
                    Role::new("parent")
                        .with_max(2)
                        .with_subroles(["first_parent", "second_parent"]),
                    Role::new("child"),
                ],
            )
            .with_containing_entities(["district"]),
        )
    }

    fn district() -> Arc<Entity> {
        Arc::new(Entity::group("district", "districts", vec![Role::new("resident")]))
    }

    /// Two households: persons 0, 1, 3 in the first, 2 and 4 in the second.
    fn households() -> GroupPopulation {
        GroupPopulation::new(
            household(),
            vec!["h1".into(), "h2".into()],
            vec![0, 0, 1, 0, 1],
            vec![
                "first_parent".into(),
                "second_parent".into(),
                "first_parent".into(),
                "child".into(),
                "child".into(),
            ],
        )
        .unwrap()
    }

    fn persons() -> Population {
        Population::with_count(Arc::new(Entity::person("person", "persons")), 5)
    }

    #[test]
    fn test_construction_validates_membership() {
        let err = GroupPopulation::new(household(), vec!["h".into()], vec![0, 1], vec!["child".into(), "child".into()])
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = GroupPopulation::new(household(), vec!["h".into()], vec![0], vec!["cousin".into()])
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRole { .. }));

        let err = GroupPopulation::new(
            household(),
            vec!["h".into()],
            vec![0, 0, 0],
            vec!["parent".into(), "parent".into(), "parent".into()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than allowed"));

        let err = GroupPopulation::new(
            household(),
            vec!["h".into()],
            vec![0, 0],
            vec!["first_parent".into(), "first_parent".into()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("first_parent"));

        let person = Arc::new(Entity::person("person", "persons"));
        let err = GroupPopulation::new(person, vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::NotAGroup { .. }));
    }

    #[test]
    fn test_members_position_counts_arrivals() {
        assert_eq!(households().members_position(), &[0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_sum_by_role_and_type() {
        let households = households();
        let salaries = Array::from(vec![100.0, 200.0, 50.0, 10.0, 5.0]);
        assert_eq!(households.sum(&salaries, None).unwrap(), Array::from(vec![310.0, 55.0]));
        assert_eq!(
            households.sum(&salaries, Some("parent")).unwrap(),
            Array::from(vec![300.0, 50.0])
        );
        assert_eq!(
            households.sum(&salaries, Some("second_parent")).unwrap(),
            Array::from(vec![200.0, 0.0])
        );
        let flags = Array::from(vec![true, true, false, true, true]);
        assert_eq!(households.sum(&flags, None).unwrap(), Array::from(vec![3_i64, 1]));
        assert!(households.sum(&salaries, Some("grandparent")).is_err());
        assert!(households.sum(&Array::from(vec![1.0]), None).is_err());
    }

    #[test]
    fn test_any_all_max_min() {
        let households = households();
        let flags = Array::from(vec![true, false, false, false, false]);
        assert_eq!(households.any(&flags, None).unwrap(), Array::from(vec![true, false]));
        assert_eq!(households.all(&flags, None).unwrap(), Array::from(vec![false, false]));
        assert_eq!(
            households.all(&flags, Some("first_parent")).unwrap(),
            Array::from(vec![true, false])
        );

        let ages = Array::from(vec![40_i64, 38, 30, 12, 3]);
        assert_eq!(households.max(&ages, None).unwrap(), Array::from(vec![40_i64, 30]));
        assert_eq!(households.min(&ages, None).unwrap(), Array::from(vec![12_i64, 3]));
        let income = Array::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(
            households.max(&income, Some("second_parent")).unwrap(),
            Array::from(vec![2.0, f64::NEG_INFINITY])
        );
    }

    #[test]
    fn test_int_sum_overflow_is_an_error() {
        let households = households();
        let big = Array::from(vec![i64::MAX, 1, 0, 0, 0]);
        let err = households.sum(&big, None).unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("overflow"));
        assert_eq!(
            households.sum(&big, Some("first_parent")).unwrap(),
            Array::from(vec![i64::MAX, 0])
        );
    }

    #[test]
    fn test_int_max_min_keep_full_precision() {
        let households = households();
        let above = (1_i64 << 53) + 1;
        let values = Array::from(vec![above, 1 << 53, 7, above - 2, 9]);
        assert_eq!(households.max(&values, None).unwrap(), Array::from(vec![above, 9]));
        assert_eq!(households.min(&values, None).unwrap(), Array::from(vec![above - 2, 7]));
        assert_eq!(
            households.max(&values, Some("second_parent")).unwrap(),
            Array::from(vec![1 << 53, i64::MIN])
        );
        assert!(households.max(&Array::from(vec![1_i64]), None).is_err());
    }

    #[test]
    fn test_nb_persons() {
        let households = households();
        assert_eq!(households.nb_persons(None).unwrap(), Array::from(vec![3_i64, 2]));
        assert_eq!(households.nb_persons(Some("child")).unwrap(), Array::from(vec![1_i64, 1]));
    }

    #[test]
    fn test_value_nth_person_uses_default_for_small_groups() {
        let households = households();
        let ages = Array::from(vec![40_i64, 38, 30, 12, 3]);
        assert_eq!(
            households.value_nth_person(2, &ages, &Scalar::Int(-1)).unwrap(),
            Array::from(vec![12_i64, -1])
        );
        assert_eq!(
            households.value_from_first_person(&ages).unwrap(),
            Array::from(vec![40_i64, 30])
        );
    }

    #[test]
    fn test_value_from_person_requires_unique_role() {
        let households = households();
        let ages = Array::from(vec![40_i64, 38, 30, 12, 3]);
        assert_eq!(
            households
                .value_from_person(&ages, "second_parent", &Scalar::Int(0))
                .unwrap(),
            Array::from(vec![38_i64, 0])
        );
        let err = households
            .value_from_person(&ages, "parent", &Scalar::Int(0))
            .unwrap_err();
        assert!(err.to_string().contains("only unique roles"));
    }

    #[test]
    fn test_project_broadcasts_and_masks() {
        let households = households();
        let rent = Array::from(vec![900.0, 500.0]);
        assert_eq!(
            households.project(&rent, None).unwrap(),
            Array::from(vec![900.0, 900.0, 500.0, 900.0, 500.0])
        );
        assert_eq!(
            households.project(&rent, Some("child")).unwrap(),
            Array::from(vec![0.0, 0.0, 0.0, 900.0, 500.0])
        );
        assert!(households.project(&Array::from(vec![1.0]), None).is_err());
    }

    #[test]
    fn test_project_from_containing_entity() {
        let households = households();
        let districts = GroupPopulation::new(
            district(),
            vec!["d1".into(), "d2".into()],
            vec![1, 1, 0, 1, 0],
            vec!["resident".into(); 5],
        )
        .unwrap();
        let tax_rate = Array::from(vec![0.1, 0.3]);
        assert_eq!(
            households.project_from(&districts, &tax_rate).unwrap(),
            Array::from(vec![0.3, 0.1])
        );
        assert!(districts.project_from(&households, &Array::from(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_has_role_and_rank() {
        let persons = persons();
        let households = households();
        assert_eq!(
            persons.has_role(&households, "parent").unwrap(),
            Array::from(vec![true, true, true, false, false])
        );

        let ages = Array::from(vec![40_i64, 38, 30, 12, 3]);
        let everyone = persons.filled_array(true);
        assert_eq!(
            persons.get_rank(&households, &ages, &everyone).unwrap(),
            Array::from(vec![2_i64, 1, 1, 0, 0])
        );
        let adults = ages.gt(18.0).unwrap();
        assert_eq!(
            persons.get_rank(&households, &ages, &adults).unwrap(),
            Array::from(vec![1_i64, 0, 0, -1, -1])
        );
    }

    #[test]
    fn test_rank_keeps_arrival_order_on_ties() {
        let persons = persons();
        let households = households();
        let same = persons.filled_array(1.0);
        let everyone = persons.filled_array(true);
        assert_eq!(
            persons.get_rank(&households, &same, &everyone).unwrap(),
            Array::from(vec![0_i64, 1, 0, 2, 1])
        );
    }

    #[test]
    fn test_population_holders() {
        use crate::time::DateUnit;
        use crate::value::ValueType;
        use crate::variable::Variable;

        let mut persons = persons();
        assert!(persons.get_holder("salary").is_none());
        let variable = Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
            .build()
            .unwrap();
        persons.insert_holder(Holder::new(Arc::new(variable), 5, "persons"));
        assert_eq!(persons.get_holder("salary").unwrap().count(), 5);
        assert_eq!(persons.holders().count(), 1);
    }
}
