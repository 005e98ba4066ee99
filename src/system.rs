//! Tax-benefit systems and reforms.
//!
//! A [`TaxBenefitSystem`] is the read-only registry a simulation evaluates:
//! entities, variables and parameters. A [`Reform`] layers overrides on top
//! of an existing system without touching it; lookups check the overrides
//! first and fall back to the base registry.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::entity::Entity;
use crate::error::{CalcResult, ExecutionError, ValidationError};
use crate::parameters::{ParameterTree, Parameters};
use crate::variable::Variable;

/// Registry of entities, variables and parameters.
#[derive(Debug, Clone)]
pub struct TaxBenefitSystem {
    name: String,
    entities: Arc<Vec<Arc<Entity>>>,
    person: Arc<Entity>,
    variables: BTreeMap<String, Arc<Variable>>,
    base: Option<Arc<TaxBenefitSystem>>,
    parameters: Parameters,
    auto_carry_over_input_variables: bool,
    cache_blacklist: HashSet<String>,
}

impl TaxBenefitSystem {
    /// Creates an empty system over `entities`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEntity` unless exactly one person
    /// entity is declared, keys are unique, every entity is valid and every
    /// containing entity is a declared group.
    pub fn new(name: impl Into<String>, entities: Vec<Entity>) -> Result<Self, ValidationError> {
        let persons = entities.iter().filter(|e| e.is_person).count();
        let person_index = entities.iter().position(|e| e.is_person);
        let Some(person_index) = person_index.filter(|_| persons == 1) else {
            return Err(ValidationError::InvalidEntity {
                key: entities.first().map(|e| e.key.clone()).unwrap_or_default(),
                reason: format!("exactly one person entity is required, found {persons}"),
            });
        };
        let mut keys = HashSet::new();
        for entity in &entities {
            entity.validate()?;
            if !keys.insert(entity.key.as_str()) {
                return Err(ValidationError::InvalidEntity {
                    key: entity.key.clone(),
                    reason: "entity key is declared twice".to_string(),
                });
            }
        }
        for entity in &entities {
            for container in &entity.containing_entities {
                let known = entities.iter().any(|e| &e.key == container && !e.is_person);
                if !known || container == &entity.key {
                    return Err(ValidationError::InvalidEntity {
                        key: entity.key.clone(),
                        reason: format!("containing entity '{container}' is not another group"),
                    });
                }
            }
        }
        let entities: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
        let person = Arc::clone(&entities[person_index]);
        Ok(Self {
            name: name.into(),
            entities: Arc::new(entities),
            person,
            variables: BTreeMap::new(),
            base: None,
            parameters: Parameters::empty(),
            auto_carry_over_input_variables: false,
            cache_blacklist: HashSet::new(),
        })
    }

    /// System name, suffixed by applied reforms.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a variable.
    ///
    /// # Errors
    ///
    /// Fails when the name is already taken or the entity is unknown.
    pub fn add_variable(&mut self, variable: Variable) -> Result<(), ValidationError> {
        if self.has_variable(variable.name()) {
            return Err(ValidationError::InvalidVariable {
                name: variable.name().to_string(),
                reason: "a variable with this name already exists".to_string(),
            });
        }
        self.insert_variable(variable)
    }

    /// Builder-style [`TaxBenefitSystem::add_variable`].
    ///
    /// # Errors
    ///
    /// Same as [`TaxBenefitSystem::add_variable`].
    pub fn with_variable(mut self, variable: Variable) -> Result<Self, ValidationError> {
        self.add_variable(variable)?;
        Ok(self)
    }

    fn insert_variable(&mut self, variable: Variable) -> Result<(), ValidationError> {
        if self.entity(variable.entity()).is_none() {
            return Err(ValidationError::InvalidVariable {
                name: variable.name().to_string(),
                reason: format!("unknown entity '{}'", variable.entity()),
            });
        }
        self.variables
            .insert(variable.name().to_string(), Arc::new(variable));
        Ok(())
    }

    /// Replaces the parameter tree.
    #[must_use]
    pub fn with_parameters(mut self, tree: Arc<dyn ParameterTree>) -> Self {
        self.parameters = Parameters::new(tree);
        self
    }

    /// Lets input variables without a value for a period reuse their latest
    /// known value.
    #[must_use]
    pub const fn with_auto_carry_over(mut self, enabled: bool) -> Self {
        self.auto_carry_over_input_variables = enabled;
        self
    }

    /// Variables whose results are not cached when a simulation opts out
    /// of caching.
    #[must_use]
    pub fn with_cache_blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_blacklist = names.into_iter().map(Into::into).collect();
        self
    }

    /// The legislation handed to formulas.
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Whether input variables without formulas reuse their latest known value.
    #[must_use]
    pub const fn auto_carry_over_input_variables(&self) -> bool {
        self.auto_carry_over_input_variables
    }

    /// Whether `variable` is never cached.
    #[must_use]
    pub fn is_blacklisted(&self, variable: &str) -> bool {
        self.cache_blacklist.contains(variable)
    }

    /// Every entity, in declaration order.
    #[must_use]
    pub fn entities(&self) -> &[Arc<Entity>] {
        &self.entities
    }

    /// Looks an entity up by key.
    #[must_use]
    pub fn entity(&self, key: &str) -> Option<&Arc<Entity>> {
        self.entities.iter().find(|e| e.key == key)
    }

    /// The person entity.
    #[must_use]
    pub fn person_entity(&self) -> &Arc<Entity> {
        &self.person
    }

    /// Group entities, in declaration order.
    pub fn group_entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.iter().filter(|e| !e.is_person)
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<&Arc<Variable>> {
        self.variables
            .get(name)
            .or_else(|| self.base.as_deref().and_then(|base| base.lookup(name)))
    }

    /// Resolves a variable, overrides first.
    ///
    /// With `check_existence`, a missing variable is an error; otherwise it
    /// yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::VariableNotFound` when `check_existence` is
    /// set and the name is unknown.
    pub fn get_variable(
        &self,
        name: &str,
        check_existence: bool,
    ) -> CalcResult<Option<Arc<Variable>>> {
        match self.lookup(name) {
            Some(variable) => Ok(Some(Arc::clone(variable))),
            None if check_existence => Err(ExecutionError::VariableNotFound {
                name: name.to_string(),
            }
            .into()),
            None => Ok(None),
        }
    }

    /// Resolves a variable that must exist.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::VariableNotFound` for unknown names.
    pub fn variable(&self, name: &str) -> CalcResult<Arc<Variable>> {
        self.lookup(name).cloned().ok_or_else(|| {
            ExecutionError::VariableNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Every variable name visible in this system.
    #[must_use]
    pub fn variable_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .base
            .as_deref()
            .map(Self::variable_names)
            .unwrap_or_default();
        names.extend(self.variables.keys().cloned());
        names
    }

    /// The system this one was reformed from, if any.
    #[must_use]
    pub fn base(&self) -> Option<&Arc<Self>> {
        self.base.as_ref()
    }
}

/// A set of changes applied on top of a base system.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use microsim::{DateUnit, Entity, Reform, TaxBenefitSystem, ValueType, Variable};
///
/// let base = TaxBenefitSystem::new("base", vec![Entity::person("person", "persons")])
///     .unwrap()
///     .with_variable(
///         Variable::builder("benefit", "person", ValueType::Float, DateUnit::Month).build().unwrap(),
///     )
///     .unwrap();
/// let base = Arc::new(base);
///
/// let reformed = Reform::new("no_benefit", Arc::clone(&base))
///     .neutralize_variable("benefit")
///     .unwrap()
///     .apply();
/// assert!(reformed.variable("benefit").unwrap().is_neutralized());
/// assert!(!base.variable("benefit").unwrap().is_neutralized());
/// ```
#[derive(Debug, Clone)]
pub struct Reform {
    name: String,
    base: Arc<TaxBenefitSystem>,
    overrides: BTreeMap<String, Arc<Variable>>,
    parameters: Option<Parameters>,
}

impl Reform {
    /// A reform of `base` with no overrides yet.
    #[must_use]
    pub fn new(name: impl Into<String>, base: Arc<TaxBenefitSystem>) -> Self {
        Self {
            name: name.into(),
            base,
            overrides: BTreeMap::new(),
            parameters: None,
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.overrides.contains_key(name) || self.base.has_variable(name)
    }

    fn check_entity(&self, variable: &Variable) -> Result<(), ValidationError> {
        if self.base.entity(variable.entity()).is_none() {
            return Err(ValidationError::InvalidVariable {
                name: variable.name().to_string(),
                reason: format!("unknown entity '{}'", variable.entity()),
            });
        }
        Ok(())
    }

    /// Adds a variable absent from the base system.
    ///
    /// # Errors
    ///
    /// Fails when the name already exists or the entity is unknown.
    pub fn add_variable(mut self, variable: Variable) -> Result<Self, ValidationError> {
        if self.exists(variable.name()) {
            return Err(ValidationError::InvalidVariable {
                name: variable.name().to_string(),
                reason: "a variable with this name already exists".to_string(),
            });
        }
        self.check_entity(&variable)?;
        self.overrides
            .insert(variable.name().to_string(), Arc::new(variable));
        Ok(self)
    }

    /// Replaces an existing variable.
    ///
    /// # Errors
    ///
    /// Fails when the name is unknown or the entity is unknown.
    pub fn update_variable(mut self, variable: Variable) -> CalcResult<Self> {
        if !self.exists(variable.name()) {
            return Err(ExecutionError::VariableNotFound {
                name: variable.name().to_string(),
            }
            .into());
        }
        self.check_entity(&variable)?;
        self.overrides
            .insert(variable.name().to_string(), Arc::new(variable));
        Ok(self)
    }

    /// Makes a variable always yield its default value.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::VariableNotFound` for unknown names.
    pub fn neutralize_variable(mut self, name: &str) -> CalcResult<Self> {
        let current = match self.overrides.get(name) {
            Some(variable) => Arc::clone(variable),
            None => self.base.variable(name)?,
        };
        self.overrides
            .insert(name.to_string(), Arc::new(current.neutralized()));
        Ok(self)
    }

    /// Replaces the parameter tree.
    #[must_use]
    pub fn with_parameters(mut self, tree: Arc<dyn ParameterTree>) -> Self {
        self.parameters = Some(Parameters::new(tree));
        self
    }

    /// Builds the reformed system. The base system is left untouched.
    #[must_use]
    pub fn apply(self) -> TaxBenefitSystem {
        debug!(
            reform = %self.name,
            base = %self.base.name(),
            overrides = self.overrides.len(),
            "applying reform"
        );
        TaxBenefitSystem {
            name: format!("{}+{}", self.base.name(), self.name),
            entities: Arc::clone(&self.base.entities),
            person: Arc::clone(&self.base.person),
            variables: self.overrides,
            parameters: self
                .parameters
                .unwrap_or_else(|| self.base.parameters.clone()),
            auto_carry_over_input_variables: self.base.auto_carry_over_input_variables,
            cache_blacklist: self.base.cache_blacklist.clone(),
            base: Some(self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;
    use crate::time::DateUnit;
    use crate::value::ValueType;

    fn entities() -> Vec<Entity> {
        vec![
            Entity::person("person", "persons"),
            Entity::group("household", "households", vec![Role::new("member")]),
        ]
    }

    fn salary() -> Variable {
        Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
            .build()
            .unwrap()
    }

    #[test]
    fn test_requires_exactly_one_person() {
        assert!(TaxBenefitSystem::new("x", vec![]).is_err());
        let two = vec![Entity::person("a", "as"), Entity::person("b", "bs")];
        assert!(TaxBenefitSystem::new("x", two).is_err());
        let system = TaxBenefitSystem::new("x", entities()).unwrap();
        assert_eq!(system.person_entity().key, "person");
        assert_eq!(system.group_entities().count(), 1);
    }

    #[test]
    fn test_person_entity_declared_after_groups() {
        let mut list = entities();
        list.reverse();
        let system = Arc::new(TaxBenefitSystem::new("x", list).unwrap());
        assert_eq!(system.person_entity().key, "person");
        let reformed = Reform::new("r", Arc::clone(&system)).apply();
        assert_eq!(reformed.person_entity().key, "person");
    }

    #[test]
    fn test_containing_entities_must_be_groups() {
        let mut list = entities();
        list[1] = list[1].clone().with_containing_entities(["person"]);
        assert!(TaxBenefitSystem::new("x", list).is_err());
    }

    #[test]
    fn test_get_variable_existence_flag() {
        let system = TaxBenefitSystem::new("x", entities())
            .unwrap()
            .with_variable(salary())
            .unwrap();
        assert!(system.get_variable("salary", true).unwrap().is_some());
        assert!(system.get_variable("unknown", false).unwrap().is_none());
        assert!(system.get_variable("unknown", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_variable_rejects_duplicates_and_unknown_entities() {
        let mut system = TaxBenefitSystem::new("x", entities()).unwrap();
        system.add_variable(salary()).unwrap();
        assert!(system.add_variable(salary()).is_err());
        let orphan = Variable::builder("rent", "family", ValueType::Float, DateUnit::Month)
            .build()
            .unwrap();
        assert!(system.add_variable(orphan).is_err());
    }

    #[test]
    fn test_reform_layers_over_base() {
        let base = Arc::new(
            TaxBenefitSystem::new("base", entities())
                .unwrap()
                .with_variable(salary())
                .unwrap(),
        );
        let bonus = Variable::builder("bonus", "person", ValueType::Float, DateUnit::Year)
            .build()
            .unwrap();
        let reformed = Reform::new("bonus", Arc::clone(&base))
            .add_variable(bonus)
            .unwrap()
            .neutralize_variable("salary")
            .unwrap()
            .apply();

        assert!(reformed.variable("salary").unwrap().is_neutralized());
        assert!(reformed.has_variable("bonus"));
        assert!(!base.has_variable("bonus"));
        assert!(!base.variable("salary").unwrap().is_neutralized());
        assert_eq!(reformed.variable_names().len(), 2);
        assert_eq!(reformed.name(), "base+bonus");
        assert!(reformed.base().is_some());
    }

    #[test]
    fn test_reform_update_requires_existing_variable() {
        let base = Arc::new(TaxBenefitSystem::new("base", entities()).unwrap());
        assert!(Reform::new("r", base).update_variable(salary()).is_err());
    }
}
