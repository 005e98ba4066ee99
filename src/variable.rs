//! Variable declarations and formula resolution.
//!
//! A variable is a plain descriptor: value type, entity, definition period
//! and zero or more dated formulas. Formulas are kept in a map ordered by
//! effective date and resolved with a greatest-lower-bound lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, ValidationError};
use crate::parameters::Parameters;
use crate::simulation::Scope;
use crate::time::{DateUnit, Instant, Period};
use crate::value::{Array, Scalar, ValueType};

/// A formula: computes the variable for every member of the scope's
/// population over `period`.
pub type Formula =
    Arc<dyn Fn(&mut Scope<'_>, &Period, &Parameters) -> CalcResult<Array> + Send + Sync>;

/// How an input given for a coarser period is spread over the variable's
/// definition period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetInputStrategy {
    /// Every subperiod receives the input.
    DispatchByPeriod,
    /// The input is a total split evenly across subperiods.
    DivideByPeriod,
}

/// How `Simulation::calculate_output` reaches a period coarser or finer
/// than the definition period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStrategy {
    /// Sum the values of the subperiods.
    Add,
    /// Split the value of the enclosing period evenly.
    Divide,
}

static FORMULA_NAME: OnceLock<Regex> = OnceLock::new();

fn formula_name_regex() -> &'static Regex {
    FORMULA_NAME.get_or_init(|| {
        Regex::new(r"^formula(?:_(\d{4})(?:_(\d{2})(?:_(\d{2}))?)?)?$")
            .expect("valid formula name regex")
    })
}

/// Effective date encoded in a conventional formula name.
///
/// `formula` starts at [`Instant::MIN`]; `formula_2020`, `formula_2020_07`
/// and `formula_2020_07_14` start on the first day they name.
///
/// # Errors
///
/// Returns `ValidationError::InvalidVariable` for names outside the
/// convention or naming an impossible date.
pub fn formula_start(variable: &str, formula_name: &str) -> Result<Instant, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidVariable {
        name: variable.to_string(),
        reason,
    };
    let captures = formula_name_regex()
        .captures(formula_name)
        .ok_or_else(|| invalid(format!("'{formula_name}' is not a formula name")))?;
    let Some(year) = captures.get(1) else {
        return Ok(Instant::MIN);
    };
    let parse = |m: Option<regex::Match<'_>>| -> u32 { m.and_then(|m| m.as_str().parse().ok()).unwrap_or(1) };
    let year: i32 = year
        .as_str()
        .parse()
        .map_err(|_| invalid(format!("'{formula_name}' has an invalid year")))?;
    Instant::new(year, parse(captures.get(2)), parse(captures.get(3)))
        .map_err(|e| invalid(format!("'{formula_name}': {e}")))
}

/// A variable declaration.
#[derive(Clone)]
pub struct Variable {
    name: String,
    entity: String,
    value_type: ValueType,
    definition_period: DateUnit,
    default_value: Scalar,
    formulas: BTreeMap<Instant, Formula>,
    end: Option<Instant>,
    set_input: Option<SetInputStrategy>,
    defined_for: Option<String>,
    possible_values: Vec<String>,
    label: Option<String>,
    reference: Vec<String>,
    calculate_output: Option<OutputStrategy>,
    is_neutralized: bool,
}

impl Variable {
    /// Starts a declaration.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        entity: impl Into<String>,
        value_type: ValueType,
        definition_period: DateUnit,
    ) -> VariableBuilder {
        VariableBuilder::new(name, entity, value_type, definition_period)
    }

    /// Unique name within the system.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the entity this variable is defined for.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Type of every cell.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Unit values are defined for.
    #[must_use]
    pub const fn definition_period(&self) -> DateUnit {
        self.definition_period
    }

    /// Value of cells nothing computed or set.
    #[must_use]
    pub const fn default_value(&self) -> &Scalar {
        &self.default_value
    }

    /// Last day a formula applies, if the variable is retired.
    #[must_use]
    pub const fn end(&self) -> Option<Instant> {
        self.end
    }

    /// How inputs for coarser periods are spread, if at all.
    #[must_use]
    pub const fn set_input(&self) -> Option<SetInputStrategy> {
        self.set_input
    }

    /// Role or boolean variable restricting where the formula runs.
    #[must_use]
    pub fn defined_for(&self) -> Option<&str> {
        self.defined_for.as_deref()
    }

    /// Labels of an enum variable, by index.
    #[must_use]
    pub fn possible_values(&self) -> &[String] {
        &self.possible_values
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Legislative references.
    #[must_use]
    pub fn reference(&self) -> &[String] {
        &self.reference
    }

    /// Strategy used by `Simulation::calculate_output`.
    #[must_use]
    pub const fn calculate_output(&self) -> Option<OutputStrategy> {
        self.calculate_output
    }

    /// True when a reform pinned the variable to its default.
    #[must_use]
    pub const fn is_neutralized(&self) -> bool {
        self.is_neutralized
    }

    /// True for variables defined over eternity.
    #[must_use]
    pub fn is_eternal(&self) -> bool {
        self.definition_period == DateUnit::Eternity
    }

    /// True when no formula is declared: values only come from inputs.
    #[must_use]
    pub fn is_input_variable(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Effective dates of the declared formulas, oldest first.
    #[must_use]
    pub fn formula_dates(&self) -> Vec<Instant> {
        self.formulas.keys().copied().collect()
    }

    /// Formula in force for `period`.
    ///
    /// Without a period, returns the oldest formula. Returns `None` for
    /// input variables and for periods starting after [`Variable::end`].
    #[must_use]
    pub fn get_formula(&self, period: Option<&Period>) -> Option<Formula> {
        let Some(period) = period else {
            return self.formulas.values().next().cloned();
        };
        let start = period.start();
        if self.end.is_some_and(|end| start > end) {
            return None;
        }
        self.formulas
            .range(..=start)
            .next_back()
            .map(|(_, formula)| Arc::clone(formula))
    }

    /// Array of `count` default values.
    #[must_use]
    pub fn default_array(&self, count: usize) -> Array {
        Array::filled(&self.default_value, count)
    }

    /// Copy of this variable that always yields its default value.
    #[must_use]
    pub fn neutralized(&self) -> Self {
        let mut variable = self.clone();
        variable.formulas.clear();
        variable.set_input = None;
        variable.is_neutralized = true;
        variable
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("value_type", &self.value_type)
            .field("definition_period", &self.definition_period)
            .field("default_value", &self.default_value)
            .field("formulas", &self.formula_dates())
            .field("end", &self.end)
            .field("set_input", &self.set_input)
            .field("defined_for", &self.defined_for)
            .field("is_neutralized", &self.is_neutralized)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Variable`].
pub struct VariableBuilder {
    name: String,
    entity: String,
    value_type: ValueType,
    definition_period: DateUnit,
    default_value: Option<Scalar>,
    formulas: Vec<(Result<Instant, ValidationError>, Formula)>,
    end: Option<Instant>,
    set_input: Option<SetInputStrategy>,
    defined_for: Option<String>,
    possible_values: Vec<String>,
    label: Option<String>,
    reference: Vec<String>,
    calculate_output: Option<OutputStrategy>,
}

impl VariableBuilder {
    fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        value_type: ValueType,
        definition_period: DateUnit,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            value_type,
            definition_period,
            default_value: None,
            formulas: Vec::new(),
            end: None,
            set_input: None,
            defined_for: None,
            possible_values: Vec::new(),
            label: None,
            reference: Vec::new(),
            calculate_output: None,
        }
    }

    /// Sets the default value (cast to the value type at build time).
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Scalar>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Adds a formula in force from `start`.
    #[must_use]
    pub fn formula<F>(mut self, start: Instant, formula: F) -> Self
    where
        F: Fn(&mut Scope<'_>, &Period, &Parameters) -> CalcResult<Array> + Send + Sync + 'static,
    {
        self.formulas.push((Ok(start), Arc::new(formula)));
        self
    }

    /// Adds a formula whose effective date is encoded in its name
    /// (`formula`, `formula_YYYY`, `formula_YYYY_MM`, `formula_YYYY_MM_DD`).
    #[must_use]
    pub fn formula_named<F>(mut self, name: &str, formula: F) -> Self
    where
        F: Fn(&mut Scope<'_>, &Period, &Parameters) -> CalcResult<Array> + Send + Sync + 'static,
    {
        let start = formula_start(&self.name, name);
        self.formulas.push((start, Arc::new(formula)));
        self
    }

    /// Last day the variable's formulas apply.
    #[must_use]
    pub const fn end(mut self, end: Instant) -> Self {
        self.end = Some(end);
        self
    }

    /// Accepts inputs for periods coarser than the definition period.
    #[must_use]
    pub const fn set_input(mut self, strategy: SetInputStrategy) -> Self {
        self.set_input = Some(strategy);
        self
    }

    /// Masks computed values with a boolean variable.
    #[must_use]
    pub fn defined_for(mut self, variable: impl Into<String>) -> Self {
        self.defined_for = Some(variable.into());
        self
    }

    /// Declares enum variants, in index order.
    #[must_use]
    pub fn possible_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a legislative reference.
    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference.push(reference.into());
        self
    }

    /// Sets the strategy used by `Simulation::calculate_output`.
    #[must_use]
    pub const fn calculate_output(mut self, strategy: OutputStrategy) -> Self {
        self.calculate_output = Some(strategy);
        self
    }

    /// Validates and builds the variable.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidVariable` for an invalid name, an
    /// enum without possible values, a default that does not fit the value
    /// type, two formulas sharing a start date or a formula starting after
    /// the end date.
    pub fn build(self) -> Result<Variable, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidVariable {
            name: self.name.clone(),
            reason,
        };
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(invalid("names use ASCII letters, digits and '_'".to_string()));
        }
        if self.entity.trim().is_empty() {
            return Err(invalid("entity must not be empty".to_string()));
        }
        if self.value_type == ValueType::Enum && self.possible_values.is_empty() {
            return Err(invalid("enum variables need possible values".to_string()));
        }

        let default_value = match self.default_value {
            None => self.value_type.default_scalar(),
            Some(value) => value.cast(&self.name, self.value_type, &self.possible_values)?,
        };

        let mut formulas = BTreeMap::new();
        for (start, formula) in self.formulas {
            let start = start?;
            if self.end.is_some_and(|end| start > end) {
                return Err(invalid(format!("a formula starts on {start}, after the end date")));
            }
            if formulas.insert(start, formula).is_some() {
                return Err(invalid(format!("two formulas start on {start}")));
            }
        }

        Ok(Variable {
            name: self.name,
            entity: self.entity,
            value_type: self.value_type,
            definition_period: self.definition_period,
            default_value,
            formulas,
            end: self.end,
            set_input: self.set_input,
            defined_for: self.defined_for,
            possible_values: self.possible_values,
            label: self.label,
            reference: self.reference,
            calculate_output: self.calculate_output,
            is_neutralized: false,
        })
    }
}

impl fmt::Debug for VariableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableBuilder")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("formulas", &self.formulas.len())
            .finish_non_exhaustive()
    }
}
