//! Error types for microsim.
//!
//! All errors in microsim are strongly typed using thiserror.
//! This enables pattern matching on specific error conditions
//! and provides clear error messages.

use thiserror::Error;

use crate::storage::StorageError;
use crate::time::{DateUnit, Period, PeriodError};

/// Validation errors: the caller supplied something the engine cannot use.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "Unable to set a value for variable \"{variable}\" for period \"{period}\": \
         \"{variable}\" can only be set for one {definition_period} at a time. {hint}"
    )]
    PeriodMismatch {
        variable: String,
        period: Period,
        definition_period: DateUnit,
        hint: String,
    },

    #[error("Unable to compute variable \"{variable}\" for period {period}: {reason}")]
    InvalidCalculationPeriod {
        variable: String,
        period: Period,
        reason: String,
    },

    #[error(
        "Inconsistent input: variable {variable} has already been set for all sub-periods of \
         {period}, and the value provided for {period} doesn't match the total ({known_total})"
    )]
    InconsistentInput {
        variable: String,
        period: Period,
        known_total: String,
    },

    #[error(
        "Unable to set value for variable \"{variable}\": its length is {actual} while there \
         are {expected} {entity_plural} in the simulation"
    )]
    LengthMismatch {
        variable: String,
        entity_plural: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot convert a {from} array to {to} for variable \"{variable}\": {reason}")]
    InvalidCast {
        variable: String,
        from: &'static str,
        to: &'static str,
        reason: String,
    },

    #[error("Operation '{operation}' is not supported between {left} and {right} arrays")]
    UnsupportedOperation {
        operation: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Arrays of length {left} and {right} cannot be combined")]
    ShapeMismatch {
        left: usize,
        right: usize,
    },

    #[error("Role '{role}' is not a role of entity '{entity}'")]
    InvalidRole {
        entity: String,
        role: String,
    },

    #[error(
        "Role '{role}' of entity '{entity}' can hold several persons; only unique roles \
         select a single person per group"
    )]
    NonUniqueRole {
        entity: String,
        role: String,
    },

    #[error("Entity '{entity}' is not a group entity")]
    NotAGroup {
        entity: String,
    },

    #[error("Invalid variable definition for '{name}': {reason}")]
    InvalidVariable {
        name: String,
        reason: String,
    },

    #[error("Invalid entity definition for '{key}': {reason}")]
    InvalidEntity {
        key: String,
        reason: String,
    },

    #[error("Invalid simulation setup: {reason}")]
    InvalidSimulation {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while evaluating formulas.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Variable '{name}' was not found in the tax and benefit system")]
    VariableNotFound {
        name: String,
    },

    #[error("Entity '{key}' was not found in the tax and benefit system")]
    EntityNotFound {
        key: String,
    },

    #[error("Variable '{variable}' is defined for {expected}, not for {actual}")]
    EntityMismatch {
        variable: String,
        expected: String,
        actual: String,
    },

    #[error("Circular definition detected on formula {variable}@{period}")]
    Cycle {
        variable: String,
        period: Period,
    },

    #[error("Quasicircular definition detected on formula {variable}@{period} involving {stack}")]
    Spiral {
        variable: String,
        period: Period,
        stack: String,
    },

    #[error("Parameter '{path}' not found at {instant}")]
    ParameterNotFound {
        path: String,
        instant: String,
    },

    #[error("Parameter '{path}' is not a {expected}")]
    ParameterType {
        path: String,
        expected: &'static str,
    },

    #[error("Integer overflow in '{operation}' over {entity}")]
    Overflow {
        operation: &'static str,
        entity: String,
    },
}

/// Top-level error type for microsim.
///
/// This enum encompasses all possible errors that can occur
/// when running a simulation.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Period error: {0}")]
    Period(#[from] PeriodError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CalcError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true for a fatal circular definition.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Cycle { .. }))
    }

    /// Returns true for the recoverable quasicircular condition.
    #[must_use]
    pub const fn is_spiral(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Spiral { .. }))
    }

    /// Returns true if a period did not match a variable's definition period.
    #[must_use]
    pub const fn is_period_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Validation(
                ValidationError::PeriodMismatch { .. }
                    | ValidationError::InvalidCalculationPeriod { .. }
            )
        )
    }

    /// Returns true if a variable or entity lookup failed.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Execution(
                ExecutionError::VariableNotFound { .. } | ExecutionError::EntityNotFound { .. }
            )
        )
    }
}

/// Result type alias for microsim operations.
pub type CalcResult<T> = Result<T, CalcError>;
