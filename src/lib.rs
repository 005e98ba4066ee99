//! # microsim - a tax-benefit microsimulation engine
//!
//! microsim computes tax and benefit outcomes by applying legislative
//! formulas to populations of persons and the groups they belong to.
//!
//! ## Core Concepts
//!
//! - **Period**: when a value applies (a day, a month, a year, several of
//!   them, or eternity)
//! - **Variable**: a typed quantity of one entity, defined per period, with
//!   dated formulas
//! - **Holder**: the per-variable cache of computed and input arrays, in
//!   memory or spilled to disk
//! - **Simulation**: the evaluator resolving formulas recursively, with
//!   cycle and spiral detection
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use microsim::{Array, Entity, Simulation, TaxBenefitSystem, ValueType, Variable};
//! use microsim::parameters::{DatedParameters, ParameterValue};
//! use microsim::time::DateUnit;
//!
//! let parameters = DatedParameters::new().with_value(
//!     "tax.rate",
//!     chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
//!     ParameterValue::Float(0.2),
//! );
//! let system = TaxBenefitSystem::new("demo", vec![Entity::person("person", "persons")])?
//!     .with_parameters(Arc::new(parameters))
//!     .with_variable(
//!         Variable::builder("salary", "person", ValueType::Float, DateUnit::Month).build()?,
//!     )?
//!     .with_variable(
//!         Variable::builder("income_tax", "person", ValueType::Float, DateUnit::Month)
//!             .formula_named("formula", |scope, period, parameters| {
//!                 let rate = parameters.at(period)?.float("tax.rate")?;
//!                 Ok(scope.calculate("salary", period)?.scale(rate)?)
//!             })
//!             .build()?,
//!     )?;
//!
//! let mut simulation = Simulation::builder(Arc::new(system)).persons(2).build()?;
//! simulation.set_input("salary", "2022-01", vec![1000.0, 2500.0])?;
//! assert_eq!(
//!     simulation.calculate("income_tax", "2022-01")?,
//!     Array::from(vec![200.0, 500.0])
//! );
//! # Ok::<(), microsim::CalcError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod time;
pub mod value;

// Declarations consumed by the evaluator
pub mod parameters;
pub mod system;
pub mod variable;

// Caching and evaluation
pub mod holder;
pub mod population;
pub mod simulation;
pub mod storage;

pub use entity::{Entity, Role};
pub use error::{CalcError, CalcResult, ExecutionError, ValidationError};
pub use holder::{Holder, MemoryUsage};
pub use parameters::{ParameterNode, ParameterTree, Parameters};
pub use population::{GroupPopulation, Population};
pub use simulation::{
    EvalContext, FullTracer, MemoryConfig, Scope, Simulation, SimulationBuilder, SimulationConfig,
    SimulationId, SimulationMemoryUsage,
};
pub use storage::{ArrayStorage, FixedPressure, MemoryPressure, StorageError};
pub use system::{Reform, TaxBenefitSystem};
pub use time::{DateUnit, Instant, Period, PeriodInput};
pub use value::{Array, Scalar, ValueType};
pub use variable::{Formula, OutputStrategy, SetInputStrategy, Variable, VariableBuilder};
