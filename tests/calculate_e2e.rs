use std::sync::Arc;

use chrono::NaiveDate;
use microsim::parameters::{DatedParameters, ParameterValue};
use microsim::{
    Array, DateUnit, Entity, Instant, OutputStrategy, Reform, Role, SetInputStrategy, Simulation,
    SimulationConfig, TaxBenefitSystem, ValueType, Variable,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn system() -> TaxBenefitSystem {
    let parameters = DatedParameters::new()
        .with_value("tax.rate", date(2020, 1, 1), ParameterValue::Float(0.2))
        .with_value("tax.rate", date(2023, 1, 1), ParameterValue::Float(0.25));

    TaxBenefitSystem::new(
        "e2e",
        vec![
            Entity::person("person", "persons"),
            Entity::group(
                "household",
                "households",
                vec![Role::new("parent").with_max(2), Role::new("child")],
            ),
        ],
    )
    .unwrap()
    .with_parameters(Arc::new(parameters))
    .with_variable(
        Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
            .set_input(SetInputStrategy::DivideByPeriod)
            .calculate_output(OutputStrategy::Add)
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("income_tax", "person", ValueType::Float, DateUnit::Month)
            .formula_named("formula", |scope, period, parameters| {
                let rate = parameters.at(period)?.float("tax.rate")?;
                Ok(scope.calculate("salary", period)?.scale(rate)?)
            })
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("bonus", "person", ValueType::Float, DateUnit::Year)
            .formula_named("formula_2020", |scope, _, _| Ok(scope.filled(100.0)))
            .formula_named("formula_2021", |scope, _, _| Ok(scope.filled(200.0)))
            .end(Instant::new(2022, 12, 31).unwrap())
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("is_adult", "person", ValueType::Bool, DateUnit::Month)
            .default_value(true)
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("adult_allowance", "person", ValueType::Float, DateUnit::Month)
            .defined_for("is_adult")
            .default_value(-1.0)
            .formula_named("formula", |scope, _, _| Ok(scope.filled(50.0)))
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("is_renting", "household", ValueType::Bool, DateUnit::Month)
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("rent_rebate", "person", ValueType::Float, DateUnit::Month)
            .defined_for("is_renting")
            .formula_named("formula", |scope, _, _| Ok(scope.filled(30.0)))
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("zone", "household", ValueType::Int, DateUnit::Month)
            .default_value(1)
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_variable(
        Variable::builder("birth_year", "person", ValueType::Int, DateUnit::Eternity)
            .build()
            .unwrap(),
    )
    .unwrap()
}

fn simulation(system: TaxBenefitSystem) -> Simulation {
    Simulation::builder(Arc::new(system))
        .persons(3)
        .group(
            "household",
            vec!["h0".into(), "h1".into()],
            vec![0, 0, 1],
            vec!["parent".into(), "child".into(), "parent".into()],
        )
        .build()
        .unwrap()
}

#[test]
fn yearly_input_is_divided_and_added_back() {
    let mut sim = simulation(system());
    sim.set_input("salary", 2022, vec![12_000.0, 0.0, 24_000.0]).unwrap();

    assert_eq!(
        sim.calculate("salary", "2022-03").unwrap(),
        Array::from(vec![1000.0, 0.0, 2000.0])
    );
    assert_eq!(
        sim.calculate_add("salary", 2022).unwrap(),
        Array::from(vec![12_000.0, 0.0, 24_000.0])
    );
    assert_eq!(
        sim.calculate_output("salary", 2022).unwrap(),
        Array::from(vec![12_000.0, 0.0, 24_000.0])
    );
    assert_eq!(sim.get_known_periods("salary").unwrap().len(), 12);
}

#[test]
fn formulas_read_dated_parameters() {
    let mut sim = simulation(system());
    sim.set_input("salary", "2022-12", vec![1000.0, 0.0, 2000.0]).unwrap();
    sim.set_input("salary", "2023-01", vec![1000.0, 0.0, 2000.0]).unwrap();

    assert_eq!(
        sim.calculate("income_tax", "2022-12").unwrap(),
        Array::from(vec![200.0, 0.0, 400.0])
    );
    assert_eq!(
        sim.calculate("income_tax", "2023-01").unwrap(),
        Array::from(vec![250.0, 0.0, 500.0])
    );
    // Computed values are cached under their own period.
    assert!(sim.get_array("income_tax", "2022-12").unwrap().is_some());
    assert!(sim.get_array("income_tax", "2022-11").unwrap().is_none());
}

#[test]
fn missing_inputs_fall_back_to_the_default() {
    let mut sim = simulation(system());
    assert_eq!(
        sim.calculate("income_tax", "2022-01").unwrap(),
        Array::from(vec![0.0, 0.0, 0.0])
    );
}

#[test]
fn formula_follows_its_start_and_the_end_date() {
    let mut sim = simulation(system());
    assert_eq!(sim.calculate("bonus", 2019).unwrap(), Array::from(vec![0.0; 3]));
    assert_eq!(sim.calculate("bonus", 2020).unwrap(), Array::from(vec![100.0; 3]));
    assert_eq!(sim.calculate("bonus", 2022).unwrap(), Array::from(vec![200.0; 3]));
    assert_eq!(sim.calculate("bonus", 2023).unwrap(), Array::from(vec![0.0; 3]));
}

#[test]
fn divide_spreads_a_yearly_value() {
    let mut sim = simulation(system());
    assert_eq!(
        sim.calculate_divide("bonus", "2021-05").unwrap(),
        Array::from(vec![200.0 / 12.0; 3])
    );
    let err = sim.calculate_divide("salary", 2022).unwrap_err();
    assert!(err.is_period_mismatch());
}

#[test]
fn divide_over_a_whole_year_is_a_plain_calculation() {
    let mut sim = simulation(system());
    let divided = sim.calculate_divide("bonus", 2022).unwrap();
    assert_eq!(divided, Array::from(vec![200.0; 3]));
    assert_eq!(divided, sim.calculate("bonus", 2022).unwrap());
}

#[test]
fn divide_requires_a_single_month_or_year() {
    let mut sim = simulation(system());
    let err = sim.calculate_divide("bonus", "month:2022-01:3").unwrap_err();
    assert!(err.is_period_mismatch());
    assert!(err.to_string().contains("one-year or a one-month"));
}

#[test]
fn add_rejects_periods_finer_than_the_definition_period() {
    let mut sim = simulation(system());
    let err = sim.calculate_add("bonus", "2022-03").unwrap_err();
    assert!(err.is_period_mismatch());
    assert!(err.to_string().contains("can only be computed for year-long periods"));
}

#[test]
fn period_mismatches_are_rejected_with_hints() {
    let mut sim = simulation(system());
    let err = sim.calculate("salary", 2022).unwrap_err();
    assert!(err.is_period_mismatch());
    assert!(err.to_string().contains("ADD"));

    let err = sim.calculate("bonus", "2022-01").unwrap_err();
    assert!(err.is_period_mismatch());
    assert!(err.to_string().contains("DIVIDE"));

    let err = sim.calculate_add("birth_year", 2022).unwrap_err();
    assert!(err.is_period_mismatch());
}

#[test]
fn eternal_variables_accept_any_period() {
    let mut sim = simulation(system());
    sim.set_input("birth_year", "2022-04", vec![1980_i64, 2010, 1975]).unwrap();
    assert_eq!(
        sim.calculate("birth_year", 1990).unwrap(),
        Array::from(vec![1980_i64, 2010, 1975])
    );
    assert_eq!(
        sim.calculate("birth_year", "ETERNITY").unwrap(),
        Array::from(vec![1980_i64, 2010, 1975])
    );
}

#[test]
fn defined_for_masks_with_the_default() {
    let mut sim = simulation(system());
    sim.set_input("is_adult", "2022-01", vec![true, false, true]).unwrap();
    assert_eq!(
        sim.calculate("adult_allowance", "2022-01").unwrap(),
        Array::from(vec![50.0, -1.0, 50.0])
    );
}

#[test]
fn defined_for_on_a_group_is_projected_to_members() {
    let mut sim = simulation(system());
    sim.set_input("is_renting", "2022-01", vec![false, true]).unwrap();
    assert_eq!(
        sim.calculate("rent_rebate", "2022-01").unwrap(),
        Array::from(vec![0.0, 0.0, 30.0])
    );
}

#[test]
fn carry_over_uses_the_latest_known_input() {
    let system = system().with_auto_carry_over(true);
    let mut sim = simulation(system);
    sim.set_input("zone", "2021-06", vec![3_i64, 4]).unwrap();
    sim.set_input("zone", "2022-02", vec![5_i64, 6]).unwrap();

    assert_eq!(sim.calculate("zone", "2021-01").unwrap(), Array::from(vec![1_i64, 1]));
    assert_eq!(sim.calculate("zone", "2021-12").unwrap(), Array::from(vec![3_i64, 4]));
    assert_eq!(sim.calculate("zone", "2022-07").unwrap(), Array::from(vec![5_i64, 6]));
}

#[test]
fn without_carry_over_inputs_stay_put() {
    let mut sim = simulation(system());
    sim.set_input("zone", "2021-06", vec![3_i64, 4]).unwrap();
    assert_eq!(sim.calculate("zone", "2021-12").unwrap(), Array::from(vec![1_i64, 1]));
}

#[test]
fn reforms_neutralize_and_update_variables() {
    let base = Arc::new(system());
    let reformed = Reform::new("flat_bonus", Arc::clone(&base))
        .neutralize_variable("income_tax")
        .unwrap()
        .update_variable(
            Variable::builder("bonus", "person", ValueType::Float, DateUnit::Year)
                .formula_named("formula", |scope, _, _| Ok(scope.filled(10.0)))
                .build()
                .unwrap(),
        )
        .unwrap()
        .apply();

    let mut sim = simulation(reformed);
    sim.set_input("salary", "2022-01", vec![1000.0, 0.0, 2000.0]).unwrap();
    sim.set_input("income_tax", "2022-01", vec![9.0, 9.0, 9.0]).unwrap();
    assert_eq!(
        sim.calculate("income_tax", "2022-01").unwrap(),
        Array::from(vec![0.0; 3])
    );
    assert_eq!(sim.calculate("bonus", 2022).unwrap(), Array::from(vec![10.0; 3]));

    // The base system is untouched.
    let mut sim = simulation((*base).clone());
    assert_eq!(sim.calculate("bonus", 2022).unwrap(), Array::from(vec![200.0; 3]));
}

#[test]
fn unknown_variables_are_not_found() {
    let mut sim = simulation(system());
    let err = sim.calculate("wealth_tax", 2022).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn formula_results_must_cover_the_population() {
    let system = system()
        .with_variable(
            Variable::builder("short", "person", ValueType::Float, DateUnit::Month)
                .formula_named("formula", |_, _, _| Ok(Array::from(vec![1.0])))
                .build()
                .unwrap(),
        )
        .unwrap();
    let mut sim = simulation(system);
    let err = sim.calculate("short", "2022-01").unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn tracing_records_the_computation_tree() {
    let config = SimulationConfig {
        trace: true,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::builder(Arc::new(system()))
        .persons(2)
        .config(config)
        .build()
        .unwrap();
    sim.set_input("salary", "2022-01", vec![1000.0, 3000.0]).unwrap();
    sim.calculate("income_tax", "2022-01").unwrap();
    sim.calculate("income_tax", "2022-01").unwrap();

    let tracer = sim.tracer().unwrap();
    assert_eq!(
        tracer.computation_log(false),
        vec![
            "income_tax<2022-01> >> [200, 600]",
            "  salary<2022-01> >> [1000, 3000]",
            "income_tax<2022-01> >> [200, 600]",
        ]
    );
    let usage = sim.get_memory_usage(Some(&["income_tax"]));
    assert_eq!(usage.by_variable["income_tax"].nb_requests, Some(2));
    assert!(!usage.by_variable.contains_key("salary"));
}
