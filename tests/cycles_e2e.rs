use std::sync::Arc;

use microsim::{
    Array, DateUnit, Entity, Simulation, SimulationConfig, TaxBenefitSystem, ValueType, Variable,
};

fn month_variable(name: &str) -> microsim::VariableBuilder {
    Variable::builder(name, "person", ValueType::Float, DateUnit::Month)
}

fn system() -> Arc<TaxBenefitSystem> {
    let system = TaxBenefitSystem::new("cycles", vec![Entity::person("person", "persons")])
        .unwrap()
        // a <-> b within the same period: a fatal cycle.
        .with_variable(
            month_variable("a")
                .formula_named("formula", |scope, period, _| scope.calculate("b", period))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            month_variable("b")
                .formula_named("formula", |scope, period, _| scope.calculate("a", period))
                .build()
                .unwrap(),
        )
        .unwrap()
        // balance depends on its own previous month: a spiral.
        .with_variable(
            month_variable("balance")
                .formula_named("formula", |scope, period, _| {
                    let previous = scope.calculate("balance", period.last_month())?;
                    Ok(previous.add(&scope.filled(1.0))?)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        // x and y depend on each other across months.
        .with_variable(
            month_variable("x")
                .formula_named("formula", |scope, period, _| {
                    Ok(scope.calculate("y", period)?.add(&scope.filled(1.0))?)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            month_variable("y")
                .formula_named("formula", |scope, period, _| {
                    Ok(scope.calculate("x", period.last_month())?.scale(2.0)?)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        // uses a spiralling variable and then the cache.
        .with_variable(
            month_variable("double_balance")
                .formula_named("formula", |scope, period, _| {
                    let first = scope.calculate("balance", period)?;
                    let second = scope.calculate("balance", period)?;
                    Ok(first.add(&second)?)
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    Arc::new(system)
}

fn simulation(max_spiral_loops: usize) -> Simulation {
    let config = SimulationConfig {
        max_spiral_loops,
        ..SimulationConfig::default()
    };
    Simulation::builder(system())
        .persons(1)
        .config(config)
        .build()
        .unwrap()
}

#[test]
fn same_period_cycle_is_fatal() {
    let mut sim = simulation(1);
    let err = sim.calculate("a", "2022-01").unwrap_err();
    assert!(err.is_cycle());
    assert!(err.to_string().contains("a@2022-01"));
    // Nothing half-computed is left behind.
    assert!(sim.get_array("a", "2022-01").unwrap().is_none());
    assert!(sim.get_array("b", "2022-01").unwrap().is_none());
}

#[test]
fn simulation_recovers_after_a_cycle() {
    let mut sim = simulation(1);
    assert!(sim.calculate("a", "2022-01").is_err());
    assert_eq!(
        sim.calculate("balance", "2022-03").unwrap(),
        Array::from(vec![1.0])
    );
}

#[test]
fn spiral_falls_back_to_the_default() {
    let mut sim = simulation(1);
    assert_eq!(
        sim.calculate("balance", "2022-03").unwrap(),
        Array::from(vec![1.0])
    );
    // Values computed under the spiral are not kept.
    assert!(sim.get_array("balance", "2022-03").unwrap().is_none());
    assert!(sim.get_array("balance", "2022-02").unwrap().is_none());
}

#[test]
fn spiral_depth_follows_max_spiral_loops() {
    let mut sim = simulation(3);
    assert_eq!(
        sim.calculate("balance", "2022-03").unwrap(),
        Array::from(vec![3.0])
    );
}

#[test]
fn spiral_across_two_variables() {
    let mut sim = simulation(1);
    // x(03) = y(03) + 1, y(03) = 2 * x(02), and x(02) spirals to 0.
    assert_eq!(sim.calculate("x", "2022-03").unwrap(), Array::from(vec![1.0]));
    assert!(sim.get_array("x", "2022-03").unwrap().is_none());
    assert!(sim.get_array("y", "2022-03").unwrap().is_none());
}

#[test]
fn known_inputs_stop_the_recursion() {
    let mut sim = simulation(3);
    sim.set_input("balance", "2022-01", vec![10.0]).unwrap();
    assert_eq!(
        sim.calculate("balance", "2022-03").unwrap(),
        Array::from(vec![12.0])
    );
    assert!(sim.get_array("balance", "2022-03").unwrap().is_some());
}

#[test]
fn invalidated_entries_are_purged_after_the_outer_calculation() {
    let mut sim = simulation(1);
    // The second lookup of balance hits the cache: the purge waits for the
    // outer calculation to end.
    assert_eq!(
        sim.calculate("double_balance", "2022-03").unwrap(),
        Array::from(vec![2.0])
    );
    assert!(sim.get_array("balance", "2022-03").unwrap().is_none());
    // Frames below the spiral keep their value.
    assert!(sim.get_array("double_balance", "2022-03").unwrap().is_some());
}

#[test]
fn explicit_invalidation_is_applied_on_purge() {
    let mut sim = simulation(1);
    sim.set_input("balance", "2022-01", vec![10.0]).unwrap();
    let january = microsim::Period::month(2022, 1).unwrap();
    sim.invalidate_cache_entry("balance", january);
    assert!(sim.get_array("balance", january).unwrap().is_some());
    sim.purge_cache_of_invalid_values().unwrap();
    assert!(sim.get_array("balance", january).unwrap().is_none());
}
