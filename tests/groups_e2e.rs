use std::sync::Arc;

use microsim::{
    Array, DateUnit, Entity, Role, Scalar, Simulation, TaxBenefitSystem, ValueType, Variable,
};

fn entities() -> Vec<Entity> {
    vec![
        Entity::person("person", "persons"),
        Entity::group(
            "household",
            "households",
            vec![
                Role::new("parent")
                    .with_max(2)
                    .with_subroles(["first_parent", "second_parent"]),
                Role::new("child").with_plural("children"),
            ],
        )
        .with_containing_entities(["district"]),
        Entity::group("district", "districts", vec![Role::new("resident")]),
    ]
}

fn variable(name: &str, entity: &str, value_type: ValueType) -> microsim::VariableBuilder {
    Variable::builder(name, entity, value_type, DateUnit::Month)
}

#[allow(clippy::too_many_lines)]
fn system() -> Arc<TaxBenefitSystem> {
    let system = TaxBenefitSystem::new("groups", entities())
        .unwrap()
        .with_variable(variable("salary", "person", ValueType::Float).build().unwrap())
        .unwrap()
        .with_variable(variable("age", "person", ValueType::Int).build().unwrap())
        .unwrap()
        .with_variable(
            variable("district_rate", "district", ValueType::Float)
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("household_income", "household", ValueType::Float)
                .formula_named("formula", |scope, period, _| {
                    let salaries = scope.members("salary", period)?;
                    scope.sum(&salaries, None)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("children_income", "household", ValueType::Float)
                .formula_named("formula", |scope, period, _| {
                    let salaries = scope.members("salary", period)?;
                    scope.sum(&salaries, Some("child"))
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("nb_children", "household", ValueType::Int)
                .formula_named("formula", |scope, _, _| scope.nb_persons(Some("child")))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("has_high_earner", "household", ValueType::Bool)
                .formula_named("formula", |scope, period, _| {
                    let high = scope.members("salary", period)?.gt(2500.0)?;
                    scope.any(&high, None)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("first_parent_salary", "household", ValueType::Float)
                .formula_named("formula", |scope, period, _| {
                    let salaries = scope.members("salary", period)?;
                    scope.value_from_person(&salaries, "first_parent", &Scalar::from(0.0))
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("eldest_age", "household", ValueType::Int)
                .formula_named("formula", |scope, period, _| {
                    let ages = scope.members("age", period)?;
                    scope.max(&ages, None)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("household_district_rate", "household", ValueType::Float)
                .formula_named("formula", |scope, period, _| {
                    scope.containing_value("district", "district_rate", period)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("household_income_of_person", "person", ValueType::Float)
                .formula_named("formula", |scope, period, _| {
                    scope.group_value("household", "household_income", period)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("is_parent", "person", ValueType::Bool)
                .formula_named("formula", |scope, _, _| scope.has_role("household", "parent"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("age_rank", "person", ValueType::Int)
                .formula_named("formula", |scope, period, _| {
                    let ages = scope.calculate("age", period)?;
                    let everyone = scope.filled(true);
                    scope.rank("household", &ages, &everyone)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_variable(
            variable("misplaced", "household", ValueType::Float)
                .formula_named("formula", |scope, period, _| scope.calculate("salary", period))
                .build()
                .unwrap(),
        )
        .unwrap();
    Arc::new(system)
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i}")).collect()
}

fn roles(roles: &[&str]) -> Vec<String> {
    roles.iter().map(ToString::to_string).collect()
}

fn simulation() -> Simulation {
    let mut sim = Simulation::builder(system())
        .person_ids(ids("p", 5))
        .group(
            "household",
            ids("h", 2),
            vec![0, 0, 0, 1, 1],
            roles(&["first_parent", "second_parent", "child", "first_parent", "child"]),
        )
        .group(
            "district",
            ids("d", 2),
            vec![0, 0, 0, 1, 1],
            roles(&["resident"; 5]),
        )
        .build()
        .unwrap();
    sim.set_input("salary", "2022-01", vec![3000.0, 1000.0, 0.0, 2000.0, 500.0])
        .unwrap();
    sim.set_input("age", "2022-01", vec![40_i64, 38, 10, 30, 5])
        .unwrap();
    sim.set_input("district_rate", "2022-01", vec![0.1, 0.3]).unwrap();
    sim
}

#[test]
fn sums_over_members_and_roles() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("household_income", "2022-01").unwrap(),
        Array::from(vec![4000.0, 2500.0])
    );
    assert_eq!(
        sim.calculate("children_income", "2022-01").unwrap(),
        Array::from(vec![0.0, 500.0])
    );
    assert_eq!(
        sim.calculate("nb_children", "2022-01").unwrap(),
        Array::from(vec![1_i64, 1])
    );
}

#[test]
fn boolean_and_extreme_reductions() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("has_high_earner", "2022-01").unwrap(),
        Array::from(vec![true, false])
    );
    assert_eq!(
        sim.calculate("eldest_age", "2022-01").unwrap(),
        Array::from(vec![40_i64, 30])
    );
}

#[test]
fn values_of_a_unique_role() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("first_parent_salary", "2022-01").unwrap(),
        Array::from(vec![3000.0, 2000.0])
    );

    let salaries = sim.get_array("salary", "2022-01").unwrap().unwrap();
    let households = sim.group("household").unwrap();
    let err = households
        .value_from_person(&salaries, "parent", &Scalar::from(0.0))
        .unwrap_err();
    assert!(err.to_string().contains("parent"));
    assert_eq!(
        households.value_nth_person(1, &salaries, &Scalar::from(-1.0)).unwrap(),
        Array::from(vec![1000.0, 500.0])
    );
    assert_eq!(
        households.value_nth_person(2, &salaries, &Scalar::from(-1.0)).unwrap(),
        Array::from(vec![0.0, -1.0])
    );
}

#[test]
fn group_values_reach_their_members() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("household_income_of_person", "2022-01").unwrap(),
        Array::from(vec![4000.0, 4000.0, 4000.0, 2500.0, 2500.0])
    );
    // The household value was cached on the way.
    assert!(sim.get_array("household_income", "2022-01").unwrap().is_some());
}

#[test]
fn containing_entities_project_onto_nested_groups() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("household_district_rate", "2022-01").unwrap(),
        Array::from(vec![0.1, 0.3])
    );
}

#[test]
fn roles_and_ranks_of_persons() {
    let mut sim = simulation();
    assert_eq!(
        sim.calculate("is_parent", "2022-01").unwrap(),
        Array::from(vec![true, true, false, true, false])
    );
    assert_eq!(
        sim.calculate("age_rank", "2022-01").unwrap(),
        Array::from(vec![2_i64, 1, 0, 1, 0])
    );
}

#[test]
fn formulas_cannot_read_variables_of_other_entities_directly() {
    let mut sim = simulation();
    let err = sim.calculate("misplaced", "2022-01").unwrap_err();
    assert!(err.is_execution());
}

#[test]
fn populations_expose_their_ids() {
    let sim = simulation();
    assert_eq!(sim.persons().ids()[4], "p4");
    assert_eq!(sim.group("district").unwrap().count(), 2);
    assert_eq!(sim.get_variable_population("salary").unwrap().count(), 5);
    assert_eq!(sim.get_variable_population("household_income").unwrap().count(), 2);
}
