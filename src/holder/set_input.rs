//! Spreading inputs given for coarse periods over elementary subperiods.

use crate::error::{CalcResult, ValidationError};
use crate::holder::Holder;
use crate::time::Period;
use crate::value::Array;

fn elementary_subperiods(holder: &Holder, period: &Period) -> CalcResult<Vec<Period>> {
    Ok(period.subperiods(holder.variable().definition_period())?)
}

/// Replicates `array` into every subperiod without a value.
///
/// A subperiod that already holds a value is left untouched, and that value
/// is what the following empty subperiods receive.
pub(super) fn dispatch_by_period(
    holder: &mut Holder,
    period: &Period,
    array: Array,
) -> CalcResult<()> {
    let mut current = holder.to_array(array)?;
    for subperiod in elementary_subperiods(holder, period)? {
        match holder.get_array(&subperiod)? {
            Some(existing) => current = existing,
            None => holder.set(&subperiod, current.clone())?,
        }
    }
    Ok(())
}

/// Splits the total `array` evenly over the subperiods without a value,
/// after subtracting the values already known.
///
/// When every subperiod is known, the input must match their sum exactly.
pub(super) fn divide_by_period(
    holder: &mut Holder,
    period: &Period,
    array: Array,
) -> CalcResult<()> {
    let array = holder.to_array(array)?;
    let subperiods = elementary_subperiods(holder, period)?;
    let mut remaining = array.clone();
    let mut empty = Vec::new();
    for subperiod in subperiods {
        match holder.get_array(&subperiod)? {
            Some(existing) => remaining = remaining.sub(&existing)?,
            None => empty.push(subperiod),
        }
    }

    if empty.is_empty() {
        if remaining.is_all_zero()? {
            return Ok(());
        }
        let known_total = array.sub(&remaining)?;
        return Err(ValidationError::InconsistentInput {
            variable: holder.variable().name().to_string(),
            period: *period,
            known_total: known_total.to_string(),
        }
        .into());
    }

    #[allow(clippy::cast_precision_loss)]
    let divided = remaining.div_scalar(empty.len() as f64)?;
    for subperiod in empty {
        holder.set(&subperiod, divided.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::time::DateUnit;
    use crate::value::ValueType;
    use crate::variable::{SetInputStrategy, Variable};

    fn holder(strategy: SetInputStrategy, definition_period: DateUnit) -> Holder {
        let variable = Variable::builder("salary", "person", ValueType::Float, definition_period)
            .set_input(strategy)
            .build()
            .unwrap();
        Holder::new(Arc::new(variable), 2, "persons")
    }

    fn quarter() -> Period {
        "month:2022-01:3".parse().unwrap()
    }

    fn sum_months(holder: &Holder, period: &Period) -> Array {
        period
            .subperiods(DateUnit::Month)
            .unwrap()
            .iter()
            .map(|month| holder.get_array(month).unwrap().unwrap())
            .reduce(|a, b| a.add(&b).unwrap())
            .unwrap()
    }

    #[test]
    fn test_dispatch_replicates_value() {
        let mut holder = holder(SetInputStrategy::DispatchByPeriod, DateUnit::Month);
        holder.set_input(&quarter(), Array::from(vec![10.0, 20.0])).unwrap();
        assert_eq!(sum_months(&holder, &quarter()), Array::from(vec![30.0, 60.0]));
    }

    #[test]
    fn test_dispatch_carries_existing_values_forward() {
        let mut holder = holder(SetInputStrategy::DispatchByPeriod, DateUnit::Month);
        let feb = Period::month(2022, 2).unwrap();
        holder.set_input(&feb, Array::from(vec![5.0, 5.0])).unwrap();
        holder.set_input(&quarter(), Array::from(vec![1.0, 1.0])).unwrap();
        assert_eq!(
            holder.get_array(&Period::month(2022, 1).unwrap()).unwrap(),
            Some(Array::from(vec![1.0, 1.0]))
        );
        assert_eq!(holder.get_array(&feb).unwrap(), Some(Array::from(vec![5.0, 5.0])));
        assert_eq!(
            holder.get_array(&Period::month(2022, 3).unwrap()).unwrap(),
            Some(Array::from(vec![5.0, 5.0]))
        );
    }

    #[test]
    fn test_divide_splits_total() {
        let mut holder = holder(SetInputStrategy::DivideByPeriod, DateUnit::Month);
        holder.set_input(&quarter(), Array::from(vec![30.0, 3.0])).unwrap();
        assert_eq!(
            holder.get_array(&Period::month(2022, 2).unwrap()).unwrap(),
            Some(Array::from(vec![10.0, 1.0]))
        );
        assert_eq!(sum_months(&holder, &quarter()), Array::from(vec![30.0, 3.0]));
    }

    #[test]
    fn test_divide_subtracts_known_values() {
        let mut holder = holder(SetInputStrategy::DivideByPeriod, DateUnit::Month);
        holder
            .set_input(&Period::month(2022, 1).unwrap(), Array::from(vec![12.0, 0.0]))
            .unwrap();
        holder.set_input(&quarter(), Array::from(vec![30.0, 30.0])).unwrap();
        assert_eq!(
            holder.get_array(&Period::month(2022, 3).unwrap()).unwrap(),
            Some(Array::from(vec![9.0, 15.0]))
        );
        assert_eq!(sum_months(&holder, &quarter()), Array::from(vec![30.0, 30.0]));
    }

    #[test]
    fn test_divide_rejects_inconsistent_total() {
        let mut holder = holder(SetInputStrategy::DivideByPeriod, DateUnit::Month);
        holder.set_input(&quarter(), Array::from(vec![30.0, 30.0])).unwrap();
        holder.set_input(&quarter(), Array::from(vec![30.0, 30.0])).unwrap();
        let err = holder
            .set_input(&quarter(), Array::from(vec![31.0, 30.0]))
            .unwrap_err();
        assert!(err.to_string().contains("Inconsistent input"));
        assert!(err.to_string().contains("[30, 30]"));
    }

    #[test]
    fn test_yearly_variable_over_several_years() {
        let mut holder = holder(SetInputStrategy::DivideByPeriod, DateUnit::Year);
        let two_years: Period = "year:2020:2".parse().unwrap();
        holder.set_input(&two_years, Array::from(vec![100.0, 50.0])).unwrap();
        assert_eq!(
            holder.get_array(&Period::year(2021).unwrap()).unwrap(),
            Some(Array::from(vec![50.0, 25.0]))
        );
    }
}
