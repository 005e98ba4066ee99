//! Value types and typed arrays.
//!
//! Every variable has a [`ValueType`]; its values for one period form an
//! [`Array`] with one cell per population member. Arrays are plain typed
//! columns. Casting between types follows the engine's dtype rules: floats
//! truncate into ints, numbers become bools through `!= 0`, strings become
//! enum indices through the variable's possible values.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, ValidationError};

/// Declared type of a variable's values.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Date,
    /// Index into the variable's possible values.
    Enum,
}

impl ValueType {
    /// Returns a human-readable type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Date => "date",
            Self::Enum => "enum",
        }
    }

    /// Default value used when a variable declares none.
    #[must_use]
    pub fn default_scalar(self) -> Scalar {
        match self {
            Self::Bool => Scalar::Bool(false),
            Self::Int => Scalar::Int(0),
            Self::Float => Scalar::Float(0.0),
            Self::Str => Scalar::Str(String::new()),
            Self::Date => Scalar::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()),
            Self::Enum => Scalar::Enum(0),
        }
    }

    /// Size in bytes of one cell, as laid out on disk.
    #[must_use]
    pub const fn cell_size(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Enum => 2,
            Self::Int | Self::Float | Self::Date => 8,
            Self::Str => std::mem::size_of::<String>(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Enum(i16),
}

impl Scalar {
    /// The type of the value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
            Self::Date(_) => ValueType::Date,
            Self::Enum(_) => ValueType::Enum,
        }
    }

    /// Casts this scalar with the same rules as [`Array::cast`].
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCast` when the conversion is impossible.
    pub fn cast(
        &self,
        variable: &str,
        target: ValueType,
        possible_values: &[String],
    ) -> Result<Self, ValidationError> {
        let array = Array::filled(self, 1).cast(variable, target, possible_values)?;
        array.get(0).ok_or_else(|| ValidationError::InvalidCast {
            variable: variable.to_string(),
            from: self.value_type().name(),
            to: target.name(),
            reason: "empty cast result".to_string(),
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "enum:{v}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

/// A typed column of values, one cell per population member.
///
/// # Examples
///
/// ```
/// use microsim::{Array, ValueType};
///
/// let salaries = Array::from(vec![1000.0, 2000.0]);
/// let taxes = salaries.scale(0.2).unwrap();
/// assert_eq!(taxes, Array::from(vec![200.0, 400.0]));
/// assert_eq!(taxes.value_type(), ValueType::Float);
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Array {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
    Date(Vec<NaiveDate>),
    Enum(Vec<i16>),
}

/// Applies a same-type transformation to every variant.
macro_rules! map_same {
    ($array:expr, $values:ident => $body:expr) => {
        match $array {
            Array::Bool($values) => Array::Bool($body),
            Array::Int($values) => Array::Int($body),
            Array::Float($values) => Array::Float($body),
            Array::Str($values) => Array::Str($body),
            Array::Date($values) => Array::Date($body),
            Array::Enum($values) => Array::Enum($body),
        }
    };
}

/// Matches two arrays of the same variant.
macro_rules! zip_same {
    ($left:expr, $right:expr, ($l:ident, $r:ident) => $body:expr, _ => $mismatch:expr) => {
        match ($left, $right) {
            (Array::Bool($l), Array::Bool($r)) => $body,
            (Array::Int($l), Array::Int($r)) => $body,
            (Array::Float($l), Array::Float($r)) => $body,
            (Array::Str($l), Array::Str($r)) => $body,
            (Array::Date($l), Array::Date($r)) => $body,
            (Array::Enum($l), Array::Enum($r)) => $body,
            _ => $mismatch,
        }
    };
}

#[derive(Clone, Copy)]
enum NumericOp {
    Add,
    Sub,
    Mul,
}

impl NumericOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
        }
    }

    fn apply_f64(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
        }
    }

    fn apply_i64(self, a: i64, b: i64) -> i64 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn float_cells(array: &Array) -> Option<Vec<f64>> {
    match array {
        Array::Float(v) => Some(v.clone()),
        Array::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
        Array::Bool(v) => Some(v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect()),
        _ => None,
    }
}

fn int_cells(array: &Array) -> Option<Vec<i64>> {
    match array {
        Array::Int(v) => Some(v.clone()),
        Array::Bool(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
        _ => None,
    }
}

impl Array {
    /// An array of `len` copies of `value`.
    #[must_use]
    pub fn filled(value: &Scalar, len: usize) -> Self {
        match value {
            Scalar::Bool(v) => Self::Bool(vec![*v; len]),
            Scalar::Int(v) => Self::Int(vec![*v; len]),
            Scalar::Float(v) => Self::Float(vec![*v; len]),
            Scalar::Str(v) => Self::Str(vec![v.clone(); len]),
            Scalar::Date(v) => Self::Date(vec![*v; len]),
            Scalar::Enum(v) => Self::Enum(vec![*v; len]),
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::Date(v) => v.len(),
            Self::Enum(v) => v.len(),
        }
    }

    /// True for zero cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of every cell.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
            Self::Date(_) => ValueType::Date,
            Self::Enum(_) => ValueType::Enum,
        }
    }

    /// Returns the cell at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Self::Bool(v) => v.get(index).copied().map(Scalar::Bool),
            Self::Int(v) => v.get(index).copied().map(Scalar::Int),
            Self::Float(v) => v.get(index).copied().map(Scalar::Float),
            Self::Str(v) => v.get(index).cloned().map(Scalar::Str),
            Self::Date(v) => v.get(index).copied().map(Scalar::Date),
            Self::Enum(v) => v.get(index).copied().map(Scalar::Enum),
        }
    }

    /// Approximate number of bytes held by the cells.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        match self {
            Self::Str(v) => v
                .iter()
                .map(|s| std::mem::size_of::<String>() + s.len())
                .sum(),
            other => other.len() * other.value_type().cell_size(),
        }
    }

    /// The cells of a float array.
    #[must_use]
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// The cells of an int array.
    #[must_use]
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The cells of a bool array.
    #[must_use]
    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The indices of an enum array.
    #[must_use]
    pub fn as_enum_indices(&self) -> Option<&[i16]> {
        match self {
            Self::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// The cells of a string array.
    #[must_use]
    pub fn as_strs(&self) -> Option<&[String]> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric cells widened to `f64`.
    ///
    /// # Errors
    ///
    /// Fails for string, date and enum arrays.
    pub fn to_floats(&self) -> CalcResult<Vec<f64>> {
        float_cells(self).ok_or_else(|| {
            ValidationError::UnsupportedOperation {
                operation: "to_floats",
                left: self.value_type().name(),
                right: "float",
            }
            .into()
        })
    }

    /// Truthiness of every cell (`!= 0` for numbers and enum indices,
    /// non-empty for strings).
    ///
    /// # Errors
    ///
    /// Fails for date arrays.
    pub fn truthiness(&self) -> CalcResult<Vec<bool>> {
        match self {
            Self::Bool(v) => Ok(v.clone()),
            Self::Int(v) => Ok(v.iter().map(|&x| x != 0).collect()),
            Self::Float(v) => Ok(v.iter().map(|&x| x != 0.0).collect()),
            Self::Enum(v) => Ok(v.iter().map(|&x| x != 0).collect()),
            Self::Str(v) => Ok(v.iter().map(|s| !s.is_empty()).collect()),
            Self::Date(_) => Err(ValidationError::UnsupportedOperation {
                operation: "truthiness",
                left: "date",
                right: "bool",
            }
            .into()),
        }
    }

    /// True when every numeric cell equals zero.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    pub fn is_all_zero(&self) -> CalcResult<bool> {
        Ok(self.to_floats()?.iter().all(|&x| x == 0.0))
    }

    fn check_same_len(&self, other: &Self) -> CalcResult<()> {
        if self.len() != other.len() {
            return Err(ValidationError::ShapeMismatch {
                left: self.len(),
                right: other.len(),
            }
            .into());
        }
        Ok(())
    }

    fn numeric(&self, other: &Self, op: NumericOp) -> CalcResult<Self> {
        self.check_same_len(other)?;
        let unsupported = || ValidationError::UnsupportedOperation {
            operation: op.name(),
            left: self.value_type().name(),
            right: other.value_type().name(),
        };
        let any_float = matches!(self, Self::Float(_)) || matches!(other, Self::Float(_));
        if any_float {
            let (a, b) = (
                float_cells(self).ok_or_else(unsupported)?,
                float_cells(other).ok_or_else(unsupported)?,
            );
            return Ok(Self::Float(
                a.iter().zip(&b).map(|(&x, &y)| op.apply_f64(x, y)).collect(),
            ));
        }
        let (a, b) = (
            int_cells(self).ok_or_else(unsupported)?,
            int_cells(other).ok_or_else(unsupported)?,
        );
        Ok(Self::Int(
            a.iter().zip(&b).map(|(&x, &y)| op.apply_i64(x, y)).collect(),
        ))
    }

    /// Element-wise sum. Bools count as 0/1; any float operand yields floats.
    ///
    /// # Errors
    ///
    /// Fails on length mismatch or non-numeric operands.
    pub fn add(&self, other: &Self) -> CalcResult<Self> {
        self.numeric(other, NumericOp::Add)
    }

    /// Element-wise difference.
    ///
    /// # Errors
    ///
    /// Fails on length mismatch or non-numeric operands.
    pub fn sub(&self, other: &Self) -> CalcResult<Self> {
        self.numeric(other, NumericOp::Sub)
    }

    /// Element-wise product.
    ///
    /// # Errors
    ///
    /// Fails on length mismatch or non-numeric operands.
    pub fn mul(&self, other: &Self) -> CalcResult<Self> {
        self.numeric(other, NumericOp::Mul)
    }

    /// Element-wise true division, always producing floats.
    ///
    /// # Errors
    ///
    /// Fails on length mismatch or non-numeric operands.
    pub fn div(&self, other: &Self) -> CalcResult<Self> {
        self.check_same_len(other)?;
        let (a, b) = (self.to_floats()?, other.to_floats()?);
        Ok(Self::Float(a.iter().zip(&b).map(|(&x, &y)| x / y).collect()))
    }

    /// Multiplies every cell by `factor`, producing floats.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    pub fn scale(&self, factor: f64) -> CalcResult<Self> {
        Ok(Self::Float(
            self.to_floats()?.into_iter().map(|x| x * factor).collect(),
        ))
    }

    /// Divides every cell by `divisor`, producing floats.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    pub fn div_scalar(&self, divisor: f64) -> CalcResult<Self> {
        Ok(Self::Float(
            self.to_floats()?.into_iter().map(|x| x / divisor).collect(),
        ))
    }

    /// Applies `f` to every numeric cell, producing floats.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    pub fn map_float(&self, f: impl Fn(f64) -> f64) -> CalcResult<Self> {
        Ok(Self::Float(self.to_floats()?.into_iter().map(f).collect()))
    }

    /// Boolean mask of cells strictly greater than `threshold`.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    pub fn gt(&self, threshold: f64) -> CalcResult<Self> {
        Ok(Self::Bool(
            self.to_floats()?.into_iter().map(|x| x > threshold).collect(),
        ))
    }

    /// Boolean mask of cells equal to `value`.
    ///
    /// # Errors
    ///
    /// Fails for non-numeric arrays.
    #[allow(clippy::float_cmp)]
    pub fn eq_value(&self, value: f64) -> CalcResult<Self> {
        Ok(Self::Bool(
            self.to_floats()?.into_iter().map(|x| x == value).collect(),
        ))
    }

    /// Keeps `self` where `mask` holds and takes `other` elsewhere.
    ///
    /// # Errors
    ///
    /// Fails on length mismatch or when `self` and `other` differ in type.
    pub fn select(&self, mask: &[bool], other: &Self) -> CalcResult<Self> {
        self.check_same_len(other)?;
        if mask.len() != self.len() {
            return Err(ValidationError::ShapeMismatch {
                left: self.len(),
                right: mask.len(),
            }
            .into());
        }
        zip_same!(self, other, (a, b) => Ok(Self::from(
            a.iter()
                .zip(b.iter())
                .zip(mask)
                .map(|((x, y), &keep)| if keep { x.clone() } else { y.clone() })
                .collect::<Vec<_>>()
        )), _ => Err(ValidationError::UnsupportedOperation {
            operation: "select",
            left: self.value_type().name(),
            right: other.value_type().name(),
        }
        .into()))
    }

    /// Cells at `indices`, in order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds; callers index with membership
    /// tables validated at population construction.
    #[must_use]
    pub fn gather(&self, indices: &[usize]) -> Self {
        map_same!(self, v => indices.iter().map(|&i| v[i].clone()).collect())
    }

    /// Copies `source[src]` into `self[dst]` for every `(src, dst)` pair.
    ///
    /// # Errors
    ///
    /// Fails when the two arrays differ in type.
    pub fn assign_from(&mut self, source: &Self, pairs: &[(usize, usize)]) -> CalcResult<()> {
        let (left, right) = (self.value_type().name(), source.value_type().name());
        zip_same!(self, source, (target, values) => {
            for &(src, dst) in pairs {
                target[dst] = values[src].clone();
            }
            Ok(())
        }, _ => Err(ValidationError::UnsupportedOperation {
            operation: "assign",
            left,
            right,
        }
        .into()))
    }

    /// Casts every cell to `target`.
    ///
    /// `possible_values` names the enum variants; it is only consulted when
    /// converting to or from enums.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCast` when a cell cannot be converted.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::too_many_lines
    )]
    pub fn cast(
        self,
        variable: &str,
        target: ValueType,
        possible_values: &[String],
    ) -> Result<Self, ValidationError> {
        let from = self.value_type();
        if from == target {
            if let (Self::Enum(indices), false) = (&self, possible_values.is_empty()) {
                check_enum_indices(variable, indices.iter().map(|&i| i64::from(i)), possible_values)?;
            }
            return Ok(self);
        }
        let fail = |reason: String| ValidationError::InvalidCast {
            variable: variable.to_string(),
            from: from.name(),
            to: target.name(),
            reason,
        };
        let cast = match (self, target) {
            (Self::Bool(v), ValueType::Int) => Self::Int(v.into_iter().map(i64::from).collect()),
            (Self::Bool(v), ValueType::Float) => {
                Self::Float(v.into_iter().map(|x| if x { 1.0 } else { 0.0 }).collect())
            }
            (Self::Bool(v), ValueType::Str) => Self::Str(v.into_iter().map(|x| x.to_string()).collect()),
            (Self::Bool(v), ValueType::Enum) => {
                let indices: Vec<i64> = v.into_iter().map(i64::from).collect();
                Self::Enum(check_enum_indices(variable, indices.into_iter(), possible_values)?)
            }
            (Self::Int(v), ValueType::Bool) => Self::Bool(v.into_iter().map(|x| x != 0).collect()),
            (Self::Int(v), ValueType::Float) => Self::Float(v.into_iter().map(|x| x as f64).collect()),
            (Self::Int(v), ValueType::Str) => Self::Str(v.into_iter().map(|x| x.to_string()).collect()),
            (Self::Int(v), ValueType::Enum) => {
                Self::Enum(check_enum_indices(variable, v.into_iter(), possible_values)?)
            }
            (Self::Float(v), ValueType::Bool) => Self::Bool(v.into_iter().map(|x| x != 0.0).collect()),
            (Self::Float(v), ValueType::Int) => Self::Int(v.into_iter().map(|x| x as i64).collect()),
            (Self::Float(v), ValueType::Str) => Self::Str(v.into_iter().map(|x| x.to_string()).collect()),
            (Self::Float(v), ValueType::Enum) => Self::Enum(check_enum_indices(
                variable,
                v.into_iter().map(|x| x as i64),
                possible_values,
            )?),
            (Self::Str(v), ValueType::Bool) => Self::Bool(
                v.iter()
                    .map(|s| match s.trim().to_ascii_lowercase().as_str() {
                        "true" | "1" => Ok(true),
                        "false" | "0" | "" => Ok(false),
                        _ => Err(fail(format!("'{s}' is not a boolean"))),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (Self::Str(v), ValueType::Int) => Self::Int(
                v.iter()
                    .map(|s| s.trim().parse::<i64>().map_err(|e| fail(format!("'{s}': {e}"))))
                    .collect::<Result<_, _>>()?,
            ),
            (Self::Str(v), ValueType::Float) => Self::Float(
                v.iter()
                    .map(|s| s.trim().parse::<f64>().map_err(|e| fail(format!("'{s}': {e}"))))
                    .collect::<Result<_, _>>()?,
            ),
            (Self::Str(v), ValueType::Date) => Self::Date(
                v.iter()
                    .map(|s| {
                        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                            .map_err(|e| fail(format!("'{s}': {e}")))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (Self::Str(v), ValueType::Enum) => Self::Enum(
                v.iter()
                    .map(|s| {
                        possible_values
                            .iter()
                            .position(|p| p == s)
                            .and_then(|i| i16::try_from(i).ok())
                            .ok_or_else(|| fail(format!("'{s}' is not one of {possible_values:?}")))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (Self::Date(v), ValueType::Str) => Self::Str(v.into_iter().map(|d| d.to_string()).collect()),
            (Self::Enum(v), ValueType::Bool) => Self::Bool(v.into_iter().map(|x| x != 0).collect()),
            (Self::Enum(v), ValueType::Int) => Self::Int(v.into_iter().map(i64::from).collect()),
            (Self::Enum(v), ValueType::Float) => Self::Float(v.into_iter().map(f64::from).collect()),
            (Self::Enum(v), ValueType::Str) => Self::Str(
                v.into_iter()
                    .map(|i| {
                        usize::try_from(i)
                            .ok()
                            .and_then(|i| possible_values.get(i).cloned())
                            .ok_or_else(|| fail(format!("index {i} has no possible value")))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (other, _) => {
                return Err(fail(format!(
                    "no conversion from {} to {}",
                    other.value_type(),
                    target
                )))
            }
        };
        Ok(cast)
    }
}

fn check_enum_indices(
    variable: &str,
    indices: impl Iterator<Item = i64>,
    possible_values: &[String],
) -> Result<Vec<i16>, ValidationError> {
    indices
        .map(|i| {
            usize::try_from(i)
                .ok()
                .filter(|&i| i < possible_values.len())
                .and_then(|_| i16::try_from(i).ok())
                .ok_or_else(|| ValidationError::InvalidCast {
                    variable: variable.to_string(),
                    from: "int",
                    to: "enum",
                    reason: format!("index {i} is outside {} possible values", possible_values.len()),
                })
        })
        .collect()
}

macro_rules! impl_cells {
    ($ty:ty, $variant:ident) => {
        impl From<Vec<$ty>> for Array {
            fn from(cells: Vec<$ty>) -> Self {
                Self::$variant(cells)
            }
        }
    };
}

impl_cells!(bool, Bool);
impl_cells!(i64, Int);
impl_cells!(f64, Float);
impl_cells!(String, Str);
impl_cells!(NaiveDate, Date);
impl_cells!(i16, Enum);

impl From<Vec<&str>> for Array {
    fn from(cells: Vec<&str>) -> Self {
        Self::Str(cells.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 10;
        f.write_str("[")?;
        for i in 0..self.len().min(SHOWN) {
            if i > 0 {
                f.write_str(", ")?;
            }
            if let Some(cell) = self.get(i) {
                write!(f, "{cell}")?;
            }
        }
        if self.len() > SHOWN {
            write!(f, ", ... ({} cells)", self.len())?;
        }
        f.write_str("]")
    }
}
