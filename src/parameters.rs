//! Legislative parameters.
//!
//! Formulas read parameters as of the start of the period being computed.
//! The engine only needs a [`ParameterTree`] that can produce a snapshot
//! ([`ParameterNode`]) for an instant; [`DatedParameters`] is the in-memory
//! implementation, loadable from JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, ExecutionError};
use crate::time::{Instant, Period};

/// A leaf parameter value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Floats(Vec<f64>),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Leaf(ParameterValue),
    Branch(BTreeMap<String, ParameterNode>),
}

/// Snapshot of a parameter subtree at one instant.
///
/// # Examples
///
/// ```
/// use microsim::parameters::{DatedParameters, ParameterTree};
/// use microsim::time::Instant;
///
/// let tree = DatedParameters::from_json(r#"{"tax.rate": {"2020-01-01": 0.2}}"#).unwrap();
/// let node = tree.node_at(Instant::new(2022, 3, 1).unwrap()).unwrap();
/// assert_eq!(node.float("tax.rate").unwrap(), 0.2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    instant: Instant,
    path: String,
    kind: NodeKind,
}

impl ParameterNode {
    fn branch(instant: Instant, path: String) -> Self {
        Self {
            instant,
            path,
            kind: NodeKind::Branch(BTreeMap::new()),
        }
    }

    /// Instant this snapshot was taken at.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.instant
    }

    /// Full dotted path of this node; empty for the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn join(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn not_found(&self, path: &str) -> ExecutionError {
        ExecutionError::ParameterNotFound {
            path: self.join(path),
            instant: self.instant.to_string(),
        }
    }

    /// Walks a dotted path down from this node.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ParameterNotFound` when a segment is missing.
    pub fn get(&self, path: &str) -> CalcResult<&Self> {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = match &node.kind {
                NodeKind::Branch(children) => children.get(segment),
                NodeKind::Leaf(_) => None,
            }
            .ok_or_else(|| self.not_found(path))?;
        }
        Ok(node)
    }

    /// Leaf value of this node, if it is a leaf.
    #[must_use]
    pub fn value(&self) -> Option<&ParameterValue> {
        match &self.kind {
            NodeKind::Leaf(value) => Some(value),
            NodeKind::Branch(_) => None,
        }
    }

    /// Names of direct children.
    #[must_use]
    pub fn children(&self) -> Vec<&str> {
        match &self.kind {
            NodeKind::Branch(children) => children.keys().map(String::as_str).collect(),
            NodeKind::Leaf(_) => Vec::new(),
        }
    }

    fn leaf(&self, path: &str, expected: &'static str) -> CalcResult<&ParameterValue> {
        let node = self.get(path)?;
        node.value().ok_or_else(|| {
            ExecutionError::ParameterType {
                path: node.path.clone(),
                expected,
            }
            .into()
        })
    }

    /// Numeric leaf at `path`. Integers and booleans widen to `f64`.
    ///
    /// # Errors
    ///
    /// Fails when the path is missing or does not hold a number.
    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, path: &str) -> CalcResult<f64> {
        match self.leaf(path, "number")? {
            ParameterValue::Float(v) => Ok(*v),
            ParameterValue::Int(v) => Ok(*v as f64),
            ParameterValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            _ => Err(ExecutionError::ParameterType {
                path: self.join(path),
                expected: "number",
            }
            .into()),
        }
    }

    /// Boolean leaf at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the path is missing or does not hold a boolean.
    pub fn bool(&self, path: &str) -> CalcResult<bool> {
        match self.leaf(path, "boolean")? {
            ParameterValue::Bool(v) => Ok(*v),
            _ => Err(ExecutionError::ParameterType {
                path: self.join(path),
                expected: "boolean",
            }
            .into()),
        }
    }

    /// Array leaf at `path` (e.g. bracket thresholds).
    ///
    /// # Errors
    ///
    /// Fails when the path is missing or does not hold an array.
    pub fn floats(&self, path: &str) -> CalcResult<&[f64]> {
        match self.leaf(path, "array")? {
            ParameterValue::Floats(v) => Ok(v),
            _ => Err(ExecutionError::ParameterType {
                path: self.join(path),
                expected: "array",
            }
            .into()),
        }
    }

    fn insert(&mut self, segments: &[&str], value: ParameterValue) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        let child_path = self.join(first);
        let instant = self.instant;
        if let NodeKind::Leaf(_) = self.kind {
            self.kind = NodeKind::Branch(BTreeMap::new());
        }
        if let NodeKind::Branch(children) = &mut self.kind {
            if rest.is_empty() {
                children.insert(
                    (*first).to_string(),
                    Self {
                        instant,
                        path: child_path,
                        kind: NodeKind::Leaf(value),
                    },
                );
            } else {
                children
                    .entry((*first).to_string())
                    .or_insert_with(|| Self::branch(instant, child_path))
                    .insert(rest, value);
            }
        }
    }
}

/// Source of parameter snapshots.
pub trait ParameterTree: fmt::Debug + Send + Sync {
    /// Snapshot of every parameter in force at `instant`.
    ///
    /// # Errors
    ///
    /// Implementations may fail when the tree cannot be resolved.
    fn node_at(&self, instant: Instant) -> CalcResult<ParameterNode>;
}

/// Parameters with dated values, keyed by dotted path.
///
/// The JSON form maps each path to `{ "YYYY-MM-DD": value }`; a value holds
/// from its date until the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatedParameters {
    values: BTreeMap<String, BTreeMap<NaiveDate, ParameterValue>>,
}

impl DatedParameters {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Records `value` for `path` from `start` on.
    #[must_use]
    pub fn with_value(
        mut self,
        path: impl Into<String>,
        start: NaiveDate,
        value: ParameterValue,
    ) -> Self {
        self.set(path, start, value);
        self
    }

    /// In-place form of [`DatedParameters::with_value`].
    pub fn set(&mut self, path: impl Into<String>, start: NaiveDate, value: ParameterValue) {
        self.values.entry(path.into()).or_default().insert(start, value);
    }

    /// Number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no path has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterTree for DatedParameters {
    fn node_at(&self, instant: Instant) -> CalcResult<ParameterNode> {
        let date = instant.to_date().unwrap_or(NaiveDate::MAX);
        let mut root = ParameterNode::branch(instant, String::new());
        for (path, history) in &self.values {
            if let Some((_, value)) = history.range(..=date).next_back() {
                let segments: Vec<&str> = path.split('.').collect();
                root.insert(&segments, value.clone());
            }
        }
        Ok(root)
    }
}

/// Accessor handed to formulas.
#[derive(Debug, Clone)]
pub struct Parameters(Arc<dyn ParameterTree>);

impl Parameters {
    /// Wraps a parameter source.
    #[must_use]
    pub fn new(tree: Arc<dyn ParameterTree>) -> Self {
        Self(tree)
    }

    /// Parameters with no values.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::new(DatedParameters::new()))
    }

    /// Snapshot as of the start of `period`.
    ///
    /// # Errors
    ///
    /// Propagates the tree's failure.
    pub fn at(&self, period: &Period) -> CalcResult<ParameterNode> {
        self.0.node_at(period.start())
    }

    /// Snapshot at an arbitrary instant.
    ///
    /// # Errors
    ///
    /// Propagates the tree's failure.
    pub fn at_instant(&self, instant: Instant) -> CalcResult<ParameterNode> {
        self.0.node_at(instant)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::empty()
    }
}
