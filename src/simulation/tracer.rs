//! Full calculation tracing.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::time::Period;
use crate::value::Array;

/// One calculation and the calculations it triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    /// Variable name.
    pub name: String,
    /// Requested period.
    pub period: Period,
    /// `None` when the calculation failed.
    pub value: Option<Array>,
    /// Calculations triggered by this one, in request order.
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    fn new(name: &str, period: Period) -> Self {
        Self {
            name: name.to_string(),
            period,
            value: None,
            children: Vec::new(),
        }
    }

    fn log_into(&self, depth: usize, aggregate: bool, lines: &mut Vec<String>) {
        let mut line = format!("{}{}<{}> >> ", "  ".repeat(depth), self.name, self.period);
        match &self.value {
            None => line.push_str("<failed>"),
            Some(value) if aggregate => line.push_str(&summarize(value)),
            Some(value) => {
                let _ = write!(line, "{value}");
            }
        }
        lines.push(line);
        for child in &self.children {
            child.log_into(depth + 1, aggregate, lines);
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(value: &Array) -> String {
    match value.to_floats() {
        Ok(cells) if !cells.is_empty() => {
            let avg = cells.iter().sum::<f64>() / cells.len() as f64;
            let max = cells.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = cells.iter().copied().fold(f64::INFINITY, f64::min);
            format!("{{avg: {avg}, max: {max}, min: {min}}}")
        }
        _ => value.to_string(),
    }
}

/// Records every calculation of a simulation as a tree.
#[derive(Debug, Default)]
pub struct FullTracer {
    trees: Vec<TraceNode>,
    open: Vec<TraceNode>,
    requests: HashMap<String, usize>,
}

impl FullTracer {
    /// An empty tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a node under the calculation in progress.
    pub fn record_calculation_start(&mut self, name: &str, period: &Period) {
        *self.requests.entry(name.to_string()).or_default() += 1;
        self.open.push(TraceNode::new(name, *period));
    }

    /// Attaches `value` to the open node.
    pub fn record_calculation_result(&mut self, value: &Array) {
        if let Some(node) = self.open.last_mut() {
            node.value = Some(value.clone());
        }
    }

    /// Closes the open node. A node with no parent becomes a new tree.
    pub fn record_calculation_end(&mut self) {
        let Some(node) = self.open.pop() else {
            return;
        };
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.trees.push(node),
        }
    }

    /// Completed top-level calculations, oldest first.
    #[must_use]
    pub fn trees(&self) -> &[TraceNode] {
        &self.trees
    }

    /// Number of times `variable` was requested, cache hits included.
    #[must_use]
    pub fn nb_requests(&self, variable: &str) -> usize {
        self.requests.get(variable).copied().unwrap_or(0)
    }

    /// One line per calculation, indented by depth:
    /// `name<period> >> value`. With `aggregate`, numeric values are
    /// summarized by their average, maximum and minimum.
    #[must_use]
    pub fn computation_log(&self, aggregate: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for tree in &self.trees {
            tree.log_into(0, aggregate, &mut lines);
        }
        lines
    }

    /// Drops every tree and request count.
    pub fn clear(&mut self) {
        self.trees.clear();
        self.open.clear();
        self.requests.clear();
    }
}
