//! Dependency tree nodes

use std::fmt;

/// Why a formula cell was not expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Termination {
    /// The node sits at the requested maximum depth
    DepthLimit,
    /// The formula points into another workbook
    ExternalReference,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::DepthLimit => f.write_str("depth limit"),
            Termination::ExternalReference => f.write_str("external reference"),
        }
    }
}

/// One cell in a dependency tree
///
/// `is_leaf` is true when the cell holds no formula, or when expansion was
/// stopped on purpose (`termination` says why). A formula cell whose only
/// references were cut as circular keeps `is_leaf == false` with no
/// dependencies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaComponent {
    pub name: String,
    /// `Sheet!A1`, using the sheet name as stored in the workbook
    pub cell_reference: String,
    /// Cached numeric value; non-numeric content reads as 0
    pub value: f64,
    pub formula: Option<String>,
    pub is_leaf: bool,
    pub dependencies: Vec<FormulaComponent>,
    /// Reserved
    pub variance_contribution: f64,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub termination: Option<Termination>,
}

impl FormulaComponent {
    /// Create an unexpanded node; it is a leaf unless it has a formula
    pub fn new(cell_reference: impl Into<String>, value: f64, formula: Option<String>) -> Self {
        let cell_reference = cell_reference.into();
        Self {
            name: cell_reference.clone(),
            is_leaf: formula.is_none(),
            cell_reference,
            value,
            formula,
            dependencies: Vec::new(),
            variance_contribution: 0.0,
            termination: None,
        }
    }

    /// Mark the node as a leaf that was deliberately not expanded
    pub fn terminate(&mut self, reason: Termination) {
        self.is_leaf = true;
        self.termination = Some(reason);
        self.dependencies.clear();
    }

    /// Whether the cell holds a formula
    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Levels below this node (0 for a node without dependencies)
    pub fn depth(&self) -> usize {
        self.dependencies
            .iter()
            .map(|d| d.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self
            .dependencies
            .iter()
            .map(FormulaComponent::node_count)
            .sum::<usize>()
    }

    /// Find a node in this subtree by its cell reference (depth-first)
    pub fn find(&self, cell_reference: &str) -> Option<&FormulaComponent> {
        if self.cell_reference == cell_reference {
            return Some(self);
        }
        self.dependencies.iter().find_map(|d| d.find(cell_reference))
    }
}
