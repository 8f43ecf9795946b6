//! Single-formula complexity classification
//!
//! Answers "is this one formula worth a drill-down affordance" from its text
//! alone, in time proportional to the references it contains. The resolver
//! uses the same answer to annotate tree nodes without a second walk.

use crate::external::detect_external_reference;
use crate::functions::extract_primary_function;
use crate::references::{is_formula, parse_formula};
use std::fmt;

/// Functions that push a formula to at least [`Complexity::Moderate`]
const MODERATE_FUNCTIONS: &[&str] = &["SUMIF", "SUMIFS", "VLOOKUP"];

/// More references than this is [`Complexity::Complex`]
const COMPLEX_REFERENCE_COUNT: usize = 10;

/// More references than this is at least [`Complexity::Moderate`]
const MODERATE_REFERENCE_COUNT: usize = 3;

/// Deepest drill-down ever estimated
const MAX_ESTIMATED_DEPTH: usize = 5;

/// Complexity label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one formula
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormulaComplexity {
    pub complexity: Complexity,
    /// There is at least one local reference to follow
    pub can_drill_down: bool,
    pub has_external_refs: bool,
    /// At least one reference names a sheet explicitly
    pub has_cross_sheet_refs: bool,
    /// Ranges count once; they are not expanded here
    pub reference_count: usize,
    pub main_function: Option<String>,
    /// Rough drill-down depth hint, `min(5, reference_count / 2)`
    pub estimated_depth: usize,
}

/// Classify a cell's formula text
///
/// `None` and text without the `=` marker are constants: simple, nothing to
/// drill into.
pub fn classify(formula: Option<&str>) -> FormulaComplexity {
    let formula = match formula {
        Some(f) if is_formula(f) => f,
        _ => return FormulaComplexity::default(),
    };

    let references = parse_formula(formula);
    let reference_count = references.len();
    let has_external_refs = detect_external_reference(formula);
    let has_cross_sheet_refs = references.iter().any(|r| r.sheet().is_some());
    let main_function = extract_primary_function(formula);

    let complexity = if reference_count > COMPLEX_REFERENCE_COUNT {
        Complexity::Complex
    } else if reference_count > MODERATE_REFERENCE_COUNT
        || main_function.map_or(false, |name| MODERATE_FUNCTIONS.contains(&name))
    {
        Complexity::Moderate
    } else {
        Complexity::Simple
    };

    FormulaComplexity {
        complexity,
        can_drill_down: reference_count > 0 && !has_external_refs,
        has_external_refs,
        has_cross_sheet_refs,
        reference_count,
        main_function: main_function.map(str::to_string),
        estimated_depth: (reference_count / 2).min(MAX_ESTIMATED_DEPTH),
    }
}
