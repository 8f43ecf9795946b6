//! # drillsheets-formula
//!
//! Formula text analysis for drillsheets.
//!
//! This crate provides:
//! - Reference scanning (formula text → cell and range tokens)
//! - External-workbook reference detection
//! - Primary function extraction over a fixed allow-list
//! - Relative reference shifting (for expanding shared formulas)
//! - Complexity classification for drill-down affordances
//!
//! None of this evaluates formulas; it only reads their text.
//!
//! ## Example
//!
//! ```rust
//! use drillsheets_formula::{classify, parse_formula, Complexity};
//!
//! let refs = parse_formula("=SUM(A1:A10)+B2");
//! assert_eq!(refs.len(), 2);
//! assert!(refs[0].is_range());
//!
//! let info = classify(Some("=SUM(A1:A10)+B2"));
//! assert_eq!(info.complexity, Complexity::Simple);
//! assert!(info.can_drill_down);
//! ```

pub mod complexity;
pub mod external;
pub mod functions;
pub mod references;
pub mod shift;

pub use complexity::{classify, Complexity, FormulaComplexity};
pub use external::detect_external_reference;
pub use functions::{extract_primary_function, SUPPORTED_FUNCTIONS};
pub use references::{is_formula, parse_formula, parse_optional_formula};
pub use shift::shift_formula;
