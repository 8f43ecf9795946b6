//! # drillsheets
//!
//! Drill down into spreadsheet formulas.
//!
//! Starting from any cell, drillsheets follows the references in its formula
//! and builds a tree of the cells it depends on, with their cached values.
//! The tree is what an analyst walks when asking "where does this number come
//! from?".
//!
//! ## Features
//!
//! - Dependency trees with cycle detection and a depth limit
//! - Bounded range expansion with immaterial cells pruned
//! - External workbook links detected and left unexpanded
//! - Formula classification (simple / moderate / complex)
//! - Sessions with per-sheet naming columns and manual names
//! - XLSX/XLSM loading, shared formulas included
//!
//! ## Example
//!
//! ```rust
//! use drillsheets::prelude::*;
//!
//! let mut workbook = WorkbookSnapshot::new();
//! workbook.add_sheet("P&L").unwrap();
//! workbook.set_number("P&L", "B2", 1200.0).unwrap();
//! workbook.set_number("P&L", "B3", 300.0).unwrap();
//! workbook.set_formula("P&L", "B4", "=SUM(B2:B3)", 1500.0).unwrap();
//!
//! let root = workbook.resolve("P&L", "B4", 3).unwrap().unwrap();
//! let values: Vec<f64> = root.dependencies.iter().map(|d| d.value).collect();
//! assert_eq!(values, vec![1200.0, 300.0]);
//!
//! let analysis = classify(root.formula.as_deref());
//! assert_eq!(analysis.main_function.as_deref(), Some("SUM"));
//! ```

pub mod component;
pub mod error;
pub mod naming;
pub mod prelude;
pub mod resolver;
pub mod service;
pub mod session;

pub use component::{FormulaComponent, Termination};
pub use error::{ServiceError, ServiceResult};
pub use naming::{resolve_name, NameSource, ResolvedName};
pub use resolver::{DuplicatePolicy, Resolution, ResolveOptions, ResolveStats, WorkbookResolveExt};
pub use service::{
    CellInfo, DependencyInfo, DrillDownResponse, DrillService, ServiceOptions, UploadResponse,
    WorkbookLoader, XlsxLoader,
};
pub use session::{MemorySessionStore, Session, SessionStore};

// Re-export core types
pub use drillsheets_core::{
    CachedValue, CellAddress, CellContents, CellRecord, CellReference, Error, RangeReference,
    Result, RowValue, SheetSnapshot, WorkbookSnapshot, WorkbookSource,
};

// Re-export formula analysis
pub use drillsheets_formula::{
    classify, detect_external_reference, extract_primary_function, parse_formula, shift_formula,
    Complexity, FormulaComplexity, SUPPORTED_FUNCTIONS,
};

// Re-export the XLSX reader
pub use drillsheets_xlsx::{XlsxError, XlsxReader};
