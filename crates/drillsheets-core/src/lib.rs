//! # drillsheets-core
//!
//! Core data structures for the drillsheets formula drill-down toolkit.
//!
//! This crate provides the fundamental types used throughout drillsheets:
//! - [`CellAddress`] and [`RangeReference`] - A1-style addressing with optional
//!   sheet prefixes and `$` anchors
//! - [`CellReference`] - A reference token found in formula text
//! - [`WorkbookSource`] - Read access to a workbook's formulas and cached values
//! - [`WorkbookSnapshot`] - An in-memory workbook implementing [`WorkbookSource`]
//!
//! ## Example
//!
//! ```rust
//! use drillsheets_core::{CellAddress, WorkbookSnapshot, WorkbookSource};
//!
//! let mut workbook = WorkbookSnapshot::new();
//! workbook.add_sheet("Sheet1").unwrap();
//! workbook.set_number("Sheet1", "B1", 10.0).unwrap();
//! workbook.set_formula("Sheet1", "A1", "=B1*2", 20.0).unwrap();
//!
//! let cell = workbook
//!     .read_cell("sheet1", &CellAddress::parse("A1").unwrap())
//!     .unwrap();
//! assert_eq!(cell.value, Some(20.0));
//! assert_eq!(cell.formula.as_deref(), Some("=B1*2"));
//! ```

pub mod cell;
pub mod error;
pub mod workbook;

// Re-exports for convenience
pub use cell::{
    column_to_index, index_to_column, quote_sheet_name, CellAddress, CellReference, RangeCells,
    RangeReference,
};
pub use error::{Error, Result};
pub use workbook::{
    excel_serial_to_datetime, CachedValue, CellContents, CellRecord, RowValue, SheetSnapshot,
    WorkbookSnapshot, WorkbookSource,
};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u32 = 16_384;
