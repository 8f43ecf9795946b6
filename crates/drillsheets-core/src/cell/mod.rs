//! Cell addressing types
//!
//! This module contains:
//! - [`CellAddress`] - A cell's location (e.g., "A1", "'Q1 Plan'!$B$2")
//! - [`RangeReference`] - A rectangular block of cells (e.g., "A1:B10")
//! - [`CellReference`] - Either of the above, as found in formula text

mod address;

pub use address::{
    column_to_index, index_to_column, quote_sheet_name, CellAddress, CellReference, RangeCells,
    RangeReference,
};
