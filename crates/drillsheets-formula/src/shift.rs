//! Relative reference shifting
//!
//! XLSX stores a block of identical formulas once, on an anchor cell, and
//! marks the other cells as sharing it. Each sharing cell's text is the
//! anchor's formula with every relative row/column moved by the offset
//! between the two cells.

use crate::references::scan;
use drillsheets_core::{CellAddress, CellReference, RangeReference, MAX_COLS, MAX_ROWS};

/// Move every relative part of every reference in `formula`
///
/// `$`-anchored parts stay put. A reference pushed off the sheet becomes
/// `#REF!`. Text that is not a formula is returned unchanged.
///
/// ```rust
/// use drillsheets_formula::shift_formula;
///
/// assert_eq!(shift_formula("=A1*$B$1+SUM(C1:C3)", 2, 1), "=B3*$B$1+SUM(D3:D5)");
/// assert_eq!(shift_formula("=A1", -1, 0), "=#REF!");
/// ```
pub fn shift_formula(formula: &str, row_delta: i64, col_delta: i64) -> String {
    let Some(body) = formula.strip_prefix('=') else {
        return formula.to_string();
    };
    if row_delta == 0 && col_delta == 0 {
        return formula.to_string();
    }

    let mut shifted = String::with_capacity(formula.len() + 8);
    shifted.push('=');

    let mut last = 0;
    for (span, reference) in scan(body) {
        shifted.push_str(&body[last..span.start]);
        match shift_reference(&reference, row_delta, col_delta) {
            Some(moved) => shifted.push_str(&moved.to_string()),
            None => shifted.push_str("#REF!"),
        }
        last = span.end;
    }
    shifted.push_str(&body[last..]);

    shifted
}

fn shift_reference(
    reference: &CellReference,
    row_delta: i64,
    col_delta: i64,
) -> Option<CellReference> {
    match reference {
        CellReference::Cell(addr) => {
            shift_address(addr, row_delta, col_delta).map(CellReference::Cell)
        }
        CellReference::Range(range) => {
            let start = shift_address(&range.start, row_delta, col_delta)?;
            let end = shift_address(&range.end(), row_delta, col_delta)?;
            Some(CellReference::Range(RangeReference::new(start, end)))
        }
    }
}

fn shift_address(addr: &CellAddress, row_delta: i64, col_delta: i64) -> Option<CellAddress> {
    let row = offset(addr.row, row_delta, addr.absolute_row, MAX_ROWS)?;
    let col = offset(addr.column_index(), col_delta, addr.absolute_column, MAX_COLS)?;

    let mut moved = CellAddress::from_indices(row, col).ok()?;
    moved.sheet = addr.sheet.clone();
    moved.absolute_row = addr.absolute_row;
    moved.absolute_column = addr.absolute_column;
    Some(moved)
}

fn offset(value: u32, delta: i64, anchored: bool, max: u32) -> Option<u32> {
    if anchored {
        return Some(value);
    }
    let moved = i64::from(value) + delta;
    if moved < 1 || moved > i64::from(max) {
        None
    } else {
        u32::try_from(moved).ok()
    }
}
