//! Cell address and range types

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A cell address (e.g., "A1", "$B$2", "'Q1 Plan'!C3")
///
/// Columns are stored as upper-case letters (A-XFD) and rows as 1-based numbers
/// (1-1048576), exactly as they appear in formula text. The optional `$` prefix
/// marks the column and/or row as absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellAddress {
    /// Sheet qualifier, unquoted (`None` means "the sheet of the formula")
    pub sheet: Option<String>,
    /// Column letters, upper-case
    pub column: String,
    /// Row number (1-based)
    pub row: u32,
    /// Whether the column reference is absolute ($)
    pub absolute_column: bool,
    /// Whether the row reference is absolute ($)
    pub absolute_row: bool,
}

impl CellAddress {
    /// Create a new relative cell address without a sheet qualifier
    pub fn new(column: &str, row: u32) -> Result<Self> {
        Self::with_absolute(column, row, false, false)
    }

    /// Create a new cell address with specified absolute/relative flags
    pub fn with_absolute(
        column: &str,
        row: u32,
        absolute_column: bool,
        absolute_row: bool,
    ) -> Result<Self> {
        let index = column_to_index(column)?;
        check_row(row)?;
        Ok(Self {
            sheet: None,
            column: index_to_column(index),
            row,
            absolute_column,
            absolute_row,
        })
    }

    /// Create a relative address from 1-based row and column numbers
    pub fn from_indices(row: u32, col: u32) -> Result<Self> {
        if col == 0 || col > MAX_COLS {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS));
        }
        check_row(row)?;
        Ok(Self {
            sheet: None,
            column: index_to_column(col),
            row,
            absolute_column: false,
            absolute_row: false,
        })
    }

    /// Parse a cell address from A1-style notation, with an optional
    /// `Sheet!` or `'Sheet Name'!` prefix
    ///
    /// # Examples
    /// ```
    /// use drillsheets_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("b2").unwrap();
    /// assert_eq!(addr.column, "B");
    /// assert_eq!(addr.row, 2);
    ///
    /// let addr = CellAddress::parse("'Q1 Plan'!$C$3").unwrap();
    /// assert_eq!(addr.sheet.as_deref(), Some("Q1 Plan"));
    /// assert!(addr.absolute_column);
    /// assert!(addr.absolute_row);
    /// assert_eq!(addr.to_string(), "'Q1 Plan'!$C$3");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }

        let (sheet, local) = split_sheet_prefix(s)?;
        let mut addr = parse_local(local, s)?;
        addr.sheet = sheet;
        Ok(addr)
    }

    /// 1-based column number (A = 1, Z = 26, AA = 27, ...)
    pub fn column_index(&self) -> u32 {
        letters_value(&self.column)
    }

    /// Format as A1-style string without the sheet qualifier
    pub fn to_a1_string(&self) -> String {
        let mut result = String::new();

        if self.absolute_column {
            result.push('$');
        }
        result.push_str(&self.column);

        if self.absolute_row {
            result.push('$');
        }
        result.push_str(&self.row.to_string());

        result
    }

    /// The same cell with the sheet qualifier and `$` anchors removed
    pub fn local(&self) -> Self {
        Self {
            sheet: None,
            column: self.column.clone(),
            row: self.row,
            absolute_column: false,
            absolute_row: false,
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular block of cells (e.g., "A1:B10", "Data!$A$1:$A$200")
///
/// The start corner carries the sheet qualifier. Ranges are kept as written:
/// an end corner above or left of the start is an *inverted* range, which
/// contains no cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeReference {
    /// Start corner (and sheet qualifier)
    pub start: CellAddress,
    /// End corner column letters, upper-case
    pub range_end_column: String,
    /// End corner row number (1-based)
    pub range_end_row: u32,
    /// Whether the end column is absolute ($)
    pub end_absolute_column: bool,
    /// Whether the end row is absolute ($)
    pub end_absolute_row: bool,
}

impl RangeReference {
    /// Create a range from two corners; the sheet qualifier is taken from `start`
    pub fn new(start: CellAddress, end: CellAddress) -> Self {
        Self {
            start,
            range_end_column: end.column,
            range_end_row: end.row,
            end_absolute_column: end.absolute_column,
            end_absolute_row: end.absolute_row,
        }
    }

    /// Parse a range from `A1:B10` notation with an optional sheet prefix
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (sheet, local) = split_sheet_prefix(s)?;

        let colon_pos = local
            .find(':')
            .ok_or_else(|| Error::InvalidRange(format!("missing ':' in '{}'", s)))?;
        let mut start = parse_local(&local[..colon_pos], s)
            .map_err(|e| Error::InvalidRange(e.to_string()))?;
        let end = parse_local(&local[colon_pos + 1..], s)
            .map_err(|e| Error::InvalidRange(e.to_string()))?;
        start.sheet = sheet;

        Ok(Self::new(start, end))
    }

    /// Sheet qualifier, if any
    pub fn sheet(&self) -> Option<&str> {
        self.start.sheet.as_deref()
    }

    /// End corner as an address (qualified with the range's sheet)
    pub fn end(&self) -> CellAddress {
        CellAddress {
            sheet: self.start.sheet.clone(),
            column: self.range_end_column.clone(),
            row: self.range_end_row,
            absolute_column: self.end_absolute_column,
            absolute_row: self.end_absolute_row,
        }
    }

    /// Whether the end corner lies above or left of the start corner
    pub fn is_inverted(&self) -> bool {
        self.range_end_row < self.start.row
            || letters_value(&self.range_end_column) < self.start.column_index()
    }

    /// Get the number of rows in the range
    pub fn row_count(&self) -> u32 {
        if self.is_inverted() {
            0
        } else {
            self.range_end_row - self.start.row + 1
        }
    }

    /// Get the number of columns in the range
    pub fn col_count(&self) -> u32 {
        if self.is_inverted() {
            0
        } else {
            letters_value(&self.range_end_column) - self.start.column_index() + 1
        }
    }

    /// Get the total number of cells in the range
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// Iterate over all cell addresses in the range, row by row
    pub fn cells(&self) -> RangeCells {
        let start_col = self.start.column_index();
        let end_col = letters_value(&self.range_end_column);
        let exhausted = self.is_inverted();

        RangeCells {
            sheet: self.start.sheet.clone(),
            start_col,
            end_col,
            end_row: self.range_end_row,
            current_row: self.start.row,
            current_col: start_col,
            exhausted,
        }
    }

    /// Format as `A1:B10` without the sheet qualifier
    pub fn to_a1_string(&self) -> String {
        format!("{}:{}", self.start.to_a1_string(), self.end().to_a1_string())
    }
}

impl fmt::Display for RangeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.start.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for RangeReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Iterator over cells in a range (outer loop rows, inner loop columns)
#[derive(Debug, Clone)]
pub struct RangeCells {
    sheet: Option<String>,
    start_col: u32,
    end_col: u32,
    end_row: u32,
    current_row: u32,
    current_col: u32,
    exhausted: bool,
}

impl Iterator for RangeCells {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.current_row > self.end_row {
            return None;
        }

        let addr = CellAddress {
            sheet: self.sheet.clone(),
            column: index_to_column(self.current_col),
            row: self.current_row,
            absolute_column: false,
            absolute_row: false,
        };

        // Move to next cell
        self.current_col += 1;
        if self.current_col > self.end_col {
            self.current_col = self.start_col;
            self.current_row += 1;
        }

        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted || self.current_row > self.end_row {
            return (0, Some(0));
        }
        let width = (self.end_col - self.start_col + 1) as u64;
        let full_rows = (self.end_row - self.current_row) as u64;
        let in_row = (self.end_col - self.current_col + 1) as u64;
        let remaining = (full_rows * width + in_row) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RangeCells {}

/// A reference token found in formula text: a single cell or a range
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellReference {
    /// Single cell reference (`B2`, `Sheet2!$A$1`)
    Cell(CellAddress),
    /// Range reference (`A1:A10`)
    Range(RangeReference),
}

impl CellReference {
    /// Sheet qualifier, if any
    pub fn sheet(&self) -> Option<&str> {
        match self {
            CellReference::Cell(addr) => addr.sheet.as_deref(),
            CellReference::Range(range) => range.sheet(),
        }
    }

    /// Whether this token denotes a range
    pub fn is_range(&self) -> bool {
        matches!(self, CellReference::Range(_))
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellReference::Cell(addr) => addr.fmt(f),
            CellReference::Range(range) => range.fmt(f),
        }
    }
}

impl From<CellAddress> for CellReference {
    fn from(addr: CellAddress) -> Self {
        CellReference::Cell(addr)
    }
}

impl From<RangeReference> for CellReference {
    fn from(range: RangeReference) -> Self {
        CellReference::Range(range)
    }
}

/// Convert 1-based column number to letters (1 = A, 26 = Z, 27 = AA, etc.)
pub fn index_to_column(index: u32) -> String {
    let mut result = String::new();
    let mut n = index;

    while n > 0 {
        n -= 1;
        let c = ((n % 26) as u8 + b'A') as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}

/// Convert column letters to a 1-based number (A = 1, Z = 26, AA = 27, etc.)
pub fn column_to_index(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(Error::InvalidAddress("empty column letters".into()));
    }
    if let Some(c) = letters.chars().find(|c| !c.is_ascii_alphabetic()) {
        return Err(Error::InvalidAddress(format!(
            "invalid column letter '{}'",
            c
        )));
    }
    // Longer than XFD cannot be valid and would overflow
    if letters.len() > 3 {
        return Err(Error::InvalidAddress(format!(
            "column '{}' is too long",
            letters
        )));
    }

    let col = letters_value(letters);
    if col > MAX_COLS {
        return Err(Error::ColumnOutOfBounds(col, MAX_COLS));
    }

    Ok(col)
}

/// Quote a sheet name for use in a reference when it needs quoting
///
/// Names made only of letters, digits, `_` and `.` that start with a letter or
/// `_` and do not look like a cell address are left bare.
pub fn quote_sheet_name(name: &str) -> Cow<'_, str> {
    let bare = name
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && parse_local(name, name).is_err();

    if bare {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    }
}

/// Unchecked base-26 value of ASCII column letters
fn letters_value(letters: &str) -> u32 {
    letters.bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(26)
            .saturating_add((b.to_ascii_uppercase() - b'A') as u32 + 1)
    })
}

fn check_row(row: u32) -> Result<()> {
    if row == 0 {
        return Err(Error::InvalidAddress("row number must be >= 1".into()));
    }
    if row > MAX_ROWS {
        return Err(Error::RowOutOfBounds(row, MAX_ROWS));
    }
    Ok(())
}

/// Split `Sheet!A1` / `'Sheet Name'!A1` into the unquoted sheet and the rest
fn split_sheet_prefix(s: &str) -> Result<(Option<String>, &str)> {
    let Some(bang) = s.rfind('!') else {
        return Ok((None, s));
    };

    let prefix = &s[..bang];
    let sheet = match prefix
        .strip_prefix('\'')
        .and_then(|p| p.strip_suffix('\''))
    {
        Some(inner) => inner.replace("''", "'"),
        None => prefix.to_string(),
    };

    if sheet.trim().is_empty() {
        return Err(Error::InvalidAddress(format!(
            "empty sheet name in '{}'",
            s
        )));
    }

    Ok((Some(sheet), &s[bang + 1..]))
}

/// Parse the `$A$1` part of an address; `full` is only used in messages
fn parse_local(s: &str, full: &str) -> Result<CellAddress> {
    let bytes = s.as_bytes();
    let mut pos = 0;

    // Check for column absolute marker
    let absolute_column = if bytes.get(pos) == Some(&b'$') {
        pos += 1;
        true
    } else {
        false
    };

    // Parse column letters
    let col_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        pos += 1;
    }

    if pos == col_start {
        return Err(Error::InvalidAddress(format!(
            "no column letters in '{}'",
            full
        )));
    }

    let col = column_to_index(&s[col_start..pos])?;

    // Check for row absolute marker
    let absolute_row = if bytes.get(pos) == Some(&b'$') {
        pos += 1;
        true
    } else {
        false
    };

    // Parse row number
    let row_str = &s[pos..];
    if row_str.is_empty() {
        return Err(Error::InvalidAddress(format!(
            "no row number in '{}'",
            full
        )));
    }
    if !row_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAddress(format!(
            "invalid row number in '{}'",
            full
        )));
    }

    let row: u32 = row_str
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("row number too large in '{}'", full)))?;
    check_row(row)?;

    Ok(CellAddress {
        sheet: None,
        column: index_to_column(col),
        row,
        absolute_column,
        absolute_row,
    })
}
