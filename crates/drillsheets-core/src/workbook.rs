//! Workbook access - the read interface the resolver consumes, and an
//! in-memory workbook that implements it

use crate::cell::{column_to_index, index_to_column, CellAddress};
use crate::error::{Error, Result};
use ahash::AHashMap;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// The last-computed content of a cell, as stored in the file
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CachedValue {
    /// No content
    #[default]
    Empty,
    /// Numeric content (integers are stored as floats)
    Number(f64),
    /// Text content
    Text(String),
    /// Boolean content
    Boolean(bool),
    /// A date/time, as the 1900-system serial stored in the file
    Date(f64),
    /// Error content such as `#REF!`
    Error(String),
}

impl CachedValue {
    /// The numeric value, or `None` for anything that is not a number
    ///
    /// Dates are not numbers here even though they are stored as serials.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CachedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Display text of the value, or `None` when empty
    pub fn display_text(&self) -> Option<String> {
        match self {
            CachedValue::Empty => None,
            CachedValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{}", n))
                }
            }
            CachedValue::Text(s) if s.trim().is_empty() => None,
            CachedValue::Text(s) => Some(s.clone()),
            CachedValue::Boolean(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CachedValue::Date(serial) => Some(match excel_serial_to_datetime(*serial) {
                Some(dt) if serial.fract() == 0.0 => dt.date().to_string(),
                Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => serial.to_string(),
            }),
            CachedValue::Error(e) => Some(e.clone()),
        }
    }

    /// Whether the cell has no content
    pub fn is_empty(&self) -> bool {
        matches!(self, CachedValue::Empty)
    }
}

/// Convert a 1900-system date serial (1 = 1900-01-01) to a date and time
///
/// Serial 60 is Excel's phantom 1900-02-29 and has no calendar date.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial.trunc() == 60.0 || serial >= 2_958_466.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let adjusted = if days > 60 { days - 1 } else { days };
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;

    let base = NaiveDate::from_ymd_opt(1899, 12, 31)?.and_hms_opt(0, 0, 0)?;
    base.checked_add_signed(Duration::days(adjusted))?
        .checked_add_signed(Duration::seconds(seconds))
}

impl From<f64> for CachedValue {
    fn from(n: f64) -> Self {
        CachedValue::Number(n)
    }
}

impl From<&str> for CachedValue {
    fn from(s: &str) -> Self {
        CachedValue::Text(s.to_string())
    }
}

impl From<String> for CachedValue {
    fn from(s: String) -> Self {
        CachedValue::Text(s)
    }
}

impl From<bool> for CachedValue {
    fn from(b: bool) -> Self {
        CachedValue::Boolean(b)
    }
}

/// What the resolver sees of a cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellContents {
    /// Cached value, only when numeric
    pub value: Option<f64>,
    /// Raw formula text (with leading `=`), only for formula cells
    pub formula: Option<String>,
}

/// A stored cell: cached content plus formula text when the cell is a formula
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellRecord {
    /// Last-computed content
    pub cached: CachedValue,
    /// Formula text with leading `=`
    pub formula: Option<String>,
}

impl CellRecord {
    fn contents(&self) -> CellContents {
        CellContents {
            value: self.cached.as_number(),
            formula: self.formula.clone(),
        }
    }
}

/// A non-empty cell in a row, used to offer naming columns
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowValue {
    /// Column letters
    pub column: String,
    /// Display text
    pub value: String,
}

/// Read access to one workbook snapshot
///
/// Sheet names supplied by callers may differ from the stored names in case
/// and surrounding whitespace; implementations resolve them to the stored
/// name or fail with [`Error::SheetNotFound`].
pub trait WorkbookSource {
    /// Sheet names in workbook order
    fn list_sheets(&self) -> Vec<String>;

    /// Read the numeric cached value and formula text of a cell
    ///
    /// The address's own sheet qualifier is ignored; `sheet` decides.
    fn read_cell(&self, sheet: &str, address: &CellAddress) -> Result<CellContents>;

    /// Display text of a cell's cached content
    fn cell_text(&self, sheet: &str, address: &CellAddress) -> Result<Option<String>>;

    /// Resolve a caller-supplied sheet name to the stored name
    fn resolve_sheet_name(&self, name: &str) -> Result<String> {
        let wanted = name.trim().to_lowercase();
        self.list_sheets()
            .into_iter()
            .find(|s| s.trim().to_lowercase() == wanted)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))
    }

    /// Non-empty cells of a row among the first `max_columns` columns
    fn row_values(&self, sheet: &str, row: u32, max_columns: u32) -> Result<Vec<RowValue>> {
        let mut values = Vec::new();
        for col in 1..=max_columns {
            let addr = CellAddress::from_indices(row, col)?;
            if let Some(value) = self.cell_text(sheet, &addr)? {
                values.push(RowValue {
                    column: addr.column,
                    value,
                });
            }
        }
        Ok(values)
    }
}

/// One sheet of a [`WorkbookSnapshot`]
#[derive(Debug, Clone, Default)]
pub struct SheetSnapshot {
    name: String,
    /// (row, column), both 1-based
    cells: AHashMap<(u32, u32), CellRecord>,
}

impl SheetSnapshot {
    /// Create an empty sheet
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: AHashMap::new(),
        }
    }

    /// Sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Get a stored cell
    pub fn cell(&self, address: &CellAddress) -> Option<&CellRecord> {
        self.cells.get(&(address.row, address.column_index()))
    }

    /// Store a cell, replacing any previous content
    pub fn set_cell(&mut self, row: u32, col: u32, record: CellRecord) {
        self.cells.insert((row, col), record);
    }

    /// Iterate over formula cells as (address, formula text)
    pub fn formula_cells(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.cells.iter().filter_map(|((row, col), record)| {
            record
                .formula
                .as_deref()
                .map(|f| (format!("{}{}", index_to_column(*col), row), f))
        })
    }
}

/// A fully loaded workbook: every sheet's formulas and cached values
///
/// Readers build one of these per open; it owns no file handle, so a snapshot
/// can be moved to another thread and dropped at any point.
#[derive(Debug, Clone, Default)]
pub struct WorkbookSnapshot {
    sheets: Vec<SheetSnapshot>,
}

impl WorkbookSnapshot {
    /// Create an empty workbook with no sheets
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty sheet, returning its index
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        self.push_sheet(SheetSnapshot::new(name))
    }

    /// Add a populated sheet, returning its index
    pub fn push_sheet(&mut self, sheet: SheetSnapshot) -> Result<usize> {
        let lower = sheet.name.to_lowercase();
        if self.sheets.iter().any(|s| s.name.to_lowercase() == lower) {
            return Err(Error::DuplicateSheetName(sheet.name));
        }
        self.sheets.push(sheet);
        Ok(self.sheets.len() - 1)
    }

    /// Number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Find a sheet by name (case-insensitive, whitespace-trimmed)
    pub fn sheet(&self, name: &str) -> Option<&SheetSnapshot> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|s| s.name.trim().to_lowercase() == wanted)
    }

    /// Find a sheet by name for modification
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut SheetSnapshot> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter_mut()
            .find(|s| s.name.trim().to_lowercase() == wanted)
    }

    /// Iterate over sheets in order
    pub fn sheets(&self) -> impl Iterator<Item = &SheetSnapshot> {
        self.sheets.iter()
    }

    /// Store a cell given an A1 address
    pub fn set_cell(&mut self, sheet: &str, address: &str, record: CellRecord) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        let col = column_to_index(&addr.column)?;
        let target = self
            .sheet_mut(sheet)
            .ok_or_else(|| Error::SheetNotFound(sheet.to_string()))?;
        target.set_cell(addr.row, col, record);
        Ok(())
    }

    /// Store a constant number
    pub fn set_number(&mut self, sheet: &str, address: &str, value: f64) -> Result<()> {
        self.set_value(sheet, address, value)
    }

    /// Store a constant of any kind
    pub fn set_value<V: Into<CachedValue>>(
        &mut self,
        sheet: &str,
        address: &str,
        value: V,
    ) -> Result<()> {
        self.set_cell(
            sheet,
            address,
            CellRecord {
                cached: value.into(),
                formula: None,
            },
        )
    }

    /// Store a formula with its cached result; a missing `=` is added
    pub fn set_formula<V: Into<CachedValue>>(
        &mut self,
        sheet: &str,
        address: &str,
        formula: &str,
        cached: V,
    ) -> Result<()> {
        let formula = if formula.starts_with('=') {
            formula.to_string()
        } else {
            format!("={}", formula)
        };
        self.set_cell(
            sheet,
            address,
            CellRecord {
                cached: cached.into(),
                formula: Some(formula),
            },
        )
    }

    fn record(&self, sheet: &str, address: &CellAddress) -> Result<Option<&CellRecord>> {
        let target = self
            .sheet(sheet)
            .ok_or_else(|| Error::SheetNotFound(sheet.to_string()))?;
        Ok(target.cell(address))
    }
}

impl WorkbookSource for WorkbookSnapshot {
    fn list_sheets(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_cell(&self, sheet: &str, address: &CellAddress) -> Result<CellContents> {
        Ok(self
            .record(sheet, address)?
            .map(CellRecord::contents)
            .unwrap_or_default())
    }

    fn cell_text(&self, sheet: &str, address: &CellAddress) -> Result<Option<String>> {
        Ok(self
            .record(sheet, address)?
            .and_then(|r| r.cached.display_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> WorkbookSnapshot {
        let mut wb = WorkbookSnapshot::new();
        wb.add_sheet("Income Statement").unwrap();
        wb.set_value("Income Statement", "A2", "Revenue").unwrap();
        wb.set_number("Income Statement", "B2", 1200.0).unwrap();
        wb.set_formula("Income Statement", "C2", "B2*2", 2400.0)
            .unwrap();
        wb.set_formula("Income Statement", "D2", "=A2&\"!\"", "Revenue!")
            .unwrap();
        wb.set_value("Income Statement", "E2", true).unwrap();
        wb.set_value("Income Statement", "F2", CachedValue::Date(45292.0))
            .unwrap();
        wb
    }

    #[test]
    fn test_sheet_lookup_is_case_insensitive() {
        let wb = sample();
        assert_eq!(
            wb.resolve_sheet_name("  income statement ").unwrap(),
            "Income Statement"
        );
        assert!(matches!(
            wb.resolve_sheet_name("Balance Sheet"),
            Err(Error::SheetNotFound(_))
        ));
    }

    #[test]
    fn test_read_cell_numeric_only() {
        let wb = sample();
        let read = |a: &str| {
            wb.read_cell("INCOME STATEMENT", &CellAddress::parse(a).unwrap())
                .unwrap()
        };

        assert_eq!(
            read("B2"),
            CellContents {
                value: Some(1200.0),
                formula: None
            }
        );
        assert_eq!(read("C2").formula.as_deref(), Some("=B2*2"));
        assert_eq!(read("C2").value, Some(2400.0));

        // Text, boolean and empty cells carry no value
        assert_eq!(read("A2").value, None);
        assert_eq!(read("D2").value, None);
        assert_eq!(read("D2").formula.as_deref(), Some("=A2&\"!\""));
        assert_eq!(read("E2").value, None);
        assert_eq!(read("F2").value, None);
        assert_eq!(read("Z99"), CellContents::default());
    }

    #[test]
    fn test_date_serials() {
        let text = |serial: f64| CachedValue::Date(serial).display_text();

        assert_eq!(text(1.0).as_deref(), Some("1900-01-01"));
        assert_eq!(text(59.0).as_deref(), Some("1900-02-28"));
        assert_eq!(text(61.0).as_deref(), Some("1900-03-01"));
        assert_eq!(text(45292.0).as_deref(), Some("2024-01-01"));
        assert_eq!(text(45292.5).as_deref(), Some("2024-01-01 12:00:00"));
        // No calendar date: fall back to the serial
        assert_eq!(text(60.0).as_deref(), Some("60"));
        assert_eq!(CachedValue::Date(45292.0).as_number(), None);
    }

    #[test]
    fn test_missing_sheet_is_an_error() {
        let wb = sample();
        let err = wb
            .read_cell("Nope", &CellAddress::parse("A1").unwrap())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_row_values() {
        let wb = sample();
        let values = wb.row_values("Income Statement", 2, 20).unwrap();
        let columns: Vec<&str> = values.iter().map(|v| v.column.as_str()).collect();
        assert_eq!(columns, vec!["A", "B", "C", "D", "E", "F"]);
        assert_eq!(values[0].value, "Revenue");
        assert_eq!(values[1].value, "1200");
        assert_eq!(values[4].value, "TRUE");
        assert_eq!(values[5].value, "2024-01-01");
    }

    #[test]
    fn test_duplicate_sheet_rejected() {
        let mut wb = sample();
        assert!(matches!(
            wb.add_sheet("income statement"),
            Err(Error::DuplicateSheetName(_))
        ));
    }
}
