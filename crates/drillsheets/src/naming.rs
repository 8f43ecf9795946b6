//! Human-readable names for dependency cells
//!
//! A sheet can be given a naming column: the label for any cell is then the
//! text found in that column on the cell's row. Without one, the row's
//! non-empty values are offered so a caller can pick a column. A manual name
//! set for the cell is reported alongside either way.

use crate::session::Session;
use drillsheets_core::{CellAddress, Result, RowValue, WorkbookSource};
use std::fmt;

/// Where a resolved name came from; serialized as its display text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    /// Text from the sheet's naming column
    Column(String),
}

impl fmt::Display for NameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameSource::Column(letters) => write!(f, "Column {}", letters),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NameSource {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Naming information for one cell reference
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedName {
    pub resolved_name: Option<String>,
    pub name_source: Option<NameSource>,
    /// Offered only when no name was resolved
    pub row_values: Option<Vec<RowValue>>,
    pub manual_name: Option<String>,
}

/// Look up the name of `cell_reference` (`Sheet!A1`)
///
/// References that do not split into a known sheet and a valid address get
/// an empty result rather than an error; only workbook read failures are
/// returned as errors.
pub fn resolve_name<W: WorkbookSource + ?Sized>(
    source: &W,
    session: &Session,
    cell_reference: &str,
    row_value_columns: u32,
) -> Result<ResolvedName> {
    let Some((sheet, address)) = cell_reference.rsplit_once('!') else {
        return Ok(ResolvedName::default());
    };
    let Ok(addr) = CellAddress::parse(address) else {
        return Ok(ResolvedName::default());
    };

    let mut resolved = ResolvedName {
        manual_name: session.manual_name(sheet, &addr.to_string()).map(str::to_string),
        ..ResolvedName::default()
    };

    if let Some(column) = session.naming_column(sheet) {
        let label_cell = CellAddress::new(column, addr.row)?;
        if let Some(text) = not_found_as_none(source.cell_text(sheet, &label_cell))?.flatten() {
            let text = text.trim();
            if !text.is_empty() {
                resolved.resolved_name = Some(text.to_string());
                resolved.name_source = Some(NameSource::Column(column.to_string()));
                return Ok(resolved);
            }
        }
    }

    resolved.row_values = not_found_as_none(source.row_values(sheet, addr.row, row_value_columns))?;
    Ok(resolved)
}

fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
