//! Error types for drillsheets-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in drillsheets-core
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row number out of bounds (1-based)
    #[error("Row {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column number out of bounds (1-based)
    #[error("Column {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u32),

    /// Sheet not found by name
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Duplicate sheet name
    #[error("Sheet name already exists: {0}")]
    DuplicateSheetName(String),

    /// The workbook backend failed to produce a cell
    #[error("Workbook read failure: {0}")]
    Workbook(String),
}

impl Error {
    /// Create a backend failure with a message
    pub fn workbook<S: Into<String>>(msg: S) -> Self {
        Error::Workbook(msg.into())
    }

    /// Whether this error means "the thing asked for does not exist"
    /// rather than "the workbook could not be read".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress(_)
                | Error::InvalidRange(_)
                | Error::RowOutOfBounds(..)
                | Error::ColumnOutOfBounds(..)
                | Error::SheetNotFound(_)
        )
    }
}
