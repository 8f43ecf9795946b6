//! Service error types

use std::time::Duration;
use thiserror::Error;

/// Result type for [`DrillService`](crate::DrillService) operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced to callers of the drill-down service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No session with this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Cell address is not of the `A1` form
    #[error("Invalid cell address '{0}'. Use a format like 'A1', 'B5', 'AC123'")]
    InvalidAddress(String),

    /// Sheet is not part of the session's workbook
    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    /// Requested drill-down depth outside the accepted range
    #[error("Depth {depth} out of range (1..={max})")]
    DepthOutOfRange { depth: usize, max: usize },

    /// File is not a workbook this service can open
    #[error("Unsupported file '{0}'. Please provide an Excel workbook (.xlsx or .xlsm)")]
    UnsupportedFile(String),

    /// Resolution did not finish in time; no partial result is kept
    #[error("Resolution of {cell} did not finish within {timeout:?}")]
    Timeout { cell: String, timeout: Duration },

    /// The worker running a resolution stopped without answering
    #[error("Workbook worker failed: {0}")]
    Workbook(String),

    /// Reading the workbook package failed
    #[error("XLSX error: {0}")]
    Xlsx(#[from] drillsheets_xlsx::XlsxError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] drillsheets_core::Error),
}

impl ServiceError {
    /// Whether the caller asked for something that does not exist or is
    /// malformed, as opposed to a failure while reading
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::SessionNotFound(_)
                | ServiceError::InvalidAddress(_)
                | ServiceError::SheetNotFound(_)
                | ServiceError::DepthOutOfRange { .. }
                | ServiceError::UnsupportedFile(_)
        )
    }
}
