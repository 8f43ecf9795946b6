//! # drillsheets-xlsx
//!
//! XLSX (Office Open XML) reader for drillsheets.
//!
//! The reader makes one pass over the package and keeps both the formula
//! text and the last cached value of every cell, so a single snapshot serves
//! formula inspection and value lookup alike. The zip handle is released
//! before [`XlsxReader::read`] returns, on success and on error.

pub mod error;
pub mod reader;

pub use error::{XlsxError, XlsxResult};
pub use reader::XlsxReader;
