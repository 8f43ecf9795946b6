//! Prelude module - common imports for drillsheets users
//!
//! ```rust
//! use drillsheets::prelude::*;
//! ```

pub use crate::{
    classify,
    // Addressing
    CellAddress,
    CellReference,
    // Formula analysis
    Complexity,
    DrillService,
    // Errors
    Error,
    FormulaComplexity,
    // Dependency trees
    FormulaComponent,
    RangeReference,
    ResolveOptions,
    ResolveStats,
    Result,
    ServiceError,
    // Service
    ServiceOptions,
    Termination,
    // Workbooks
    WorkbookResolveExt,
    WorkbookSnapshot,
    WorkbookSource,
    XlsxReader,
};
