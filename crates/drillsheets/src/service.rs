//! Drill-down service
//!
//! The facade a transport layer talks to. It owns the session store,
//! validates requests, opens a fresh workbook snapshot per call and runs
//! resolutions on a worker thread under a wall-clock timeout.
//!
//! ```rust,no_run
//! use drillsheets::DrillService;
//!
//! let service = DrillService::new();
//! let upload = service.open_workbook("model.xlsx").unwrap();
//! let drill = service
//!     .drill_down(&upload.session_id, &upload.sheets[0], "B12", 2)
//!     .unwrap();
//! for dep in &drill.dependencies {
//!     println!("{} = {}", dep.cell_reference, dep.value);
//! }
//! ```

use crate::component::{FormulaComponent, Termination};
use crate::error::{ServiceError, ServiceResult};
use crate::naming::{resolve_name, ResolvedName};
use crate::resolver::{Resolution, ResolveOptions, ResolveStats, WorkbookResolveExt};
use crate::session::{MemorySessionStore, Session, SessionStore};
use drillsheets_core::{
    column_to_index, index_to_column, CellAddress, CellContents, RowValue, WorkbookSnapshot,
    WorkbookSource, MAX_ROWS,
};
use drillsheets_formula::{classify, FormulaComplexity};
use drillsheets_xlsx::XlsxReader;
use lazy_regex::regex_is_match;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Options for the drill-down service
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Resolver settings; `max_depth` is replaced by each request's depth
    pub resolve: ResolveOptions,
    /// Wall-clock budget for one resolution
    pub timeout: Duration,
    /// Deepest drill-down a request may ask for
    pub max_request_depth: usize,
    /// Columns scanned when offering row values as names
    pub row_value_columns: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            resolve: ResolveOptions::default(),
            timeout: Duration::from_secs(30),
            max_request_depth: 5,
            row_value_columns: 20,
        }
    }
}

/// Opens workbook files
///
/// Every call gets its own source, so concurrent requests never share a
/// reader.
pub trait WorkbookLoader: Send + Sync + 'static {
    type Source: WorkbookSource + Send + 'static;

    /// Sheet names in workbook order, without loading cells
    fn sheet_names(&self, path: &Path) -> ServiceResult<Vec<String>>;

    /// Load the workbook
    fn open(&self, path: &Path) -> ServiceResult<Self::Source>;
}

/// Loads `.xlsx`/`.xlsm` files with [`XlsxReader`]
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxLoader;

impl WorkbookLoader for XlsxLoader {
    type Source = WorkbookSnapshot;

    fn sheet_names(&self, path: &Path) -> ServiceResult<Vec<String>> {
        Ok(XlsxReader::sheet_names_from_file(path)?)
    }

    fn open(&self, path: &Path) -> ServiceResult<WorkbookSnapshot> {
        Ok(XlsxReader::read_file(path)?)
    }
}

/// Result of opening a workbook
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UploadResponse {
    pub session_id: String,
    pub message: String,
    pub sheets: Vec<String>,
}

/// A single cell and its formula classification
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellInfo {
    pub sheet_name: String,
    pub cell_address: String,
    pub value: Option<f64>,
    pub formula: Option<String>,
    pub analysis: FormulaComplexity,
}

/// A dependency as presented to a user
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DependencyInfo {
    pub name: String,
    pub cell_reference: String,
    pub value: f64,
    pub formula: Option<String>,
    pub is_leaf: bool,
    /// Has a formula that was not expanded in this response
    pub can_expand: bool,
    /// Level below the source cell (direct dependencies are 1)
    pub depth: usize,
    pub termination: Option<Termination>,
    pub analysis: FormulaComplexity,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub naming: ResolvedName,
    pub children: Vec<DependencyInfo>,
}

/// Dependencies of one source cell
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DrillDownResponse {
    /// `Sheet!A1`
    pub source_cell: String,
    pub source_value: f64,
    pub source_formula: Option<String>,
    pub dependencies: Vec<DependencyInfo>,
    /// Requested depth
    pub depth: usize,
    pub total_dependencies: usize,
    pub stats: ResolveStats,
}

/// What a worker hands back: the snapshot it opened, the starting cell and
/// the tree (absent for constant cells)
struct Resolved<W> {
    source: W,
    start: CellContents,
    resolution: Option<Resolution>,
}

/// Drill-down service over a session store and a workbook loader
pub struct DrillService<S = MemorySessionStore, L = XlsxLoader> {
    store: S,
    loader: Arc<L>,
    options: ServiceOptions,
}

impl DrillService {
    /// In-memory sessions, XLSX files, default options
    pub fn new() -> Self {
        Self::with_parts(MemorySessionStore::new(), XlsxLoader, ServiceOptions::default())
    }
}

impl Default for DrillService {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SessionStore, L: WorkbookLoader> DrillService<S, L> {
    pub fn with_parts(store: S, loader: L, options: ServiceOptions) -> Self {
        Self {
            store,
            loader: Arc::new(loader),
            options,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open a workbook file and start a session for it
    pub fn open_workbook(&self, path: impl AsRef<Path>) -> ServiceResult<UploadResponse> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let lower = file_name.to_lowercase();
        if !(lower.ends_with(".xlsx") || lower.ends_with(".xlsm")) {
            return Err(ServiceError::UnsupportedFile(file_name));
        }

        let sheets = self.loader.sheet_names(path)?;
        let session = Session::new(file_name.as_str(), path, sheets.clone());
        let session_id = session.id.clone();
        self.store.put(session);

        log::info!("Opened '{}' as session {}", file_name, session_id);

        Ok(UploadResponse {
            session_id,
            message: format!("File '{}' opened successfully", file_name),
            sheets,
        })
    }

    /// Sheet names of a session's workbook
    pub fn sheets(&self, session_id: &str) -> ServiceResult<Vec<String>> {
        Ok(self.session(session_id)?.sheets)
    }

    /// Value, formula and classification of one cell
    pub fn analyze_cell(
        &self,
        session_id: &str,
        sheet: &str,
        address: &str,
    ) -> ServiceResult<CellInfo> {
        let session = self.session(session_id)?;
        let sheet = sheet_of(&session, sheet)?;
        let addr = validate_address(address)?;

        let source = self.loader.open(&session.path)?;
        let contents = source.read_cell(&sheet, &addr)?;

        Ok(CellInfo {
            analysis: classify(contents.formula.as_deref()),
            sheet_name: sheet,
            cell_address: addr.to_string(),
            value: contents.value,
            formula: contents.formula,
        })
    }

    /// Dependencies of a cell, `depth` levels deep (1 = direct only)
    pub fn drill_down(
        &self,
        session_id: &str,
        sheet: &str,
        address: &str,
        depth: usize,
    ) -> ServiceResult<DrillDownResponse> {
        if depth < 1 || depth > self.options.max_request_depth {
            return Err(ServiceError::DepthOutOfRange {
                depth,
                max: self.options.max_request_depth,
            });
        }

        let session = self.session(session_id)?;
        let sheet = sheet_of(&session, sheet)?;
        let addr = validate_address(address)?;
        let source_cell = format!("{}!{}", sheet, addr);

        let resolved = self.resolve_timed(&session, &sheet, &addr, depth)?;
        let (dependencies, stats) = match resolved.resolution {
            Some(Resolution {
                root: Some(root),
                stats,
            }) => (
                self.describe_all(&resolved.source, &session, root.dependencies, 1)?,
                stats,
            ),
            Some(Resolution { root: None, stats }) => (Vec::new(), stats),
            None => (Vec::new(), ResolveStats::default()),
        };

        Ok(DrillDownResponse {
            source_cell,
            source_value: resolved.start.value.unwrap_or(0.0),
            source_formula: resolved.start.formula,
            total_dependencies: dependencies.len(),
            dependencies,
            depth,
            stats,
        })
    }

    /// Direct dependencies of one cell, for expanding a node in place
    pub fn expand_dependency(
        &self,
        session_id: &str,
        sheet: &str,
        address: &str,
    ) -> ServiceResult<Vec<DependencyInfo>> {
        log::info!("Expanding dependency {}!{}", sheet, address);
        Ok(self.drill_down(session_id, sheet, address, 1)?.dependencies)
    }

    /// Non-empty values of a row, for choosing a naming column
    pub fn row_values(
        &self,
        session_id: &str,
        sheet: &str,
        row: u32,
    ) -> ServiceResult<Vec<RowValue>> {
        let session = self.session(session_id)?;
        let sheet = sheet_of(&session, sheet)?;
        if row == 0 || row > MAX_ROWS {
            return Err(ServiceError::InvalidAddress(format!("row {}", row)));
        }

        let source = self.loader.open(&session.path)?;
        Ok(source.row_values(&sheet, row, self.options.row_value_columns)?)
    }

    /// Use `column` as the label column of `sheet`; returns the normalized
    /// column letters
    pub fn configure_naming(
        &self,
        session_id: &str,
        sheet: &str,
        column: &str,
    ) -> ServiceResult<String> {
        let session = self.session(session_id)?;
        let sheet = sheet_of(&session, sheet)?;
        let column = column_to_index(column.trim())
            .map(index_to_column)
            .map_err(|_| ServiceError::InvalidAddress(column.to_string()))?;

        self.store
            .update(session_id, |s| {
                s.naming_columns.insert(sheet.clone(), column.clone());
            })
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        log::info!(
            "Sheet '{}' uses column {} for names in session {}",
            sheet,
            column,
            session_id
        );
        Ok(column)
    }

    /// Configured naming columns, sheet name -> column letters
    pub fn naming_config(&self, session_id: &str) -> ServiceResult<BTreeMap<String, String>> {
        Ok(self.session(session_id)?.naming_columns)
    }

    /// Record a user-supplied name for a cell
    pub fn mark_manual_name(
        &self,
        session_id: &str,
        sheet: &str,
        address: &str,
        name: &str,
    ) -> ServiceResult<()> {
        let session = self.session(session_id)?;
        let sheet = sheet_of(&session, sheet)?;
        let addr = validate_address(address)?;

        self.store
            .update(session_id, |s| {
                s.manual_names
                    .entry(sheet.clone())
                    .or_default()
                    .insert(addr.to_string(), name.to_string());
            })
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        log::info!("Marked {}!{} as manually named '{}'", sheet, addr, name);
        Ok(())
    }

    /// Names for a batch of `Sheet!A1` references
    pub fn resolved_names<I, R>(
        &self,
        session_id: &str,
        cell_references: I,
    ) -> ServiceResult<BTreeMap<String, ResolvedName>>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let session = self.session(session_id)?;
        let source = self.loader.open(&session.path)?;

        let mut names = BTreeMap::new();
        for reference in cell_references {
            let reference = reference.as_ref();
            let name = resolve_name(
                &source,
                &session,
                reference,
                self.options.row_value_columns,
            )?;
            names.insert(reference.to_string(), name);
        }
        Ok(names)
    }

    /// End a session
    pub fn close_session(&self, session_id: &str) -> ServiceResult<Session> {
        let session = self
            .store
            .delete(session_id)
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;
        log::info!("Closed session {} ('{}')", session.id, session.file_name);
        Ok(session)
    }

    fn session(&self, session_id: &str) -> ServiceResult<Session> {
        self.store
            .get(session_id)
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    /// Open the workbook and resolve on a worker thread, giving up after the
    /// configured timeout. On timeout the worker's cancel flag is raised so
    /// it stops walking the tree; whatever it returns is dropped.
    fn resolve_timed(
        &self,
        session: &Session,
        sheet: &str,
        addr: &CellAddress,
        depth: usize,
    ) -> ServiceResult<Resolved<L::Source>> {
        let loader = Arc::clone(&self.loader);
        let path = session.path.clone();
        let sheet = sheet.to_string();
        let addr = addr.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let options = ResolveOptions {
            max_depth: depth,
            cancel: Some(Arc::clone(&cancel)),
            ..self.options.resolve.clone()
        };
        let cell = format!("{}!{}", sheet, addr);

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("drillsheets-resolve".into())
            .spawn(move || {
                let job = || -> ServiceResult<Resolved<L::Source>> {
                    let source = loader.open(&path)?;
                    let start = source.read_cell(&sheet, &addr)?;
                    let resolution = match start.formula {
                        Some(_) => Some(source.resolve_with_stats(
                            &sheet,
                            &addr.to_string(),
                            &options,
                        )?),
                        None => None,
                    };
                    Ok(Resolved {
                        source,
                        start,
                        resolution,
                    })
                };
                // The receiver is gone after a timeout
                let _ = tx.send(job());
            })
            .map_err(|e| ServiceError::Workbook(format!("could not start worker: {}", e)))?;

        match rx.recv_timeout(self.options.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                log::warn!(
                    "Resolution of {} exceeded {:?}, cancelling",
                    cell,
                    self.options.timeout
                );
                Err(ServiceError::Timeout {
                    cell,
                    timeout: self.options.timeout,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ServiceError::Workbook(format!(
                "worker resolving {} stopped without a result",
                cell
            ))),
        }
    }

    fn describe_all(
        &self,
        source: &L::Source,
        session: &Session,
        components: Vec<FormulaComponent>,
        depth: usize,
    ) -> ServiceResult<Vec<DependencyInfo>> {
        components
            .into_iter()
            .map(|c| self.describe(source, session, c, depth))
            .collect()
    }

    fn describe(
        &self,
        source: &L::Source,
        session: &Session,
        component: FormulaComponent,
        depth: usize,
    ) -> ServiceResult<DependencyInfo> {
        let analysis = classify(component.formula.as_deref());
        let naming = resolve_name(
            source,
            session,
            &component.cell_reference,
            self.options.row_value_columns,
        )?;
        let can_expand = component.is_formula()
            && component.dependencies.is_empty()
            && component.termination != Some(Termination::ExternalReference);
        let children = self.describe_all(source, session, component.dependencies, depth + 1)?;

        Ok(DependencyInfo {
            name: component.name,
            cell_reference: component.cell_reference,
            value: component.value,
            formula: component.formula,
            is_leaf: component.is_leaf,
            can_expand,
            depth,
            termination: component.termination,
            analysis,
            naming,
            children,
        })
    }
}

/// Accept only plain `A1`-style addresses (letters then digits)
fn validate_address(address: &str) -> ServiceResult<CellAddress> {
    let upper = address.to_uppercase();
    if !regex_is_match!(r"^[A-Z]+[0-9]+$", &upper) {
        return Err(ServiceError::InvalidAddress(address.to_string()));
    }
    CellAddress::parse(&upper).map_err(|_| ServiceError::InvalidAddress(address.to_string()))
}

fn sheet_of(session: &Session, sheet: &str) -> ServiceResult<String> {
    session
        .find_sheet(sheet)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::SheetNotFound(sheet.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert_eq!(validate_address("b12").unwrap().to_string(), "B12");
        assert_eq!(validate_address("AC123").unwrap().to_string(), "AC123");

        for bad in ["", "12", "B", "$B$2", "Sheet1!A1", "A1:B2", "B 2", "XFE1", "A0"] {
            assert!(
                matches!(validate_address(bad), Err(ServiceError::InvalidAddress(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_default_options() {
        let options = ServiceOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.max_request_depth, 5);
        assert_eq!(options.row_value_columns, 20);
        assert_eq!(options.resolve.max_range_cells, 50);
    }
}
