//! Tests for the drill-down service: sessions, validation, naming and timeouts

mod common;

use common::{sample_workbook, write_xlsx, SnapshotLoader};
use drillsheets::{
    CellAddress, CellContents, DrillService, MemorySessionStore, NameSource, ResolvedName,
    RowValue, ServiceError, ServiceOptions, ServiceResult, SessionStore, Termination,
    WorkbookLoader, WorkbookSnapshot, WorkbookSource,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn service_for(workbook: WorkbookSnapshot) -> DrillService<MemorySessionStore, SnapshotLoader> {
    DrillService::with_parts(
        MemorySessionStore::new(),
        SnapshotLoader::new(workbook),
        ServiceOptions::default(),
    )
}

/// A labelled P&L sheet: names in column A, values in column C
fn labelled_workbook() -> WorkbookSnapshot {
    let mut wb = WorkbookSnapshot::new();
    wb.add_sheet("P&L").unwrap();
    wb.set_value("P&L", "A2", "Revenue").unwrap();
    wb.set_value("P&L", "B2", "FY24").unwrap();
    wb.set_number("P&L", "C2", 1200.0).unwrap();
    wb.set_value("P&L", "A3", "Costs").unwrap();
    wb.set_number("P&L", "C3", -700.0).unwrap();
    wb.set_value("P&L", "A4", "Margin").unwrap();
    wb.set_formula("P&L", "C4", "=C2+C3", 500.0).unwrap();
    wb
}

/// Opening a workbook creates a session listing its sheets
#[test]
fn test_open_workbook() {
    let service = service_for(sample_workbook());
    let upload = service.open_workbook("/data/Model.XLSX").unwrap();

    assert_eq!(upload.sheets, vec!["Sheet1".to_string()]);
    assert_eq!(upload.message, "File 'Model.XLSX' opened successfully");
    assert_eq!(service.sheets(&upload.session_id).unwrap(), upload.sheets);
    assert_eq!(service.store().ids(), vec![upload.session_id.clone()]);

    let err = service.open_workbook("/data/model.csv").unwrap_err();
    assert!(matches!(err, ServiceError::UnsupportedFile(ref f) if f == "model.csv"));
    assert!(err.is_client_error());
}

/// Drill-down returns the dependencies below the source cell
#[test]
fn test_drill_down() {
    let service = service_for(sample_workbook());
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let drill = service.drill_down(&session, "sheet1", "a1", 2).unwrap();
    assert_eq!(drill.source_cell, "Sheet1!A1");
    assert_eq!(drill.source_value, 20.0);
    assert_eq!(drill.source_formula.as_deref(), Some("=B1+C1"));
    assert_eq!(drill.depth, 2);
    assert_eq!(drill.total_dependencies, 2);
    assert_eq!(drill.stats.nodes, 4);

    let b1 = &drill.dependencies[0];
    assert_eq!(b1.cell_reference, "Sheet1!B1");
    assert_eq!(b1.depth, 1);
    assert!(b1.is_leaf);
    assert!(!b1.can_expand);

    let c1 = &drill.dependencies[1];
    assert!(!c1.can_expand);
    assert_eq!(c1.children.len(), 1);
    assert_eq!(c1.children[0].cell_reference, "Sheet1!D1");
    assert_eq!(c1.children[0].depth, 2);
    assert_eq!(c1.analysis.reference_count, 1);
}

/// At depth 1 formula children are offered for expansion
#[test]
fn test_drill_down_one_level_and_expand() {
    let service = service_for(sample_workbook());
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let drill = service.drill_down(&session, "Sheet1", "A1", 1).unwrap();
    let c1 = &drill.dependencies[1];
    assert!(c1.can_expand);
    assert!(c1.children.is_empty());
    assert_eq!(c1.termination, Some(Termination::DepthLimit));

    let expanded = service.expand_dependency(&session, "Sheet1", "C1").unwrap();
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].cell_reference, "Sheet1!D1");
    assert_eq!(expanded[0].value, 5.0);
}

/// A constant source cell has no dependencies
#[test]
fn test_drill_down_constant() {
    let service = service_for(sample_workbook());
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let drill = service.drill_down(&session, "Sheet1", "B1", 3).unwrap();
    assert_eq!(drill.source_value, 10.0);
    assert_eq!(drill.source_formula, None);
    assert!(drill.dependencies.is_empty());
    assert_eq!(drill.total_dependencies, 0);
}

/// External links are shown but never offered for expansion
#[test]
fn test_external_dependency_not_expandable() {
    let mut wb = sample_workbook();
    wb.set_formula("Sheet1", "E1", "=[Plan.xlsx]Inputs!B4", 3.0)
        .unwrap();
    wb.set_formula("Sheet1", "F1", "=E1*2", 6.0).unwrap();
    let service = service_for(wb);
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let drill = service.drill_down(&session, "Sheet1", "F1", 3).unwrap();
    let e1 = &drill.dependencies[0];
    assert_eq!(e1.termination, Some(Termination::ExternalReference));
    assert!(e1.analysis.has_external_refs);
    assert!(!e1.can_expand);
}

/// Bad input is rejected before any workbook is read
#[test]
fn test_request_validation() {
    let service = service_for(sample_workbook());
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    assert!(matches!(
        service.drill_down("no-such-session", "Sheet1", "A1", 1),
        Err(ServiceError::SessionNotFound(_))
    ));
    assert!(matches!(
        service.drill_down(&session, "Nope", "A1", 1),
        Err(ServiceError::SheetNotFound(_))
    ));
    for address in ["A", "1A", "A1:B2", "$A$1", "Sheet1!A1", ""] {
        assert!(
            matches!(
                service.drill_down(&session, "Sheet1", address, 1),
                Err(ServiceError::InvalidAddress(_))
            ),
            "{:?} should be rejected",
            address
        );
    }
    for depth in [0, 6] {
        assert!(matches!(
            service.drill_down(&session, "Sheet1", "A1", depth),
            Err(ServiceError::DepthOutOfRange { max: 5, .. })
        ));
    }
}

/// Cell analysis reports value, formula and classification
#[test]
fn test_analyze_cell() {
    let mut wb = sample_workbook();
    wb.set_formula("Sheet1", "G1", "=VLOOKUP(A1,Data!A1:C10,2,0)", 1.0)
        .unwrap();
    let service = service_for(wb);
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let info = service.analyze_cell(&session, "SHEET1", "g1").unwrap();
    assert_eq!(info.sheet_name, "Sheet1");
    assert_eq!(info.cell_address, "G1");
    assert_eq!(info.value, Some(1.0));
    assert_eq!(info.analysis.main_function.as_deref(), Some("VLOOKUP"));
    assert!(info.analysis.has_cross_sheet_refs);
    assert_eq!(info.analysis.complexity.as_str(), "moderate");

    let blank = service.analyze_cell(&session, "Sheet1", "Z99").unwrap();
    assert_eq!(blank.value, None);
    assert!(!blank.analysis.can_drill_down);
}

/// Without a naming column, row values are offered instead of a name
#[test]
fn test_row_values_offered_without_naming_column() {
    let service = service_for(labelled_workbook());
    let session = service.open_workbook("pl.xlsx").unwrap().session_id;

    let drill = service.drill_down(&session, "P&L", "C4", 1).unwrap();
    let revenue = &drill.dependencies[0];
    assert_eq!(revenue.naming.resolved_name, None);
    assert_eq!(
        revenue.naming.row_values,
        Some(vec![
            RowValue {
                column: "A".into(),
                value: "Revenue".into()
            },
            RowValue {
                column: "B".into(),
                value: "FY24".into()
            },
            RowValue {
                column: "C".into(),
                value: "1200".into()
            },
        ])
    );

    assert_eq!(
        service.row_values(&session, "P&L", 3).unwrap().len(),
        2
    );
    assert!(matches!(
        service.row_values(&session, "P&L", 0),
        Err(ServiceError::InvalidAddress(_))
    ));
}

/// A naming column labels dependencies by their row
#[test]
fn test_naming_column() {
    let service = service_for(labelled_workbook());
    let session = service.open_workbook("pl.xlsx").unwrap().session_id;

    assert_eq!(service.configure_naming(&session, "p&l", " a ").unwrap(), "A");
    assert_eq!(
        service.naming_config(&session).unwrap().get("P&L").map(String::as_str),
        Some("A")
    );
    assert!(matches!(
        service.configure_naming(&session, "P&L", "A1"),
        Err(ServiceError::InvalidAddress(_))
    ));

    let drill = service.drill_down(&session, "P&L", "C4", 1).unwrap();
    let names: Vec<Option<&str>> = drill
        .dependencies
        .iter()
        .map(|d| d.naming.resolved_name.as_deref())
        .collect();
    assert_eq!(names, vec![Some("Revenue"), Some("Costs")]);
    assert_eq!(
        drill.dependencies[0].naming.name_source,
        Some(NameSource::Column("A".into()))
    );
    assert_eq!(drill.dependencies[0].naming.row_values, None);
}

/// Manual names are stored per sheet and reported with the dependency
#[test]
fn test_manual_names() {
    let service = service_for(labelled_workbook());
    let session = service.open_workbook("pl.xlsx").unwrap().session_id;

    service
        .mark_manual_name(&session, "P&L", "c3", "Operating costs")
        .unwrap();

    let names = service
        .resolved_names(&session, ["P&L!C3", "P&L!C2", "bogus"])
        .unwrap();
    assert_eq!(
        names["P&L!C3"].manual_name.as_deref(),
        Some("Operating costs")
    );
    assert_eq!(names["P&L!C2"].manual_name, None);
    assert_eq!(names["bogus"], ResolvedName::default());

    let drill = service.drill_down(&session, "P&L", "C4", 1).unwrap();
    assert_eq!(
        drill.dependencies[1].naming.manual_name.as_deref(),
        Some("Operating costs")
    );
}

/// Closing a session forgets it
#[test]
fn test_close_session() {
    let service = service_for(sample_workbook());
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let closed = service.close_session(&session).unwrap();
    assert_eq!(closed.file_name, "m.xlsx");
    assert!(service.store().is_empty());
    assert!(matches!(
        service.sheets(&session),
        Err(ServiceError::SessionNotFound(_))
    ));
    assert!(matches!(
        service.close_session(&session),
        Err(ServiceError::SessionNotFound(_))
    ));
}

/// A resolution that overruns its budget is reported as a timeout
#[test]
fn test_timeout() {
    let service = DrillService::with_parts(
        MemorySessionStore::new(),
        SnapshotLoader::slow(sample_workbook(), Duration::from_millis(500)),
        ServiceOptions {
            timeout: Duration::from_millis(20),
            ..ServiceOptions::default()
        },
    );
    let session = service.open_workbook("m.xlsx").unwrap().session_id;

    let err = service.drill_down(&session, "Sheet1", "A1", 2).unwrap_err();
    match err {
        ServiceError::Timeout { cell, timeout } => {
            assert_eq!(cell, "Sheet1!A1");
            assert_eq!(timeout, Duration::from_millis(20));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

/// Counts and slows down every cell read
struct SlowReads {
    inner: WorkbookSnapshot,
    reads: Arc<AtomicUsize>,
}

impl WorkbookSource for SlowReads {
    fn list_sheets(&self) -> Vec<String> {
        self.inner.list_sheets()
    }

    fn read_cell(
        &self,
        sheet: &str,
        address: &CellAddress,
    ) -> drillsheets::Result<CellContents> {
        std::thread::sleep(Duration::from_millis(20));
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_cell(sheet, address)
    }

    fn cell_text(
        &self,
        sheet: &str,
        address: &CellAddress,
    ) -> drillsheets::Result<Option<String>> {
        self.inner.cell_text(sheet, address)
    }
}

struct SlowReadsLoader {
    workbook: WorkbookSnapshot,
    reads: Arc<AtomicUsize>,
}

impl WorkbookLoader for SlowReadsLoader {
    type Source = SlowReads;

    fn sheet_names(&self, _path: &Path) -> ServiceResult<Vec<String>> {
        Ok(self.workbook.list_sheets())
    }

    fn open(&self, _path: &Path) -> ServiceResult<SlowReads> {
        Ok(SlowReads {
            inner: self.workbook.clone(),
            reads: Arc::clone(&self.reads),
        })
    }
}

/// After a timeout the worker stops reading cells instead of finishing the tree
#[test]
fn test_timed_out_worker_stops() {
    let mut wb = WorkbookSnapshot::new();
    wb.add_sheet("Data").unwrap();
    for row in 1..=50 {
        wb.set_number("Data", &format!("B{}", row), row as f64).unwrap();
    }
    wb.set_formula("Data", "A1", "=SUM(B1:B50)", 1275.0).unwrap();

    let reads = Arc::new(AtomicUsize::new(0));
    let service = DrillService::with_parts(
        MemorySessionStore::new(),
        SlowReadsLoader {
            workbook: wb,
            reads: Arc::clone(&reads),
        },
        ServiceOptions {
            timeout: Duration::from_millis(60),
            ..ServiceOptions::default()
        },
    );
    let session = service.open_workbook("big.xlsx").unwrap().session_id;

    let err = service.drill_down(&session, "Data", "A1", 1).unwrap_err();
    assert!(matches!(err, ServiceError::Timeout { .. }));

    std::thread::sleep(Duration::from_millis(150));
    let settled = reads.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(reads.load(Ordering::SeqCst), settled);
    assert!(settled < 51, "worker read {} cells", settled);
}

/// End to end through a real XLSX file on disk
#[test]
fn test_xlsx_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_xlsx(
        dir.path(),
        "forecast.xlsx",
        &[
            (
                "Summary",
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><f>Inputs!B1+Inputs!B2</f><v>150</v></c></row>"#,
            ),
            (
                "Inputs",
                r#"<row r="1"><c r="A1" t="s"><v>1</v></c><c r="B1"><v>100</v></c></row><row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><f>B1/2</f><v>50</v></c></row>"#,
            ),
        ],
        &["Total", "Units", "Half"],
    );

    let service = DrillService::new();
    let upload = service.open_workbook(&path).unwrap();
    assert_eq!(upload.sheets, vec!["Summary".to_string(), "Inputs".to_string()]);

    let session = upload.session_id;
    service.configure_naming(&session, "Inputs", "A").unwrap();

    let drill = service.drill_down(&session, "Summary", "B1", 2).unwrap();
    assert_eq!(drill.source_value, 150.0);
    assert_eq!(drill.source_formula.as_deref(), Some("=Inputs!B1+Inputs!B2"));

    let refs: Vec<(&str, f64, Option<&str>)> = drill
        .dependencies
        .iter()
        .map(|d| {
            (
                d.cell_reference.as_str(),
                d.value,
                d.naming.resolved_name.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        refs,
        vec![
            ("Inputs!B1", 100.0, Some("Units")),
            ("Inputs!B2", 50.0, Some("Half")),
        ]
    );
    assert_eq!(drill.dependencies[1].children[0].cell_reference, "Inputs!B1");

    let err = DrillService::new()
        .open_workbook(dir.path().join("missing.xlsx"))
        .unwrap_err();
    assert!(!err.is_client_error());
}
