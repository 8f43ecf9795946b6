//! Shared fixtures for the drillsheets integration tests

#![allow(dead_code)]

use drillsheets::{ServiceResult, WorkbookLoader, WorkbookSnapshot};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The four-cell workbook used throughout:
/// A1 = B1 + C1, B1 = 10, C1 = D1 * 2, D1 = 5
pub fn sample_workbook() -> WorkbookSnapshot {
    let mut wb = WorkbookSnapshot::new();
    wb.add_sheet("Sheet1").unwrap();
    wb.set_formula("Sheet1", "A1", "=B1+C1", 20.0).unwrap();
    wb.set_number("Sheet1", "B1", 10.0).unwrap();
    wb.set_formula("Sheet1", "C1", "=D1*2", 10.0).unwrap();
    wb.set_number("Sheet1", "D1", 5.0).unwrap();
    wb
}

/// Serves clones of one in-memory workbook regardless of path
pub struct SnapshotLoader {
    pub workbook: WorkbookSnapshot,
    pub delay: Option<Duration>,
}

impl SnapshotLoader {
    pub fn new(workbook: WorkbookSnapshot) -> Self {
        Self {
            workbook,
            delay: None,
        }
    }

    /// A loader whose `open` sleeps first
    pub fn slow(workbook: WorkbookSnapshot, delay: Duration) -> Self {
        Self {
            workbook,
            delay: Some(delay),
        }
    }
}

impl WorkbookLoader for SnapshotLoader {
    type Source = WorkbookSnapshot;

    fn sheet_names(&self, _path: &Path) -> ServiceResult<Vec<String>> {
        Ok(self
            .workbook
            .sheets()
            .map(|s| s.name().to_string())
            .collect())
    }

    fn open(&self, _path: &Path) -> ServiceResult<WorkbookSnapshot> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(self.workbook.clone())
    }
}

/// Write a minimal XLSX package with one worksheet per (name, sheetData
/// body) and optional shared-string items; returns the file path
pub fn write_xlsx(
    dir: &Path,
    file_name: &str,
    sheets: &[(&str, &str)],
    shared_strings: &[&str],
) -> PathBuf {
    let path = dir.join(file_name);
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
</Types>"#,
    )
    .unwrap();

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            n,
            n
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            n, n
        ));
    }
    workbook.push_str("</sheets></workbook>");
    if !shared_strings.is_empty() {
        rels.push_str(r#"<Relationship Id="rIdSst" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#);
    }
    rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();

    for (i, (_, data)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
            .unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                data
            )
            .as_bytes(),
        )
        .unwrap();
    }

    if !shared_strings.is_empty() {
        let items: String = shared_strings
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", escape(s)))
            .collect();
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{1}</sst>"#,
                shared_strings.len(),
                items
            )
            .as_bytes(),
        )
        .unwrap();
    }

    zip.finish().unwrap();
    path
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
