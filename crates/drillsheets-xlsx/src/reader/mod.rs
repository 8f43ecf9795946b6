//! XLSX reader

mod styles;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use drillsheets_core::{
    CachedValue, CellAddress, CellRecord, SheetSnapshot, WorkbookSnapshot, MAX_ROWS,
};
use drillsheets_formula::shift_formula;
use styles::{read_date_styles, DateStyles};

/// Decode Excel's `_xHHHH_` escape sequences (`_x000a_` is a line feed,
/// `_x005f_` a literal underscore).
fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut decoded = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("_x") {
        decoded.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match escaped_char(tail) {
            Some(ch) => {
                decoded.push(ch);
                rest = &tail[7..];
            }
            None => {
                decoded.push('_');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

/// The character encoded by a leading `_xHHHH_`, if `tail` starts with one
fn escaped_char(tail: &str) -> Option<char> {
    let bytes = tail.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' {
        return None;
    }
    let hex = tail.get(2..6)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

fn with_formula_marker(text: &str) -> String {
    if text.starts_with('=') {
        text.to_string()
    } else {
        format!("={}", text)
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.to_string()))
}

/// Anchor of a shared formula block
struct SharedFormula {
    formula: String,
    row: u32,
    col: u32,
}

/// Workbook-wide tables a worksheet's cells refer to
struct SheetContext<'a> {
    shared_strings: &'a [String],
    date_styles: &'a DateStyles,
}

/// A `<c>` element being read
#[derive(Default)]
struct PendingCell {
    row: u32,
    col: u32,
    cell_type: Option<String>,
    style: Option<usize>,
    value: Option<String>,
    formula: Option<String>,
    shared_index: Option<u32>,
}

impl PendingCell {
    fn push_value(&mut self, text: &str) {
        self.value.get_or_insert_with(String::new).push_str(text);
    }

    fn push_formula(&mut self, text: &str) {
        self.formula.get_or_insert_with(String::new).push_str(text);
    }

    /// Record `t="shared"` / `si` from an `<f>` element
    fn formula_attributes(&mut self, e: &BytesStart<'_>) {
        if attribute(e, b"t").as_deref() == Some("shared") {
            self.shared_index = attribute(e, b"si").and_then(|si| si.parse().ok());
        }
    }
}

/// XLSX file reader
///
/// Loads a whole workbook into a [`WorkbookSnapshot`]. Each cell keeps its
/// formula text (with the `=` marker, shared formulas expanded per cell) and
/// its last cached value.
pub struct XlsxReader;

impl XlsxReader {
    /// Read a workbook from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<WorkbookSnapshot> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a workbook from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<WorkbookSnapshot> {
        let mut archive = zip::ZipArchive::new(reader)?;
        Self::check_content_types(&mut archive)?;

        let shared_strings = Self::read_shared_strings(&mut archive)?;
        let date_styles = Self::read_styles(&mut archive)?;
        let sheet_info = Self::read_workbook_xml(&mut archive)?;
        let sheet_paths = Self::read_workbook_rels(&mut archive)?;

        let mut workbook = WorkbookSnapshot::new();
        for (name, r_id) in &sheet_info {
            let Some(path) = sheet_paths.get(r_id) else {
                log::debug!("Sheet '{}' ({}) is not a worksheet, skipping", name, r_id);
                continue;
            };

            let mut sheet = SheetSnapshot::new(name.as_str());
            let context = SheetContext {
                shared_strings: &shared_strings,
                date_styles: &date_styles,
            };
            Self::read_worksheet(&mut archive, path, &mut sheet, &context)?;
            log::debug!("Read sheet '{}': {} cells", name, sheet.cell_count());
            workbook.push_sheet(sheet)?;
        }

        if workbook.sheet_count() == 0 {
            return Err(XlsxError::InvalidFormat(
                "workbook contains no worksheets".into(),
            ));
        }

        Ok(workbook)
    }

    /// Worksheet names in workbook order, without loading any cells
    pub fn sheet_names_from_file<P: AsRef<Path>>(path: P) -> XlsxResult<Vec<String>> {
        let file = File::open(path)?;
        Self::sheet_names(BufReader::new(file))
    }

    /// Worksheet names in workbook order, without loading any cells
    pub fn sheet_names<R: Read + Seek>(reader: R) -> XlsxResult<Vec<String>> {
        let mut archive = zip::ZipArchive::new(reader)?;
        Self::check_content_types(&mut archive)?;

        let sheet_info = Self::read_workbook_xml(&mut archive)?;
        let sheet_paths = Self::read_workbook_rels(&mut archive)?;

        Ok(sheet_info
            .into_iter()
            .filter(|(_, r_id)| sheet_paths.contains_key(r_id))
            .map(|(name, _)| name)
            .collect())
    }

    fn check_content_types<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> XlsxResult<()> {
        if archive.by_name("[Content_Types].xml").is_err() {
            return Err(XlsxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }
        Ok(())
    }

    /// Read the shared strings table
    ///
    /// Rich-text runs are concatenated; phonetic hints (`<rPh>`) are skipped.
    /// Whitespace is kept as written.
    fn read_shared_strings<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<Vec<String>> {
        let mut strings = Vec::new();

        let file = match archive.by_name("xl/sharedStrings.xml") {
            Ok(f) => f,
            Err(_) => return Ok(strings),
        };

        let mut xml_reader = Reader::from_reader(BufReader::new(file));

        let mut buf = Vec::new();
        let mut current = String::new();
        let mut in_t = false;
        let mut in_phonetic = false;

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"si" => current.clear(),
                    b"rPh" => in_phonetic = true,
                    b"t" if !in_phonetic => in_t = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.name().as_ref() == b"si" => {
                    strings.push(String::new());
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"si" => strings.push(decode_excel_escapes(&current)),
                    b"rPh" => in_phonetic = false,
                    b"t" => in_t = false,
                    _ => {}
                },
                Ok(Event::Text(e)) if in_t => {
                    if let Ok(text) = e.unescape() {
                        current.push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(strings)
    }

    /// Read the date flags of `xl/styles.xml`; a package without one has no dates
    fn read_styles<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> XlsxResult<DateStyles> {
        match archive.by_name("xl/styles.xml") {
            Ok(file) => read_date_styles(file),
            Err(_) => Ok(DateStyles::default()),
        }
    }

    /// Read workbook.xml to get sheet names and rIds
    fn read_workbook_xml<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<Vec<(String, String)>> {
        let file = archive
            .by_name("xl/workbook.xml")
            .map_err(|_| XlsxError::MissingPart("xl/workbook.xml".into()))?;

        let mut xml_reader = Reader::from_reader(BufReader::new(file));
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut sheets = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"sheet" => {
                    if let (Some(name), Some(r_id)) =
                        (attribute(&e, b"name"), attribute(&e, b"r:id"))
                    {
                        sheets.push((name, r_id));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(sheets)
    }

    /// Read workbook.xml.rels to map rIds to worksheet part paths
    fn read_workbook_rels<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<HashMap<String, String>> {
        let file = archive
            .by_name("xl/_rels/workbook.xml.rels")
            .map_err(|_| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;

        let mut xml_reader = Reader::from_reader(BufReader::new(file));
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut rels = HashMap::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    let is_worksheet = attribute(&e, b"Type")
                        .map_or(false, |t| t.ends_with("/worksheet"));
                    if let (true, Some(id), Some(target)) =
                        (is_worksheet, attribute(&e, b"Id"), attribute(&e, b"Target"))
                    {
                        // Relative targets hang off xl/
                        let path = match target.strip_prefix('/') {
                            Some(absolute) => absolute.to_string(),
                            None => format!("xl/{}", target),
                        };
                        rels.insert(id, path);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// Read one worksheet's cells into `sheet`
    fn read_worksheet<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
        path: &str,
        sheet: &mut SheetSnapshot,
        context: &SheetContext<'_>,
    ) -> XlsxResult<()> {
        let file = archive
            .by_name(path)
            .map_err(|_| XlsxError::MissingPart(path.to_string()))?;

        let mut xml_reader = Reader::from_reader(BufReader::new(file));

        let mut buf = Vec::new();
        let mut shared_formulas: HashMap<u32, SharedFormula> = HashMap::new();

        // Position for cells written without an `r` attribute
        let mut current_row = 0u32;
        let mut next_col = 1u32;

        let mut cell: Option<PendingCell> = None;
        let mut in_value = false;
        let mut in_formula = false;
        let mut in_inline_str = false;
        let mut in_inline_text = false;

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"row" => {
                        current_row = Self::row_number(&e, current_row)?;
                        next_col = 1;
                    }
                    b"c" => {
                        let (row, col) = Self::cell_position(&e, current_row, next_col)?;
                        next_col = col + 1;
                        cell = Some(PendingCell {
                            row,
                            col,
                            cell_type: attribute(&e, b"t"),
                            style: attribute(&e, b"s").and_then(|s| s.parse().ok()),
                            ..PendingCell::default()
                        });
                    }
                    b"v" => in_value = true,
                    b"f" => {
                        in_formula = true;
                        if let Some(cell) = cell.as_mut() {
                            cell.formula_attributes(&e);
                        }
                    }
                    b"is" => in_inline_str = true,
                    b"t" if in_inline_str => in_inline_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"row" => {
                        current_row = Self::row_number(&e, current_row)?;
                        next_col = 1;
                    }
                    b"c" => {
                        // Styled but empty
                        let (_, col) = Self::cell_position(&e, current_row, next_col)?;
                        next_col = col + 1;
                    }
                    b"f" => {
                        if let Some(cell) = cell.as_mut() {
                            cell.formula_attributes(&e);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if let Some(cell) = cell.as_mut() {
                        if in_value || in_formula || in_inline_text {
                            let text = e.unescape()?;
                            if in_formula {
                                cell.push_formula(&text);
                            } else {
                                cell.push_value(&text);
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"c" => {
                        if let Some(done) = cell.take() {
                            Self::process_cell(sheet, done, context, &mut shared_formulas)?;
                        }
                    }
                    b"v" => in_value = false,
                    b"f" => in_formula = false,
                    b"is" => in_inline_str = false,
                    b"t" if in_inline_str => in_inline_text = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(())
    }

    /// The row's `r` attribute, or the row after `previous` when it has none
    fn row_number(e: &BytesStart<'_>, previous: u32) -> XlsxResult<u32> {
        let row = match attribute(e, b"r").and_then(|r| r.parse().ok()) {
            Some(row) => row,
            None => previous.saturating_add(1),
        };
        if row == 0 || row > MAX_ROWS {
            return Err(XlsxError::Parse(format!(
                "Row {} is outside the sheet (1..={})",
                row, MAX_ROWS
            )));
        }
        Ok(row)
    }

    fn cell_position(e: &BytesStart<'_>, current_row: u32, next_col: u32) -> XlsxResult<(u32, u32)> {
        match attribute(e, b"r") {
            Some(reference) => {
                let addr = CellAddress::parse(&reference).map_err(|e| {
                    XlsxError::Parse(format!("Invalid cell reference '{}': {}", reference, e))
                })?;
                Ok((addr.row, addr.column_index()))
            }
            None if current_row > 0 => Ok((current_row, next_col)),
            None => Err(XlsxError::Parse(
                "cell without a reference outside of any row".into(),
            )),
        }
    }

    /// Turn a finished `<c>` element into a stored cell
    fn process_cell(
        sheet: &mut SheetSnapshot,
        cell: PendingCell,
        context: &SheetContext<'_>,
        shared_formulas: &mut HashMap<u32, SharedFormula>,
    ) -> XlsxResult<()> {
        let formula = match (cell.formula.as_deref(), cell.shared_index) {
            (Some(text), Some(si)) => {
                let formula = with_formula_marker(text);
                shared_formulas.insert(
                    si,
                    SharedFormula {
                        formula: formula.clone(),
                        row: cell.row,
                        col: cell.col,
                    },
                );
                Some(formula)
            }
            (Some(text), None) => Some(with_formula_marker(text)),
            (None, Some(si)) => match shared_formulas.get(&si) {
                Some(anchor) => Some(shift_formula(
                    &anchor.formula,
                    i64::from(cell.row) - i64::from(anchor.row),
                    i64::from(cell.col) - i64::from(anchor.col),
                )),
                None => {
                    log::warn!(
                        "Shared formula {} used in sheet '{}' before its anchor cell",
                        si,
                        sheet.name()
                    );
                    None
                }
            },
            (None, None) => None,
        };

        let cached = Self::cached_value(
            cell.cell_type.as_deref(),
            cell.value.as_deref(),
            context.date_styles.is_date(cell.style),
            context.shared_strings,
        )?;

        if formula.is_none() && cached.is_empty() {
            return Ok(());
        }

        sheet.set_cell(cell.row, cell.col, CellRecord { cached, formula });
        Ok(())
    }

    /// Interpret a `<v>` (or inline string) by the cell's `t` attribute
    ///
    /// Numbers under a date or time format are kept as dates.
    fn cached_value(
        cell_type: Option<&str>,
        value: Option<&str>,
        is_date: bool,
        shared_strings: &[String],
    ) -> XlsxResult<CachedValue> {
        let Some(value) = value else {
            return Ok(CachedValue::Empty);
        };

        let cached = match cell_type {
            Some("s") => {
                let idx: usize = value.trim().parse().map_err(|_| {
                    XlsxError::Parse(format!("Invalid shared string index: {}", value))
                })?;
                let text = shared_strings.get(idx).ok_or_else(|| {
                    XlsxError::Parse(format!("Shared string index {} out of bounds", idx))
                })?;
                CachedValue::Text(text.clone())
            }
            Some("b") => CachedValue::Boolean(value == "1" || value.eq_ignore_ascii_case("true")),
            Some("e") => CachedValue::Error(value.to_string()),
            Some("str") | Some("inlineStr") => CachedValue::Text(decode_excel_escapes(value)),
            None | Some("n") => match value.trim().parse::<f64>() {
                Ok(n) if is_date => CachedValue::Date(n),
                Ok(n) => CachedValue::Number(n),
                Err(_) => CachedValue::Text(value.to_string()),
            },
            // ISO dates (`t="d"`) and anything unknown stay text
            Some(_) => CachedValue::Text(value.to_string()),
        };

        Ok(cached)
    }
}
