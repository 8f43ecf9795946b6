//! Number formats from `xl/styles.xml`, reduced to "is this a date"

use std::collections::HashMap;
use std::io::{BufReader, Read};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::attribute;
use crate::error::{XlsxError, XlsxResult};

/// Date flag per `cellXfs` entry, indexed by a cell's `s` attribute
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DateStyles {
    is_date: Vec<bool>,
}

impl DateStyles {
    /// Whether style index `s` carries a date or time format
    pub(crate) fn is_date(&self, style: Option<usize>) -> bool {
        style
            .and_then(|s| self.is_date.get(s))
            .copied()
            .unwrap_or(false)
    }
}

/// Read the `numFmts` and `cellXfs` tables
pub(crate) fn read_date_styles<R: Read>(reader: R) -> XlsxResult<DateStyles> {
    let mut xml_reader = Reader::from_reader(BufReader::new(reader));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut custom: HashMap<u32, String> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"numFmt" => {
                    let id = attribute(&e, b"numFmtId").and_then(|s| s.parse().ok());
                    if let (Some(id), Some(code)) = (id, attribute(&e, b"formatCode")) {
                        custom.insert(id, code);
                    }
                }
                b"xf" if in_cell_xfs => {
                    let id = attribute(&e, b"numFmtId")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    xf_formats.push(id);
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(DateStyles {
        is_date: xf_formats
            .into_iter()
            .map(|id| is_date_format(id, custom.get(&id).map(String::as_str)))
            .collect(),
    })
}

/// Built-in ids 14-22 and 45-47 are dates and times. A custom code is one
/// when a date/time placeholder survives outside quotes, brackets and escapes.
pub(crate) fn is_date_format(id: u32, code: Option<&str>) -> bool {
    let Some(code) = code else {
        return matches!(id, 14..=22 | 45..=47);
    };

    // Only the first (positive) section decides
    let mut chars = code.chars();
    while let Some(c) = chars.next() {
        match c {
            ';' => return false,
            '"' => {
                chars.by_ref().find(|&c| c == '"');
            }
            '[' => {
                // Elapsed time such as [h]:mm still counts
                let inner: String = chars.by_ref().take_while(|&c| c != ']').collect();
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            c if matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's') => return true,
            _ => {}
        }
    }
    false
}
