//! Reference scanner
//!
//! Extracts every cell and range reference from formula text by pattern
//! scanning, not by a full grammar parse. Function names, operators and
//! literals around a reference are ignored, so `=SUM(A1:A10)+B2` yields the
//! range `A1:A10` followed by the cell `B2`.

use drillsheets_core::{CellAddress, CellReference, Error, RangeReference, Result};
use lazy_regex::{lazy_regex, Lazy};
use regex::{Captures, Regex};
use std::ops::Range;

/// Optional `Sheet!` / `'Sheet Name'!` prefix, a `$`-anchorable column/row
/// pair, and an optional `:column/row` range end.
static REFERENCE_PATTERN: Lazy<Regex> = lazy_regex!(
    r"(?x)
    (?:
        '(?P<quoted>(?:[^']|'')+)'!
      | (?P<sheet>[\p{L}_][\w.]*)!
    )?
    (?P<col_abs>\$?)(?P<col>[A-Za-z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)
    (?:
        :(?P<end_col_abs>\$?)(?P<end_col>[A-Za-z]{1,3})(?P<end_row_abs>\$?)(?P<end_row>[0-9]+)
    )?
    "
);

/// Whether text is formula text (starts with the `=` marker)
pub fn is_formula(text: &str) -> bool {
    text.starts_with('=')
}

/// Extract reference tokens from formula text, in order of appearance
///
/// Text that does not start with `=` is a constant and yields no tokens.
/// Individual matches that do not form a valid address (row 0, row or column
/// out of range) are skipped with a warning.
///
/// # Example
/// ```rust
/// use drillsheets_formula::parse_formula;
///
/// let refs = parse_formula("=SUM(A1:A10)+'Cost Base'!$B$2");
/// assert_eq!(refs[0].to_string(), "A1:A10");
/// assert_eq!(refs[1].to_string(), "'Cost Base'!$B$2");
///
/// assert!(parse_formula("42").is_empty());
/// ```
pub fn parse_formula(formula: &str) -> Vec<CellReference> {
    match formula.strip_prefix('=') {
        Some(body) => scan(body).into_iter().map(|(_, r)| r).collect(),
        None => Vec::new(),
    }
}

/// [`parse_formula`] for cells that may have no formula at all
pub fn parse_optional_formula(formula: Option<&str>) -> Vec<CellReference> {
    formula.map(parse_formula).unwrap_or_default()
}

/// Scan text for references, returning each token with its byte span
pub(crate) fn scan(text: &str) -> Vec<(Range<usize>, CellReference)> {
    let mut found = Vec::new();

    for caps in REFERENCE_PATTERN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        // Part of a longer identifier: LOG10(, Q1_Sales, XA1B
        if !at_token_boundary(text, whole.start(), whole.end()) {
            continue;
        }

        match build_reference(&caps) {
            Ok(reference) => found.push((whole.range(), reference)),
            Err(e) => {
                log::warn!(
                    "Could not parse cell reference '{}' from formula: {}",
                    whole.as_str(),
                    e
                );
            }
        }
    }

    found
}

fn at_token_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '.'));
    let after_ok = text[end..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '('));
    before_ok && after_ok
}

fn build_reference(caps: &Captures<'_>) -> Result<CellReference> {
    let sheet = caps
        .name("quoted")
        .map(|m| m.as_str().replace("''", "'"))
        .or_else(|| caps.name("sheet").map(|m| m.as_str().to_string()));

    let mut start = corner(caps, "col_abs", "col", "row_abs", "row")?;
    start.sheet = sheet;

    if caps.name("end_col").is_some() {
        let end = corner(caps, "end_col_abs", "end_col", "end_row_abs", "end_row")?;
        return Ok(CellReference::Range(RangeReference::new(start, end)));
    }

    Ok(CellReference::Cell(start))
}

fn corner(
    caps: &Captures<'_>,
    col_abs: &str,
    col: &str,
    row_abs: &str,
    row: &str,
) -> Result<CellAddress> {
    let group = |name: &str| caps.name(name).map_or("", |m| m.as_str());

    let row_text = group(row);
    let row: u32 = row_text
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("row '{}' is not a valid number", row_text)))?;

    CellAddress::with_absolute(
        group(col),
        row,
        !group(col_abs).is_empty(),
        !group(row_abs).is_empty(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(formula: &str) -> Vec<String> {
        parse_formula(formula)
            .iter()
            .map(|r| r.to_string())
            .collect()
    }

    #[test]
    fn test_range_then_cell() {
        let refs = parse_formula("=SUM(A1:A10)+B2");
        assert_eq!(refs.len(), 2);

        match &refs[0] {
            CellReference::Range(range) => {
                assert_eq!(range.start.column, "A");
                assert_eq!(range.start.row, 1);
                assert_eq!(range.range_end_column, "A");
                assert_eq!(range.range_end_row, 10);
            }
            other => panic!("Expected range, got {:?}", other),
        }
        match &refs[1] {
            CellReference::Cell(addr) => {
                assert_eq!(addr.column, "B");
                assert_eq!(addr.row, 2);
            }
            other => panic!("Expected cell, got {:?}", other),
        }
    }

    #[test]
    fn test_constants_yield_nothing() {
        assert!(parse_formula("").is_empty());
        assert!(parse_formula("A1+B1").is_empty());
        assert!(parse_formula("123").is_empty());
        assert!(parse_optional_formula(None).is_empty());
        assert_eq!(parse_optional_formula(Some("=C3")).len(), 1);
    }

    #[test]
    fn test_sheet_prefixes_and_anchors() {
        assert_eq!(
            texts("=Sheet2!$A$1*'Cash Flow'!B$7+'Bob''s'!C3"),
            vec!["Sheet2!$A$1", "'Cash Flow'!B$7", "'Bob''s'!C3"]
        );

        let refs = parse_formula("='Cash Flow'!B7");
        assert_eq!(refs[0].sheet(), Some("Cash Flow"));
    }

    #[test]
    fn test_lowercase_is_normalized() {
        assert_eq!(texts("=sum(a1:b2)*c3"), vec!["A1:B2", "C3"]);
    }

    #[test]
    fn test_function_names_and_identifiers_are_not_references() {
        assert_eq!(texts("=LOG10(A1)+ATAN2(B1,C1)"), vec!["A1", "B1", "C1"]);
        assert!(parse_formula("=Q1_Sales*2").is_empty());
        assert!(parse_formula("=TRUE").is_empty());
    }

    #[test]
    fn test_malformed_tokens_are_skipped() {
        // A0 and the oversized row are invalid, the rest still parses
        assert_eq!(texts("=A0+B2+C99999999999+D4"), vec!["B2", "D4"]);
    }

    #[test]
    fn test_mixed_range_anchors() {
        let refs = parse_formula("=SUM($A1:B$10)");
        assert_eq!(refs[0].to_string(), "$A1:B$10");
    }

    #[test]
    fn test_external_link_still_scanned() {
        // Detection of the external marker is a separate concern
        assert_eq!(texts("=[1]Sheet1!A1*2"), vec!["Sheet1!A1"]);
    }
}
