//! Primary function extraction

/// Functions recognized as the "main" function of a formula, in match
/// priority order.
pub const SUPPORTED_FUNCTIONS: &[&str] = &[
    "SUM", "AVERAGE", "COUNT", "MAX", "MIN", "SUMIF", "SUMIFS", "IF", "IFERROR", "VLOOKUP",
    "HLOOKUP", "INDEX", "MATCH",
];

/// Find the first supported function called anywhere in the formula
///
/// Functions are tried in [`SUPPORTED_FUNCTIONS`] order, not by position in
/// the text, so `=IF(SUM(A1:A3)>0,1,0)` reports `SUM`. A name only counts
/// when it is immediately followed by `(` and not preceded by another
/// identifier character, which keeps `SUM` from matching inside `SUMIF(`
/// or `DSUM(`. An `_xlfn.` style prefix is allowed.
///
/// ```rust
/// use drillsheets_formula::extract_primary_function;
///
/// assert_eq!(extract_primary_function("=sumif(A:A,\"x\",B:B)"), Some("SUMIF"));
/// assert_eq!(extract_primary_function("=A1*2"), None);
/// ```
pub fn extract_primary_function(formula: &str) -> Option<&'static str> {
    if !formula.starts_with('=') {
        return None;
    }

    let upper = formula.to_uppercase();
    SUPPORTED_FUNCTIONS
        .iter()
        .copied()
        .find(|name| calls_function(&upper, name))
}

fn calls_function(upper: &str, name: &str) -> bool {
    let needle = format!("{}(", name);
    upper.match_indices(&needle).any(|(pos, _)| {
        upper[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_calls() {
        assert_eq!(extract_primary_function("=SUM(A1:A10)"), Some("SUM"));
        assert_eq!(extract_primary_function("=average(B1:B4)"), Some("AVERAGE"));
        assert_eq!(
            extract_primary_function("=VLOOKUP(A1,Data!A:C,3,FALSE)"),
            Some("VLOOKUP")
        );
    }

    #[test]
    fn test_allow_list_order_wins() {
        assert_eq!(extract_primary_function("=IF(SUM(A1:A3)>0,1,0)"), Some("SUM"));
        assert_eq!(
            extract_primary_function("=INDEX(B:B,MATCH(A1,C:C,0))"),
            Some("INDEX")
        );
    }

    #[test]
    fn test_longer_names_do_not_match_prefixes() {
        assert_eq!(extract_primary_function("=SUMIFS(A:A,B:B,1)"), Some("SUMIFS"));
        assert_eq!(extract_primary_function("=DSUM(A1:C9,2,E1:E2)"), None);
        assert_eq!(extract_primary_function("=COUNTA(A1:A9)"), None);
    }

    #[test]
    fn test_prefixed_function() {
        assert_eq!(extract_primary_function("=_xlfn.IFERROR(A1,0)"), Some("IFERROR"));
    }

    #[test]
    fn test_no_function() {
        assert_eq!(extract_primary_function("=A1+B1"), None);
        assert_eq!(extract_primary_function("SUM(A1)"), None);
        assert_eq!(extract_primary_function(""), None);
    }
}
