//! External workbook reference detection

use lazy_regex::regex_is_match;

/// Whether formula text references another workbook
///
/// Two forms are recognized: an inline file name in brackets
/// (`[Budget.xlsx]Sheet1!A1`, any `.xl*` extension) and the numeric link
/// index Excel stores on disk (`[1]Sheet1!A1`).
///
/// ```rust
/// use drillsheets_formula::detect_external_reference;
///
/// assert!(detect_external_reference("=[Budget.xlsx]Sheet1!A1"));
/// assert!(detect_external_reference("='C:\\Shared\\[Plan.xlsm]Q1'!B2*2"));
/// assert!(!detect_external_reference("=Sheet1!A1"));
/// ```
pub fn detect_external_reference(formula: &str) -> bool {
    regex_is_match!(r"(?i)\[[^\[\]]+\.xl[a-z]{0,2}\]", formula)
        || regex_is_match!(r"\[\d+\][^!\[\]]*!", formula)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_file_names() {
        assert!(detect_external_reference("=[Book1.xlsx]Sheet1!A1"));
        assert!(detect_external_reference("=[book1.XLS]Sheet1!A1"));
        assert!(detect_external_reference("=SUM([Data.xlsm]Raw!A1:A9)"));
        assert!(detect_external_reference("=[Old.xlsb]S!A1"));
    }

    #[test]
    fn test_link_index_form() {
        assert!(detect_external_reference("=[1]Sheet1!A1"));
        assert!(detect_external_reference("='[2]Cash Flow'!B7"));
    }

    #[test]
    fn test_local_formulas() {
        assert!(!detect_external_reference("=A1+B1"));
        assert!(!detect_external_reference("=Sheet2!A1"));
        assert!(!detect_external_reference("=\"[notes.txt]\"&A1"));
        // Structured table references are not links
        assert!(!detect_external_reference("=SUM(Table1[Amount])"));
    }
}
