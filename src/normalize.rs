//! Value normalization for raw export cells.
//!
//! Government export tooling emits inconsistent placeholder text for
//! suppressed figures ("Not Available", "Withheld"), inconsistent thousands
//! separators, and the occasional mis-decoded byte. These conversions are
//! total: a cell that cannot be coerced degrades to a documented default and
//! logs a warning, it never fails the row or the import.

use tracing::warn;

/// Coerce a raw dollars cell to a number, preserving the original text.
///
/// Empty/placeholder cells are zero. Strips `$`, thousands separators,
/// whitespace, and known mojibake artifacts (NBSP decoded through the wrong
/// code page) before parsing. A cell that still fails to parse is zero.
pub fn parse_currency(raw: Option<&str>) -> (f64, String) {
    let original = raw.unwrap_or("").to_string();
    let trimmed = original.trim();

    if trimmed.is_empty() {
        return (0.0, original);
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower == "not available" || lower == "withheld" {
        return (0.0, original);
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '\u{a0}' | '\u{c2}') && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) => (value, original),
        Err(_) => {
            warn!(value = %trimmed, "could not coerce investment dollars, storing 0.0");
            (0.0, original)
        }
    }
}

/// Coerce a fiscal-year cell to an integer; unparseable input maps to `0`.
pub fn parse_fiscal_year(raw: Option<&str>) -> i64 {
    match coerce_integer(raw) {
        Some(year) => year,
        None => {
            if let Some(value) = raw.filter(|v| !v.trim().is_empty()) {
                warn!(value = %value.trim(), "could not coerce fiscal year, storing 0");
            }
            0
        }
    }
}

/// Coerce an investment-count cell to an integer.
///
/// Defaults to `1`, not `0`: a transaction row with a missing count still
/// represents at least one investment.
pub fn parse_investment_count(raw: Option<&str>) -> i64 {
    match coerce_integer(raw) {
        Some(count) => count,
        None => {
            if let Some(value) = raw.filter(|v| !v.trim().is_empty()) {
                warn!(value = %value.trim(), "could not coerce investment count, storing 1");
            }
            1
        }
    }
}

fn coerce_integer(raw: Option<&str>) -> Option<i64> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    // Export tools sometimes widen integer columns to floats ("2023.0").
    s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64)
}

/// Normalize a header cell to a stable column name: lowercase, spaces to
/// underscores, everything outside `[a-zA-Z0-9_]` stripped.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_plain() {
        let (value, original) = parse_currency(Some("265,000"));
        assert_eq!(value, 265_000.0);
        assert_eq!(original, "265,000");
    }

    #[test]
    fn test_currency_symbols_and_decimals() {
        assert_eq!(parse_currency(Some("$1,234,567")).0, 1_234_567.0);
        assert_eq!(parse_currency(Some("$ 42.50")).0, 42.5);
    }

    #[test]
    fn test_currency_placeholders_are_zero() {
        for raw in ["", "Not Available", "Withheld", "not available", "WITHHELD"] {
            let (value, original) = parse_currency(Some(raw));
            assert_eq!(value, 0.0, "placeholder {:?} should be zero", raw);
            assert_eq!(original, raw);
        }
        assert_eq!(parse_currency(None), (0.0, String::new()));
    }

    #[test]
    fn test_currency_mojibake_artifacts() {
        // NBSP as thousands separator, and its latin-1 mis-decode "Â ".
        assert_eq!(parse_currency(Some("1\u{a0}000")).0, 1000.0);
        assert_eq!(parse_currency(Some("Â 1,500")).0, 1500.0);
    }

    #[test]
    fn test_currency_garbage_is_zero_but_preserved() {
        let (value, original) = parse_currency(Some("TBD"));
        assert_eq!(value, 0.0);
        assert_eq!(original, "TBD");
    }

    #[test]
    fn test_fiscal_year() {
        assert_eq!(parse_fiscal_year(Some("2023")), 2023);
        assert_eq!(parse_fiscal_year(Some("2023.0")), 2023);
        assert_eq!(parse_fiscal_year(Some(" 2021 ")), 2021);
        assert_eq!(parse_fiscal_year(Some("FY23")), 0);
        assert_eq!(parse_fiscal_year(Some("")), 0);
        assert_eq!(parse_fiscal_year(None), 0);
    }

    #[test]
    fn test_investment_count_defaults_to_one() {
        assert_eq!(parse_investment_count(Some("3")), 3);
        assert_eq!(parse_investment_count(Some("n/a")), 1);
        assert_eq!(parse_investment_count(Some("")), 1);
        assert_eq!(parse_investment_count(None), 1);
    }

    #[test]
    fn test_column_names() {
        assert_eq!(normalize_column_name("Fiscal Year"), "fiscal_year");
        assert_eq!(normalize_column_name("  State Name "), "state_name");
        assert_eq!(
            normalize_column_name("Investment Dollars ($)"),
            "investment_dollars_"
        );
        assert_eq!(normalize_column_name("County FIPS"), "county_fips");
    }
}
