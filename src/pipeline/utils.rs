//! Utility functions for header normalization, lenient number parsing, and
//! display formatting.

use num_format::{Locale, ToFormattedString};

/// Normalize a spreadsheet/API header name: trim, case-fold, collapse
/// internal whitespace. Applied exactly once, at ingestion.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a cell value as a number, stripping currency and percent
/// decoration. Unparseable or empty input becomes 0.0.
pub fn parse_number(raw: &str) -> f64 {
    let clean = raw
        .replace('$', "")
        .replace(',', "")
        .replace('%', "")
        .trim()
        .to_string();

    // f64's parser accepts "nan"/"inf", which would serialize to JSON null
    // and corrupt stored snapshots; only finite values count as numbers
    match clean.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Format a dollar value: no decimals, `$` prefix, thousands separators.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round() as i64;
    if rounded < 0 {
        format!("-${}", (-rounded).to_formatted_string(&Locale::en))
    } else {
        format!("${}", rounded.to_formatted_string(&Locale::en))
    }
}

/// Format a percentage: one decimal place plus `%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format a plain decimal to a fixed precision.
pub fn format_decimal(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Completed   Revenue "), "completed revenue");
        assert_eq!(normalize_header("Technician"), "technician");
        assert_eq!(normalize_header("LEADS BOOKED"), "leads booked");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("$15,000"), 15000.0);
        assert_eq!(parse_number("42.5%"), 42.5);
        assert_eq!(parse_number(" 7 "), 7.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("n/a"), 0.0);
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        // These parse as f64 but would not survive a JSON round trip
        assert_eq!(parse_number("nan"), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
        assert_eq!(parse_number("inf"), 0.0);
        assert_eq!(parse_number("-infinity"), 0.0);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(15000.0), "$15,000");
        assert_eq!(format_currency(1234567.4), "$1,234,567");
        assert_eq!(format_currency(999.6), "$1,000");
        assert_eq!(format_currency(-2500.0), "-$2,500");
    }

    #[test]
    fn test_format_percent_and_decimal() {
        assert_eq!(format_percent(42.5), "42.5%");
        assert_eq!(format_percent(0.0), "0.0%");
        assert_eq!(format_decimal(2.34, 1), "2.3");
        assert_eq!(format_decimal(8.0, 0), "8");
    }
}
