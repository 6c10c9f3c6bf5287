//! Type inference for raw cell values
//!
//! Classification looks at one value at a time, never at its column, so the
//! same value always gets the same type. Precedence:
//!
//! 1. empty
//! 2. boolean literal (`true`, `"no"`, `"YES"`, ...)
//! 3. number (thousands separators stripped)
//! 4. date (must contain `-`, `/` or `.`)
//! 5. text

use crate::types::{CellValue, DataType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// String literals classified as boolean
pub const BOOLEAN_LITERALS: [&str; 8] = ["true", "false", "TRUE", "FALSE", "yes", "no", "YES", "NO"];

/// String literals counted as `true` in boolean statistics
pub const TRUTHY_LITERALS: [&str; 4] = ["true", "TRUE", "yes", "YES"];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Classify a single cell value
pub fn classify(value: &CellValue) -> DataType {
    match value {
        CellValue::Empty => DataType::Empty,
        CellValue::Boolean(_) => DataType::Boolean,
        CellValue::Number(n) if n.is_finite() => DataType::Number,
        CellValue::Number(_) => DataType::Text,
        CellValue::Error(_) => DataType::Text,
        CellValue::Text(s) => classify_text(s),
    }
}

fn classify_text(s: &str) -> DataType {
    if s.is_empty() {
        return DataType::Empty;
    }
    if BOOLEAN_LITERALS.contains(&s) {
        return DataType::Boolean;
    }
    if parse_number(s).is_some() {
        return DataType::Number;
    }
    if s.contains(['-', '/', '.']) && parse_date(s).is_some() {
        return DataType::Date;
    }
    DataType::Text
}

/// Parse numeric text, ignoring thousands-separator commas. Non-finite
/// results (`inf`, `NaN`) are rejected.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned = s.replace(',', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Numeric view of a cell: numbers as-is, text through [`parse_number`]
pub fn numeric_value(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => parse_number(s),
        _ => None,
    }
}

/// Parse a calendar date or timestamp
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    // year-month only
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Date view of a cell (only text can hold a date)
pub fn date_value(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Text(s) => parse_date(s),
        _ => None,
    }
}

/// True for values counted as `true` in boolean statistics
pub fn is_truthy(value: &CellValue) -> bool {
    match value {
        CellValue::Boolean(b) => *b,
        CellValue::Text(s) => TRUTHY_LITERALS.contains(&s.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> DataType {
        classify(&CellValue::from(s))
    }

    #[test]
    fn test_classify_examples() {
        assert_eq!(t("yes"), DataType::Boolean);
        assert_eq!(t("2024-01-05"), DataType::Date);
        assert_eq!(t("42"), DataType::Number);
        assert_eq!(t(""), DataType::Empty);
        assert_eq!(classify(&CellValue::Empty), DataType::Empty);
    }

    #[test]
    fn test_boolean_precedes_everything() {
        assert_eq!(t("no"), DataType::Boolean);
        assert_eq!(t("NO"), DataType::Boolean);
        assert_eq!(classify(&CellValue::Boolean(false)), DataType::Boolean);
        // only the exact literals count
        assert_eq!(t("No"), DataType::Text);
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(t("1,200"), DataType::Number);
        assert_eq!(t("-3,400.5"), DataType::Number);
        assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
    }

    #[test]
    fn test_non_finite_is_not_number() {
        assert_eq!(t("inf"), DataType::Text);
        assert_eq!(t("NaN"), DataType::Text);
        assert_eq!(classify(&CellValue::Number(f64::INFINITY)), DataType::Text);
    }

    #[test]
    fn test_date_formats() {
        for s in [
            "2024/01/05",
            "2024.01.05",
            "01/05/2024",
            "05.01.2024",
            "2024-01",
            "2024-01-05T10:30:00",
            "2024-01-05T10:30:00Z",
            "2024-01-05T10:30:00+02:00",
        ] {
            assert_eq!(t(s), DataType::Date, "{}", s);
        }
    }

    #[test]
    fn test_invalid_dates_are_text() {
        assert_eq!(t("2024-13-45"), DataType::Text);
        assert_eq!(t("a-b-c"), DataType::Text);
        assert_eq!(t("hello"), DataType::Text);
    }

    #[test]
    fn test_classify_idempotent() {
        for v in ["yes", "12", "2024-01-05", "abc", ""] {
            let value = CellValue::from(v);
            assert_eq!(classify(&value), classify(&value));
        }
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy(&CellValue::from("YES")));
        assert!(is_truthy(&CellValue::Boolean(true)));
        assert!(!is_truthy(&CellValue::from("no")));
        assert!(!is_truthy(&CellValue::from("True")));
    }
}
