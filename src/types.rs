use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

//==============================================================================
// Cell values
//==============================================================================

/// Error sentinels a cell (or an evaluation) can produce instead of a value.
///
/// These are returned to callers as ordinary values; nothing in the core
/// surfaces them as Rust errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellError {
    /// Generic failure (`#ERROR!`), also used by the disabled engine
    Error,
    /// Division by zero (`#DIV/0!`)
    DivZero,
    /// Wrong operand type (`#VALUE!`)
    Value,
    /// Invalid or stale reference (`#REF!`)
    Ref,
    /// Unknown function or name (`#NAME?`)
    Name,
    /// Circular dependency (`#CYCLE!`)
    Cycle,
    /// Value not available (`#N/A`)
    NotAvailable,
    /// Invalid numeric result (`#NUM!`)
    Num,
}

impl CellError {
    pub fn code(&self) -> &'static str {
        match self {
            CellError::Error => "#ERROR!",
            CellError::DivZero => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Cycle => "#CYCLE!",
            CellError::NotAvailable => "#N/A",
            CellError::Num => "#NUM!",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "#ERROR!" => Some(CellError::Error),
            "#DIV/0!" => Some(CellError::DivZero),
            "#VALUE!" => Some(CellError::Value),
            "#REF!" => Some(CellError::Ref),
            "#NAME?" => Some(CellError::Name),
            "#CYCLE!" => Some(CellError::Cycle),
            "#N/A" => Some(CellError::NotAvailable),
            "#NUM!" => Some(CellError::Num),
            _ => None,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single cell value as exchanged with the grid UI.
///
/// The UI stores strings, numbers, booleans and nulls interchangeably; this
/// closed variant makes every conversion explicit. JSON/YAML `null` and the
/// empty string both deserialize to [`CellValue::Empty`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    #[default]
    Empty,
    Error(CellError),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    /// True for text that starts with the formula marker `=`
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.starts_with('='))
    }

    /// Numeric view of the value. Text is parsed after trimming; booleans
    /// are not coerced (callers decide that explicitly).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Typed form of a non-formula literal: text holding a number, a
    /// `TRUE`/`FALSE` flag or an error code becomes that value.
    pub fn literal(&self) -> CellValue {
        let CellValue::Text(s) = self else {
            return self.clone();
        };
        if self.is_formula() {
            return self.clone();
        }
        if let Some(n) = self.as_number() {
            return CellValue::Number(n);
        }
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Boolean(false);
        }
        match CellError::from_code(trimmed) {
            Some(e) => CellValue::Error(e),
            None => self.clone(),
        }
    }

    /// Display text of the value, the way a grid cell shows it
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Empty => String::new(),
            CellValue::Error(e) => e.code().to_string(),
        }
    }
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s)
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::Empty => serializer.serialize_none(),
            CellValue::Error(e) => serializer.serialize_str(e.code()),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Number(f64),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => CellValue::Empty,
            Some(Raw::Bool(b)) => CellValue::Boolean(b),
            Some(Raw::Number(n)) => CellValue::Number(n),
            Some(Raw::Text(s)) => CellValue::from(s),
        })
    }
}

//==============================================================================
// Grid
//==============================================================================

/// One sheet's visible content: rows of cells, row 0 conventionally headers
pub type Grid = Vec<Vec<CellValue>>;

/// Build a grid from anything convertible into cell values (handy in tests)
pub fn grid_from<R, C>(rows: R) -> Grid
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = C>,
    C: Into<CellValue>,
{
    rows.into_iter()
        .map(|row| row.into_iter().map(Into::into).collect())
        .collect()
}

//==============================================================================
// Data types
//==============================================================================

/// Classified type of a single raw cell value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Text,
    Date,
    Boolean,
    Empty,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::Text => "text",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
            DataType::Empty => "empty",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_mixed_row() {
        let row: Vec<CellValue> = serde_json::from_str(r#"["Jan", 1200, true, null, ""]"#).unwrap();
        assert_eq!(
            row,
            vec![
                CellValue::Text("Jan".to_string()),
                CellValue::Number(1200.0),
                CellValue::Boolean(true),
                CellValue::Empty,
                CellValue::Empty,
            ]
        );
    }

    #[test]
    fn test_serialize_error_as_code() {
        let json = serde_json::to_string(&CellValue::Error(CellError::DivZero)).unwrap();
        assert_eq!(json, "\"#DIV/0!\"");
        assert_eq!(serde_json::to_string(&CellValue::Empty).unwrap(), "null");
    }

    #[test]
    fn test_as_text_integral_number() {
        assert_eq!(CellValue::Number(30.0).as_text(), "30");
        assert_eq!(CellValue::Number(2.5).as_text(), "2.5");
        assert_eq!(CellValue::Boolean(false).as_text(), "FALSE");
    }

    #[test]
    fn test_is_formula() {
        assert!(CellValue::from("=SUM(A1:A2)").is_formula());
        assert!(!CellValue::from("SUM").is_formula());
        assert!(!CellValue::Number(1.0).is_formula());
    }

    #[test]
    fn test_literal_types_numeric_text() {
        assert_eq!(CellValue::from("10").literal(), CellValue::Number(10.0));
        assert_eq!(CellValue::from(" 2.5 ").literal(), CellValue::Number(2.5));
        assert_eq!(CellValue::from("true").literal(), CellValue::Boolean(true));
        assert_eq!(CellValue::from("FALSE").literal(), CellValue::Boolean(false));
        assert_eq!(
            CellValue::from("#N/A").literal(),
            CellValue::Error(CellError::NotAvailable)
        );
        assert_eq!(CellValue::from("inf").literal(), CellValue::from("inf"));
        assert_eq!(CellValue::from("Sales").literal(), CellValue::from("Sales"));
        assert_eq!(CellValue::from("=1").literal(), CellValue::from("=1"));
    }

    #[test]
    fn test_error_code_round_trip() {
        for err in [CellError::Error, CellError::Ref, CellError::Cycle, CellError::NotAvailable] {
            assert_eq!(CellError::from_code(err.code()), Some(err));
        }
    }
}
