//! Column statistics
//!
//! Statistics are computed from a [`ColumnSnapshot`], a deep copy of the grid
//! taken when a column is selected. Edits to the live grid do not touch the
//! snapshot; only a new selection or an explicit refresh retakes it.

use super::inference::{classify, date_value, is_truthy, numeric_value};
use crate::core::addressing::col_index_to_label;
use crate::types::{CellValue, DataType, Grid};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Statistics record for one column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStats {
    pub count: usize,
    pub unique: usize,
    pub empty: usize,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(flatten)]
    pub details: Option<StatDetails>,
}

/// Type-specific part of the record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatDetails {
    Numeric(NumericStats),
    Date(DateStats),
    Boolean(BooleanStats),
    Text(TextStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub average: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateStats {
    pub oldest: NaiveDateTime,
    pub newest: NaiveDateTime,
    pub avg_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanStats {
    pub true_count: usize,
    pub false_count: usize,
    pub true_percent: String,
    pub false_percent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStats {
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
    pub most_common_value: String,
    pub most_common_count: usize,
}

impl ColumnStats {
    pub fn numeric(&self) -> Option<&NumericStats> {
        match &self.details {
            Some(StatDetails::Numeric(s)) => Some(s),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<&DateStats> {
        match &self.details {
            Some(StatDetails::Date(s)) => Some(s),
            _ => None,
        }
    }

    pub fn boolean(&self) -> Option<&BooleanStats> {
        match &self.details {
            Some(StatDetails::Boolean(s)) => Some(s),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&TextStats> {
        match &self.details {
            Some(StatDetails::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// Deep copy of the grid taken at selection time
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSnapshot {
    column: usize,
    grid: Grid,
}

impl ColumnSnapshot {
    pub fn take(grid: &Grid, column: usize) -> Self {
        Self {
            column,
            grid: grid.clone(),
        }
    }

    /// Retake the snapshot from the current grid (manual refresh)
    pub fn refresh(&mut self, grid: &Grid) {
        self.grid = grid.clone();
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Header text of the column, or its letter when the header is blank
    pub fn column_name(&self) -> String {
        column_name(&self.grid, self.column)
    }

    pub fn stats(&self) -> ColumnStats {
        column_stats(&self.grid, self.column)
    }
}

/// Selection-driven statistics: recomputes only when the selected column
/// changes or a refresh is requested, never on grid edits
#[derive(Debug, Default)]
pub struct ColumnInspector {
    snapshot: Option<ColumnSnapshot>,
    stats: Option<ColumnStats>,
}

impl ColumnInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a column. Selecting the already-selected column keeps the
    /// existing snapshot. `None` or an empty grid clears the inspector.
    pub fn select(&mut self, column: Option<usize>, grid: &Grid) -> Option<&ColumnStats> {
        let Some(column) = column.filter(|_| !grid.is_empty()) else {
            self.snapshot = None;
            self.stats = None;
            return None;
        };
        if self.snapshot.as_ref().map(ColumnSnapshot::column) != Some(column) {
            let snapshot = ColumnSnapshot::take(grid, column);
            self.stats = Some(snapshot.stats());
            self.snapshot = Some(snapshot);
        }
        self.stats.as_ref()
    }

    /// Retake the snapshot for the current selection
    pub fn refresh(&mut self, grid: &Grid) -> Option<&ColumnStats> {
        if grid.is_empty() {
            return self.stats.as_ref();
        }
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.refresh(grid);
            self.stats = Some(snapshot.stats());
        }
        self.stats.as_ref()
    }

    pub fn stats(&self) -> Option<&ColumnStats> {
        self.stats.as_ref()
    }

    pub fn column_name(&self) -> Option<String> {
        self.snapshot.as_ref().map(ColumnSnapshot::column_name)
    }
}

fn column_name(grid: &Grid, column: usize) -> String {
    match grid.first().and_then(|header| header.get(column)) {
        Some(value) if !value.is_empty() => value.as_text(),
        _ => col_index_to_label(column),
    }
}

/// Statistics for one column of a grid; row 0 is the header
pub fn column_stats(grid: &Grid, column: usize) -> ColumnStats {
    let data_rows = grid.len().saturating_sub(1);
    let values: Vec<CellValue> = grid
        .iter()
        .skip(1)
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_empty() && !matches!(v, CellValue::Text(s) if s.is_empty()))
        .cloned()
        .collect();

    let mut stats = summarize(&values);
    stats.empty = data_rows - values.len();
    stats
}

/// Statistics for already-extracted non-empty values. `empty` is left at 0.
pub fn summarize(values: &[CellValue]) -> ColumnStats {
    if values.is_empty() {
        return ColumnStats {
            count: 0,
            unique: 0,
            empty: 0,
            data_type: DataType::Empty,
            details: None,
        };
    }

    let data_type = predominant_type(values);
    // keyed on variant too, so 1200 and "1200" stay distinct
    let unique = values
        .iter()
        .map(|v| (std::mem::discriminant(v), v.as_text()))
        .collect::<HashSet<_>>()
        .len();

    let details = match data_type {
        DataType::Number => numeric_stats(values).map(StatDetails::Numeric),
        DataType::Date => date_stats(values).map(StatDetails::Date),
        DataType::Boolean => Some(StatDetails::Boolean(boolean_stats(values))),
        DataType::Text => text_stats(values).map(StatDetails::Text),
        DataType::Empty => None,
    };

    ColumnStats {
        count: values.len(),
        unique,
        empty: 0,
        data_type,
        details,
    }
}

/// Most frequent classified type; ties go to the type seen first
pub fn predominant_type(values: &[CellValue]) -> DataType {
    let mut counts: Vec<(DataType, usize)> = Vec::new();
    for value in values {
        let data_type = classify(value);
        match counts.iter_mut().find(|(t, _)| *t == data_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((data_type, 1)),
        }
    }

    let mut best: Option<(DataType, usize)> = None;
    for (data_type, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((data_type, count));
        }
    }
    best.map(|(t, _)| t).unwrap_or(DataType::Empty)
}

fn numeric_stats(values: &[CellValue]) -> Option<NumericStats> {
    let numbers: Vec<f64> = values.iter().filter_map(numeric_value).collect();
    if numbers.is_empty() {
        return None;
    }

    let sum: f64 = numbers.iter().sum();
    let average = sum / numbers.len() as f64;
    let variance = numbers.iter().map(|v| (v - average).powi(2)).sum::<f64>() / numbers.len() as f64;

    Some(NumericStats {
        min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
        max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        sum,
        average,
        std_dev: variance.sqrt(),
    })
}

fn date_stats(values: &[CellValue]) -> Option<DateStats> {
    let dates: Vec<NaiveDateTime> = values.iter().filter_map(date_value).collect();
    let oldest = *dates.iter().min()?;
    let newest = *dates.iter().max()?;

    let total_millis: f64 = dates
        .iter()
        .map(|d| d.and_utc().timestamp_millis() as f64)
        .sum();
    let avg_millis = (total_millis / dates.len() as f64).round() as i64;
    let avg_date = DateTime::from_timestamp_millis(avg_millis)?.naive_utc();

    Some(DateStats {
        oldest,
        newest,
        avg_date,
    })
}

fn boolean_stats(values: &[CellValue]) -> BooleanStats {
    let true_count = values.iter().filter(|v| is_truthy(v)).count();
    let false_count = values.len() - true_count;
    let percent = |n: usize| format!("{:.1}%", n as f64 / values.len() as f64 * 100.0);

    BooleanStats {
        true_count,
        false_count,
        true_percent: percent(true_count),
        false_percent: percent(false_count),
    }
}

fn text_stats(values: &[CellValue]) -> Option<TextStats> {
    let texts: Vec<String> = values.iter().map(CellValue::as_text).collect();
    let lengths: Vec<usize> = texts.iter().map(|s| s.chars().count()).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for text in &texts {
        let count = counts.entry(text.as_str()).or_insert(0);
        if *count == 0 {
            order.push(text.as_str());
        }
        *count += 1;
    }

    let mut most_common: Option<(&str, usize)> = None;
    for text in order {
        let count = counts[text];
        if most_common.map_or(true, |(_, c)| count > c) {
            most_common = Some((text, count));
        }
    }
    let (most_common_value, most_common_count) = most_common?;

    Some(TextStats {
        min_length: *lengths.iter().min()?,
        max_length: *lengths.iter().max()?,
        avg_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        most_common_value: most_common_value.to_string(),
        most_common_count,
    })
}

/// A column that qualifies as numeric for matrix selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub index: usize,
    pub name: String,
    /// First few data values, as shown in the column picker
    pub sample: Vec<CellValue>,
}

/// Default share of numeric cells for a column to count as numeric
pub const NUMERIC_COLUMN_THRESHOLD: f64 = 0.8;

const SAMPLE_ROWS: usize = 4;

/// Columns whose non-empty data cells are at least `threshold` numeric
pub fn numeric_columns(grid: &Grid, threshold: f64) -> Vec<NumericColumn> {
    let width = grid.first().map(Vec::len).unwrap_or(0);

    (0..width)
        .filter_map(|col| {
            let non_empty: Vec<&CellValue> = grid
                .iter()
                .skip(1)
                .filter_map(|row| row.get(col))
                .filter(|v| !v.is_empty())
                .collect();
            if non_empty.is_empty() {
                return None;
            }
            let numeric = non_empty.iter().filter(|v| numeric_value(v).is_some()).count();
            if (numeric as f64) / (non_empty.len() as f64) < threshold {
                return None;
            }

            Some(NumericColumn {
                index: col,
                name: column_name(grid, col),
                sample: grid
                    .iter()
                    .skip(1)
                    .take(SAMPLE_ROWS)
                    .map(|row| row.get(col).cloned().unwrap_or_default())
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::grid_from;

    fn sales_grid() -> Grid {
        vec![
            vec![CellValue::from("Month"), CellValue::from("Sales")],
            vec![CellValue::from("Jan"), CellValue::from(1200.0)],
            vec![CellValue::from("Feb"), CellValue::from(1350.0)],
        ]
    }

    #[test]
    fn test_numeric_column_stats() {
        let stats = column_stats(&sales_grid(), 1);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.unique, 2);
        assert_eq!(stats.empty, 0);
        assert_eq!(stats.data_type, DataType::Number);
        let numeric = stats.numeric().unwrap();
        assert_eq!(numeric.min, 1200.0);
        assert_eq!(numeric.max, 1350.0);
        assert_eq!(numeric.average, 1275.0);
        assert_eq!(numeric.sum, 2550.0);
        assert_eq!(numeric.std_dev, 75.0);
    }

    #[test]
    fn test_empty_column_record() {
        let grid = grid_from(vec![vec!["A", "B"], vec!["x", ""], vec!["y", ""]]);
        let stats = column_stats(&grid, 1);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.unique, 0);
        assert_eq!(stats.empty, 2);
        assert_eq!(stats.data_type, DataType::Empty);
        assert!(stats.details.is_none());
    }

    #[test]
    fn test_ragged_rows_count_as_empty() {
        let grid = vec![
            vec![CellValue::from("h1"), CellValue::from("h2")],
            vec![CellValue::from("a")],
            vec![CellValue::from("b"), CellValue::from(3.0)],
        ];
        let stats = column_stats(&grid, 1);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.empty, 1);
    }

    #[test]
    fn test_predominant_type_tie_first_wins() {
        let values = vec![CellValue::from("abc"), CellValue::from(1.0)];
        assert_eq!(predominant_type(&values), DataType::Text);
        let values = vec![CellValue::from(1.0), CellValue::from("abc")];
        assert_eq!(predominant_type(&values), DataType::Number);
    }

    #[test]
    fn test_boolean_stats() {
        let values: Vec<CellValue> = vec!["yes".into(), "no".into(), true.into(), "FALSE".into()];
        let stats = summarize(&values);
        let b = stats.boolean().unwrap();
        assert_eq!(b.true_count, 2);
        assert_eq!(b.false_count, 2);
        assert_eq!(b.true_count + b.false_count, stats.count);
        assert_eq!(b.true_percent, "50.0%");
    }

    #[test]
    fn test_boolean_percent_one_decimal() {
        let values: Vec<CellValue> = vec!["yes".into(), "no".into(), "no".into()];
        let b = summarize(&values).boolean().cloned().unwrap();
        assert_eq!(b.true_percent, "33.3%");
        assert_eq!(b.false_percent, "66.7%");
    }

    #[test]
    fn test_text_stats_mode_first_encountered() {
        let values: Vec<CellValue> = vec!["b".into(), "aa".into(), "aa".into(), "b".into(), "ccc".into()];
        let t = summarize(&values).text().cloned().unwrap();
        assert_eq!(t.min_length, 1);
        assert_eq!(t.max_length, 3);
        assert_eq!(t.most_common_value, "b");
        assert_eq!(t.most_common_count, 2);
    }

    #[test]
    fn test_date_stats() {
        let values: Vec<CellValue> = vec!["2024-01-01".into(), "2024-01-03".into()];
        let d = summarize(&values).date().cloned().unwrap();
        assert_eq!(d.oldest.to_string(), "2024-01-01 00:00:00");
        assert_eq!(d.newest.to_string(), "2024-01-03 00:00:00");
        assert_eq!(d.avg_date.to_string(), "2024-01-02 00:00:00");
    }

    #[test]
    fn test_unique_separates_number_from_numeric_text() {
        let values: Vec<CellValue> = vec![1200.0.into(), "1200".into(), 1200.0.into()];
        assert_eq!(summarize(&values).unique, 2);
    }

    #[test]
    fn test_inspector_ignores_edits_until_refresh() {
        let mut grid = sales_grid();
        let mut inspector = ColumnInspector::new();
        assert_eq!(inspector.select(Some(1), &grid).unwrap().count, 2);

        grid.push(vec![CellValue::from("Mar"), CellValue::from(1500.0)]);
        assert_eq!(inspector.select(Some(1), &grid).unwrap().count, 2);

        assert_eq!(inspector.refresh(&grid).unwrap().count, 3);
        assert_eq!(inspector.column_name().as_deref(), Some("Sales"));
    }

    #[test]
    fn test_inspector_clears_on_no_selection() {
        let mut inspector = ColumnInspector::new();
        inspector.select(Some(0), &sales_grid());
        assert!(inspector.select(None, &sales_grid()).is_none());
        assert!(inspector.stats().is_none());
    }

    #[test]
    fn test_numeric_columns_threshold() {
        let grid = grid_from(vec![
            vec!["Name", "Score", ""],
            vec!["a", "10", "1"],
            vec!["b", "20", "x"],
            vec!["c", "n/a", "2"],
            vec!["d", "30", "y"],
            vec!["e", "40", ""],
        ]);
        let cols = numeric_columns(&grid, NUMERIC_COLUMN_THRESHOLD);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].index, 1);
        assert_eq!(cols[0].name, "Score");
        assert_eq!(cols[0].sample.len(), 4);
    }

    #[test]
    fn test_stats_serialize_flat() {
        let json = serde_json::to_value(column_stats(&sales_grid(), 1)).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["average"], 1275.0);
        assert_eq!(json["stdDev"], 75.0);
    }
}
