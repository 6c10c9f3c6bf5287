use crate::analysis::{
    self, classify, classify_query, numeric_columns, AnalysisRequest,
    AnalysisResult, ColumnSnapshot, ColumnStats, Matrix, MatrixRequest, Operation,
};
use crate::config::AdapterConfig;
use crate::core::FormulaAdapter;
use crate::error::{SheetError, SheetResult};
use crate::types::{format_number, CellValue, Grid};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON (`.json`) or YAML (`.yaml`/`.yml`) document
fn read_document<T: DeserializeOwned>(path: &Path) -> SheetResult<T> {
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => Ok(serde_json::from_str(&content)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        _ => Err(SheetError::InvalidInput(format!(
            "Unsupported file format: {}. Use .json, .yaml or .yml",
            path.display()
        ))),
    }
}

/// Load a grid file: a 2D array whose first row is the header
pub fn load_grid(path: &Path) -> SheetResult<Grid> {
    read_document(path)
}

/// Load a 2D numeric array
pub fn load_matrix(path: &Path) -> SheetResult<Vec<Vec<f64>>> {
    read_document(path)
}

fn print_json<T: Serialize>(value: &T) -> SheetResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_rows(rows: &[Vec<f64>]) {
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>12.6}", v)).collect();
        println!("   [{}]", cells.join(" "));
    }
}

/// Execute the classify command - infer the data type of one value
pub fn classify_value(value: String, json: bool) -> SheetResult<()> {
    let cell = CellValue::from(value.as_str());
    let data_type = classify(&cell);

    if json {
        return print_json(&serde_json::json!({ "value": value, "type": data_type }));
    }
    println!("{} {}", format!("{:?}", value).cyan(), data_type.name().bold());
    Ok(())
}

/// Execute the stats command - summary statistics for one column
pub fn stats(file: PathBuf, column: usize, json: bool) -> SheetResult<()> {
    let grid = load_grid(&file)?;
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if column >= width {
        return Err(SheetError::InvalidInput(format!(
            "Column {} is out of range ({} has {} columns)",
            column,
            file.display(),
            width
        )));
    }

    let snapshot = ColumnSnapshot::take(&grid, column);
    let stats = snapshot.stats();
    if json {
        return print_json(&stats);
    }

    let name = snapshot.column_name();
    println!("{}", "📊 SheetSense - Column Statistics".bold().green());
    println!("   File:   {}", file.display());
    println!("   Column: {} ({})\n", name.bright_blue().bold(), column);
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &ColumnStats) {
    println!("   Type:   {}", stats.data_type.name().bold());
    println!("   Count:  {}", stats.count);
    println!("   Unique: {}", stats.unique);
    println!("   Empty:  {}", stats.empty);

    if let Some(n) = stats.numeric() {
        println!("   Min:     {}", format_number(n.min));
        println!("   Max:     {}", format_number(n.max));
        println!("   Sum:     {}", format_number(n.sum));
        println!("   Average: {}", format_number(n.average));
        println!("   Std dev: {}", format_number(n.std_dev));
    } else if let Some(d) = stats.date() {
        println!("   Oldest:  {}", d.oldest);
        println!("   Newest:  {}", d.newest);
        println!("   Average: {}", d.avg_date);
    } else if let Some(b) = stats.boolean() {
        println!("   True:  {} ({})", b.true_count, b.true_percent);
        println!("   False: {} ({})", b.false_count, b.false_percent);
    } else if let Some(t) = stats.text() {
        println!("   Length:      {}..{} (avg {:.2})", t.min_length, t.max_length, t.avg_length);
        println!(
            "   Most common: {} ({}x)",
            t.most_common_value.bright_blue(),
            t.most_common_count
        );
    }
}

/// Execute the eval command - evaluate a formula against a grid
pub fn eval(
    file: PathBuf,
    formula: String,
    row: usize,
    col: usize,
    config: Option<PathBuf>,
    json: bool,
) -> SheetResult<()> {
    let grid = load_grid(&file)?;
    let adapter_config = match config {
        Some(path) => AdapterConfig::from_yaml_file(&path)?,
        None => AdapterConfig::default(),
    };

    let mut adapter = FormulaAdapter::new(adapter_config);
    if adapter.get_engine().is_none() {
        return Err(SheetError::Config(
            adapter
                .disabled_reason()
                .unwrap_or("formula engine unavailable")
                .to_string(),
        ));
    }
    let handle = adapter.load_grid(&grid)?;
    let value = adapter.evaluate(&formula, row, col, handle);
    adapter.destroy();

    if json {
        return print_json(&serde_json::json!({ "formula": formula, "value": value }));
    }
    let shown = if value.is_error() {
        value.to_string().red().bold()
    } else {
        value.to_string().bold()
    };
    println!("{} = {}", formula.cyan(), shown);
    Ok(())
}

/// Execute the matrix command - run an operation on matrix files
pub fn matrix(
    operation: String,
    a: PathBuf,
    b: Option<PathBuf>,
    transpose_b: bool,
    json: bool,
) -> SheetResult<()> {
    let request = MatrixRequest {
        matrix_a: Some(load_matrix(&a)?),
        matrix_b: b.as_deref().map(load_matrix).transpose()?,
        operation: Some(operation),
        transpose_b,
    };
    let result = analysis::execute(request)?;

    if json {
        return print_json(&result);
    }
    print_result(&result);
    Ok(())
}

/// Execute the pca command - PCA over selected grid columns
pub fn pca(file: PathBuf, columns: Vec<usize>, json: bool) -> SheetResult<()> {
    let grid = load_grid(&file)?;
    let data = Matrix::from_selection(&grid, &columns)?;
    let result = AnalysisRequest::new(Operation::Pca, data, None)?.execute()?;

    if json {
        return print_json(&result);
    }
    println!("{}", "🧮 SheetSense - Principal Component Analysis".bold().green());
    println!("   File:    {}", file.display());
    println!("   Columns: {:?}\n", columns);
    print_result(&result);
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!("{} {}", "Result:".bold().cyan(), result.result_type());
    match result {
        AnalysisResult::Matrix { result } => print_rows(result),
        AnalysisResult::Scalar { result } => println!("   {}", format_number(*result).bold()),
        AnalysisResult::Vector { result } => {
            for eigenvalue in result {
                if eigenvalue.imag == 0.0 {
                    println!("   {}", format_number(eigenvalue.real));
                } else {
                    println!(
                        "   {} {} {}i",
                        format_number(eigenvalue.real),
                        if eigenvalue.imag < 0.0 { "-" } else { "+" },
                        format_number(eigenvalue.imag.abs())
                    );
                }
            }
        }
        AnalysisResult::Pca {
            result,
            explained_variance,
            components,
        } => {
            println!("   {}", "Explained variance:".bold());
            for (i, ratio) in explained_variance.iter().enumerate() {
                println!("      PC{}: {:.2}%", i + 1, ratio * 100.0);
            }
            println!("   {}", "Components:".bold());
            print_rows(components);
            println!("   {}", "Transformed:".bold());
            print_rows(result);
        }
        AnalysisResult::Svd { u, s, vt } => {
            println!("   {}", "U:".bold());
            print_rows(u);
            println!("   {} {:?}", "S:".bold(), s);
            println!("   {}", "Vt:".bold());
            print_rows(vt);
        }
    }
}

/// Execute the query command - classify a free-text request
pub fn query(text: String, json: bool) -> SheetResult<()> {
    let operation = classify_query(&text);

    if json {
        return print_json(&serde_json::json!({ "operation": operation }));
    }
    match operation {
        Some(op) => println!("{} {}", "Operation:".bold().green(), op.name().bold()),
        None => println!("{}", "No matching operation".yellow()),
    }
    Ok(())
}

/// Execute the columns command - list numeric columns of a grid
pub fn columns(file: PathBuf, threshold: f64, json: bool) -> SheetResult<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SheetError::InvalidInput(format!(
            "Threshold must be between 0 and 1, got {}",
            threshold
        )));
    }
    let grid = load_grid(&file)?;
    let found = numeric_columns(&grid, threshold);

    if json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("{}", "No numeric columns found".yellow());
        return Ok(());
    }
    println!("{}", "🔢 Numeric columns:".bold().green());
    for column in &found {
        let sample: Vec<String> = column.sample.iter().map(CellValue::as_text).collect();
        println!(
            "   {:>3}  {}  [{}]",
            column.index,
            column.name.bright_blue().bold(),
            sample.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_grid_json() {
        let file = temp_file(".json", r#"[["Name", "Sales"], ["a", 1], ["b", null]]"#);
        let grid = load_grid(file.path()).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1][1], CellValue::Number(1.0));
        assert!(grid[2][1].is_empty());
    }

    #[test]
    fn test_load_grid_yaml() {
        let file = temp_file(".yaml", "- [Name, Sales]\n- [a, 10]\n- [b, true]\n");
        let grid = load_grid(file.path()).unwrap();
        assert_eq!(grid[0][0], CellValue::Text("Name".to_string()));
        assert_eq!(grid[1][1], CellValue::Number(10.0));
        assert_eq!(grid[2][1], CellValue::Boolean(true));
    }

    #[test]
    fn test_load_grid_unknown_extension() {
        let file = temp_file(".csv", "a,b\n1,2\n");
        assert!(matches!(
            load_grid(file.path()),
            Err(SheetError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_matrix_rejects_text() {
        let file = temp_file(".json", r#"[[1, "x"]]"#);
        assert!(matches!(load_matrix(file.path()), Err(SheetError::Json(_))));
    }

    #[test]
    fn test_stats_column_out_of_range() {
        let file = temp_file(".json", r#"[["A"], [1]]"#);
        assert!(stats(file.path().to_path_buf(), 3, true).is_err());
    }

    #[test]
    fn test_matrix_dimension_error_propagates() {
        let a = temp_file(".json", "[[1, 2], [3, 4]]");
        let b = temp_file(".json", "[[1, 2, 3]]");
        let result = matrix(
            "add".to_string(),
            a.path().to_path_buf(),
            Some(b.path().to_path_buf()),
            false,
            true,
        );
        assert!(matches!(result, Err(SheetError::Dimension { .. })));
    }

    #[test]
    fn test_columns_threshold_validated() {
        let file = temp_file(".json", r#"[["A"], [1]]"#);
        assert!(columns(file.path().to_path_buf(), 1.5, true).is_err());
    }
}
