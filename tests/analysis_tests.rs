//! Analytics integration tests
//!
//! Type inference, column statistics, matrix operations, PCA and the query
//! classifier, driven the way the grid UI drives them.

use pretty_assertions::assert_eq;
use sheetsense::analysis::stats::NUMERIC_COLUMN_THRESHOLD;
use sheetsense::analysis::{
    classify, classify_query, column_stats, execute, numeric_columns, run_pca, AnalysisRequest,
    AnalysisResult, ColumnInspector, ColumnSnapshot, Matrix, MatrixRequest, Operation,
};
use sheetsense::error::SheetError;
use sheetsense::types::{grid_from, CellValue, DataType, Grid};

fn t(text: &str) -> CellValue {
    CellValue::from(text)
}

fn n(value: f64) -> CellValue {
    CellValue::Number(value)
}

fn sales_grid() -> Grid {
    grid_from(vec![
        vec![t("Month"), t("Sales")],
        vec![t("Jan"), n(1200.0)],
        vec![t("Feb"), n(1350.0)],
    ])
}

fn request(operation: &str, a: Vec<Vec<f64>>, b: Option<Vec<Vec<f64>>>) -> MatrixRequest {
    MatrixRequest {
        matrix_a: Some(a),
        matrix_b: b,
        operation: Some(operation.to_string()),
        transpose_b: false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TYPE INFERENCE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_classify_scenarios() {
    assert_eq!(classify(&t("yes")), DataType::Boolean);
    assert_eq!(classify(&t("2024-01-05")), DataType::Date);
    assert_eq!(classify(&t("42")), DataType::Number);
    assert_eq!(classify(&t("")), DataType::Empty);
}

#[test]
fn test_classify_is_idempotent() {
    for value in [t("yes"), t("1,200"), t("2024/03/01"), t("hello"), n(3.5), CellValue::Empty] {
        assert_eq!(classify(&value), classify(&value));
    }
}

#[test]
fn test_classify_native_values() {
    assert_eq!(classify(&CellValue::Boolean(false)), DataType::Boolean);
    assert_eq!(classify(&n(-0.5)), DataType::Number);
    assert_eq!(classify(&CellValue::Empty), DataType::Empty);
}

// ═══════════════════════════════════════════════════════════════════════════
// COLUMN STATISTICS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sales_stats_scenario() {
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
}

#[test]
fn test_sales_stats_json_shape() {
    let json = serde_json::to_value(column_stats(&sales_grid(), 1)).unwrap();
    assert_eq!(json["type"], "number");
    assert_eq!(json["count"], 2);
    assert_eq!(json["average"], 1275.0);
}

#[test]
fn test_numeric_ordering_property() {
    let grid = grid_from(vec![
        vec![t("x")],
        vec![n(-3.0)],
        vec![n(8.5)],
        vec![t("12")],
        vec![n(0.0)],
    ]);
    let stats = column_stats(&grid, 0);
    let numeric = stats.numeric().unwrap();
    assert!(numeric.max >= numeric.average);
    assert!(numeric.average >= numeric.min);
}

#[test]
fn test_boolean_counts_add_up() {
    let grid = grid_from(vec![
        vec![t("Active")],
        vec![t("yes")],
        vec![t("no")],
        vec![CellValue::Boolean(true)],
        vec![CellValue::Empty],
    ]);
    let stats = column_stats(&grid, 0);
    let boolean = stats.boolean().unwrap();
    assert_eq!(boolean.true_count + boolean.false_count, stats.count);
    assert_eq!(stats.empty, 1);
}

#[test]
fn test_snapshot_is_detached_from_grid() {
    let mut grid = sales_grid();
    let snapshot = ColumnSnapshot::take(&grid, 1);
    grid[1][1] = n(0.0);

    assert_eq!(snapshot.stats().numeric().unwrap().sum, 2550.0);
    assert_eq!(snapshot.column_name(), "Sales");
}

#[test]
fn test_inspector_select_and_refresh() {
    let mut grid = sales_grid();
    let mut inspector = ColumnInspector::new();
    assert!(inspector.select(None, &grid).is_none());

    inspector.select(Some(1), &grid);
    grid[2][1] = n(1800.0);
    assert_eq!(inspector.stats().unwrap().numeric().unwrap().max, 1350.0);

    let refreshed = inspector.refresh(&grid).unwrap();
    assert_eq!(refreshed.numeric().unwrap().max, 1800.0);
}

#[test]
fn test_numeric_column_detection() {
    let grid = grid_from(vec![
        vec![t("Name"), t("Q1"), t("Q2")],
        vec![t("a"), n(1.0), t("n/a")],
        vec![t("b"), t("2,500"), t("x")],
        vec![t("c"), n(3.0), n(4.0)],
    ]);
    let columns = numeric_columns(&grid, NUMERIC_COLUMN_THRESHOLD);
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].index, 1);
    assert_eq!(columns[0].name, "Q1");
}

// ═══════════════════════════════════════════════════════════════════════════
// MATRIX OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_multiply_dimension_guard() {
    let a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    let b = vec![vec![1.0, 2.0]; 4];
    match execute(request("multiply", a, Some(b))) {
        Err(SheetError::Dimension { operation, .. }) => assert_eq!(operation, "multiply"),
        other => panic!("expected dimension error, got {:?}", other),
    }
}

#[test]
fn test_multiply_with_transpose_b() {
    let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
    let b = vec![vec![5.0, 6.0], vec![7.0, 8.0]];
    let mut req = request("multiply", a, Some(b));
    req.transpose_b = true;

    let result = execute(req).unwrap();
    assert_eq!(
        result,
        AnalysisResult::Matrix {
            result: vec![vec![17.0, 23.0], vec![39.0, 53.0]]
        }
    );
}

#[test]
fn test_determinant_scalar() {
    let result = execute(request("determinant", vec![vec![1.0, 2.0], vec![3.0, 4.0]], None)).unwrap();
    match result {
        AnalysisResult::Scalar { result } => assert!((result + 2.0).abs() < 1e-9),
        other => panic!("expected scalar, got {:?}", other),
    }
}

#[test]
fn test_singular_inverse_is_computation_error() {
    let result = execute(request("inverse", vec![vec![1.0, 2.0], vec![2.0, 4.0]], None));
    assert!(matches!(result, Err(SheetError::Computation(_))));
}

#[test]
fn test_missing_operand_b_is_invalid_input() {
    let result = execute(request("add", vec![vec![1.0]], None));
    assert!(matches!(result, Err(SheetError::InvalidInput(_))));
}

#[test]
fn test_unknown_operation_rejected() {
    let result = execute(request("cholesky", vec![vec![1.0]], None));
    assert!(matches!(result, Err(SheetError::InvalidInput(_))));
}

#[test]
fn test_eigenvalues_of_rotation_are_complex() {
    let result = execute(request("eigenvalues", vec![vec![0.0, -1.0], vec![1.0, 0.0]], None)).unwrap();
    match result {
        AnalysisResult::Vector { result } => {
            assert_eq!(result.len(), 2);
            for eigenvalue in result {
                assert!(eigenvalue.real.abs() < 1e-9);
                assert!((eigenvalue.imag.abs() - 1.0).abs() < 1e-9);
            }
        }
        other => panic!("expected vector, got {:?}", other),
    }
}

#[test]
fn test_result_json_is_tagged() {
    let result = execute(request("transpose", vec![vec![1.0, 2.0]], None)).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["resultType"], "matrix");
    assert_eq!(json["result"], serde_json::json!([[1.0], [2.0]]));
}

#[test]
fn test_camel_case_request_accepted() {
    let req: MatrixRequest = serde_json::from_str(
        r#"{"matrixA": [[1, 0], [0, 1]], "matrixB": [[2, 3], [4, 5]], "operation": "multiply"}"#,
    )
    .unwrap();
    let result = execute(req).unwrap();
    assert_eq!(
        result,
        AnalysisResult::Matrix {
            result: vec![vec![2.0, 3.0], vec![4.0, 5.0]]
        }
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// PCA
// ═══════════════════════════════════════════════════════════════════════════

fn pca_grid() -> Grid {
    grid_from(vec![
        vec![t("Region"), t("Sales"), t("Cost"), t("Units")],
        vec![t("N"), n(2.5), n(2.4), n(1.2)],
        vec![t("S"), n(0.5), n(0.7), n(0.3)],
        vec![t("E"), n(2.2), n(2.9), n(1.1)],
        vec![t("W"), n(1.9), n(2.2), n(0.8)],
        vec![t("C"), n(3.1), n(3.0), n(1.6)],
    ])
}

#[test]
fn test_pca_scenario_from_selection() {
    let data = Matrix::from_selection(&pca_grid(), &[1, 2, 3]).unwrap();
    assert_eq!(data.shape(), (5, 3));

    let result = run_pca(&data).unwrap();
    assert_eq!(result.transformed.len(), 5);
    assert!(result.transformed.iter().all(|row| row.len() == 2));
    assert_eq!(result.explained_variance.len(), 2);
    assert!(result.explained_variance.iter().sum::<f64>() <= 1.0 + 1e-9);
}

#[test]
fn test_pca_component_count_bounded_by_features() {
    let data = Matrix::from_selection(&pca_grid(), &[1]).unwrap();
    let result = run_pca(&data).unwrap();
    assert_eq!(result.explained_variance.len(), 1);
}

#[test]
fn test_pca_zero_variance_feature_is_error() {
    let mut grid = pca_grid();
    for row in grid.iter_mut().skip(1) {
        row[3] = n(1.0);
    }
    let data = Matrix::from_selection(&grid, &[1, 2, 3]).unwrap();
    assert!(matches!(run_pca(&data), Err(SheetError::Computation(_))));
}

#[test]
fn test_pca_through_dispatch_is_tagged() {
    let data = Matrix::from_selection(&pca_grid(), &[1, 2, 3]).unwrap();
    let result = AnalysisRequest::new(Operation::Pca, data, None)
        .unwrap()
        .execute()
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["resultType"], "pca");
    assert_eq!(json["explainedVariance"].as_array().unwrap().len(), 2);
    assert_eq!(json["components"].as_array().unwrap().len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// QUERY CLASSIFIER
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_query_classifier() {
    assert_eq!(classify_query("please multiply matrix A and B"), Some(Operation::Multiply));
    assert_eq!(classify_query("Run a Principal Component analysis"), Some(Operation::Pca));
    assert_eq!(classify_query("what's the weather"), None);
}
