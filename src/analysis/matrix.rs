//! Rectangular numeric matrices
//!
//! Shape checks run before any arithmetic so a mismatched request fails with
//! a dimension error naming the operation, never with a partial result.
//! Decompositions go through nalgebra.

use super::inference::numeric_value;
use crate::error::{SheetError, SheetResult};
use crate::types::Grid;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-major matrix with at least one row and one column, all rows equal length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: Vec<Vec<f64>>,
}

/// Complex eigenvalue as returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eigenvalue {
    pub real: f64,
    pub imag: f64,
}

/// Thin singular value decomposition, singular values descending
#[derive(Debug, Clone, PartialEq)]
pub struct Svd {
    pub u: Matrix,
    pub s: Vec<f64>,
    pub vt: Matrix,
}

impl Matrix {
    pub fn new(rows: Vec<Vec<f64>>) -> SheetResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return Err(SheetError::InvalidInput(
                "matrix must have at least one row and one column".to_string(),
            ));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(SheetError::dimension(
                "matrix",
                format!("row {} has {} columns, expected {}", i, row.len(), cols),
            ));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SheetError::InvalidInput(
                "matrix contains a non-finite value".to_string(),
            ));
        }
        Ok(Self { rows })
    }

    /// Build a matrix from grid columns. The header row and rows that are
    /// entirely empty are skipped; empty or non-numeric cells become 0.
    pub fn from_selection(grid: &Grid, columns: &[usize]) -> SheetResult<Self> {
        if columns.is_empty() {
            return Err(SheetError::InvalidInput("no columns selected".to_string()));
        }
        let rows: Vec<Vec<f64>> = grid
            .iter()
            .skip(1)
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .map(|row| {
                columns
                    .iter()
                    .map(|&col| row.get(col).and_then(numeric_value).unwrap_or(0.0))
                    .collect()
            })
            .collect();
        if rows.is_empty() {
            return Err(SheetError::InvalidInput(
                "selection contains no data rows".to_string(),
            ));
        }
        Self::new(rows)
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.rows[0].len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn is_square(&self) -> bool {
        self.rows() == self.cols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    pub fn as_rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }

    /// Values of one column, top to bottom
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[col]).collect()
    }

    pub fn transpose(&self) -> Matrix {
        let rows = (0..self.cols()).map(|c| self.column(c)).collect();
        Matrix { rows }
    }

    pub fn add(&self, other: &Matrix) -> SheetResult<Matrix> {
        ensure_same_shape("add", self, other)?;
        Ok(self.zip_with(other, |a, b| a + b))
    }

    pub fn subtract(&self, other: &Matrix) -> SheetResult<Matrix> {
        ensure_same_shape("subtract", self, other)?;
        Ok(self.zip_with(other, |a, b| a - b))
    }

    pub fn multiply(&self, other: &Matrix) -> SheetResult<Matrix> {
        ensure_multipliable(self, other)?;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                (0..other.cols())
                    .map(|c| row.iter().enumerate().map(|(k, a)| a * other.rows[k][c]).sum())
                    .collect()
            })
            .collect();
        Ok(Matrix { rows })
    }

    pub fn determinant(&self) -> SheetResult<f64> {
        ensure_square("determinant", self)?;
        Ok(self.to_dmatrix().determinant())
    }

    pub fn inverse(&self) -> SheetResult<Matrix> {
        ensure_square("inverse", self)?;
        let inverse = self
            .to_dmatrix()
            .try_inverse()
            .ok_or_else(|| SheetError::Computation("matrix is singular and has no inverse".to_string()))?;
        let result = Matrix::from_dmatrix(&inverse);
        if result.rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SheetError::Computation(
                "matrix is singular and has no inverse".to_string(),
            ));
        }
        Ok(result)
    }

    /// Eigenvalues of a general square matrix (possibly complex)
    pub fn eigenvalues(&self) -> SheetResult<Vec<Eigenvalue>> {
        ensure_square("eigenvalues", self)?;
        Ok(self
            .to_dmatrix()
            .complex_eigenvalues()
            .iter()
            .map(|c| Eigenvalue {
                real: c.re,
                imag: c.im,
            })
            .collect())
    }

    /// Pearson correlation between every pair of columns
    pub fn correlation(&self) -> SheetResult<Matrix> {
        if self.cols() < 2 {
            return Err(SheetError::dimension(
                "correlation",
                format!("need at least 2 columns, got {}", self.cols()),
            ));
        }
        if self.rows() < 2 {
            return Err(SheetError::dimension(
                "correlation",
                format!("need at least 2 rows, got {}", self.rows()),
            ));
        }

        let n = self.rows() as f64;
        let centered: Vec<Vec<f64>> = (0..self.cols())
            .map(|c| {
                let col = self.column(c);
                let mean = col.iter().sum::<f64>() / n;
                col.into_iter().map(|v| v - mean).collect()
            })
            .collect();
        let norms: Vec<f64> = centered
            .iter()
            .map(|col| col.iter().map(|v| v * v).sum::<f64>().sqrt())
            .collect();
        if let Some(i) = norms.iter().position(|norm| *norm == 0.0) {
            return Err(SheetError::Computation(format!(
                "column {} has zero variance, correlation is undefined",
                i
            )));
        }

        let k = self.cols();
        let mut rows = vec![vec![0.0; k]; k];
        for i in 0..k {
            rows[i][i] = 1.0;
            for j in (i + 1)..k {
                let dot: f64 = centered[i].iter().zip(&centered[j]).map(|(a, b)| a * b).sum();
                let r = (dot / (norms[i] * norms[j])).clamp(-1.0, 1.0);
                rows[i][j] = r;
                rows[j][i] = r;
            }
        }
        Ok(Matrix { rows })
    }

    pub fn svd(&self) -> SheetResult<Svd> {
        let svd = self.to_dmatrix().svd(true, true);
        let (Some(u), Some(vt)) = (svd.u, svd.v_t) else {
            return Err(SheetError::Computation("SVD did not converge".to_string()));
        };

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let u_rows = (0..u.nrows())
            .map(|r| order.iter().map(|&k| u[(r, k)]).collect())
            .collect();
        let vt_rows = order
            .iter()
            .map(|&k| (0..vt.ncols()).map(|c| vt[(k, c)]).collect())
            .collect();

        Ok(Svd {
            u: Matrix { rows: u_rows },
            s: order.iter().map(|&k| svd.singular_values[k]).collect(),
            vt: Matrix { rows: vt_rows },
        })
    }

    fn zip_with(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Matrix {
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect())
            .collect();
        Matrix { rows }
    }

    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows(), self.cols(), |r, c| self.rows[r][c])
    }

    pub fn from_dmatrix(m: &DMatrix<f64>) -> Matrix {
        let rows = (0..m.nrows())
            .map(|r| (0..m.ncols()).map(|c| m[(r, c)]).collect())
            .collect();
        Matrix { rows }
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = SheetError;

    fn try_from(rows: Vec<Vec<f64>>) -> SheetResult<Self> {
        Matrix::new(rows)
    }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(m: Matrix) -> Self {
        m.rows
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| format!("{:>10.4}", v)).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}

fn fmt_shape(m: &Matrix) -> String {
    format!("{}x{}", m.rows(), m.cols())
}

pub fn ensure_same_shape(operation: &str, a: &Matrix, b: &Matrix) -> SheetResult<()> {
    if a.shape() != b.shape() {
        return Err(SheetError::dimension(
            operation,
            format!(
                "matrices must have the same dimensions, got {} and {}",
                fmt_shape(a),
                fmt_shape(b)
            ),
        ));
    }
    Ok(())
}

pub fn ensure_multipliable(a: &Matrix, b: &Matrix) -> SheetResult<()> {
    if a.cols() != b.rows() {
        return Err(SheetError::dimension(
            "multiply",
            format!(
                "columns of A ({}) must equal rows of B ({}); got {} and {}",
                a.cols(),
                b.rows(),
                fmt_shape(a),
                fmt_shape(b)
            ),
        ));
    }
    Ok(())
}

pub fn ensure_square(operation: &str, m: &Matrix) -> SheetResult<()> {
    if !m.is_square() {
        return Err(SheetError::dimension(
            operation,
            format!("matrix must be square, got {}", fmt_shape(m)),
        ));
    }
    Ok(())
}
