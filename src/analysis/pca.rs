//! Principal component analysis
//!
//! Features are standardized with the population standard deviation, the
//! covariance of the standardized data uses `n - 1`, and the covariance
//! matrix is eigendecomposed with nalgebra's `SymmetricEigen`. At most two
//! components are kept, ordered by descending eigenvalue.

use super::matrix::Matrix;
use crate::error::{SheetError, SheetResult};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::Serialize;

/// Number of components kept at most
pub const MAX_COMPONENTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PcaResult {
    /// Standardized samples projected onto the kept components (n x k)
    pub transformed: Vec<Vec<f64>>,
    /// Share of total variance per kept component
    pub explained_variance: Vec<f64>,
    /// Unit eigenvectors, one per kept component (k x features)
    pub components: Vec<Vec<f64>>,
}

/// Standardize every column to zero mean and unit population variance.
///
/// A constant column cannot be standardized; it is reported as a
/// computation error naming the column instead of producing NaN.
pub fn standardize(data: &Matrix) -> SheetResult<Vec<Vec<f64>>> {
    let n = data.rows() as f64;
    let mut means = Vec::with_capacity(data.cols());
    let mut stds = Vec::with_capacity(data.cols());

    for c in 0..data.cols() {
        let column = data.column(c);
        let mean = column.iter().sum::<f64>() / n;
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        if std == 0.0 || !std.is_finite() {
            return Err(SheetError::Computation(format!(
                "feature {} has zero variance and cannot be standardized",
                c
            )));
        }
        means.push(mean);
        stds.push(std);
    }

    Ok(data
        .as_rows()
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(c, v)| (v - means[c]) / stds[c])
                .collect()
        })
        .collect())
}

/// Sample covariance (divisor `n - 1`). Only the upper triangle is
/// computed; the lower one is mirrored.
pub fn covariance(standardized: &[Vec<f64>]) -> DMatrix<f64> {
    let samples = standardized.len();
    let features = standardized.first().map(Vec::len).unwrap_or(0);
    let mut cov = DMatrix::<f64>::zeros(features, features);

    for i in 0..features {
        for j in i..features {
            let sum: f64 = standardized.iter().map(|row| row[i] * row[j]).sum();
            let value = sum / (samples - 1) as f64;
            cov[(i, j)] = value;
            cov[(j, i)] = value;
        }
    }
    cov
}

/// Run PCA on a samples x features matrix
pub fn run_pca(data: &Matrix) -> SheetResult<PcaResult> {
    if data.rows() < 2 {
        return Err(SheetError::dimension(
            "pca",
            format!("need at least 2 samples, got {}", data.rows()),
        ));
    }

    let standardized = standardize(data)?;
    let cov = covariance(&standardized);
    let features = data.cols();

    let eigen = SymmetricEigen::new(cov);
    let eigenvalues = eigen.eigenvalues;
    let eigenvectors = eigen.eigenvectors;

    let mut indices: Vec<usize> = (0..features).collect();
    indices.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(SheetError::Computation(
            "covariance matrix has no positive variance".to_string(),
        ));
    }

    let k = features.min(MAX_COMPONENTS);
    let mut components = Vec::with_capacity(k);
    let mut explained_variance = Vec::with_capacity(k);

    for &idx in indices.iter().take(k) {
        let mut component: Vec<f64> = (0..features).map(|row| eigenvectors[(row, idx)]).collect();
        orient(&mut component);
        components.push(component);
        explained_variance.push(eigenvalues[idx].max(0.0) / total);
    }

    let transformed = standardized
        .iter()
        .map(|row| {
            components
                .iter()
                .map(|component| row.iter().zip(component).map(|(v, w)| v * w).sum())
                .collect()
        })
        .collect();

    Ok(PcaResult {
        transformed,
        explained_variance,
        components,
    })
}

/// Eigenvectors are only defined up to sign; make the largest-magnitude
/// entry positive so results are reproducible
fn orient(component: &mut [f64]) {
    let pivot = component
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if pivot < 0.0 {
        for v in component.iter_mut() {
            *v = -*v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_5x3() -> Matrix {
        Matrix::new(vec![
            vec![2.5, 2.4, 1.2],
            vec![0.5, 0.7, 0.3],
            vec![2.2, 2.9, 1.1],
            vec![1.9, 2.2, 0.8],
            vec![3.1, 3.0, 1.6],
        ])
        .unwrap()
    }

    #[test]
    fn test_pca_shapes() {
        let result = run_pca(&sample_5x3()).unwrap();
        assert_eq!(result.transformed.len(), 5);
        assert!(result.transformed.iter().all(|row| row.len() == 2));
        assert_eq!(result.explained_variance.len(), 2);
        assert_eq!(result.components.len(), 2);
        assert!(result.components.iter().all(|c| c.len() == 3));
    }

    #[test]
    fn test_explained_variance_bounded_and_sorted() {
        let result = run_pca(&sample_5x3()).unwrap();
        let total: f64 = result.explained_variance.iter().sum();
        assert!(total <= 1.0 + 1e-9);
        assert!(result.explained_variance[0] >= result.explained_variance[1]);
    }

    #[test]
    fn test_components_are_unit_vectors() {
        let result = run_pca(&sample_5x3()).unwrap();
        for component in &result.components {
            let norm: f64 = component.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_feature_keeps_one_component() {
        let data = Matrix::new(vec![vec![1.0], vec![2.0], vec![4.0]]).unwrap();
        let result = run_pca(&data).unwrap();
        assert_eq!(result.explained_variance.len(), 1);
        assert!((result.explained_variance[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_feature_is_error() {
        let data = Matrix::new(vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]]).unwrap();
        match run_pca(&data) {
            Err(SheetError::Computation(msg)) => assert!(msg.contains("feature 1")),
            other => panic!("expected computation error, got {:?}", other),
        }
    }

    #[test]
    fn test_single_sample_is_error() {
        let data = Matrix::new(vec![vec![1.0, 2.0]]).unwrap();
        assert!(matches!(run_pca(&data), Err(SheetError::Dimension { .. })));
    }

    #[test]
    fn test_covariance_of_standardized_is_symmetric() {
        let standardized = standardize(&sample_5x3()).unwrap();
        let cov = covariance(&standardized);
        for i in 0..3 {
            // population-standardized data: diagonal is n / (n - 1)
            assert!((cov[(i, i)] - 5.0 / 4.0).abs() < 1e-9);
            for j in 0..3 {
                assert_eq!(cov[(i, j)], cov[(j, i)]);
            }
        }
    }
}
