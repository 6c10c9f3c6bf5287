//! Free-text query classifier
//!
//! Fixed keyword matching, case-insensitive. Rules are checked in order and
//! the first match wins, so "matrix product sum" is a multiply.

use super::operations::Operation;

/// Map a free-text request to an analytics operation, if any
pub fn classify_query(query: &str) -> Option<Operation> {
    let q = query.to_lowercase();
    let has = |needle: &str| q.contains(needle);
    let matrix = has("matrix");

    if (matrix && (has("multiply") || has("multiplication") || has("product")))
        || has("matrix multiplication")
    {
        return Some(Operation::Multiply);
    }
    if (matrix && (has("add") || has("addition") || has("sum"))) || has("matrix addition") {
        return Some(Operation::Add);
    }
    if (matrix && (has("subtract") || has("subtraction") || has("difference")))
        || has("matrix subtraction")
    {
        return Some(Operation::Subtract);
    }
    if has("transpose") {
        return Some(Operation::Transpose);
    }
    if has("determinant") {
        return Some(Operation::Determinant);
    }
    if has("inverse") {
        return Some(Operation::Inverse);
    }
    if has("eigenvalue")
        || has("eigen value")
        || has("characteristic value")
        || (matrix && has("eigen"))
    {
        return Some(Operation::Eigenvalues);
    }
    if has("pca") || has("principal component analysis") || (has("principal") && has("component")) {
        return Some(Operation::Pca);
    }
    if has("correlation") || has("correlate") || has("covariance") {
        return Some(Operation::Correlation);
    }
    if has("svd") || has("singular value decomposition") {
        return Some(Operation::Svd);
    }

    None
}
