//! Column analytics: type inference, statistics, matrix operations and PCA

pub mod inference;
pub mod matrix;
pub mod operations;
pub mod pca;
pub mod query;
pub mod stats;

pub use inference::classify;
pub use matrix::{Eigenvalue, Matrix};
pub use operations::{execute, AnalysisRequest, AnalysisResult, MatrixRequest, Operation};
pub use pca::{run_pca, PcaResult};
pub use query::classify_query;
pub use stats::{column_stats, numeric_columns, ColumnInspector, ColumnSnapshot, ColumnStats};
