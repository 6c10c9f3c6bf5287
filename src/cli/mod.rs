//! CLI command handlers

pub mod commands;

pub use commands::{classify_value, columns, eval, load_grid, load_matrix, matrix, pca, query, stats};
