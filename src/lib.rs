//! SheetSense - spreadsheet compute core
//!
//! This library evaluates spreadsheet formulas with dependency-aware
//! recalculation and runs the analytics behind a grid UI's data inspector.
//!
//! # Features
//!
//! - Excel-style formulas (SUM, AVERAGE, IF, SUMIF, ...) over A1 references
//! - Incremental recalculation in dependency order, with cycle detection
//! - Engine adapter with lazy creation, fallback config and a disabled state
//! - Type inference and per-column statistics (Number, Text, Date, Boolean)
//! - Matrix operations, eigenvalues, correlation, SVD and PCA
//!
//! # Example
//!
//! ```
//! use sheetsense::core::FormulaAdapter;
//! use sheetsense::types::{grid_from, CellValue};
//!
//! let grid = grid_from(vec![
//!     vec![CellValue::from("Sales")],
//!     vec![CellValue::from(100.0)],
//!     vec![CellValue::from(250.0)],
//! ]);
//!
//! let mut adapter = FormulaAdapter::default();
//! let handle = adapter.load_grid(&grid)?;
//! let total = adapter.evaluate("=SUM(A2:A3)", 0, 1, handle);
//! assert_eq!(total, CellValue::Number(350.0));
//! # Ok::<(), sheetsense::error::SheetError>(())
//! ```

pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{SheetError, SheetResult};
pub use types::{CellError, CellValue, DataType, Grid};
