//! Formula engine with dependency-aware recalculation

pub mod adapter;
pub mod addressing;
pub mod deps;
pub mod engine;
pub mod formula;

pub use adapter::{CellChange, ChangeSource, FormulaAdapter, SheetHandle};
pub use addressing::{col_index_to_label, label_to_col_index, CellRange, CellRef};
pub use engine::{CellAddress, FormulaEngine, SheetId};
