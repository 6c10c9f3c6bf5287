//! Formula language: tokenizer, parser and evaluator
//!
//! ```text
//! "=SUM(A2:A3) * 2" -> [Token] -> Expr -> Value
//! ```

pub mod evaluator;
pub mod parser;
pub mod tokenizer;

pub use evaluator::{evaluate, CellSource, EvalContext, EvalError, Value};
pub use parser::{Expr, Precedent};

use crate::error::{SheetError, SheetResult};

/// Tokenize and parse a formula (leading `=` optional)
pub fn parse_formula(formula: &str) -> SheetResult<Expr> {
    let tokens = tokenizer::tokenize(formula).map_err(|e| SheetError::Parse(e.to_string()))?;
    parser::parse(tokens).map_err(|e| SheetError::Parse(e.to_string()))
}
