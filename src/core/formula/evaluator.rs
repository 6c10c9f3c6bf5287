//! Formula evaluator
//!
//! Evaluates an AST against a [`CellSource`] to produce a result value.
//! Ranges evaluate to arrays (row-major); errors raised while evaluating are
//! carried as [`EvalError`] and surface to the engine as cell error values.

use super::parser::Expr;
use crate::core::addressing::{CellRange, CellRef};
use crate::types::{CellError, CellValue};

/// Read access to computed cell values
pub trait CellSource {
    fn cell_value(&self, cell: CellRef) -> CellValue;
}

/// Value type produced during evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Values of a range, row-major
    Array(Vec<Value>),
    /// Empty cell
    Null,
    /// Error cell inside a range
    Error(CellError),
}

impl Value {
    /// Numeric coercion used by arithmetic: empty is 0, booleans are 1/0,
    /// numeric text is parsed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::Array(_) | Value::Error(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => crate::types::format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Null => String::new(),
            Value::Error(e) => e.code().to_string(),
            Value::Array(arr) => arr.first().map(Value::as_text).unwrap_or_default(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Null => Some(false),
            Value::Text(s) => match s.to_uppercase().as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Convert into the cell value a formula cell displays
    pub fn into_cell_value(self, null_to_zero: bool) -> CellValue {
        match self {
            Value::Number(n) if n.is_finite() => CellValue::Number(n),
            Value::Number(_) => CellValue::Error(CellError::Num),
            Value::Text(s) => CellValue::Text(s),
            Value::Boolean(b) => CellValue::Boolean(b),
            Value::Null if null_to_zero => CellValue::Number(0.0),
            Value::Null => CellValue::Empty,
            Value::Error(e) => CellValue::Error(e),
            // implicit intersection: a range result shows its first value
            Value::Array(arr) => arr
                .into_iter()
                .next()
                .map(|v| v.into_cell_value(null_to_zero))
                .unwrap_or(CellValue::Empty),
        }
    }
}

impl From<CellValue> for Value {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Number(n) => Value::Number(n),
            CellValue::Text(s) => Value::Text(s),
            CellValue::Boolean(b) => Value::Boolean(b),
            CellValue::Empty => Value::Null,
            CellValue::Error(e) => Value::Error(e),
        }
    }
}

/// Evaluation context: where cell values come from plus behavior switches
pub struct EvalContext<'a> {
    pub source: &'a dyn CellSource,
    /// Apply arithmetic element-wise when an operand is a range
    pub array_arithmetic: bool,
    /// References at or past these bounds evaluate to `#REF!`
    pub max_rows: usize,
    pub max_columns: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(source: &'a dyn CellSource) -> Self {
        Self {
            source,
            array_arithmetic: true,
            max_rows: usize::MAX,
            max_columns: usize::MAX,
        }
    }

    pub fn with_array_arithmetic(mut self, enabled: bool) -> Self {
        self.array_arithmetic = enabled;
        self
    }

    pub fn with_bounds(mut self, max_rows: usize, max_columns: usize) -> Self {
        self.max_rows = max_rows;
        self.max_columns = max_columns;
        self
    }

    fn check_bounds(&self, cell: CellRef) -> Result<(), EvalError> {
        if cell.row >= self.max_rows || cell.col >= self.max_columns {
            return Err(EvalError::new(
                CellError::Ref,
                format!(
                    "{} is outside the sheet ({} rows x {} columns)",
                    cell, self.max_rows, self.max_columns
                ),
            ));
        }
        Ok(())
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: CellError,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: CellError, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn value(message: impl Into<String>) -> Self {
        Self::new(CellError::Value, message)
    }

    fn div_zero() -> Self {
        Self::new(CellError::DivZero, "Division by zero")
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate an expression in the given context
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),

        Expr::Cell(cell) => {
            ctx.check_bounds(*cell)?;
            match Value::from(ctx.source.cell_value(*cell)) {
                Value::Error(e) => Err(EvalError::new(e, format!("{} holds {}", cell, e))),
                value => Ok(value),
            }
        }

        Expr::Range(range) => {
            // the normalized end corner is the furthest cell on both axes
            ctx.check_bounds(range.end)?;
            Ok(Value::Array(read_range(range, ctx)))
        }

        Expr::Name(name) => Err(EvalError::new(
            CellError::Name,
            format!("Unknown name: {}", name),
        )),

        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),

        Expr::BinaryOp { op, left, right } => {
            let left_val = evaluate(left, ctx)?;
            let right_val = evaluate(right, ctx)?;
            evaluate_binary_op(op, &left_val, &right_val, ctx)
        }

        Expr::UnaryOp { op, operand } => {
            let val = evaluate(operand, ctx)?;
            evaluate_unary_op(op, &val)
        }
    }
}

fn read_range(range: &CellRange, ctx: &EvalContext) -> Vec<Value> {
    range
        .cells()
        .map(|cell| Value::from(ctx.source.cell_value(cell)))
        .collect()
}

/// Evaluate a binary operation, element-wise over arrays when enabled
fn evaluate_binary_op(
    op: &str,
    left: &Value,
    right: &Value,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Array(l), Value::Array(r)) if ctx.array_arithmetic => {
            if l.len() != r.len() {
                return Err(EvalError::value("Array operands have different sizes"));
            }
            let values = l
                .iter()
                .zip(r)
                .map(|(a, b)| scalar_binary_op(op, a, b).unwrap_or_else(|e| Value::Error(e.kind)))
                .collect();
            Ok(Value::Array(values))
        }
        (Value::Array(l), r) if ctx.array_arithmetic => Ok(Value::Array(
            l.iter()
                .map(|a| scalar_binary_op(op, a, r).unwrap_or_else(|e| Value::Error(e.kind)))
                .collect(),
        )),
        (l, Value::Array(r)) if ctx.array_arithmetic => Ok(Value::Array(
            r.iter()
                .map(|b| scalar_binary_op(op, l, b).unwrap_or_else(|e| Value::Error(e.kind)))
                .collect(),
        )),
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            Err(EvalError::value("Range used where a single value is expected"))
        }
        _ => scalar_binary_op(op, left, right),
    }
}

fn numeric_operands(left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    if let Value::Error(e) = left {
        return Err(EvalError::new(*e, "Error operand"));
    }
    if let Value::Error(e) = right {
        return Err(EvalError::new(*e, "Error operand"));
    }
    let l = left
        .as_number()
        .ok_or_else(|| EvalError::value("Left operand must be a number"))?;
    let r = right
        .as_number()
        .ok_or_else(|| EvalError::value("Right operand must be a number"))?;
    Ok((l, r))
}

fn scalar_binary_op(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        "+" => numeric_operands(left, right).map(|(l, r)| Value::Number(l + r)),
        "-" => numeric_operands(left, right).map(|(l, r)| Value::Number(l - r)),
        "*" => numeric_operands(left, right).map(|(l, r)| Value::Number(l * r)),
        "/" => {
            let (l, r) = numeric_operands(left, right)?;
            if r == 0.0 {
                Err(EvalError::div_zero())
            } else {
                Ok(Value::Number(l / r))
            }
        }
        "^" => {
            let (l, r) = numeric_operands(left, right)?;
            let result = l.powf(r);
            if result.is_finite() {
                Ok(Value::Number(result))
            } else {
                Err(EvalError::new(CellError::Num, "Invalid power"))
            }
        }
        "&" => Ok(Value::Text(format!("{}{}", left.as_text(), right.as_text()))),

        "=" => Ok(Value::Boolean(compare_values(left, right) == Some(std::cmp::Ordering::Equal))),
        "<>" => Ok(Value::Boolean(compare_values(left, right) != Some(std::cmp::Ordering::Equal))),
        "<" | ">" | "<=" | ">=" => {
            let ordering = compare_values(left, right)
                .ok_or_else(|| EvalError::value("Values cannot be compared"))?;
            let result = match op {
                "<" => ordering.is_lt(),
                ">" => ordering.is_gt(),
                "<=" => ordering.is_le(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Boolean(result))
        }

        _ => Err(EvalError::value(format!("Unknown operator: {}", op))),
    }
}

/// Order two scalars: numbers numerically, text case-insensitively,
/// empty equal to 0 / "" / FALSE
fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if (l - r).abs() < 1e-10 {
                Some(std::cmp::Ordering::Equal)
            } else {
                l.partial_cmp(r)
            }
        }
        (Value::Text(l), Value::Text(r)) => Some(l.to_lowercase().cmp(&r.to_lowercase())),
        (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(std::cmp::Ordering::Equal),
        (Value::Null, Value::Number(_)) => compare_values(&Value::Number(0.0), right),
        (Value::Number(_), Value::Null) => compare_values(left, &Value::Number(0.0)),
        (Value::Null, Value::Text(_)) => compare_values(&Value::Text(String::new()), right),
        (Value::Text(_), Value::Null) => compare_values(left, &Value::Text(String::new())),
        (Value::Null, Value::Boolean(_)) => compare_values(&Value::Boolean(false), right),
        (Value::Boolean(_), Value::Null) => compare_values(left, &Value::Boolean(false)),
        _ => None,
    }
}

fn evaluate_unary_op(op: &str, operand: &Value) -> Result<Value, EvalError> {
    let map = |f: fn(f64) -> f64| -> Result<Value, EvalError> {
        match operand {
            Value::Array(arr) => Ok(Value::Array(
                arr.iter()
                    .map(|v| v.as_number().map(|n| Value::Number(f(n))).unwrap_or(Value::Error(CellError::Value)))
                    .collect(),
            )),
            Value::Error(e) => Err(EvalError::new(*e, "Error operand")),
            v => v
                .as_number()
                .map(|n| Value::Number(f(n)))
                .ok_or_else(|| EvalError::value("Operand must be a number")),
        }
    };

    match op {
        "-" => map(|n| -n),
        "%" => map(|n| n / 100.0),
        _ => Err(EvalError::value(format!("Unknown unary operator: {}", op))),
    }
}

/// Evaluate a function call
fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
    match name {
        // ═══════════════════════════════════════════════════════════════════════
        // AGGREGATION FUNCTIONS
        // ═══════════════════════════════════════════════════════════════════════
        "SUM" => {
            let values = collect_numeric_values(args, ctx)?;
            Ok(Value::Number(values.iter().fold(0.0, |a, b| a + b)))
        }

        "AVERAGE" | "AVG" => {
            let values = collect_numeric_values(args, ctx)?;
            if values.is_empty() {
                Err(EvalError::div_zero())
            } else {
                Ok(Value::Number(mean(&values)))
            }
        }

        "MIN" => {
            let values = collect_numeric_values(args, ctx)?;
            Ok(Value::Number(values.into_iter().reduce(f64::min).unwrap_or(0.0)))
        }

        "MAX" => {
            let values = collect_numeric_values(args, ctx)?;
            Ok(Value::Number(values.into_iter().reduce(f64::max).unwrap_or(0.0)))
        }

        "PRODUCT" => {
            let values = collect_numeric_values(args, ctx)?;
            if values.is_empty() {
                Ok(Value::Number(0.0))
            } else {
                Ok(Value::Number(values.iter().product()))
            }
        }

        "COUNT" => {
            let mut count = 0;
            for arg in args {
                match evaluate(arg, ctx) {
                    Ok(Value::Array(arr)) => {
                        count += arr.iter().filter(|v| matches!(v, Value::Number(_))).count();
                    }
                    Ok(Value::Number(_)) => count += 1,
                    _ => {}
                }
            }
            Ok(Value::Number(count as f64))
        }

        "COUNTA" => {
            let mut count = 0;
            for arg in args {
                match evaluate(arg, ctx) {
                    Ok(Value::Array(arr)) => {
                        count += arr.iter().filter(|v| !matches!(v, Value::Null)).count();
                    }
                    Ok(Value::Null) => {}
                    _ => count += 1,
                }
            }
            Ok(Value::Number(count as f64))
        }

        "COUNTBLANK" => {
            require_args(name, args, 1)?;
            let count = match evaluate(&args[0], ctx)? {
                Value::Array(arr) => arr.iter().filter(|v| is_blank(v)).count(),
                v if is_blank(&v) => 1,
                _ => 0,
            };
            Ok(Value::Number(count as f64))
        }

        "MEDIAN" => {
            let mut values = collect_numeric_values(args, ctx)?;
            if values.is_empty() {
                return Err(EvalError::new(CellError::Num, "MEDIAN of empty set"));
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                Ok(Value::Number((values[mid - 1] + values[mid]) / 2.0))
            } else {
                Ok(Value::Number(values[mid]))
            }
        }

        "STDEV" | "STDEV.S" | "VAR" | "VAR.S" | "STDEV.P" | "VAR.P" => {
            let values = collect_numeric_values(args, ctx)?;
            let population = name.ends_with(".P");
            let min_count = if population { 1 } else { 2 };
            if values.len() < min_count {
                return Err(EvalError::div_zero());
            }
            let m = mean(&values);
            let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
            let divisor = if population {
                values.len() as f64
            } else {
                (values.len() - 1) as f64
            };
            let variance = ss / divisor;
            if name.starts_with("STDEV") {
                Ok(Value::Number(variance.sqrt()))
            } else {
                Ok(Value::Number(variance))
            }
        }

        "SUMIF" | "COUNTIF" | "AVERAGEIF" => evaluate_conditional(name, args, ctx),

        // ═══════════════════════════════════════════════════════════════════════
        // MATH FUNCTIONS
        // ═══════════════════════════════════════════════════════════════════════
        "ABS" => unary_math(name, args, ctx, |v| Ok(v.abs())),

        "SQRT" => unary_math(name, args, ctx, |v| {
            if v < 0.0 {
                Err(EvalError::new(CellError::Num, "SQRT of negative number"))
            } else {
                Ok(v.sqrt())
            }
        }),

        "EXP" => unary_math(name, args, ctx, |v| Ok(v.exp())),

        "LN" => unary_math(name, args, ctx, |v| {
            if v <= 0.0 {
                Err(EvalError::new(CellError::Num, "LN of non-positive number"))
            } else {
                Ok(v.ln())
            }
        }),

        "LOG10" => unary_math(name, args, ctx, |v| {
            if v <= 0.0 {
                Err(EvalError::new(CellError::Num, "LOG10 of non-positive number"))
            } else {
                Ok(v.log10())
            }
        }),

        "INT" => unary_math(name, args, ctx, |v| Ok(v.floor())),

        "ROUND" | "ROUNDUP" | "ROUNDDOWN" => {
            require_args_range(name, args, 1, 2)?;
            let val = number_arg(name, &args[0], ctx)?;
            let decimals = if args.len() > 1 {
                number_arg(name, &args[1], ctx)? as i32
            } else {
                0
            };
            let multiplier = 10_f64.powi(decimals);
            let scaled = val.abs() * multiplier;
            let rounded = match name {
                "ROUND" => scaled.round(),
                "ROUNDUP" => scaled.ceil(),
                _ => scaled.floor(),
            };
            Ok(Value::Number(val.signum() * rounded / multiplier))
        }

        "MOD" => {
            require_args(name, args, 2)?;
            let num = number_arg(name, &args[0], ctx)?;
            let divisor = number_arg(name, &args[1], ctx)?;
            if divisor == 0.0 {
                Err(EvalError::div_zero())
            } else {
                // result takes the sign of the divisor
                Ok(Value::Number(num - divisor * (num / divisor).floor()))
            }
        }

        "POWER" => {
            require_args(name, args, 2)?;
            let base = number_arg(name, &args[0], ctx)?;
            let exp = number_arg(name, &args[1], ctx)?;
            scalar_binary_op("^", &Value::Number(base), &Value::Number(exp))
        }

        // ═══════════════════════════════════════════════════════════════════════
        // LOGICAL FUNCTIONS
        // ═══════════════════════════════════════════════════════════════════════
        "IF" => {
            require_args_range(name, args, 2, 3)?;
            let condition = evaluate(&args[0], ctx)?
                .as_bool()
                .ok_or_else(|| EvalError::value("IF condition is not a boolean"))?;
            if condition {
                evaluate(&args[1], ctx)
            } else if args.len() > 2 {
                evaluate(&args[2], ctx)
            } else {
                Ok(Value::Boolean(false))
            }
        }

        "IFERROR" => {
            require_args(name, args, 2)?;
            match evaluate(&args[0], ctx) {
                Ok(Value::Error(_)) | Err(_) => evaluate(&args[1], ctx),
                Ok(val) => Ok(val),
            }
        }

        "AND" | "OR" => {
            if args.is_empty() {
                return Err(EvalError::value(format!("{} requires arguments", name)));
            }
            let mut flags = Vec::new();
            for arg in args {
                match evaluate(arg, ctx)? {
                    Value::Array(arr) => flags.extend(arr.iter().filter_map(|v| match v {
                        Value::Boolean(b) => Some(*b),
                        Value::Number(n) => Some(*n != 0.0),
                        _ => None,
                    })),
                    v => flags.push(
                        v.as_bool()
                            .ok_or_else(|| EvalError::value(format!("{} requires booleans", name)))?,
                    ),
                }
            }
            let result = if name == "AND" {
                flags.iter().all(|b| *b)
            } else {
                flags.iter().any(|b| *b)
            };
            Ok(Value::Boolean(result))
        }

        "NOT" => {
            require_args(name, args, 1)?;
            let val = evaluate(&args[0], ctx)?
                .as_bool()
                .ok_or_else(|| EvalError::value("NOT requires a boolean"))?;
            Ok(Value::Boolean(!val))
        }

        // ═══════════════════════════════════════════════════════════════════════
        // TEXT FUNCTIONS
        // ═══════════════════════════════════════════════════════════════════════
        "CONCAT" | "CONCATENATE" => {
            let mut result = String::new();
            for arg in args {
                match evaluate(arg, ctx)? {
                    Value::Array(arr) => {
                        for v in arr {
                            result.push_str(&v.as_text());
                        }
                    }
                    v => result.push_str(&v.as_text()),
                }
            }
            Ok(Value::Text(result))
        }

        "LEN" => {
            require_args(name, args, 1)?;
            let text = text_arg(&args[0], ctx)?;
            Ok(Value::Number(text.chars().count() as f64))
        }

        "UPPER" => {
            require_args(name, args, 1)?;
            Ok(Value::Text(text_arg(&args[0], ctx)?.to_uppercase()))
        }

        "LOWER" => {
            require_args(name, args, 1)?;
            Ok(Value::Text(text_arg(&args[0], ctx)?.to_lowercase()))
        }

        "TRIM" => {
            require_args(name, args, 1)?;
            let text = text_arg(&args[0], ctx)?;
            Ok(Value::Text(
                text.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }

        "LEFT" | "RIGHT" => {
            require_args_range(name, args, 1, 2)?;
            let text = text_arg(&args[0], ctx)?;
            let count = if args.len() > 1 {
                let n = number_arg(name, &args[1], ctx)?;
                if n < 0.0 {
                    return Err(EvalError::value(format!("{} count must be >= 0", name)));
                }
                n as usize
            } else {
                1
            };
            let chars: Vec<char> = text.chars().collect();
            let count = count.min(chars.len());
            let slice = if name == "LEFT" {
                &chars[..count]
            } else {
                &chars[chars.len() - count..]
            };
            Ok(Value::Text(slice.iter().collect()))
        }

        _ => Err(EvalError::new(
            CellError::Name,
            format!("Unknown function: {}", name),
        )),
    }
}

fn is_blank(v: &Value) -> bool {
    matches!(v, Value::Null) || matches!(v, Value::Text(s) if s.is_empty())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn unary_math(
    name: &str,
    args: &[Expr],
    ctx: &EvalContext,
    f: impl Fn(f64) -> Result<f64, EvalError>,
) -> Result<Value, EvalError> {
    require_args(name, args, 1)?;
    let val = number_arg(name, &args[0], ctx)?;
    f(val).map(Value::Number)
}

fn number_arg(func: &str, arg: &Expr, ctx: &EvalContext) -> Result<f64, EvalError> {
    match evaluate(arg, ctx)? {
        Value::Error(e) => Err(EvalError::new(e, format!("{} received an error", func))),
        v => v
            .as_number()
            .ok_or_else(|| EvalError::value(format!("{} requires a number", func))),
    }
}

fn text_arg(arg: &Expr, ctx: &EvalContext) -> Result<String, EvalError> {
    match evaluate(arg, ctx)? {
        Value::Error(e) => Err(EvalError::new(e, "Text argument is an error")),
        v => Ok(v.as_text()),
    }
}

fn require_args(func: &str, args: &[Expr], count: usize) -> Result<(), EvalError> {
    if args.len() != count {
        return Err(EvalError::value(format!(
            "{} requires {} argument(s), got {}",
            func,
            count,
            args.len()
        )));
    }
    Ok(())
}

fn require_args_range(func: &str, args: &[Expr], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::value(format!(
            "{} requires {}-{} arguments, got {}",
            func,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

/// Numbers from the arguments: ranges contribute only their numeric cells,
/// direct arguments are coerced. Any error value aborts the aggregation.
fn collect_numeric_values(args: &[Expr], ctx: &EvalContext) -> Result<Vec<f64>, EvalError> {
    let mut values = Vec::new();

    for arg in args {
        match evaluate(arg, ctx)? {
            Value::Array(arr) => {
                for v in arr {
                    match v {
                        Value::Number(n) => values.push(n),
                        Value::Error(e) => {
                            return Err(EvalError::new(e, "Range contains an error"));
                        }
                        _ => {}
                    }
                }
            }
            Value::Error(e) => return Err(EvalError::new(e, "Argument is an error")),
            v => values.push(
                v.as_number()
                    .ok_or_else(|| EvalError::value("Argument is not numeric"))?,
            ),
        }
    }

    Ok(values)
}

/// Criteria as used by SUMIF/COUNTIF/AVERAGEIF: ">5", "<>x", "=3", "apple"
#[derive(Debug, Clone, PartialEq)]
struct Criterion {
    op: &'static str,
    operand: Value,
}

impl Criterion {
    fn parse(value: &Value) -> Self {
        let text = match value {
            Value::Text(s) => s.clone(),
            other => {
                return Self {
                    op: "=",
                    operand: other.clone(),
                }
            }
        };

        let (op, rest) = ["<>", ">=", "<=", "=", ">", "<"]
            .iter()
            .find_map(|op| text.strip_prefix(op).map(|rest| (*op, rest)))
            .unwrap_or(("=", text.as_str()));

        let operand = match rest.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(rest.to_string()),
        };

        Self { op, operand }
    }

    fn matches(&self, value: &Value) -> bool {
        if let (Value::Number(_), Value::Text(_)) = (&self.operand, value) {
            // numeric criteria never match text cells
            return self.op == "<>";
        }
        match self.op {
            "=" => compare_values(value, &self.operand).is_some_and(|o| o.is_eq()),
            "<>" => !compare_values(value, &self.operand).is_some_and(|o| o.is_eq()),
            op => compare_values(value, &self.operand).is_some_and(|o| match op {
                ">" => o.is_gt(),
                "<" => o.is_lt(),
                ">=" => o.is_ge(),
                _ => o.is_le(),
            }),
        }
    }
}

fn evaluate_conditional(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
    if name == "COUNTIF" {
        require_args(name, args, 2)?;
    } else {
        require_args_range(name, args, 2, 3)?;
    }

    let range = match evaluate(&args[0], ctx)? {
        Value::Array(arr) => arr,
        v => vec![v],
    };
    let criterion = Criterion::parse(&evaluate(&args[1], ctx)?);
    let targets = if args.len() > 2 {
        match evaluate(&args[2], ctx)? {
            Value::Array(arr) => arr,
            v => vec![v],
        }
    } else {
        range.clone()
    };

    let matched: Vec<&Value> = range
        .iter()
        .zip(targets.iter())
        .filter(|(candidate, _)| criterion.matches(candidate))
        .map(|(_, target)| target)
        .collect();

    match name {
        "COUNTIF" => Ok(Value::Number(matched.len() as f64)),
        _ => {
            let numbers: Vec<f64> = matched
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            if name == "SUMIF" {
                Ok(Value::Number(numbers.iter().fold(0.0, |a, b| a + b)))
            } else if numbers.is_empty() {
                Err(EvalError::div_zero())
            } else {
                Ok(Value::Number(mean(&numbers)))
            }
        }
    }
}
