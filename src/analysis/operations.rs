//! Analytics operations: request validation and dispatch
//!
//! A request names an operation and carries matrix A (and B for binary
//! operations). All shape checks run before dispatch; the result is a
//! tagged [`AnalysisResult`] whose `resultType` tells callers how to read
//! `result`.

use super::matrix::{ensure_multipliable, ensure_same_shape, ensure_square, Eigenvalue, Matrix};
use super::pca::run_pca;
use crate::error::{SheetError, SheetResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Transpose,
    Determinant,
    Inverse,
    Eigenvalues,
    Pca,
    Correlation,
    Svd,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Transpose,
        Operation::Determinant,
        Operation::Inverse,
        Operation::Eigenvalues,
        Operation::Pca,
        Operation::Correlation,
        Operation::Svd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Transpose => "transpose",
            Operation::Determinant => "determinant",
            Operation::Inverse => "inverse",
            Operation::Eigenvalues => "eigenvalues",
            Operation::Pca => "pca",
            Operation::Correlation => "correlation",
            Operation::Svd => "svd",
        }
    }

    /// Operations that take a second matrix
    pub fn needs_matrix_b(&self) -> bool {
        matches!(
            self,
            Operation::Add | Operation::Subtract | Operation::Multiply
        )
    }

    pub fn requires_square(&self) -> bool {
        matches!(
            self,
            Operation::Determinant | Operation::Inverse | Operation::Eigenvalues
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == lower)
            .ok_or_else(|| SheetError::InvalidInput(format!("Unsupported operation: {}", s)))
    }
}

/// Wire form of an analytics request. Both snake_case and camelCase field
/// names are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixRequest {
    #[serde(default, alias = "matrixA")]
    pub matrix_a: Option<Vec<Vec<f64>>>,
    #[serde(default, alias = "matrixB")]
    pub matrix_b: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub operation: Option<String>,
    /// Transpose B before a multiply
    #[serde(default, alias = "transposeB")]
    pub transpose_b: bool,
}

/// Validated request, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub operation: Operation,
    pub a: Matrix,
    pub b: Option<Matrix>,
}

impl AnalysisRequest {
    /// Build a request, checking operand presence and shapes up front
    pub fn new(operation: Operation, a: Matrix, b: Option<Matrix>) -> SheetResult<Self> {
        let request = Self { operation, a, b };
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> SheetResult<()> {
        let b = match (&self.b, self.operation.needs_matrix_b()) {
            (Some(b), true) => Some(b),
            (None, true) => {
                return Err(SheetError::InvalidInput(format!(
                    "operation '{}' requires matrix B",
                    self.operation
                )))
            }
            (_, false) => None,
        };

        match (self.operation, b) {
            (Operation::Add | Operation::Subtract, Some(b)) => {
                ensure_same_shape(self.operation.name(), &self.a, b)
            }
            (Operation::Multiply, Some(b)) => ensure_multipliable(&self.a, b),
            (op, _) if op.requires_square() => ensure_square(op.name(), &self.a),
            (Operation::Correlation, _) if self.a.cols() < 2 => Err(SheetError::dimension(
                "correlation",
                format!("need at least 2 columns, got {}", self.a.cols()),
            )),
            _ => Ok(()),
        }
    }

    pub fn execute(&self) -> SheetResult<AnalysisResult> {
        let b = || {
            self.b.as_ref().ok_or_else(|| {
                SheetError::InvalidInput(format!("operation '{}' requires matrix B", self.operation))
            })
        };

        let result = match self.operation {
            Operation::Add => AnalysisResult::matrix(self.a.add(b()?)?),
            Operation::Subtract => AnalysisResult::matrix(self.a.subtract(b()?)?),
            Operation::Multiply => AnalysisResult::matrix(self.a.multiply(b()?)?),
            Operation::Transpose => AnalysisResult::matrix(self.a.transpose()),
            Operation::Inverse => AnalysisResult::matrix(self.a.inverse()?),
            Operation::Correlation => AnalysisResult::matrix(self.a.correlation()?),
            Operation::Determinant => AnalysisResult::Scalar {
                result: self.a.determinant()?,
            },
            Operation::Eigenvalues => AnalysisResult::Vector {
                result: self.a.eigenvalues()?,
            },
            Operation::Pca => {
                let pca = run_pca(&self.a)?;
                AnalysisResult::Pca {
                    result: pca.transformed,
                    explained_variance: pca.explained_variance,
                    components: pca.components,
                }
            }
            Operation::Svd => {
                let svd = self.a.svd()?;
                AnalysisResult::Svd {
                    u: svd.u.into_rows(),
                    s: svd.s,
                    vt: svd.vt.into_rows(),
                }
            }
        };
        Ok(result)
    }
}

impl TryFrom<MatrixRequest> for AnalysisRequest {
    type Error = SheetError;

    fn try_from(req: MatrixRequest) -> SheetResult<Self> {
        let operation: Operation = req
            .operation
            .as_deref()
            .ok_or_else(|| SheetError::InvalidInput("missing 'operation'".to_string()))?
            .parse()?;
        let a = Matrix::new(
            req.matrix_a
                .ok_or_else(|| SheetError::InvalidInput("missing 'matrix_a'".to_string()))?,
        )?;

        // B is ignored for unary operations, like the UI sends it
        let b = match req.matrix_b {
            Some(rows) if operation.needs_matrix_b() => {
                let b = Matrix::new(rows)?;
                Some(if req.transpose_b && operation == Operation::Multiply {
                    b.transpose()
                } else {
                    b
                })
            }
            _ => None,
        };

        AnalysisRequest::new(operation, a, b)
    }
}

/// Result of an analytics operation, tagged by `resultType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", rename_all = "lowercase")]
pub enum AnalysisResult {
    Matrix {
        result: Vec<Vec<f64>>,
    },
    Scalar {
        result: f64,
    },
    Vector {
        result: Vec<Eigenvalue>,
    },
    #[serde(rename_all = "camelCase")]
    Pca {
        result: Vec<Vec<f64>>,
        explained_variance: Vec<f64>,
        components: Vec<Vec<f64>>,
    },
    Svd {
        u: Vec<Vec<f64>>,
        s: Vec<f64>,
        vt: Vec<Vec<f64>>,
    },
}

impl AnalysisResult {
    fn matrix(m: Matrix) -> Self {
        AnalysisResult::Matrix {
            result: m.into_rows(),
        }
    }

    pub fn result_type(&self) -> &'static str {
        match self {
            AnalysisResult::Matrix { .. } => "matrix",
            AnalysisResult::Scalar { .. } => "scalar",
            AnalysisResult::Vector { .. } => "vector",
            AnalysisResult::Pca { .. } => "pca",
            AnalysisResult::Svd { .. } => "svd",
        }
    }
}

/// Validate and run a wire request
pub fn execute(request: MatrixRequest) -> SheetResult<AnalysisResult> {
    AnalysisRequest::try_from(request)?.execute()
}
