use thiserror::Error;

pub type SheetResult<T> = Result<T, SheetError>;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Engine configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Formula evaluation error: {0}")]
    Eval(String),

    #[error("Dimension error in {operation}: {details}")]
    Dimension { operation: String, details: String },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sheet handle is stale (the engine was reset or the sheet replaced)")]
    StaleHandle,
}

impl SheetError {
    /// Shorthand for a dimension error naming the operation
    pub fn dimension(operation: impl Into<String>, details: impl Into<String>) -> Self {
        SheetError::Dimension {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the computation itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SheetError::Dimension { .. }
                | SheetError::InvalidInput(_)
                | SheetError::Parse(_)
                | SheetError::Json(_)
                | SheetError::Yaml(_)
        )
    }
}
