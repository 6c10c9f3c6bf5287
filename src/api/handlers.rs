//! API request handlers
//!
//! Handlers for all REST API endpoints. Every request is computed
//! synchronously with its own engine; nothing mutable is shared between
//! requests.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analysis::{self, classify_query, ColumnSnapshot, ColumnStats, MatrixRequest, Operation};
use crate::core::FormulaAdapter;
use crate::error::SheetError;
use crate::types::{CellValue, Grid};

use super::server::AppState;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Bare error body of the matrix-operations endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// HTTP status for a failed computation: caller mistakes are 400, the rest 500
pub fn status_for(error: &SheetError) -> StatusCode {
    if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn envelope_error<T: Serialize>(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<T>::err(message))).into_response()
}

// ==================== Info endpoints ====================

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(path: &str, method: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "SheetSense API Server".to_string(),
        version: state.version.clone(),
        description: "Formula evaluation and column analytics for spreadsheet grids".to_string(),
        endpoints: vec![
            endpoint("/health", "GET", "Health check endpoint"),
            endpoint("/version", "GET", "Get server version"),
            endpoint(
                "/api/v1/matrix-operations",
                "POST",
                "Run a matrix operation (add, multiply, inverse, pca, svd, ...)",
            ),
            endpoint("/api/v1/stats", "POST", "Summary statistics for one column"),
            endpoint("/api/v1/evaluate", "POST", "Evaluate a formula against a grid"),
            endpoint(
                "/api/v1/classify-query",
                "POST",
                "Map a free-text request to a matrix operation",
            ),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub operations: Vec<String>,
}

/// GET /version - Server version and supported operations
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        operations: Operation::ALL.iter().map(|op| op.name().to_string()).collect(),
    }))
}

// ==================== Matrix operations ====================

/// POST /api/v1/matrix-operations - Run an analytics operation
///
/// Responds with the tagged result on success, or `{"error": ...}` with
/// 400 for malformed or inconsistent input and 500 for numerical failures.
pub async fn matrix_operations(payload: Result<Json<MatrixRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected matrix request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    match analysis::execute(request) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(error = %e, "matrix operation failed");
            }
            (status, Json(ErrorBody { error: e.to_string() })).into_response()
        }
    }
}

// ==================== Column statistics ====================

#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    pub grid: Grid,
    pub column: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub column: usize,
    pub name: String,
    pub stats: ColumnStats,
}

/// POST /api/v1/stats - Statistics for one column (row 0 is the header)
pub async fn stats(payload: Result<Json<StatsRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return envelope_error::<StatsResponse>(StatusCode::BAD_REQUEST, rejection.body_text())
        }
    };

    let width = request.grid.iter().map(Vec::len).max().unwrap_or(0);
    if request.column >= width {
        return envelope_error::<StatsResponse>(
            StatusCode::BAD_REQUEST,
            format!(
                "Column {} is out of range (grid has {} columns)",
                request.column, width
            ),
        );
    }

    let snapshot = ColumnSnapshot::take(&request.grid, request.column);

    Json(ApiResponse::ok(StatsResponse {
        column: request.column,
        name: snapshot.column_name(),
        stats: snapshot.stats(),
    }))
    .into_response()
}

// ==================== Formula evaluation ====================

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub grid: Grid,
    pub formula: String,
    #[serde(default)]
    pub row: usize,
    #[serde(default)]
    pub col: usize,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub formula: String,
    pub value: CellValue,
}

/// POST /api/v1/evaluate - Evaluate a formula against a grid
pub async fn evaluate(payload: Result<Json<EvaluateRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return envelope_error::<EvaluateResponse>(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
            )
        }
    };

    let mut adapter = FormulaAdapter::default();
    let handle = match adapter.load_grid(&request.grid) {
        Ok(handle) => handle,
        Err(e) => return envelope_error::<EvaluateResponse>(status_for(&e), e.to_string()),
    };
    let value = adapter.evaluate(&request.formula, request.row, request.col, handle);
    adapter.destroy();

    Json(ApiResponse::ok(EvaluateResponse {
        formula: request.formula,
        value,
    }))
    .into_response()
}

// ==================== Query classification ====================

#[derive(Debug, Deserialize)]
pub struct ClassifyQueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ClassifyQueryResponse {
    pub operation: Option<Operation>,
}

/// POST /api/v1/classify-query - Map free text to an operation
pub async fn classify(payload: Result<Json<ClassifyQueryRequest>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(request)) => Json(ApiResponse::ok(ClassifyQueryResponse {
            operation: classify_query(&request.query),
        }))
        .into_response(),
        Err(rejection) => {
            envelope_error::<ClassifyQueryResponse>(StatusCode::BAD_REQUEST, rejection.body_text())
        }
    }
}
