//! SheetSense API Server module
//!
//! Provides the HTTP REST API over the analytics and formula engine.
//! Run with `sheetsense serve` or `sheetsense-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run_api_server, ApiConfig, AppState};
