//! SheetSense API Server binary
//!
//! HTTP REST API for formula evaluation and column analytics.

use clap::Parser;
use sheetsense::api::{run_api_server, ApiConfig};

#[derive(Parser, Debug)]
#[command(name = "sheetsense-server")]
#[command(version)]
#[command(about = "SheetSense API Server - HTTP REST API for spreadsheet analytics")]
#[command(long_about = r#"
SheetSense API Server - HTTP REST API

Endpoints:
  - POST /api/v1/matrix-operations - Matrix operations, PCA, SVD
  - POST /matrix-operations        - Alias of the above
  - POST /api/v1/stats             - Column statistics
  - POST /api/v1/evaluate          - Formula evaluation against a grid
  - POST /api/v1/classify-query    - Free-text operation lookup
  - GET  /health                   - Health check
  - GET  /version                  - Server version info
  - GET  /                         - API documentation

Example usage:
  sheetsense-server                           # Start on localhost:8080
  sheetsense-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/matrix-operations \
    -H "Content-Type: application/json" \
    -d '{"matrixA": [[1, 2], [3, 4]], "operation": "determinant"}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "SHEETSENSE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "SHEETSENSE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config).await
}
