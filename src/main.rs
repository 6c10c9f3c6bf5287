use clap::{Parser, Subcommand};
use sheetsense::analysis::stats::NUMERIC_COLUMN_THRESHOLD;
use sheetsense::api::{run_api_server, ApiConfig};
use sheetsense::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetsense")]
#[command(about = "Spreadsheet compute core: formulas, column statistics, matrix analytics.")]
#[command(long_about = "SheetSense - Spreadsheet compute core

Evaluates spreadsheet formulas with dependency-aware recalculation, infers
column types, summarizes columns and runs matrix analytics (including PCA
and SVD) over grids stored as JSON or YAML 2D arrays.

COMMANDS:
  classify  - Infer the data type of a single value
  stats     - Summary statistics for one column of a grid
  eval      - Evaluate a formula against a grid
  matrix    - Run a matrix operation on matrix files
  pca       - Principal component analysis over grid columns
  query     - Map a free-text request to a matrix operation
  columns   - List the numeric columns of a grid
  serve     - Start the HTTP API server

EXAMPLES:
  sheetsense stats sales.json -c 1
  sheetsense eval sales.yaml \"=SUM(B2:B4)\"
  sheetsense matrix multiply --a a.json --b b.json
  sheetsense pca sales.json --columns 1,2,3
  sheetsense query \"inverse of this matrix\"")]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of colored text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer the data type of a single value
    Classify {
        /// Value to classify (e.g. 42, 2024-01-15, true, hello)
        value: String,
    },

    /// Summary statistics for one column (row 0 is the header)
    Stats {
        /// Grid file (.json, .yaml or .yml)
        file: PathBuf,

        /// Zero-based column index
        #[arg(short, long)]
        column: usize,
    },

    #[command(long_about = "Evaluate a formula against a grid.

The grid is loaded into a fresh engine as a single sheet, every formula in
it is recalculated, then FORMULA is evaluated. Input that does not start
with '=' is echoed unchanged.

EXAMPLES:
  sheetsense eval sales.json \"=AVERAGE(B2:B10)\"
  sheetsense eval sales.json \"=IF(B2>100, \\\"high\\\", \\\"low\\\")\" -r 1 -c 2")]
    /// Evaluate a formula against a grid
    Eval {
        /// Grid file (.json, .yaml or .yml)
        file: PathBuf,

        /// Formula to evaluate, starting with '='
        formula: String,

        /// Zero-based row the formula is evaluated for
        #[arg(short, long, default_value = "0")]
        row: usize,

        /// Zero-based column the formula is evaluated for
        #[arg(short, long, default_value = "0")]
        col: usize,

        /// Adapter configuration (YAML with 'full' and 'fallback' engine configs)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    #[command(long_about = "Run a matrix operation on matrix files.

Matrix files hold a 2D numeric array as JSON or YAML.

OPERATIONS:
  add, subtract, multiply  (need --b)
  transpose, determinant, inverse, eigenvalues, pca, correlation, svd")]
    /// Run a matrix operation
    Matrix {
        /// Operation name
        operation: String,

        /// Matrix A file
        #[arg(long)]
        a: PathBuf,

        /// Matrix B file
        #[arg(long)]
        b: Option<PathBuf>,

        /// Transpose B before multiplying
        #[arg(long)]
        transpose_b: bool,
    },

    /// Principal component analysis over grid columns
    Pca {
        /// Grid file (.json, .yaml or .yml)
        file: PathBuf,

        /// Zero-based column indices, comma separated
        #[arg(long, required = true, value_delimiter = ',')]
        columns: Vec<usize>,
    },

    /// Map a free-text request to a matrix operation
    Query {
        /// Request text, e.g. "multiply matrix A by B"
        text: String,
    },

    /// List the numeric columns of a grid
    Columns {
        /// Grid file (.json, .yaml or .yml)
        file: PathBuf,

        /// Minimum share of numeric cells
        #[arg(long, default_value_t = NUMERIC_COLUMN_THRESHOLD)]
        threshold: f64,
    },

    /// Start the HTTP API server
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "SHEETSENSE_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "SHEETSENSE_PORT")]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        Commands::Classify { value } => cli::classify_value(value, json)?,

        Commands::Stats { file, column } => cli::stats(file, column, json)?,

        Commands::Eval {
            file,
            formula,
            row,
            col,
            config,
        } => cli::eval(file, formula, row, col, config, json)?,

        Commands::Matrix {
            operation,
            a,
            b,
            transpose_b,
        } => cli::matrix(operation, a, b, transpose_b, json)?,

        Commands::Pca { file, columns } => cli::pca(file, columns, json)?,

        Commands::Query { text } => cli::query(text, json)?,

        Commands::Columns { file, threshold } => cli::columns(file, threshold, json)?,

        Commands::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_api_server(ApiConfig { host, port }))?;
        }
    }

    Ok(())
}
