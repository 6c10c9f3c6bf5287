//! Engine configuration
//!
//! Configurations are plain serde structs so they can be loaded from a YAML
//! file (`--config engine.yaml`) or built in code via the presets.

use crate::error::{SheetError, SheetResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard upper bounds; a config asking for more is a construction failure
pub const MAX_ROWS_LIMIT: usize = 1_048_576;
pub const MAX_COLUMNS_LIMIT: usize = 16_384;
pub const MAX_PRECISION: u32 = 15;

/// Formula engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of rows a sheet may hold
    pub max_rows: usize,
    /// Maximum number of columns a sheet may hold
    pub max_columns: usize,
    /// Decimal places numeric results are rounded to
    pub precision_rounding: u32,
    /// Allow arithmetic operators to apply element-wise over ranges
    pub array_arithmetic: bool,
    /// Treat references to empty cells as 0 instead of empty
    pub evaluate_null_to_zero: bool,
    /// Name given to the sheet created on construction
    pub default_sheet_name: String,
}

impl EngineConfig {
    /// Full configuration: bounded size, Excel-like behavior
    pub fn full() -> Self {
        Self {
            max_rows: 10_000,
            max_columns: 1_000,
            precision_rounding: 10,
            array_arithmetic: true,
            evaluate_null_to_zero: false,
            default_sheet_name: "Main".to_string(),
        }
    }

    /// Minimal configuration used when the full one cannot be built
    pub fn minimal() -> Self {
        Self {
            max_rows: 1_000,
            max_columns: 100,
            precision_rounding: 10,
            array_arithmetic: false,
            evaluate_null_to_zero: false,
            default_sheet_name: "Main".to_string(),
        }
    }

    /// Check that the configuration can back a working engine
    pub fn validate(&self) -> SheetResult<()> {
        if self.max_rows == 0 || self.max_rows > MAX_ROWS_LIMIT {
            return Err(SheetError::Config(format!(
                "max_rows must be between 1 and {}, got {}",
                MAX_ROWS_LIMIT, self.max_rows
            )));
        }
        if self.max_columns == 0 || self.max_columns > MAX_COLUMNS_LIMIT {
            return Err(SheetError::Config(format!(
                "max_columns must be between 1 and {}, got {}",
                MAX_COLUMNS_LIMIT, self.max_columns
            )));
        }
        if self.precision_rounding > MAX_PRECISION {
            return Err(SheetError::Config(format!(
                "precision_rounding must be at most {}, got {}",
                MAX_PRECISION, self.precision_rounding
            )));
        }
        if self.default_sheet_name.trim().is_empty() {
            return Err(SheetError::Config(
                "default_sheet_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::full()
    }
}

/// Adapter configuration: the primary engine config and its fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub full: EngineConfig,
    pub fallback: EngineConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            full: EngineConfig::full(),
            fallback: EngineConfig::minimal(),
        }
    }
}

impl AdapterConfig {
    /// Load an adapter configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> SheetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> SheetResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
