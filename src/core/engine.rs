//! Formula engine
//!
//! An owned spreadsheet model: a small arena of named sheets, each holding
//! raw cell contents, parsed formulas, cached values and a dependency graph.
//! Edits re-evaluate only the transitive dependents of the changed cells.

use crate::config::EngineConfig;
use crate::core::addressing::CellRef;
use crate::core::deps::DepGraph;
use crate::core::formula::{self, CellSource, EvalContext, Expr};
use crate::error::{SheetError, SheetResult};
use crate::types::{CellError, CellValue, Grid};
use std::collections::HashMap;
use tracing::debug;

/// Index of a sheet inside one engine
pub type SheetId = usize;

/// Absolute cell address: sheet plus zero-based row/column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub sheet: SheetId,
    pub cell: CellRef,
}

impl CellAddress {
    pub fn new(sheet: SheetId, row: usize, col: usize) -> Self {
        Self {
            sheet,
            cell: CellRef::new(row, col),
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    raw: CellValue,
    expr: Option<Expr>,
    value: CellValue,
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    cells: HashMap<CellRef, Cell>,
    deps: DepGraph,
}

struct SheetView<'a> {
    cells: &'a HashMap<CellRef, Cell>,
}

impl CellSource for SheetView<'_> {
    fn cell_value(&self, cell: CellRef) -> CellValue {
        self.cells
            .get(&cell)
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }
}

impl Sheet {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: HashMap::new(),
            deps: DepGraph::new(),
        }
    }

    /// Store raw content without recalculating, so callers can batch edits
    fn store(&mut self, cell: CellRef, raw: CellValue) {
        if raw.is_empty() {
            self.cells.remove(&cell);
            self.deps.remove(cell);
            return;
        }

        let (expr, value) = match &raw {
            CellValue::Text(text) if raw.is_formula() => match formula::parse_formula(text) {
                Ok(expr) => (Some(expr), CellValue::Empty),
                Err(e) => {
                    debug!(cell = %cell, error = %e, "formula failed to parse");
                    (None, CellValue::Error(CellError::Error))
                }
            },
            _ => (None, raw.literal()),
        };

        match &expr {
            Some(expr) => self.deps.set_precedents(cell, expr.precedents()),
            None => self.deps.remove(cell),
        }
        self.cells.insert(cell, Cell { raw, expr, value });
    }

    fn recalculate(&mut self, changed: &[CellRef], config: &EngineConfig) {
        let dirty = self.deps.dirty_set(changed);
        if dirty.is_empty() {
            return;
        }
        let plan = self.deps.plan(&dirty);

        for cell in &plan.cyclic {
            if let Some(c) = self.cells.get_mut(cell) {
                c.value = CellValue::Error(CellError::Cycle);
            }
        }

        for cell in &plan.order {
            let value = match self.cells.get(cell).and_then(|c| c.expr.as_ref()) {
                Some(expr) => evaluate_expr(expr, &self.cells, config),
                None => continue,
            };
            if let Some(c) = self.cells.get_mut(cell) {
                c.value = value;
            }
        }

        debug!(
            sheet = %self.name,
            dirty = dirty.len(),
            cycles = plan.cyclic.len(),
            "recalculated"
        );
    }

    fn recalculate_all(&mut self, config: &EngineConfig) {
        let formulas: Vec<CellRef> = self.deps.formula_cells().collect();
        self.recalculate(&formulas, config);
    }
}

fn evaluate_expr(expr: &Expr, cells: &HashMap<CellRef, Cell>, config: &EngineConfig) -> CellValue {
    let view = SheetView { cells };
    let ctx = EvalContext::new(&view)
        .with_array_arithmetic(config.array_arithmetic)
        .with_bounds(config.max_rows, config.max_columns);
    match formula::evaluate(expr, &ctx) {
        Ok(value) => round_value(
            value.into_cell_value(config.evaluate_null_to_zero),
            config.precision_rounding,
        ),
        Err(e) => CellValue::Error(e.kind),
    }
}

/// Round numeric results to the configured number of decimal places
fn round_value(value: CellValue, places: u32) -> CellValue {
    match value {
        CellValue::Number(n) if n.abs() < 1e15 => {
            let factor = 10_f64.powi(places as i32);
            let rounded = (n * factor).round() / factor;
            if rounded.is_finite() {
                CellValue::Number(rounded)
            } else {
                CellValue::Number(n)
            }
        }
        other => other,
    }
}

/// Spreadsheet engine owning a set of sheets
#[derive(Debug)]
pub struct FormulaEngine {
    config: EngineConfig,
    sheets: Vec<Option<Sheet>>,
    destroyed: bool,
}

impl FormulaEngine {
    /// Build an empty engine (no sheets). Fails when the configuration
    /// cannot back a working engine.
    pub fn new(config: EngineConfig) -> SheetResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sheets: Vec::new(),
            destroyed: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_alive(&self) -> SheetResult<()> {
        if self.destroyed {
            return Err(SheetError::Config("engine has been destroyed".to_string()));
        }
        Ok(())
    }

    /// Ids past the end were never issued; an emptied slot was removed
    fn missing_sheet(&self, id: SheetId) -> SheetError {
        if id < self.sheets.len() {
            SheetError::StaleHandle
        } else {
            SheetError::InvalidInput(format!("no sheet with id {}", id))
        }
    }

    fn sheet(&self, id: SheetId) -> SheetResult<&Sheet> {
        self.ensure_alive()?;
        match self.sheets.get(id) {
            Some(Some(sheet)) => Ok(sheet),
            _ => Err(self.missing_sheet(id)),
        }
    }

    fn sheet_mut(&mut self, id: SheetId) -> SheetResult<&mut Sheet> {
        self.ensure_alive()?;
        let error = self.missing_sheet(id);
        match self.sheets.get_mut(id) {
            Some(Some(sheet)) => Ok(sheet),
            _ => Err(error),
        }
    }

    fn check_bounds(&self, cell: CellRef) -> SheetResult<()> {
        if cell.row >= self.config.max_rows || cell.col >= self.config.max_columns {
            return Err(SheetError::InvalidInput(format!(
                "cell {} is outside the {}x{} sheet limit",
                cell, self.config.max_rows, self.config.max_columns
            )));
        }
        Ok(())
    }

    /// Add a sheet; names are unique, compared case-insensitively
    pub fn add_sheet(&mut self, name: &str) -> SheetResult<SheetId> {
        self.ensure_alive()?;
        if self.sheet_id(name).is_some() {
            return Err(SheetError::InvalidInput(format!(
                "sheet '{}' already exists",
                name
            )));
        }
        self.sheets.push(Some(Sheet::new(name)));
        Ok(self.sheets.len() - 1)
    }

    pub fn remove_sheet(&mut self, id: SheetId) -> SheetResult<()> {
        self.sheet(id)?;
        self.sheets[id] = None;
        Ok(())
    }

    /// Ids of the live sheets, in creation order
    pub fn sheet_ids(&self) -> Vec<SheetId> {
        self.sheets
            .iter()
            .enumerate()
            .filter_map(|(id, sheet)| sheet.as_ref().map(|_| id))
            .collect()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets
            .iter()
            .flatten()
            .map(|sheet| sheet.name.clone())
            .collect()
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets.iter().position(|sheet| {
            sheet
                .as_ref()
                .is_some_and(|s| s.name.eq_ignore_ascii_case(name))
        })
    }

    /// Replace the whole content of a sheet and recalculate every formula
    pub fn set_sheet_content(&mut self, id: SheetId, grid: &Grid) -> SheetResult<()> {
        if grid.len() > self.config.max_rows {
            return Err(SheetError::InvalidInput(format!(
                "grid has {} rows, limit is {}",
                grid.len(),
                self.config.max_rows
            )));
        }
        if let Some(width) = grid.iter().map(Vec::len).max() {
            if width > self.config.max_columns {
                return Err(SheetError::InvalidInput(format!(
                    "grid has {} columns, limit is {}",
                    width, self.config.max_columns
                )));
            }
        }

        let config = self.config.clone();
        let sheet = self.sheet_mut(id)?;
        sheet.cells.clear();
        sheet.deps.clear();
        for (row, cells) in grid.iter().enumerate() {
            for (col, value) in cells.iter().enumerate() {
                sheet.store(CellRef::new(row, col), value.clone());
            }
        }
        sheet.recalculate_all(&config);
        Ok(())
    }

    /// Write one cell and recalculate its dependents
    pub fn set_cell_contents(&mut self, addr: CellAddress, value: CellValue) -> SheetResult<()> {
        self.set_cells(addr.sheet, vec![(addr.cell, value)])
    }

    /// Write a batch of cells, then recalculate once
    pub fn set_cells(&mut self, id: SheetId, changes: Vec<(CellRef, CellValue)>) -> SheetResult<()> {
        for (cell, _) in &changes {
            self.check_bounds(*cell)?;
        }
        let config = self.config.clone();
        let sheet = self.sheet_mut(id)?;
        let changed: Vec<CellRef> = changes.iter().map(|(cell, _)| *cell).collect();
        for (cell, value) in changes {
            sheet.store(cell, value);
        }
        sheet.recalculate(&changed, &config);
        Ok(())
    }

    /// Computed value of a cell (empty when nothing is stored there)
    pub fn get_cell_value(&self, addr: CellAddress) -> SheetResult<CellValue> {
        let sheet = self.sheet(addr.sheet)?;
        Ok(sheet
            .cells
            .get(&addr.cell)
            .map(|c| c.value.clone())
            .unwrap_or_default())
    }

    /// Raw content of a cell as written (formula text for formula cells)
    pub fn get_cell_contents(&self, addr: CellAddress) -> SheetResult<CellValue> {
        let sheet = self.sheet(addr.sheet)?;
        Ok(sheet
            .cells
            .get(&addr.cell)
            .map(|c| c.raw.clone())
            .unwrap_or_default())
    }

    /// Evaluate a formula against a sheet without storing it anywhere.
    /// Malformed formulas are reported as [`SheetError::Parse`].
    pub fn calculate_formula(&self, formula: &str, id: SheetId) -> SheetResult<CellValue> {
        let sheet = self.sheet(id)?;
        let expr = formula::parse_formula(formula)?;
        Ok(evaluate_expr(&expr, &sheet.cells, &self.config))
    }

    /// Drop every sheet; the engine refuses further work afterwards
    pub fn destroy(&mut self) -> SheetResult<()> {
        self.ensure_alive()?;
        self.sheets.clear();
        self.destroyed = true;
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::grid_from;

    fn engine_with(grid: &Grid) -> (FormulaEngine, SheetId) {
        let mut engine = FormulaEngine::new(EngineConfig::full()).unwrap();
        let id = engine.add_sheet("Main").unwrap();
        engine.set_sheet_content(id, grid).unwrap();
        (engine, id)
    }

    #[test]
    fn test_formula_cell_computed_on_load() {
        let grid = vec![
            vec![CellValue::from("n")],
            vec![CellValue::from(10.0)],
            vec![CellValue::from(20.0)],
            vec![CellValue::from("=SUM(A2:A3)")],
        ];
        let (engine, id) = engine_with(&grid);
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 3, 0)).unwrap(),
            CellValue::Number(30.0)
        );
        assert_eq!(
            engine.get_cell_contents(CellAddress::new(id, 3, 0)).unwrap(),
            CellValue::from("=SUM(A2:A3)")
        );
    }

    #[test]
    fn test_chained_formulas_recalculate_on_edit() {
        let grid = grid_from(vec![vec!["1", "=A1*2", "=B1+1"]]);
        let (mut engine, id) = engine_with(&grid);
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 0, 2)).unwrap(),
            CellValue::Number(3.0)
        );

        engine
            .set_cell_contents(CellAddress::new(id, 0, 0), CellValue::Number(5.0))
            .unwrap();
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 0, 1)).unwrap(),
            CellValue::Number(10.0)
        );
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 0, 2)).unwrap(),
            CellValue::Number(11.0)
        );
    }

    #[test]
    fn test_cycle_yields_cycle_error() {
        let grid = grid_from(vec![vec!["=B1", "=A1", "=B1+1"]]);
        let (engine, id) = engine_with(&grid);
        for col in 0..3 {
            assert_eq!(
                engine.get_cell_value(CellAddress::new(id, 0, col)).unwrap(),
                CellValue::Error(CellError::Cycle)
            );
        }
    }

    #[test]
    fn test_breaking_cycle_recovers() {
        let grid = grid_from(vec![vec!["=B1", "=A1"]]);
        let (mut engine, id) = engine_with(&grid);
        engine
            .set_cell_contents(CellAddress::new(id, 0, 1), CellValue::Number(7.0))
            .unwrap();
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 0, 0)).unwrap(),
            CellValue::Number(7.0)
        );
    }

    #[test]
    fn test_unparseable_formula_stores_error() {
        let grid = grid_from(vec![vec!["=SUM(A1"]]);
        let (engine, id) = engine_with(&grid);
        assert_eq!(
            engine.get_cell_value(CellAddress::new(id, 0, 0)).unwrap(),
            CellValue::Error(CellError::Error)
        );
    }

    #[test]
    fn test_calculate_formula_parse_error() {
        let (engine, id) = engine_with(&vec![]);
        assert!(matches!(
            engine.calculate_formula("=1+", id),
            Err(SheetError::Parse(_))
        ));
        assert_eq!(
            engine.calculate_formula("=1/3", id).unwrap(),
            CellValue::Number(0.3333333333)
        );
    }

    #[test]
    fn test_bounds_enforced() {
        let config = EngineConfig {
            max_rows: 2,
            max_columns: 2,
            ..EngineConfig::full()
        };
        let mut engine = FormulaEngine::new(config).unwrap();
        let id = engine.add_sheet("Main").unwrap();
        assert!(engine
            .set_cell_contents(CellAddress::new(id, 2, 0), CellValue::Number(1.0))
            .is_err());
        let wide = grid_from(vec![vec![1.0, 2.0, 3.0]]);
        assert!(engine.set_sheet_content(id, &wide).is_err());
    }

    #[test]
    fn test_sheet_management() {
        let mut engine = FormulaEngine::new(EngineConfig::full()).unwrap();
        let main = engine.add_sheet("Main").unwrap();
        let other = engine.add_sheet("Other").unwrap();
        assert!(engine.add_sheet("main").is_err());
        assert_eq!(engine.sheet_names(), vec!["Main", "Other"]);

        engine.remove_sheet(main).unwrap();
        assert_eq!(engine.sheet_ids(), vec![other]);
        assert_eq!(engine.sheet_id("Main"), None);
        assert!(matches!(
            engine.get_cell_value(CellAddress::new(main, 0, 0)),
            Err(SheetError::StaleHandle)
        ));
        assert!(matches!(
            engine.get_cell_value(CellAddress::new(9, 0, 0)),
            Err(SheetError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_destroy_twice_fails() {
        let mut engine = FormulaEngine::new(EngineConfig::full()).unwrap();
        engine.destroy().unwrap();
        assert!(engine.is_destroyed());
        assert!(engine.destroy().is_err());
        assert!(engine.add_sheet("Main").is_err());
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let config = EngineConfig {
            max_columns: 0,
            ..EngineConfig::full()
        };
        assert!(FormulaEngine::new(config).is_err());
    }
}
