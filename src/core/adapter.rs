//! Formula engine adapter
//!
//! The grid UI talks to this adapter, never to the engine directly. It owns
//! one engine, creates it lazily, degrades to a disabled state when no
//! configuration can build one, and mirrors exactly one sheet (the active UI
//! sheet). Every public operation returns a value or a cell error sentinel;
//! nothing here panics or propagates engine failures to the grid.

use crate::config::AdapterConfig;
use crate::core::addressing::CellRef;
use crate::core::engine::{CellAddress, FormulaEngine, SheetId};
use crate::error::{SheetError, SheetResult};
use crate::types::{CellError, CellValue, Grid};
use tracing::{debug, error, warn};

pub use crate::core::addressing::{col_index_to_label, label_to_col_index};

/// Handle to the adapter's single live sheet.
///
/// Resetting the engine bumps the adapter generation, so handles taken
/// before the reset are detected as stale instead of reading another
/// document's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetHandle {
    index: SheetId,
    generation: u64,
}

impl SheetHandle {
    pub fn index(&self) -> SheetId {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Lifecycle state of the owned engine
#[derive(Debug)]
enum EngineSlot {
    Uninitialized,
    Active(FormulaEngine),
    /// Construction failed with both configurations
    Disabled { reason: String },
}

/// Where a batch of cell changes came from
#[derive(Debug, Clone, Copy)]
pub enum ChangeSource<'a> {
    /// User edit, paste or autofill: push only the changed cells
    Edit,
    /// The grid was (re)loaded wholesale: mirror the full grid
    LoadData(&'a Grid),
}

/// One edited cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub row: usize,
    pub col: usize,
    pub value: CellValue,
}

impl CellChange {
    pub fn new(row: usize, col: usize, value: impl Into<CellValue>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

pub struct FormulaAdapter {
    config: AdapterConfig,
    slot: EngineSlot,
    active: Option<SheetHandle>,
    generation: u64,
}

impl Default for FormulaAdapter {
    fn default() -> Self {
        Self::new(AdapterConfig::default())
    }
}

impl FormulaAdapter {
    /// Create an adapter; the engine itself is built on first use
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            slot: EngineSlot::Uninitialized,
            active: None,
            generation: 0,
        }
    }

    /// The owned engine, constructing it on first call. `None` when the
    /// adapter is disabled.
    pub fn get_engine(&mut self) -> Option<&mut FormulaEngine> {
        if matches!(self.slot, EngineSlot::Uninitialized) {
            self.initialize();
        }
        match &mut self.slot {
            EngineSlot::Active(engine) => Some(engine),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.slot, EngineSlot::Disabled { .. })
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.slot {
            EngineSlot::Disabled { reason } => Some(reason),
            _ => None,
        }
    }

    /// Handle of the live sheet, if the engine has one
    pub fn active_handle(&self) -> Option<SheetHandle> {
        self.active
    }

    fn check_handle(&self, handle: SheetHandle) -> SheetResult<()> {
        if self.active == Some(handle) {
            Ok(())
        } else {
            Err(SheetError::StaleHandle)
        }
    }

    fn initialize(&mut self) {
        self.slot = build_slot(&self.config);
        self.generation += 1;
        self.active = None;

        let result = match &mut self.slot {
            EngineSlot::Active(engine) => Some(ensure_single_sheet(engine)),
            _ => None,
        };
        match result {
            Some(Ok(index)) => {
                self.active = Some(SheetHandle {
                    index,
                    generation: self.generation,
                });
            }
            Some(Err(e)) => {
                error!(error = %e, "formula engine has no usable sheet, disabling");
                self.slot = EngineSlot::Disabled {
                    reason: e.to_string(),
                };
            }
            None => {}
        }
    }

    /// Destroy the current engine and build a fresh one with a single
    /// empty sheet. Handles taken before the reset become stale.
    pub fn reset_engine(&mut self) {
        self.destroy();
        self.initialize();
    }

    /// Tear the engine down; the next call rebuilds it lazily
    pub fn destroy(&mut self) {
        if let EngineSlot::Active(engine) = &mut self.slot {
            if let Err(e) = engine.destroy() {
                warn!(error = %e, "destroying formula engine failed, discarding it anyway");
            }
        }
        self.slot = EngineSlot::Uninitialized;
        self.active = None;
    }

    /// Mirror `grid` into the engine's single sheet. Extra sheets are
    /// removed; a missing sheet is created. On failure the engine is reset
    /// and the load retried once.
    pub fn load_grid(&mut self, grid: &Grid) -> SheetResult<SheetHandle> {
        match self.try_load(grid) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!(error = %e, "loading grid failed, resetting formula engine");
                self.reset_engine();
                self.try_load(grid).inspect_err(|e| {
                    error!(error = %e, "loading grid failed after reset");
                })
            }
        }
    }

    /// Manual recalculation: reload the grid so every formula is recomputed
    pub fn recalculate(&mut self, grid: &Grid) -> SheetResult<SheetHandle> {
        self.load_grid(grid)
    }

    fn try_load(&mut self, grid: &Grid) -> SheetResult<SheetHandle> {
        let Some(engine) = self.get_engine() else {
            return Err(disabled());
        };
        let index = ensure_single_sheet(engine)?;
        engine.set_sheet_content(index, grid)?;

        let handle = SheetHandle {
            index,
            generation: self.generation,
        };
        self.active = Some(handle);
        Ok(handle)
    }

    /// Evaluate a cell's raw input in the context of `(row, col)`.
    ///
    /// Input that does not start with `=` is returned unchanged. A formula
    /// the engine cannot parse directly is retried through the scratch cell
    /// `A1`, whose original content is restored afterwards. Any remaining
    /// failure yields `#ERROR!`; a stale handle yields `#REF!`.
    pub fn evaluate(
        &mut self,
        formula: &str,
        row: usize,
        col: usize,
        handle: SheetHandle,
    ) -> CellValue {
        if !formula.starts_with('=') {
            return CellValue::from(formula);
        }
        if self.get_engine().is_none() {
            return CellValue::Error(CellError::Error);
        }
        if let Err(e) = self.check_handle(handle) {
            warn!(
                handle_generation = handle.generation,
                current_generation = self.generation,
                error = %e,
                "evaluation against a stale sheet handle"
            );
            return CellValue::Error(CellError::Ref);
        }
        let Some(engine) = self.get_engine() else {
            return CellValue::Error(CellError::Error);
        };

        match engine.calculate_formula(formula, handle.index) {
            Ok(value) => value,
            // the scratch cell runs the same parser, so this path can only
            // end in #ERROR!; it remains for parity with the grid contract
            Err(SheetError::Parse(msg)) => {
                debug!(row, col, error = %msg, "direct calculation failed, using scratch cell");
                scratch_evaluate(engine, handle.index, formula).unwrap_or_else(|e| {
                    warn!(row, col, error = %e, "scratch cell evaluation failed");
                    CellValue::Error(CellError::Error)
                })
            }
            Err(e) => {
                warn!(row, col, error = %e, "formula evaluation failed");
                CellValue::Error(CellError::Error)
            }
        }
    }

    /// Display hook: formulas are replaced by their evaluated value
    pub fn before_render(&mut self, raw: &CellValue, row: usize, col: usize) -> CellValue {
        match raw {
            CellValue::Text(text) if raw.is_formula() => {
                let handle = match self.active_handle() {
                    Some(handle) => handle,
                    None => {
                        let _ = self.get_engine();
                        match self.active_handle() {
                            Some(handle) => handle,
                            None => return CellValue::Error(CellError::Error),
                        }
                    }
                };
                self.evaluate(text, row, col, handle)
            }
            _ => raw.clone(),
        }
    }

    /// Edit hook: push changed cells into the engine, or mirror the whole
    /// grid when it was loaded wholesale
    pub fn after_change(&mut self, changes: &[CellChange], source: ChangeSource<'_>) -> SheetResult<()> {
        match source {
            ChangeSource::LoadData(grid) => self.load_grid(grid).map(|_| ()),
            ChangeSource::Edit => {
                if changes.is_empty() {
                    return Ok(());
                }
                let Some(engine) = self.get_engine() else {
                    return Err(disabled());
                };
                let index = ensure_single_sheet(engine)?;
                let batch = changes
                    .iter()
                    .map(|c| (CellRef::new(c.row, c.col), c.value.clone()))
                    .collect();
                engine.set_cells(index, batch).inspect_err(|e| {
                    warn!(error = %e, count = changes.len(), "pushing cell changes failed");
                })
            }
        }
    }

    /// Computed value of a cell on the live sheet
    pub fn get_cell_value(&mut self, row: usize, col: usize) -> CellValue {
        let Some(handle) = self.active_handle() else {
            return CellValue::Error(CellError::Error);
        };
        match self.get_engine() {
            Some(engine) => engine
                .get_cell_value(CellAddress::new(handle.index, row, col))
                .unwrap_or(CellValue::Error(CellError::Ref)),
            None => CellValue::Error(CellError::Error),
        }
    }
}

fn disabled() -> SheetError {
    SheetError::Config("formula engine is disabled".to_string())
}

/// Try the full configuration, then the fallback, then give up
fn build_slot(config: &AdapterConfig) -> EngineSlot {
    match FormulaEngine::new(config.full.clone()) {
        Ok(engine) => EngineSlot::Active(engine),
        Err(e) => {
            warn!(error = %e, "full formula engine config failed, trying fallback");
            match FormulaEngine::new(config.fallback.clone()) {
                Ok(engine) => EngineSlot::Active(engine),
                Err(e) => {
                    error!(error = %e, "formula engine unavailable, formulas disabled");
                    EngineSlot::Disabled {
                        reason: e.to_string(),
                    }
                }
            }
        }
    }
}

/// Keep the first sheet, drop the rest, create one if there is none
fn ensure_single_sheet(engine: &mut FormulaEngine) -> SheetResult<SheetId> {
    let ids = engine.sheet_ids();
    match ids.split_first() {
        Some((first, rest)) => {
            for id in rest {
                engine.remove_sheet(*id)?;
            }
            Ok(*first)
        }
        None => {
            let name = engine.config().default_sheet_name.clone();
            engine.add_sheet(&name)
        }
    }
}

/// Evaluate through cell A1: save, write, read, restore
fn scratch_evaluate(engine: &mut FormulaEngine, sheet: SheetId, formula: &str) -> SheetResult<CellValue> {
    let scratch = CellAddress::new(sheet, 0, 0);
    let saved = engine.get_cell_contents(scratch)?;

    let result = engine
        .set_cell_contents(scratch, CellValue::Text(formula.to_string()))
        .and_then(|_| engine.get_cell_value(scratch))
        .and_then(|value| match value {
            CellValue::Error(CellError::Error) => Err(SheetError::Eval(format!(
                "scratch cell could not evaluate {}",
                formula
            ))),
            value => Ok(value),
        });

    if let Err(e) = engine.set_cell_contents(scratch, saved) {
        error!(error = %e, "restoring scratch cell failed");
        return Err(e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::grid_from;

    fn broken_config() -> AdapterConfig {
        let broken = EngineConfig {
            max_rows: 0,
            ..EngineConfig::full()
        };
        AdapterConfig {
            full: broken.clone(),
            fallback: broken,
        }
    }

    #[test]
    fn test_lazy_construction_creates_main_sheet() {
        let mut adapter = FormulaAdapter::default();
        assert!(adapter.active_handle().is_none());
        let engine = adapter.get_engine().unwrap();
        assert_eq!(engine.sheet_names(), vec!["Main"]);
        assert!(adapter.active_handle().is_some());
    }

    #[test]
    fn test_fallback_config_used_when_full_fails() {
        let config = AdapterConfig {
            full: EngineConfig {
                max_rows: 0,
                ..EngineConfig::full()
            },
            fallback: EngineConfig::minimal(),
        };
        let mut adapter = FormulaAdapter::new(config);
        let engine = adapter.get_engine().unwrap();
        assert_eq!(engine.config().max_columns, 100);
    }

    #[test]
    fn test_disabled_adapter_returns_error_sentinel() {
        let mut adapter = FormulaAdapter::new(broken_config());
        assert!(adapter.get_engine().is_none());
        assert!(adapter.is_disabled());
        assert!(adapter.disabled_reason().is_some());

        let grid = grid_from(vec![vec![1.0]]);
        assert!(adapter.load_grid(&grid).is_err());
        let raw = CellValue::from("=1+1");
        assert_eq!(
            adapter.before_render(&raw, 0, 0),
            CellValue::Error(CellError::Error)
        );
        assert_eq!(adapter.get_cell_value(0, 0), CellValue::Error(CellError::Error));
    }

    #[test]
    fn test_evaluate_pass_through() {
        let mut adapter = FormulaAdapter::default();
        let handle = adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        assert_eq!(
            adapter.evaluate("hello", 0, 0, handle),
            CellValue::Text("hello".to_string())
        );
    }

    #[test]
    fn test_load_grid_keeps_handle_valid() {
        let mut adapter = FormulaAdapter::default();
        let first = adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        let second = adapter.load_grid(&grid_from(vec![vec![2.0]])).unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.evaluate("=A1*10", 0, 1, first), CellValue::Number(20.0));
    }

    #[test]
    fn test_load_grid_removes_extra_sheets() {
        let mut adapter = FormulaAdapter::default();
        adapter.get_engine().unwrap().add_sheet("Other").unwrap();
        adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        assert_eq!(adapter.get_engine().unwrap().sheet_names(), vec!["Main"]);
    }

    #[test]
    fn test_stale_handle_after_reset() {
        let mut adapter = FormulaAdapter::default();
        let old = adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        adapter.reset_engine();
        assert_eq!(
            adapter.evaluate("=1+1", 0, 0, old),
            CellValue::Error(CellError::Ref)
        );
        let fresh = adapter.active_handle().unwrap();
        assert_ne!(fresh.generation(), old.generation());
        assert_eq!(adapter.evaluate("=1+1", 0, 0, fresh), CellValue::Number(2.0));
        assert!(matches!(adapter.check_handle(old), Err(SheetError::StaleHandle)));
        assert!(adapter.check_handle(fresh).is_ok());
    }

    #[test]
    fn test_scratch_evaluate_reports_eval_error() {
        let mut adapter = FormulaAdapter::default();
        let handle = adapter
            .load_grid(&grid_from(vec![vec!["keep"]]))
            .unwrap();
        let engine = adapter.get_engine().unwrap();

        let result = scratch_evaluate(engine, handle.index(), "=(1");
        assert!(matches!(result, Err(SheetError::Eval(_))));

        let value = scratch_evaluate(engine, handle.index(), "=2*3").unwrap();
        assert_eq!(value, CellValue::Number(6.0));

        let a1 = CellAddress::new(handle.index(), 0, 0);
        assert_eq!(engine.get_cell_contents(a1).unwrap(), CellValue::from("keep"));
    }

    #[test]
    fn test_numeric_text_grid_aggregates() {
        let mut adapter = FormulaAdapter::default();
        let grid = grid_from(vec![vec!["n"], vec!["10"], vec!["20"], vec!["TRUE"]]);
        let handle = adapter.load_grid(&grid).unwrap();

        assert_eq!(adapter.evaluate("=SUM(A2:A3)", 0, 1, handle), CellValue::Number(30.0));
        assert_eq!(adapter.evaluate("=A2+A3", 0, 1, handle), CellValue::Number(30.0));
        assert_eq!(adapter.evaluate("=AVERAGE(A2:A3)", 0, 1, handle), CellValue::Number(15.0));
        assert_eq!(adapter.get_cell_value(3, 0), CellValue::Boolean(true));

        let engine = adapter.get_engine().unwrap();
        let a2 = CellAddress::new(handle.index(), 1, 0);
        assert_eq!(engine.get_cell_contents(a2).unwrap(), CellValue::from("10"));
    }

    #[test]
    fn test_reference_past_sheet_limits_is_ref_error() {
        let mut adapter = FormulaAdapter::default();
        let handle = adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();

        assert_eq!(
            adapter.evaluate("=SUM(A1:ZZ200000)", 0, 1, handle),
            CellValue::Error(CellError::Ref)
        );
        assert_eq!(
            adapter.evaluate("=ZZZZ1", 0, 1, handle),
            CellValue::Error(CellError::Ref)
        );
        assert_eq!(adapter.evaluate("=SUM(A1:B2)", 0, 1, handle), CellValue::Number(1.0));
    }

    #[test]
    fn test_deeply_nested_formula_is_error_not_crash() {
        let mut adapter = FormulaAdapter::default();
        let handle = adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        let formula = format!("={}1{}", "(".repeat(200_000), ")".repeat(200_000));

        assert_eq!(
            adapter.evaluate(&formula, 0, 1, handle),
            CellValue::Error(CellError::Error)
        );
        assert_eq!(adapter.get_cell_value(0, 0), CellValue::Number(1.0));
    }

    #[test]
    fn test_scratch_cell_restored_after_fallback() {
        let mut adapter = FormulaAdapter::default();
        let grid = vec![vec![CellValue::from("orig"), CellValue::from("=LEN(A1)")]];
        let handle = adapter.load_grid(&grid).unwrap();

        let result = adapter.evaluate("=SUM(A1", 3, 3, handle);
        assert_eq!(result, CellValue::Error(CellError::Error));

        let engine = adapter.get_engine().unwrap();
        let a1 = CellAddress::new(handle.index(), 0, 0);
        assert_eq!(engine.get_cell_contents(a1).unwrap(), CellValue::from("orig"));
        assert_eq!(adapter.get_cell_value(0, 1), CellValue::Number(4.0));
    }

    #[test]
    fn test_after_change_edit_updates_dependents() {
        let mut adapter = FormulaAdapter::default();
        let grid = grid_from(vec![vec!["=B1*2", "3"]]);
        let handle = adapter.load_grid(&grid).unwrap();
        assert_eq!(adapter.get_cell_value(0, 0), CellValue::Number(6.0));

        adapter
            .after_change(&[CellChange::new(0, 1, 5.0)], ChangeSource::Edit)
            .unwrap();
        assert_eq!(adapter.get_cell_value(0, 0), CellValue::Number(10.0));
        assert_eq!(adapter.evaluate("=A1+B1", 0, 2, handle), CellValue::Number(15.0));
    }

    #[test]
    fn test_after_change_load_data_reloads() {
        let mut adapter = FormulaAdapter::default();
        adapter.load_grid(&grid_from(vec![vec![1.0]])).unwrap();
        let grid = grid_from(vec![vec![7.0]]);
        adapter.after_change(&[], ChangeSource::LoadData(&grid)).unwrap();
        assert_eq!(adapter.get_cell_value(0, 0), CellValue::Number(7.0));
    }

    #[test]
    fn test_load_grid_resets_and_retries_once() {
        let config = AdapterConfig {
            full: EngineConfig {
                max_rows: 1,
                ..EngineConfig::full()
            },
            fallback: EngineConfig::minimal(),
        };
        let mut adapter = FormulaAdapter::new(config);
        let tall = grid_from(vec![vec![1.0], vec![2.0]]);
        // full config rejects two rows; the reset rebuilds with the same config
        assert!(adapter.load_grid(&tall).is_err());
        assert!(!adapter.is_disabled());
    }

    #[test]
    fn test_before_render_non_formula_unchanged() {
        let mut adapter = FormulaAdapter::default();
        let raw = CellValue::Number(3.5);
        assert_eq!(adapter.before_render(&raw, 0, 0), raw);
    }
}
