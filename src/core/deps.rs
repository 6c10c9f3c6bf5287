//! Cell dependency graph
//!
//! Each formula cell records the cells and ranges it reads. Single-cell
//! precedents are indexed in reverse (cell -> dependents); range precedents
//! are kept as a list and matched by containment, so a large `SUM(A1:A9999)`
//! costs one entry instead of ten thousand.

use crate::core::addressing::{CellRange, CellRef};
use crate::core::formula::Precedent;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Recalculation plan for a set of dirty formula cells
#[derive(Debug, Default, PartialEq)]
pub struct RecalcPlan {
    /// Cells to evaluate, precedents before dependents
    pub order: Vec<CellRef>,
    /// Cells that sit on a reference cycle
    pub cyclic: HashSet<CellRef>,
}

#[derive(Debug, Default, Clone)]
pub struct DepGraph {
    precedents: HashMap<CellRef, Vec<Precedent>>,
    cell_dependents: HashMap<CellRef, HashSet<CellRef>>,
    range_dependents: Vec<(CellRange, CellRef)>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.precedents.clear();
        self.cell_dependents.clear();
        self.range_dependents.clear();
    }

    pub fn is_formula(&self, cell: CellRef) -> bool {
        self.precedents.contains_key(&cell)
    }

    pub fn formula_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.precedents.keys().copied()
    }

    /// Record (or replace) the precedents of a formula cell
    pub fn set_precedents(&mut self, cell: CellRef, precedents: Vec<Precedent>) {
        self.remove(cell);
        for precedent in &precedents {
            match precedent {
                Precedent::Cell(p) => {
                    self.cell_dependents.entry(*p).or_default().insert(cell);
                }
                Precedent::Range(r) => self.range_dependents.push((*r, cell)),
            }
        }
        self.precedents.insert(cell, precedents);
    }

    /// Forget a cell's formula (it became a literal or was cleared)
    pub fn remove(&mut self, cell: CellRef) {
        let Some(old) = self.precedents.remove(&cell) else {
            return;
        };
        for precedent in old {
            if let Precedent::Cell(p) = precedent {
                if let Some(set) = self.cell_dependents.get_mut(&p) {
                    set.remove(&cell);
                    if set.is_empty() {
                        self.cell_dependents.remove(&p);
                    }
                }
            }
        }
        self.range_dependents.retain(|(_, dependent)| *dependent != cell);
    }

    /// Formula cells that read `cell` directly
    pub fn direct_dependents(&self, cell: CellRef) -> HashSet<CellRef> {
        let mut out: HashSet<CellRef> = self
            .cell_dependents
            .get(&cell)
            .cloned()
            .unwrap_or_default();
        out.extend(
            self.range_dependents
                .iter()
                .filter(|(range, _)| range.contains(cell))
                .map(|(_, dependent)| *dependent),
        );
        out
    }

    /// Transitive dependents of the changed cells. Changed cells that are
    /// formulas themselves are included.
    pub fn dirty_set(&self, changed: &[CellRef]) -> HashSet<CellRef> {
        let mut dirty: HashSet<CellRef> = changed
            .iter()
            .copied()
            .filter(|c| self.is_formula(*c))
            .collect();
        let mut queue: VecDeque<CellRef> = changed.iter().copied().collect();
        let mut seen: HashSet<CellRef> = changed.iter().copied().collect();

        while let Some(cell) = queue.pop_front() {
            for dependent in self.direct_dependents(cell) {
                dirty.insert(dependent);
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        dirty
    }

    /// Order the dirty cells so every cell is evaluated after the dirty
    /// cells it reads. Cells on a cycle are reported separately.
    pub fn plan(&self, dirty: &HashSet<CellRef>) -> RecalcPlan {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        let mut cells: Vec<CellRef> = dirty.iter().copied().collect();
        cells.sort();
        for cell in &cells {
            node_indices.insert(*cell, graph.add_node(*cell));
        }

        for cell in &cells {
            for dependent in self.direct_dependents(*cell) {
                if let (Some(&from), Some(&to)) =
                    (node_indices.get(cell), node_indices.get(&dependent))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }

        if let Ok(order) = toposort(&graph, None) {
            return RecalcPlan {
                order: order.iter().map(|idx| graph[*idx]).collect(),
                cyclic: HashSet::new(),
            };
        }

        // tarjan_scc yields components in reverse topological order
        let mut plan = RecalcPlan::default();
        for component in tarjan_scc(&graph).into_iter().rev() {
            let self_loop = component.len() == 1 && graph.contains_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                plan.cyclic.extend(component.iter().map(|idx| graph[*idx]));
            } else {
                plan.order.push(graph[component[0]]);
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(label: &str) -> CellRef {
        CellRef::parse(label).unwrap()
    }

    #[test]
    fn test_transitive_dependents() {
        let mut deps = DepGraph::new();
        deps.set_precedents(c("B1"), vec![Precedent::Cell(c("A1"))]);
        deps.set_precedents(c("C1"), vec![Precedent::Cell(c("B1"))]);
        deps.set_precedents(c("D1"), vec![Precedent::Cell(c("Z9"))]);

        let dirty = deps.dirty_set(&[c("A1")]);
        assert_eq!(dirty, HashSet::from([c("B1"), c("C1")]));

        let plan = deps.plan(&dirty);
        assert_eq!(plan.order, vec![c("B1"), c("C1")]);
        assert!(plan.cyclic.is_empty());
    }

    #[test]
    fn test_range_dependents() {
        let mut deps = DepGraph::new();
        let range = CellRange::new(c("A1"), c("A10"));
        deps.set_precedents(c("B1"), vec![Precedent::Range(range)]);

        assert!(deps.direct_dependents(c("A5")).contains(&c("B1")));
        assert!(deps.direct_dependents(c("A11")).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut deps = DepGraph::new();
        deps.set_precedents(c("A1"), vec![Precedent::Cell(c("B1"))]);
        deps.set_precedents(c("B1"), vec![Precedent::Cell(c("A1"))]);
        deps.set_precedents(c("C1"), vec![Precedent::Cell(c("B1"))]);

        let dirty = deps.dirty_set(&[c("A1")]);
        let plan = deps.plan(&dirty);
        assert_eq!(plan.cyclic, HashSet::from([c("A1"), c("B1")]));
        assert_eq!(plan.order, vec![c("C1")]);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut deps = DepGraph::new();
        deps.set_precedents(c("A1"), vec![Precedent::Cell(c("A1"))]);
        let plan = deps.plan(&deps.dirty_set(&[c("A1")]));
        assert!(plan.cyclic.contains(&c("A1")));
        assert!(plan.order.is_empty());
    }

    #[test]
    fn test_remove_clears_reverse_index() {
        let mut deps = DepGraph::new();
        deps.set_precedents(c("B1"), vec![Precedent::Cell(c("A1"))]);
        deps.remove(c("B1"));
        assert!(deps.direct_dependents(c("A1")).is_empty());
        assert!(!deps.is_formula(c("B1")));
    }
}
