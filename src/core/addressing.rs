//! Cell addressing: column labels and `A1`-style references
//!
//! Column labels use bijective base 26 (there is no zero digit), so index 0
//! is `A`, 25 is `Z` and 26 is `AA`, never `A0`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Zero-based (row, column) position of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Parse `A1`, `$B$7` or `aa10`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = cell_ref_re().captures(text.trim())?;
        let col = label_to_col_index(&caps[1])?;
        let row: usize = caps[2].parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self { row: row - 1, col })
    }

    /// `A1`-style label (1-based row)
    pub fn label(&self) -> String {
        format!("{}{}", col_index_to_label(self.col), self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Rectangular block of cells, corners normalized so `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Cells in row-major order
    pub fn cells(self) -> impl Iterator<Item = CellRef> {
        let (start, end) = (self.start, self.end);
        (start.row..=end.row)
            .flat_map(move |row| (start.col..=end.col).map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

fn cell_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$?([A-Za-z]{1,4})\$?([0-9]{1,7})$").expect("valid regex"))
}

/// Convert a 0-based column index to its label (0 -> A, 26 -> AA)
pub fn col_index_to_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

/// Convert a column label to its 0-based index (A -> 0, AA -> 26).
/// Case-insensitive; returns `None` for empty or non-alphabetic input.
pub fn label_to_col_index(label: &str) -> Option<usize> {
    if label.is_empty() {
        return None;
    }
    let mut result: usize = 0;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        result = result.checked_mul(26)?.checked_add(digit)?;
    }
    Some(result - 1)
}
