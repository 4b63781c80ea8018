//! Grid data model shared between the data layer and the validation engine.
//!
//! Cells and rows are shared mutable records: the data layer edits values,
//! the engine writes error lists. Both sides hold them through [`CellRef`] /
//! [`RowRef`]; the engine only keeps [`std::sync::Weak`] handles for
//! bookkeeping.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::Value;

use crate::types::is_reserved_field;

pub type CellRef = Arc<Cell>;
pub type RowRef = Arc<Row>;

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Whether a cell value counts as "no data".
///
/// Null, whitespace-only strings and empty containers are blank. Numbers
/// and booleans never are.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Render a value the way a grid cell displays it.
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CellKey
// ---------------------------------------------------------------------------

/// Composite of row index and field identifying one cell at one instant.
///
/// Keys are only stable while the row keeps its index. Re-indexing a row
/// (see [`Row::set_index`]) makes its previous keys stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CellKey {
    pub row: usize,
    pub field: Arc<str>,
}

impl CellKey {
    pub fn new(row: usize, field: impl Into<Arc<str>>) -> Self {
        Self {
            row,
            field: field.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.row, self.field)
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CellState {
    value: Value,
    prior_value: Value,
    read_only: bool,
    errors: Vec<String>,
    /// Sequence number of the validation that last wrote `errors`.
    committed_seq: u64,
}

/// A single grid cell.
#[derive(Debug)]
pub struct Cell {
    field: Arc<str>,
    column_index: usize,
    row_index: AtomicUsize,
    state: RwLock<CellState>,
}

impl Cell {
    pub fn new(
        field: impl Into<Arc<str>>,
        row_index: usize,
        column_index: usize,
        value: Value,
    ) -> Self {
        Self {
            field: field.into(),
            column_index,
            row_index: AtomicUsize::new(row_index),
            state: RwLock::new(CellState {
                value,
                ..CellState::default()
            }),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn column_index(&self) -> usize {
        self.column_index
    }

    pub fn row_index(&self) -> usize {
        self.row_index.load(Ordering::Acquire)
    }

    /// Current key of this cell.
    pub fn key(&self) -> CellKey {
        CellKey {
            row: self.row_index(),
            field: Arc::clone(&self.field),
        }
    }

    pub fn value(&self) -> Value {
        self.read().value.clone()
    }

    pub fn prior_value(&self) -> Value {
        self.read().prior_value.clone()
    }

    /// Replace the value, keeping the old one as the prior value.
    pub fn set_value(&self, value: Value) {
        let mut state = self.write();
        state.prior_value = std::mem::replace(&mut state.value, value);
    }

    pub fn is_read_only(&self) -> bool {
        self.read().read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.write().read_only = read_only;
    }

    pub fn is_empty(&self) -> bool {
        is_blank(&self.read().value)
    }

    pub fn errors(&self) -> Vec<String> {
        self.read().errors.clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.read().errors.is_empty()
    }

    /// Write the error list produced by validation number `seq`.
    ///
    /// Rejected (returns `false`) when a newer validation already committed,
    /// so a slow stale run can never overwrite the result of a later edit.
    pub fn commit_errors(&self, seq: u64, errors: Vec<String>) -> bool {
        let mut state = self.write();
        if seq <= state.committed_seq {
            return false;
        }
        state.committed_seq = seq;
        state.errors = errors;
        true
    }

    fn set_row_index(&self, index: usize) {
        self.row_index.store(index, Ordering::Release);
    }

    fn read(&self) -> RwLockReadGuard<'_, CellState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CellState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// An ordered collection of cells keyed by field.
#[derive(Debug)]
pub struct Row {
    index: AtomicUsize,
    cells: Vec<CellRef>,
    invalid: AtomicBool,
}

impl Row {
    /// Build a row from existing cells. Every cell is moved to `index`.
    pub fn new(index: usize, cells: Vec<CellRef>) -> Self {
        for cell in &cells {
            cell.set_row_index(index);
        }
        Self {
            index: AtomicUsize::new(index),
            cells,
            invalid: AtomicBool::new(false),
        }
    }

    /// Build a row from `(field, value)` pairs in column order.
    pub fn from_values<F, I>(index: usize, values: I) -> Self
    where
        F: Into<Arc<str>>,
        I: IntoIterator<Item = (F, Value)>,
    {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(column, (field, value))| Arc::new(Cell::new(field, index, column, value)))
            .collect();
        Self::new(index, cells)
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Move the row (and its cells) to a new index after a structural change.
    pub fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Release);
        for cell in &self.cells {
            cell.set_row_index(index);
        }
    }

    pub fn cells(&self) -> &[CellRef] {
        &self.cells
    }

    pub fn cell(&self, field: &str) -> Option<&CellRef> {
        self.cells.iter().find(|c| c.field() == field)
    }

    pub fn value_of(&self, field: &str) -> Option<Value> {
        self.cell(field).map(|c| c.value())
    }

    /// Cells that take part in validation (everything but reserved columns).
    pub fn data_cells(&self) -> impl Iterator<Item = &CellRef> {
        self.cells.iter().filter(|c| !is_reserved_field(c.field()))
    }

    /// True iff every non-reserved cell is blank.
    pub fn is_empty(&self) -> bool {
        self.data_cells().all(|c| c.is_empty())
    }

    /// Whether any cell currently carries validation errors.
    pub fn has_errors(&self) -> bool {
        self.data_cells().any(|c| c.has_errors())
    }

    /// Aggregate flag as of the last row validation.
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    /// Recompute the aggregate flag from the cells' error lists.
    pub fn refresh_invalid(&self) -> bool {
        let invalid = self.has_errors();
        self.invalid.store(invalid, Ordering::Release);
        invalid
    }

    /// All error messages of the row, one per line, in column order.
    pub fn error_text(&self) -> String {
        self.data_cells()
            .flat_map(|c| {
                let field = c.field().to_string();
                c.errors()
                    .into_iter()
                    .map(move |msg| format!("{field}: {msg}"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
