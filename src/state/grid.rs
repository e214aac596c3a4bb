//! Fixed-shape ticket grid carrying the layout invariants of a bingo ticket.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows on a ticket.
pub const ROWS: usize = 3;
/// Number of columns on a ticket.
pub const COLUMNS: usize = 9;
/// Number of names printed on every ticket.
pub const NAMES_PER_TICKET: usize = 15;
/// Maximum number of names a single column may hold.
pub const MAX_PER_COLUMN: usize = 2;
/// Maximum number of names a single row may hold.
pub const MAX_PER_ROW: usize = 5;

/// Raw cell matrix, `None` marking an empty cell.
pub type Cells = [[Option<String>; COLUMNS]; ROWS];

/// Reasons a grid can be rejected or fail to generate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// The name pool holds fewer distinct names than a ticket needs.
    #[error("name pool holds {available} distinct names, at least {required} are required")]
    InsufficientPool {
        /// Distinct names found in the pool.
        available: usize,
        /// Names required for one ticket.
        required: usize,
    },
    /// The nested representation does not have 3 rows of 9 cells.
    #[error("grid must be {ROWS}x{COLUMNS}, got {rows} rows with row widths {widths:?}")]
    WrongShape {
        /// Number of rows received.
        rows: usize,
        /// Width of every row received.
        widths: Vec<usize>,
    },
    /// The grid does not hold exactly 15 names.
    #[error("grid must hold exactly {NAMES_PER_TICKET} names, found {count}")]
    WrongCount {
        /// Non-empty cells found.
        count: usize,
    },
    /// A column holds more than two names.
    #[error("column {column} holds {count} names (max {MAX_PER_COLUMN})")]
    ColumnOverflow {
        /// Zero-based column index.
        column: usize,
        /// Names found in that column.
        count: usize,
    },
    /// A row holds more than five names.
    #[error("row {row} holds {count} names (max {MAX_PER_ROW})")]
    RowOverflow {
        /// Zero-based row index.
        row: usize,
        /// Names found in that row.
        count: usize,
    },
    /// A name appears in more than one cell.
    #[error("name `{0}` appears more than once")]
    DuplicateName(String),
    /// A cell holds an empty or whitespace-only name.
    #[error("cell ({row}, {column}) holds a blank name")]
    BlankName {
        /// Zero-based row index.
        row: usize,
        /// Zero-based column index.
        column: usize,
    },
}

/// A validated 3x9 ticket grid holding exactly 15 distinct names.
///
/// The only way to obtain a value is through [`TicketGrid::new`] (or its
/// serde/`TryFrom` equivalents), so every instance satisfies the layout
/// invariants: 15 non-empty cells, at most 2 names per column, at most 5
/// names per row, no repeated name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<Vec<Option<String>>>",
    into = "Vec<Vec<Option<String>>>"
)]
pub struct TicketGrid {
    cells: Cells,
}

impl TicketGrid {
    /// Validate `cells` and wrap them into a grid.
    pub fn new(cells: Cells) -> Result<Self, GridError> {
        let mut seen = HashSet::with_capacity(NAMES_PER_TICKET);
        let mut column_counts = [0usize; COLUMNS];
        let mut total = 0;

        for (row, cells_in_row) in cells.iter().enumerate() {
            let mut row_count = 0;
            for (column, cell) in cells_in_row.iter().enumerate() {
                let Some(name) = cell else {
                    continue;
                };
                if name.trim().is_empty() {
                    return Err(GridError::BlankName { row, column });
                }
                if !seen.insert(name.as_str()) {
                    return Err(GridError::DuplicateName(name.clone()));
                }
                row_count += 1;
                column_counts[column] += 1;
                total += 1;
            }
            if row_count > MAX_PER_ROW {
                return Err(GridError::RowOverflow {
                    row,
                    count: row_count,
                });
            }
        }

        if let Some((column, &count)) = column_counts
            .iter()
            .enumerate()
            .find(|(_, count)| **count > MAX_PER_COLUMN)
        {
            return Err(GridError::ColumnOverflow { column, count });
        }

        if total != NAMES_PER_TICKET {
            return Err(GridError::WrongCount { count: total });
        }

        Ok(Self { cells })
    }

    /// Borrow the underlying cell matrix.
    pub fn cells(&self) -> &Cells {
        &self.cells
    }

    /// Iterate over the names printed on the ticket, row by row.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().flatten().filter_map(|cell| cell.as_deref())
    }

    /// Whether every name on the ticket is contained in `picked`.
    ///
    /// A single missing name makes the whole ticket uncovered.
    pub fn is_covered_by(&self, picked: &HashSet<&str>) -> bool {
        self.names().all(|name| picked.contains(name))
    }
}

impl TryFrom<Vec<Vec<Option<String>>>> for TicketGrid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<Option<String>>>) -> Result<Self, Self::Error> {
        let shape_error = |rows: &Vec<Vec<Option<String>>>| GridError::WrongShape {
            rows: rows.len(),
            widths: rows.iter().map(Vec::len).collect(),
        };

        if rows.len() != ROWS || rows.iter().any(|row| row.len() != COLUMNS) {
            return Err(shape_error(&rows));
        }

        let mut cells: Cells = Default::default();
        for (target, source) in cells.iter_mut().zip(rows) {
            for (cell, value) in target.iter_mut().zip(source) {
                *cell = value;
            }
        }

        Self::new(cells)
    }
}

impl From<TicketGrid> for Vec<Vec<Option<String>>> {
    fn from(grid: TicketGrid) -> Self {
        grid.cells.into_iter().map(Vec::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two names in each of the first six columns and one in the last three.
    fn valid_cells() -> Cells {
        let mut cells: Cells = Default::default();
        let layout = [
            (0, 0),
            (1, 0),
            (0, 1),
            (2, 1),
            (1, 2),
            (2, 2),
            (0, 3),
            (1, 3),
            (0, 4),
            (2, 4),
            (1, 5),
            (2, 5),
            (0, 6),
            (1, 7),
            (2, 8),
        ];
        for (index, (row, column)) in layout.into_iter().enumerate() {
            cells[row][column] = Some(format!("name-{index}"));
        }
        cells
    }

    #[test]
    fn accepts_valid_layout() {
        let grid = TicketGrid::new(valid_cells()).unwrap();
        assert_eq!(grid.names().count(), NAMES_PER_TICKET);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut cells = valid_cells();
        cells[2][8] = Some("name-0".into());
        assert_eq!(
            TicketGrid::new(cells).unwrap_err(),
            GridError::DuplicateName("name-0".into())
        );
    }

    #[test]
    fn rejects_overfull_column() {
        let mut cells = valid_cells();
        cells[2][8] = None;
        cells[2][0] = Some("extra".into());
        assert_eq!(
            TicketGrid::new(cells).unwrap_err(),
            GridError::ColumnOverflow {
                column: 0,
                count: 3
            }
        );
    }

    #[test]
    fn rejects_overfull_row() {
        let mut cells = valid_cells();
        // Row 0 already holds five names.
        cells[1][7] = None;
        cells[0][7] = Some("name-13".into());
        assert_eq!(
            TicketGrid::new(cells).unwrap_err(),
            GridError::RowOverflow { row: 0, count: 6 }
        );
    }

    #[test]
    fn rejects_short_grid() {
        let mut cells = valid_cells();
        cells[2][8] = None;
        assert_eq!(
            TicketGrid::new(cells).unwrap_err(),
            GridError::WrongCount { count: 14 }
        );
    }

    #[test]
    fn json_uses_nested_rows() {
        let grid = TicketGrid::new(valid_cells()).unwrap();
        let json = serde_json::to_value(&grid).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(ROWS));
        assert_eq!(json[0].as_array().map(Vec::len), Some(COLUMNS));

        let back: TicketGrid = serde_json::from_value(json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn json_with_wrong_shape_is_rejected() {
        let json = serde_json::json!([[null, "a"], [], []]);
        assert!(serde_json::from_value::<TicketGrid>(json).is_err());
    }

    #[test]
    fn coverage_requires_every_name() {
        let grid = TicketGrid::new(valid_cells()).unwrap();
        let mut picked: HashSet<&str> = grid.names().collect();
        assert!(grid.is_covered_by(&picked));

        picked.remove("name-7");
        picked.insert("someone-else");
        assert!(!grid.is_covered_by(&picked));
    }
}
