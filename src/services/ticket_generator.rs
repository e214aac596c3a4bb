//! Random ticket layout generation.
//!
//! Names are placed by walking the 27 cells in a random order and filling a cell
//! when its column holds fewer than 2 names and its row fewer than 5. Plain greedy
//! placement can strand a row: if two rows take the same five columns first, the
//! third row is left with four open columns and the ticket ends up one name short.
//! Every placement is therefore also checked against [`Layout::completable`], which
//! keeps the partial layout extendable to a full ticket, so the walk always places
//! all 15 names.

use std::collections::HashSet;

use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};

use crate::state::grid::{
    COLUMNS, Cells, GridError, MAX_PER_COLUMN, MAX_PER_ROW, NAMES_PER_TICKET, ROWS, TicketGrid,
};

/// Generate one ticket from `pool`, drawing 15 distinct names without replacement.
pub fn generate_ticket<R>(pool: &[String], rng: &mut R) -> Result<TicketGrid, GridError>
where
    R: Rng + ?Sized,
{
    let distinct = distinct_names(pool);
    if distinct.len() < NAMES_PER_TICKET {
        return Err(GridError::InsufficientPool {
            available: distinct.len(),
            required: NAMES_PER_TICKET,
        });
    }

    let mut drawn = distinct
        .choose_multiple(rng, NAMES_PER_TICKET)
        .map(|name| (*name).to_owned());

    let mut positions = (0..ROWS)
        .flat_map(|row| (0..COLUMNS).map(move |column| (row, column)))
        .collect::<Vec<_>>();
    positions.shuffle(rng);

    let mut layout = Layout::default();
    let mut cells: Cells = Default::default();

    // Each pass places at least one name while the layout stays completable, so
    // this converges in at most NAMES_PER_TICKET passes; the first pass almost
    // always places every name.
    while layout.placed < NAMES_PER_TICKET {
        let before = layout.placed;
        for &(row, column) in &positions {
            if layout.placed == NAMES_PER_TICKET {
                break;
            }
            if !layout.accepts(row, column) {
                continue;
            }
            let Some(name) = drawn.next() else {
                break;
            };
            layout.place(row, column);
            cells[row][column] = Some(name);
        }
        if layout.placed == before {
            break;
        }
    }

    TicketGrid::new(cells)
}

/// Generate `count` tickets independently; layouts and name sets may repeat.
pub fn pre_generate_tickets<R>(
    pool: &[String],
    count: usize,
    rng: &mut R,
) -> Result<Vec<TicketGrid>, GridError>
where
    R: Rng + ?Sized,
{
    (0..count).map(|_| generate_ticket(pool, rng)).collect()
}

fn distinct_names(pool: &[String]) -> Vec<&str> {
    let mut seen = HashSet::with_capacity(pool.len());
    pool.iter()
        .map(String::as_str)
        .filter(|name| !name.trim().is_empty() && seen.insert(*name))
        .collect()
}

/// Occupancy bookkeeping for a ticket under construction.
#[derive(Debug, Default, Clone)]
struct Layout {
    occupied: [[bool; COLUMNS]; ROWS],
    row_counts: [usize; ROWS],
    column_counts: [usize; COLUMNS],
    placed: usize,
}

impl Layout {
    fn accepts(&self, row: usize, column: usize) -> bool {
        if self.occupied[row][column]
            || self.column_counts[column] >= MAX_PER_COLUMN
            || self.row_counts[row] >= MAX_PER_ROW
        {
            return false;
        }
        let mut next = self.clone();
        next.place(row, column);
        next.completable()
    }

    fn place(&mut self, row: usize, column: usize) {
        self.occupied[row][column] = true;
        self.row_counts[row] += 1;
        self.column_counts[column] += 1;
        self.placed += 1;
    }

    /// Whether the remaining cells can still bring every row to exactly 5 names.
    ///
    /// Rows demand `5 - count`, columns offer `2 - count`, and a row may only use
    /// its empty cells. By max-flow/min-cut this is feasible iff every subset `S`
    /// of rows demands no more than `sum over columns of min(column capacity,
    /// empty cells of S in that column)`.
    fn completable(&self) -> bool {
        (1u8..(1 << ROWS)).all(|subset| {
            let rows = (0..ROWS)
                .filter(|row| subset & (1 << row) != 0)
                .collect::<Vec<_>>();
            let demand: usize = rows
                .iter()
                .map(|&row| MAX_PER_ROW - self.row_counts[row])
                .sum();
            let supply: usize = (0..COLUMNS)
                .map(|column| {
                    let capacity = MAX_PER_COLUMN - self.column_counts[column];
                    let reachable = rows
                        .iter()
                        .filter(|&&row| !self.occupied[row][column])
                        .count();
                    capacity.min(reachable)
                })
                .sum();
            demand <= supply
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn pool(size: usize) -> Vec<String> {
        (0..size).map(|index| format!("player-{index:03}")).collect()
    }

    fn assert_shape(grid: &TicketGrid, pool: &[String]) {
        let names = grid.names().collect::<Vec<_>>();
        assert_eq!(names.len(), NAMES_PER_TICKET);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), NAMES_PER_TICKET);
        assert!(names.iter().all(|name| pool.iter().any(|p| p == name)));

        for row in grid.cells() {
            assert!(row.iter().flatten().count() <= MAX_PER_ROW);
        }
        for column in 0..COLUMNS {
            let count = grid
                .cells()
                .iter()
                .filter(|row| row[column].is_some())
                .count();
            assert!(count <= MAX_PER_COLUMN);
        }
    }

    #[test]
    fn generated_tickets_satisfy_layout_rules() {
        let pool = pool(90);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let grid = generate_ticket(&pool, &mut rng).unwrap();
            assert_shape(&grid, &pool);
        }
    }

    #[test]
    fn exact_pool_of_fifteen_uses_every_name() {
        let pool = pool(NAMES_PER_TICKET);
        let mut rng = StdRng::seed_from_u64(11);
        let grid = generate_ticket(&pool, &mut rng).unwrap();
        let names = grid.names().collect::<HashSet<_>>();
        assert_eq!(names.len(), NAMES_PER_TICKET);
    }

    #[test]
    fn small_pool_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = generate_ticket(&pool(14), &mut rng).unwrap_err();
        assert_eq!(
            err,
            GridError::InsufficientPool {
                available: 14,
                required: NAMES_PER_TICKET
            }
        );
    }

    #[test]
    fn duplicates_do_not_count_towards_pool_size() {
        let mut names = pool(10);
        names.extend(pool(10));
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            generate_ticket(&names, &mut rng),
            Err(GridError::InsufficientPool { available: 10, .. })
        ));
    }

    #[test]
    fn batch_generation_returns_requested_count() {
        let pool = pool(90);
        let mut rng = StdRng::seed_from_u64(42);
        let grids = pre_generate_tickets(&pool, 100, &mut rng).unwrap();
        assert_eq!(grids.len(), 100);
        for grid in &grids {
            assert_shape(grid, &pool);
        }
    }

    #[test]
    fn stranded_row_is_detected() {
        let mut layout = Layout::default();
        for row in [1, 2] {
            for column in 0..5 {
                layout.place(row, column);
            }
        }
        // Row 0 needs five names but only columns 5..9 remain open.
        assert!(!layout.completable());
    }

    #[test]
    fn empty_layout_is_completable() {
        assert!(Layout::default().completable());
    }
}
