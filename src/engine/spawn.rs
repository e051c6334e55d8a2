use rand::Rng;

use super::{Grid, Tile};

/// A tile placed by [`spawn_tile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawn {
    pub row: usize,
    pub col: usize,
    pub value: Tile,
}

/// Insert a 2 (90%) or 4 (10%) into a uniformly chosen empty cell.
///
/// Returns `None` and leaves the grid untouched when there is no empty cell.
pub fn spawn_tile<R: Rng + ?Sized>(grid: &mut Grid, rng: &mut R) -> Option<Spawn> {
    let empty = grid.count_empty();
    if empty == 0 {
        return None;
    }
    let index = rng.gen_range(0..empty);
    let (row, col) = grid.empty_cells().nth(index)?;
    let value = random_tile_value(rng);
    grid.cells_mut()[row][col] = value;
    Some(Spawn { row, col, value })
}

fn random_tile_value<R: Rng + ?Sized>(rng: &mut R) -> Tile {
    if rng.gen_range(0..10) < 9 {
        2
    } else {
        4
    }
}
