use super::{Grid, Move, Tile, SIZE};

type Cells = [[Tile; SIZE]; SIZE];

/// Geometric remapping that turns a slide in any direction into a slide to the left.
///
/// `forward` is applied before the left slide and `inverse` after it. With no slide in
/// between, `inverse` undoes `forward` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Left: rows are already in slide order.
    Identity,
    /// Right: each row is reversed.
    Mirrored,
    /// Up: columns become rows.
    Transposed,
    /// Down: rows are flipped top to bottom, then transposed.
    Rotated,
}

impl Orientation {
    pub fn for_move(dir: Move) -> Self {
        match dir {
            Move::Left => Orientation::Identity,
            Move::Right => Orientation::Mirrored,
            Move::Up => Orientation::Transposed,
            Move::Down => Orientation::Rotated,
        }
    }

    pub fn forward(self, grid: &mut Grid) {
        let cells = grid.cells_mut();
        match self {
            Orientation::Identity => {}
            Orientation::Mirrored => mirror_rows(cells),
            Orientation::Transposed => transpose(cells),
            Orientation::Rotated => {
                flip_rows(cells);
                transpose(cells);
            }
        }
    }

    pub fn inverse(self, grid: &mut Grid) {
        let cells = grid.cells_mut();
        match self {
            Orientation::Identity => {}
            Orientation::Mirrored => mirror_rows(cells),
            Orientation::Transposed => transpose(cells),
            Orientation::Rotated => {
                transpose(cells);
                flip_rows(cells);
            }
        }
    }
}

fn mirror_rows(cells: &mut Cells) {
    for row in cells.iter_mut() {
        row.reverse();
    }
}

fn flip_rows(cells: &mut Cells) {
    cells.reverse();
}

fn transpose(cells: &mut Cells) {
    for r in 0..SIZE {
        for c in (r + 1)..SIZE {
            let tmp = cells[r][c];
            cells[r][c] = cells[c][r];
            cells[c][r] = tmp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distinct_grid() -> Grid {
        let mut cells = [[0; SIZE]; SIZE];
        for (i, cell) in cells.iter_mut().flatten().enumerate() {
            *cell = 1 << (i + 1);
        }
        Grid::new(cells)
    }

    #[test]
    fn round_trip_is_identity() {
        let sparse = Grid::new([[2, 0, 0, 4], [0, 8, 0, 0], [0, 0, 0, 0], [16, 0, 2, 0]]);
        for start in [distinct_grid(), sparse, Grid::EMPTY] {
            for dir in Move::ALL {
                let orientation = Orientation::for_move(dir);
                let mut g = start;
                orientation.forward(&mut g);
                orientation.inverse(&mut g);
                assert_eq!(g, start, "{dir:?} forward then inverse");
                orientation.inverse(&mut g);
                orientation.forward(&mut g);
                assert_eq!(g, start, "{dir:?} inverse then forward");
            }
        }
    }

    #[test]
    fn rotated_puts_bottom_row_first() {
        let mut g = distinct_grid();
        let bottom_left = g.cell(3, 0);
        Orientation::Rotated.forward(&mut g);
        // Column 0 read bottom-up becomes row 0.
        assert_eq!(g.cell(0, 0), bottom_left);
        assert_eq!(g.rows()[0], [2 << 12, 2 << 8, 2 << 4, 2]);
    }

    #[test]
    fn mirrored_reverses_rows() {
        let mut g = Grid::new([[2, 4, 8, 16], [0; 4], [0; 4], [0; 4]]);
        Orientation::Mirrored.forward(&mut g);
        assert_eq!(g.rows()[0], [16, 8, 4, 2]);
    }
}
