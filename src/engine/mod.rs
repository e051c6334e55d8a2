//! The 2048 board: grid, line merging, direction remapping, tile spawning.
//!
//! [`Board`] owns the one live [`Grid`] and the score, and is the only thing that
//! mutates them. Every slide is performed as a slide to the left after an
//! [`Orientation`] remap, so merge rules live in exactly one place ([`merge_line`]).
//!
//! ```
//! use rl_2048::engine::{Board, Grid, Move};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let grid = Grid::new([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
//! let mut board = Board::from_grid(grid, 0, StdRng::seed_from_u64(7));
//! assert!(board.attempt_move(Move::Left));
//! assert_eq!(board.grid().rows()[0][0], 4);
//! assert!(board.score() >= 4 + 2);
//! ```

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

mod merge;
mod orient;
mod spawn;

pub use merge::merge_line;
pub use orient::Orientation;
pub use spawn::{spawn_tile, Spawn};

/// Side length of the board.
pub const SIZE: usize = 4;

pub type Tile = u32;
pub type Score = u64;

/// Largest tile a [`Tile`] can hold. Two of these never merge.
pub const MAX_TILE: Tile = 1 << 31;

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid direction code {0}")]
pub struct InvalidDirection(pub u8);

impl Move {
    /// All directions, ordered by their code.
    pub const ALL: [Move; 4] = [Move::Up, Move::Down, Move::Left, Move::Right];

    /// Stable one-byte code: Up=0, Down=1, Left=2, Right=3.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Move::Up => 0,
            Move::Down => 1,
            Move::Left => 2,
            Move::Right => 3,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.code() as usize
    }
}

impl TryFrom<u8> for Move {
    type Error = InvalidDirection;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Move::ALL.get(code as usize).copied().ok_or(InvalidDirection(code))
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Move::Up => "up",
            Move::Down => "down",
            Move::Left => "left",
            Move::Right => "right",
        };
        f.write_str(name)
    }
}

/// Result of sliding the whole grid, before any spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slide {
    /// True iff at least one cell changed.
    pub moved: bool,
    /// Sum of the values created by merges.
    pub gained: Score,
}

/// 4x4 grid of tile values, 0 meaning empty.
///
/// Every non-zero cell is a power of two no larger than [`MAX_TILE`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Grid([[Tile; SIZE]; SIZE]);

impl Grid {
    /// A constant empty grid (all zeros).
    pub const EMPTY: Grid = Grid([[0; SIZE]; SIZE]);

    #[inline]
    pub fn new(rows: [[Tile; SIZE]; SIZE]) -> Self {
        Grid(rows)
    }

    #[inline]
    pub fn rows(&self) -> &[[Tile; SIZE]; SIZE] {
        &self.0
    }

    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Tile {
        self.0[row][col]
    }

    #[inline]
    pub(crate) fn cells_mut(&mut self) -> &mut [[Tile; SIZE]; SIZE] {
        &mut self.0
    }

    /// Row-major positions of the empty cells.
    pub fn empty_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|&(_, &t)| t == 0)
                .map(move |(c, _)| (r, c))
        })
    }

    pub fn count_empty(&self) -> usize {
        self.0.iter().flatten().filter(|&&t| t == 0).count()
    }

    pub fn highest_tile(&self) -> Tile {
        self.0.iter().flatten().copied().max().unwrap_or(0)
    }

    /// True iff the grid is full and no two neighbours in a row or column can merge.
    pub fn is_terminal(&self) -> bool {
        if self.count_empty() > 0 {
            return false;
        }
        for r in 0..SIZE {
            for c in 0..SIZE {
                let t = self.0[r][c];
                if t == MAX_TILE {
                    continue;
                }
                if c + 1 < SIZE && self.0[r][c + 1] == t {
                    return false;
                }
                if r + 1 < SIZE && self.0[r + 1][c] == t {
                    return false;
                }
            }
        }
        true
    }

    /// Slide and merge every line in `dir`. No randomness.
    pub fn slide(&mut self, dir: Move) -> Slide {
        let orientation = Orientation::for_move(dir);
        orientation.forward(self);
        let slide = self.slide_left();
        orientation.inverse(self);
        slide
    }

    fn slide_left(&mut self) -> Slide {
        let mut slide = Slide::default();
        for row in self.0.iter_mut() {
            let (merged, gained) = merge_line(*row);
            if merged != *row {
                slide.moved = true;
                *row = merged;
            }
            slide.gained += gained;
        }
        slide
    }

    /// Pack the grid as 16 4-bit exponents in a `u64`, cell 0 in the top nibble.
    ///
    /// Returns `None` if a tile does not fit in a nibble (above 32768).
    pub fn to_packed(&self) -> Option<u64> {
        let mut raw = 0u64;
        for (idx, &tile) in self.0.iter().flatten().enumerate() {
            let exp = if tile == 0 { 0 } else { tile.trailing_zeros() as u64 };
            if exp > 0xf {
                return None;
            }
            raw |= exp << (60 - 4 * idx);
        }
        Some(raw)
    }

    pub fn from_packed(raw: u64) -> Self {
        let mut grid = Grid::EMPTY;
        for (idx, cell) in grid.0.iter_mut().flatten().enumerate() {
            let exp = (raw >> (60 - 4 * idx)) & 0xf;
            *cell = if exp == 0 { 0 } else { 1 << exp };
        }
        grid
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({:?})", self.0)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, row) in self.0.iter().enumerate() {
            if r > 0 {
                writeln!(f, "-------------------------------")?;
            }
            let cells: Vec<String> = row.iter().map(|&t| format_val(t)).collect();
            writeln!(f, "{}", cells.join("|"))?;
        }
        Ok(())
    }
}

fn format_val(val: Tile) -> String {
    match val {
        0 => " ".repeat(7),
        x => format!("{:^7}", x),
    }
}

/// Read-only view of a board handed to hosts after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardView {
    pub grid: Grid,
    pub score: Score,
    pub game_over: bool,
}

/// The live game: grid, score and the random source used for spawns.
#[derive(Debug, Clone)]
pub struct Board<R = StdRng> {
    grid: Grid,
    score: Score,
    rng: R,
}

impl Board<StdRng> {
    /// Fresh board with two random tiles, spawning from a seeded `StdRng`.
    pub fn seeded(seed: u64) -> Self {
        Board::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Board<R> {
    /// Fresh board with two random tiles.
    pub fn new(rng: R) -> Self {
        let mut board = Board { grid: Grid::EMPTY, score: 0, rng };
        board.reset();
        board
    }

    /// Board starting from an arbitrary position. No tiles are spawned.
    pub fn from_grid(grid: Grid, score: Score, rng: R) -> Self {
        Board { grid, score, rng }
    }

    /// Clear the grid and score, then spawn two tiles.
    pub fn reset(&mut self) {
        self.grid = Grid::EMPTY;
        self.score = 0;
        self.spawn();
        self.spawn();
    }

    /// Restart from a fixed position with score 0.
    pub fn reset_to(&mut self, grid: Grid) {
        self.grid = grid;
        self.score = 0;
    }

    /// Slide in `dir`; if anything changed, spawn one tile. Returns whether it moved.
    ///
    /// A move that changes nothing (including any move on a terminal board) leaves
    /// grid and score untouched.
    pub fn attempt_move(&mut self, dir: Move) -> bool {
        let slide = self.grid.slide(dir);
        self.score += slide.gained;
        if slide.moved {
            self.spawn();
        }
        slide.moved
    }

    fn spawn(&mut self) {
        if let Some(spawn) = spawn_tile(&mut self.grid, &mut self.rng) {
            self.score += Score::from(spawn.value);
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.grid.is_terminal()
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn score(&self) -> Score {
        self.score
    }

    #[inline]
    pub fn highest_tile(&self) -> Tile {
        self.grid.highest_tile()
    }

    pub fn view(&self) -> BoardView {
        BoardView { grid: self.grid, score: self.score, game_over: self.is_terminal() }
    }
}

impl<R> fmt::Display for Board<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "score: {}", self.score)?;
        write!(f, "{}", self.grid)
    }
}
