use super::{Score, Tile, MAX_TILE, SIZE};

/// Compact and merge one line toward index 0.
///
/// Non-empty tiles keep their relative order. A pair of equal neighbours (after
/// compaction) becomes one tile of twice the value, and the merged tile cannot merge
/// again in the same pass. A pair of [`MAX_TILE`]s stays as it is. Returns the new line
/// and the sum of all merged values.
///
/// ```
/// use rl_2048::engine::merge_line;
/// assert_eq!(merge_line([2, 0, 2, 4]), ([4, 4, 0, 0], 4));
/// ```
pub fn merge_line(line: [Tile; SIZE]) -> ([Tile; SIZE], Score) {
    let mut out = [0; SIZE];
    let mut gained: Score = 0;
    let mut tiles = line.iter().copied().filter(|&t| t != 0).peekable();
    let mut slot = 0;
    while let Some(tile) = tiles.next() {
        let doubled = tile.checked_mul(2).filter(|_| tiles.peek() == Some(&tile));
        if let Some(merged) = doubled {
            tiles.next();
            out[slot] = merged;
            gained += Score::from(merged);
        } else {
            out[slot] = tile;
        }
        slot += 1;
    }
    (out, gained)
}
