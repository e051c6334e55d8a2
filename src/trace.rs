//! Binary record of a single played game.
//!
//! Header: `A2T1` magic, version, endianness, step count, start time, elapsed
//! seconds, final score, highest tile, agent-name length + bytes. Payload: one packed
//! `u64` board per state (steps + 1), then one move code per step. Trailer: CRC32C of
//! everything before it.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::engine::{Grid, InvalidDirection, Move, Score, Tile};

const MAGIC: &[u8; 4] = b"A2T1";
const VERSION: u8 = 1;
const ENDIAN_LE: u8 = 0;
// magic + version + endian + steps + start + elapsed + score + highest tile + agent len
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 8 + 4 + 8 + 4 + 2;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub steps: u32,
    pub start_unix_s: u64,
    pub elapsed_s: f32,
    pub final_score: Score,
    pub highest_tile: Tile,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub meta: Meta,
    /// Board before each move, plus the final board.
    pub states: Vec<Grid>,
    pub moves: Vec<Move>,
}

#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("unsupported endianness")]
    Endianness,
    #[error("file too short or malformed")]
    Malformed,
    #[error("checksum mismatch")]
    Checksum,
    #[error("expected {expected} states for {steps} moves, got {found}")]
    LengthMismatch { steps: usize, expected: usize, found: usize },
    #[error("tile too large for packed board")]
    TileOverflow,
    #[error("agent name longer than 65535 bytes")]
    AgentTooLong,
    #[error(transparent)]
    Move(#[from] InvalidDirection),
}

struct Reader<'a> {
    bytes: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TraceError> {
        let end = self.off.checked_add(n).ok_or(TraceError::Malformed)?;
        let slice = self.bytes.get(self.off..end).ok_or(TraceError::Malformed)?;
        self.off = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TraceError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, TraceError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, TraceError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, TraceError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

pub fn encode_run(run: &Run) -> Result<Vec<u8>, TraceError> {
    let steps = run.moves.len();
    if run.states.len() != steps + 1 || run.meta.steps as usize != steps {
        return Err(TraceError::LengthMismatch { steps, expected: steps + 1, found: run.states.len() });
    }
    let agent_bytes = run.meta.agent.as_deref().map(str::as_bytes).unwrap_or(&[]);
    let agent_len: u16 = agent_bytes.len().try_into().map_err(|_| TraceError::AgentTooLong)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + agent_bytes.len() + run.states.len() * 8 + steps + CHECKSUM_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.push(ENDIAN_LE);
    buf.extend_from_slice(&run.meta.steps.to_le_bytes());
    buf.extend_from_slice(&run.meta.start_unix_s.to_le_bytes());
    buf.extend_from_slice(&run.meta.elapsed_s.to_bits().to_le_bytes());
    buf.extend_from_slice(&run.meta.final_score.to_le_bytes());
    buf.extend_from_slice(&run.meta.highest_tile.to_le_bytes());
    buf.extend_from_slice(&agent_len.to_le_bytes());
    buf.extend_from_slice(agent_bytes);

    for grid in &run.states {
        let packed = grid.to_packed().ok_or(TraceError::TileOverflow)?;
        buf.extend_from_slice(&packed.to_le_bytes());
    }
    buf.extend(run.moves.iter().map(|m| m.code()));

    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

pub fn write_run_to_path<P: AsRef<Path>>(path: P, run: &Run) -> Result<(), TraceError> {
    let data = encode_run(run)?;
    let mut f = fs::File::create(path)?;
    f.write_all(&data)?;
    Ok(())
}

pub fn parse_run_bytes(bytes: &[u8]) -> Result<Run, TraceError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(TraceError::Malformed);
    }
    // Checksum first, so field reads below only see intact data.
    let (content, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if stored != crc32c::crc32c(content) {
        return Err(TraceError::Checksum);
    }

    let mut r = Reader { bytes: content, off: 0 };
    if r.take(4)? != MAGIC || r.take(1)?[0] != VERSION {
        return Err(TraceError::MagicOrVersion);
    }
    if r.take(1)?[0] != ENDIAN_LE {
        return Err(TraceError::Endianness);
    }

    let steps = r.u32()?;
    let start_unix_s = r.u64()?;
    let elapsed_s = f32::from_bits(r.u32()?);
    let final_score = r.u64()?;
    let highest_tile = r.u32()?;
    let agent_len = r.u16()? as usize;
    let agent_bytes = r.take(agent_len)?;
    let agent = if agent_len > 0 { std::str::from_utf8(agent_bytes).ok().map(str::to_string) } else { None };

    let states_count = steps as usize + 1;
    let mut states = Vec::with_capacity(states_count);
    for _ in 0..states_count {
        states.push(Grid::from_packed(r.u64()?));
    }
    let moves = r
        .take(steps as usize)?
        .iter()
        .map(|&code| Move::try_from(code))
        .collect::<Result<Vec<_>, _>>()?;

    let meta = Meta { steps, start_unix_s, elapsed_s, final_score, highest_tile, agent };
    Ok(Run { meta, states, moves })
}

pub fn parse_run_file<P: AsRef<Path>>(path: P) -> Result<Run, TraceError> {
    let data = fs::read(path)?;
    parse_run_bytes(&data)
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Collects boards and moves while a game is played.
#[derive(Debug, Clone)]
pub struct Recorder {
    states: Vec<Grid>,
    moves: Vec<Move>,
    start_unix_s: u64,
    started: Instant,
}

impl Recorder {
    pub fn new(initial: Grid) -> Self {
        let mut states = Vec::with_capacity(1024);
        states.push(initial);
        Recorder { states, moves: Vec::with_capacity(1024), start_unix_s: now_unix_seconds(), started: Instant::now() }
    }

    /// Record a move and the board it produced.
    pub fn push(&mut self, action: Move, after: Grid) {
        self.moves.push(action);
        self.states.push(after);
    }

    pub fn steps(&self) -> usize {
        self.moves.len()
    }

    pub fn into_run(self, final_score: Score, agent: Option<String>) -> Run {
        let highest_tile = self.states.last().map(Grid::highest_tile).unwrap_or(0);
        let meta = Meta {
            steps: self.moves.len() as u32,
            start_unix_s: self.start_unix_s,
            elapsed_s: self.started.elapsed().as_secs_f32(),
            final_score,
            highest_tile,
            agent,
        };
        Run { meta, states: self.states, moves: self.moves }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn small_run() -> Run {
        let g0 = Grid::new([[2, 0, 0, 0], [0; 4], [0; 4], [0, 0, 0, 2]]);
        let g1 = Grid::new([[2, 0, 0, 2], [0; 4], [0; 4], [2, 0, 0, 0]]);
        let g2 = Grid::new([[4, 0, 0, 0], [0; 4], [0, 2, 0, 0], [2, 0, 0, 0]]);
        let mut rec = Recorder::new(g0);
        rec.push(Move::Left, g1);
        rec.push(Move::Left, g2);
        let mut run = rec.into_run(12, Some("qnet".to_string()));
        run.meta.elapsed_s = 1.5;
        run
    }

    #[test]
    fn file_round_trip() {
        let run = small_run();
        let tmp = NamedTempFile::new().unwrap();
        write_run_to_path(tmp.path(), &run).unwrap();
        let parsed = parse_run_file(tmp.path()).unwrap();
        assert_eq!(parsed, run);
        assert_eq!(parsed.meta.highest_tile, 4);
    }

    #[test]
    fn checksum_mismatch() {
        let mut bytes = encode_run(&small_run()).unwrap();
        bytes[HEADER_LEN + 4] ^= 0xFF;
        assert!(matches!(parse_run_bytes(&bytes), Err(TraceError::Checksum)));
    }

    #[test]
    fn truncated_file_is_malformed() {
        let mut bytes = encode_run(&small_run()).unwrap();
        bytes.truncate(HEADER_LEN);
        assert!(matches!(parse_run_bytes(&bytes), Err(TraceError::Malformed)));
    }

    #[test]
    fn bad_move_code_is_rejected() {
        let run = small_run();
        let mut bytes = encode_run(&run).unwrap();
        let content_len = bytes.len() - CHECKSUM_LEN;
        bytes[content_len - 1] = 9;
        bytes.truncate(content_len);
        let crc = crc32c::crc32c(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert!(matches!(parse_run_bytes(&bytes), Err(TraceError::Move(InvalidDirection(9)))));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut run = small_run();
        run.states.pop();
        assert!(matches!(encode_run(&run), Err(TraceError::LengthMismatch { .. })));
    }

    #[test]
    fn oversized_tile_cannot_be_packed() {
        let mut run = small_run();
        run.states[2] = Grid::new([[65536, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(matches!(encode_run(&run), Err(TraceError::TileOverflow)));
    }
}
