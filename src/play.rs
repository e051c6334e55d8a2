//! Paced, single-episode play with a trained agent.
//!
//! The session never sleeps or spawns anything. Each [`PlaySession::tick`] makes one
//! decision and one move, then tells the host how long to wait before the next tick
//! so an observer can follow the game. The host owns the timer and may stop at any
//! tick boundary.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};

use crate::agent::{Agent, AgentError};
use crate::engine::{Board, BoardView, Move, Score, Tile};
use crate::trace::{Recorder, Run};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayConfig {
    /// Delay the host should leave between ticks.
    pub interval: Duration,
    /// End the game after this many consecutive moves that change nothing.
    pub stall_limit: Option<usize>,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self { interval: Duration::from_millis(500), stall_limit: Some(64) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No move can change the board.
    GameOver,
    /// The agent kept choosing moves that change nothing.
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub reason: EndReason,
    pub moves: usize,
    pub score: Score,
    pub highest_tile: Tile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Schedule the next tick after `next_in`.
    Continue { action: Move, moved: bool, next_in: Duration },
    Finished(GameSummary),
}

#[derive(thiserror::Error, Debug)]
pub enum PlayError {
    #[error("agent failed: {0}")]
    Decision(#[from] AgentError),
    #[error("game already finished")]
    Finished,
}

pub struct PlaySession<R = StdRng> {
    board: Board<R>,
    config: PlayConfig,
    moves: usize,
    idle: usize,
    recorder: Option<Recorder>,
    summary: Option<GameSummary>,
}

impl<R: Rng> PlaySession<R> {
    pub fn new(board: Board<R>, config: PlayConfig) -> Self {
        PlaySession { board, config, moves: 0, idle: 0, recorder: None, summary: None }
    }

    /// Keep a trace of every move from now on.
    pub fn record(mut self) -> Self {
        self.recorder = Some(Recorder::new(*self.board.grid()));
        self
    }

    pub fn view(&self) -> BoardView {
        self.board.view()
    }

    pub fn board(&self) -> &Board<R> {
        &self.board
    }

    pub fn summary(&self) -> Option<GameSummary> {
        self.summary
    }

    /// Make one decision and move. Exploration is turned off on the agent.
    pub fn tick<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<Tick, PlayError> {
        if self.summary.is_some() {
            return Err(PlayError::Finished);
        }
        if self.board.is_terminal() {
            return Ok(Tick::Finished(self.finish(EndReason::GameOver)));
        }

        agent.set_exploration(false);
        let action = agent.choose_action(self.board.grid())?;
        let moved = self.board.attempt_move(action);
        self.moves += 1;
        self.idle = if moved { 0 } else { self.idle + 1 };
        if let Some(rec) = self.recorder.as_mut() {
            rec.push(action, *self.board.grid());
        }
        debug!(%action, moved, score = self.board.score(), "tick");

        if self.board.is_terminal() {
            return Ok(Tick::Finished(self.finish(EndReason::GameOver)));
        }
        if self.config.stall_limit.is_some_and(|limit| self.idle >= limit) {
            return Ok(Tick::Finished(self.finish(EndReason::Stalled)));
        }
        Ok(Tick::Continue { action, moved, next_in: self.config.interval })
    }

    fn finish(&mut self, reason: EndReason) -> GameSummary {
        let summary = GameSummary {
            reason,
            moves: self.moves,
            score: self.board.score(),
            highest_tile: self.board.highest_tile(),
        };
        info!(?reason, moves = summary.moves, score = summary.score, highest_tile = summary.highest_tile, "game finished");
        self.summary = Some(summary);
        summary
    }

    /// The recorded game, if recording was enabled.
    pub fn into_run(self, agent: Option<String>) -> Option<Run> {
        let score = self.board.score();
        self.recorder.map(|rec| rec.into_run(score, agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentKind, RandomAgent};
    use crate::engine::Grid;
    use crate::model_io::ModelError;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use std::path::Path;

    struct Fixed(Move, bool);

    impl Agent for Fixed {
        fn kind(&self) -> AgentKind {
            AgentKind::Random
        }

        fn choose_action(&mut self, _state: &Grid) -> Result<Move, AgentError> {
            if self.1 {
                return Err(AgentError::Decision("no policy".into()));
            }
            Ok(self.0)
        }

        fn save_model(&self, _path: &Path) -> Result<(), ModelError> {
            Ok(())
        }

        fn load_model(_path: &Path) -> Result<Self, ModelError> {
            Ok(Fixed(Move::Left, false))
        }
    }

    fn quick() -> PlayConfig {
        PlayConfig { interval: Duration::from_millis(5), stall_limit: Some(3) }
    }

    #[test]
    fn plays_until_game_over_and_records() {
        let board = Board::new(StdRng::seed_from_u64(21));
        let mut session = PlaySession::new(board, PlayConfig { stall_limit: Some(1_000), ..quick() }).record();
        let mut agent = RandomAgent::new(21);
        let summary = loop {
            match session.tick(&mut agent).unwrap() {
                Tick::Continue { next_in, .. } => assert_eq!(next_in, Duration::from_millis(5)),
                Tick::Finished(summary) => break summary,
            }
        };
        assert_eq!(summary.reason, EndReason::GameOver);
        assert!(session.view().game_over);
        assert!(matches!(session.tick(&mut agent), Err(PlayError::Finished)));

        let run = session.into_run(Some("random".into())).unwrap();
        assert_eq!(run.moves.len(), summary.moves);
        assert_eq!(run.states.len(), summary.moves + 1);
        assert_eq!(run.meta.final_score, summary.score);
    }

    #[test]
    fn repeated_no_op_moves_stall() {
        let grid = Grid::new([[2, 4, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let board = Board::from_grid(grid, 6, StepRng::new(0, 0));
        let mut session = PlaySession::new(board, quick());
        let mut agent = Fixed(Move::Left, false);
        assert!(matches!(session.tick(&mut agent).unwrap(), Tick::Continue { moved: false, .. }));
        assert!(matches!(session.tick(&mut agent).unwrap(), Tick::Continue { moved: false, .. }));
        match session.tick(&mut agent).unwrap() {
            Tick::Finished(summary) => {
                assert_eq!(summary.reason, EndReason::Stalled);
                assert_eq!(summary.moves, 3);
                assert_eq!(summary.score, 6);
            }
            other => panic!("expected stall, got {other:?}"),
        }
    }

    #[test]
    fn terminal_start_finishes_without_asking() {
        let grid = Grid::new([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]);
        let board = Board::from_grid(grid, 0, StepRng::new(0, 0));
        let mut session = PlaySession::new(board, quick());
        let mut agent = Fixed(Move::Up, true);
        match session.tick(&mut agent).unwrap() {
            Tick::Finished(summary) => assert_eq!(summary.moves, 0),
            other => panic!("expected game over, got {other:?}"),
        }
    }

    #[test]
    fn decision_failure_is_surfaced() {
        let board = Board::new(StepRng::new(0, 0));
        let mut session = PlaySession::new(board, quick());
        let mut agent = Fixed(Move::Up, true);
        assert!(matches!(session.tick(&mut agent), Err(PlayError::Decision(_))));
        assert!(session.summary().is_none());
    }
}
