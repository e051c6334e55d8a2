//! Episodic training loop.
//!
//! [`Trainer`] owns one [`Board`] and reuses it for every episode. Per step it asks the
//! agent for a move, applies it, hands the resulting [`Transition`] to the agent's
//! learning update, then notifies the registered step callback (if any) so a host can
//! redraw. After the last episode the agent is saved exactly once.
//!
//! Hosts that need to interleave their own work can drive the loop themselves with
//! [`Trainer::begin_episode`], [`Trainer::step`] and [`Trainer::finish`]; stopping
//! early is simply not calling them again.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentError, Transition, DEFAULT_MODEL_PATH};
use crate::engine::{Board, BoardView, Grid, Move, Score, Tile};
use crate::model_io::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub episodes: usize,
    /// Per-episode step cap. `None` runs every episode until the board is terminal.
    pub max_steps: Option<usize>,
    /// Where the agent is saved after the last episode.
    pub model_path: PathBuf,
    /// Fixed opening position; episodes start from two random tiles when `None`.
    pub start_grid: Option<Grid>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            max_steps: Some(5_000),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            start_grid: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No episode started yet.
    Ready,
    RunningEpisode,
    /// The current episode ended (terminal board or step cap).
    Terminal,
    /// The agent has been saved; the run is over.
    Done,
}

#[derive(thiserror::Error, Debug)]
pub enum TrainError {
    #[error("agent failed: {0}")]
    Decision(#[from] AgentError),
    #[error("failed to save agent: {0}")]
    Persist(#[source] ModelError),
    #[error("no episode is running (phase {0:?})")]
    NotRunning(Phase),
    #[error("episode {0} is still running")]
    EpisodeRunning(usize),
    #[error("training already finished")]
    Finished,
}

/// What the step callback sees after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// 1-based episode number.
    pub episode: usize,
    /// Steps taken so far in this episode.
    pub step: usize,
    pub view: BoardView,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub action: Move,
    pub moved: bool,
    /// The learning transition, present only when the move changed the board.
    pub transition: Option<Transition>,
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub steps: usize,
    pub score: Score,
    pub highest_tile: Tile,
    /// False when the episode was cut by the step cap.
    pub terminal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
}

impl TrainingReport {
    pub fn best_score(&self) -> Score {
        self.episodes.iter().map(|e| e.score).max().unwrap_or(0)
    }

    pub fn mean_score(&self) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(|e| e.score as f64).sum::<f64>() / self.episodes.len() as f64
    }

    pub fn total_steps(&self) -> usize {
        self.episodes.iter().map(|e| e.steps).sum()
    }
}

type StepCallback<'cb> = Box<dyn FnMut(&Snapshot) + 'cb>;

pub struct Trainer<'cb, R = StdRng> {
    config: TrainerConfig,
    board: Board<R>,
    phase: Phase,
    episode: usize,
    step: usize,
    on_step: Option<StepCallback<'cb>>,
    report: TrainingReport,
}

impl<'cb, R: Rng> Trainer<'cb, R> {
    /// `rng` drives tile spawns for every episode.
    pub fn new(config: TrainerConfig, rng: R) -> Self {
        Trainer {
            config,
            board: Board::from_grid(Grid::EMPTY, 0, rng),
            phase: Phase::Ready,
            episode: 0,
            step: 0,
            on_step: None,
            report: TrainingReport::default(),
        }
    }

    /// Register the host callback invoked after every step, moved or not.
    pub fn on_step<F>(&mut self, callback: F)
    where
        F: FnMut(&Snapshot) + 'cb,
    {
        self.on_step = Some(Box::new(callback));
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn board(&self) -> &Board<R> {
        &self.board
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Run every configured episode, then save the agent.
    pub fn train<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<TrainingReport, TrainError> {
        agent.set_exploration(true);
        for _ in 0..self.config.episodes {
            self.begin_episode(agent)?;
            while self.phase == Phase::RunningEpisode {
                self.step(agent)?;
            }
        }
        self.finish(agent)
    }

    /// Reset the board and start the next episode.
    ///
    /// An opening that is already terminal is closed out at once with zero steps.
    pub fn begin_episode<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<(), TrainError> {
        match self.phase {
            Phase::Done => return Err(TrainError::Finished),
            Phase::RunningEpisode => return Err(TrainError::EpisodeRunning(self.episode)),
            Phase::Ready | Phase::Terminal => {}
        }
        match self.config.start_grid {
            Some(grid) => self.board.reset_to(grid),
            None => self.board.reset(),
        }
        self.episode += 1;
        self.step = 0;
        self.phase = Phase::RunningEpisode;
        debug!(episode = self.episode, "episode started");
        if self.board.is_terminal() {
            self.end_episode(agent, true);
        }
        Ok(())
    }

    /// Play one move of the running episode.
    ///
    /// Agent failures abort immediately; no fallback move is substituted.
    pub fn step<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<StepReport, TrainError> {
        if self.phase != Phase::RunningEpisode {
            return Err(TrainError::NotRunning(self.phase));
        }

        let state = *self.board.grid();
        let score_before = self.board.score();
        let action = agent.choose_action(&state)?;
        let moved = self.board.attempt_move(action);
        let done = self.board.is_terminal();
        self.step += 1;

        let transition = if moved {
            let t = Transition {
                state,
                action,
                reward: self.board.score() - score_before,
                next_state: *self.board.grid(),
                done,
            };
            agent.learn(&t)?;
            Some(t)
        } else {
            None
        };
        debug!(episode = self.episode, step = self.step, %action, moved, score = self.board.score(), "step");

        if let Some(callback) = self.on_step.as_mut() {
            callback(&Snapshot { episode: self.episode, step: self.step, view: self.board.view() });
        }

        let capped = self.config.max_steps.is_some_and(|cap| self.step >= cap);
        if done || capped {
            self.end_episode(agent, done);
        }
        Ok(StepReport { action, moved, transition, phase: self.phase })
    }

    fn end_episode<A: Agent + ?Sized>(&mut self, agent: &mut A, terminal: bool) {
        let summary = EpisodeSummary {
            episode: self.episode,
            steps: self.step,
            score: self.board.score(),
            highest_tile: self.board.highest_tile(),
            terminal,
        };
        if !terminal {
            warn!(episode = summary.episode, steps = summary.steps, "episode hit the step cap");
        }
        info!(
            episode = summary.episode,
            steps = summary.steps,
            score = summary.score,
            highest_tile = summary.highest_tile,
            "episode finished"
        );
        agent.end_episode();
        self.report.episodes.push(summary);
        self.phase = Phase::Terminal;
    }

    /// Save the agent to the configured path and close the run.
    pub fn finish<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<TrainingReport, TrainError> {
        if self.phase == Phase::Done {
            return Err(TrainError::Finished);
        }
        agent.save_model(&self.config.model_path).map_err(TrainError::Persist)?;
        self.phase = Phase::Done;
        info!(
            episodes = self.report.episodes.len(),
            best_score = self.report.best_score(),
            path = %self.config.model_path.display(),
            "training finished"
        );
        Ok(self.report.clone())
    }
}
