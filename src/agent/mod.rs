//! Decision-making agents.
//!
//! The orchestrators only see the [`Agent`] trait. Concrete agents are picked by
//! [`AgentKind`] at runtime:
//! - [`RandomAgent`]: uniform random directions, learns nothing.
//! - [`QNetworkAgent`]: epsilon-greedy over a small Q-value network trained online.
//! - `Search`: reserved for a search-based policy; not available.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::engine::{Grid, Move, Score};
use crate::model_io::{self, ModelError};

mod qnet;
mod random;

pub use qnet::{QNetworkAgent, QNetworkConfig};
pub use random::RandomAgent;

/// Model file shared by training and play when no path is given.
pub const DEFAULT_MODEL_PATH: &str = "2048_agent.a2m";

/// One environment step as seen by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: Grid,
    pub action: Move,
    /// Score gained by this step (merges plus the spawned tile).
    pub reward: Score,
    pub next_state: Grid,
    /// True iff `next_state` is terminal.
    pub done: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("decision failed: {0}")]
    Decision(String),
    #[error("learning update failed: {0}")]
    Learn(String),
    #[error("invalid agent configuration: {0}")]
    InvalidConfig(String),
    #[error("agent kind `{0}` is not available")]
    Unsupported(AgentKind),
    #[error("unknown agent kind `{0}`")]
    UnknownKind(String),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Which agent implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Random,
    QNetwork,
    Search,
}

impl AgentKind {
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Random => "random",
            AgentKind::QNetwork => "qnet",
            AgentKind::Search => "search",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(AgentKind::Random),
            "qnet" => Ok(AgentKind::QNetwork),
            "search" => Ok(AgentKind::Search),
            other => Err(AgentError::UnknownKind(other.to_string())),
        }
    }
}

/// A policy that maps boards to moves, optionally learning from transitions.
pub trait Agent {
    fn kind(&self) -> AgentKind;

    /// Pick a direction for `state`. May be stochastic.
    fn choose_action(&mut self, state: &Grid) -> Result<Move, AgentError>;

    /// Learning update for one step. The transition is not retained.
    fn learn(&mut self, _transition: &Transition) -> Result<(), AgentError> {
        Ok(())
    }

    /// Called once after each finished training episode.
    fn end_episode(&mut self) {}

    /// Switch between training (exploring) and pure exploitation.
    fn set_exploration(&mut self, _explore: bool) {}

    fn save_model(&self, path: &Path) -> Result<(), ModelError>;

    fn load_model(path: &Path) -> Result<Self, ModelError>
    where
        Self: Sized;
}

/// Construct an untrained agent of `kind`.
pub fn build_agent(kind: AgentKind, seed: u64) -> Result<Box<dyn Agent>, AgentError> {
    match kind {
        AgentKind::Random => Ok(Box::new(RandomAgent::new(seed))),
        AgentKind::QNetwork => {
            let config = QNetworkConfig { seed, ..QNetworkConfig::default() };
            Ok(Box::new(QNetworkAgent::new(config)?))
        }
        AgentKind::Search => Err(AgentError::Unsupported(kind)),
    }
}

/// Load an agent of `kind` from `path`. Errors are never replaced by a fresh agent.
pub fn load_agent(kind: AgentKind, path: &Path) -> Result<Box<dyn Agent>, AgentError> {
    match kind {
        AgentKind::Random => Ok(Box::new(RandomAgent::load_model(path)?)),
        AgentKind::QNetwork => Ok(Box::new(QNetworkAgent::load_model(path)?)),
        AgentKind::Search => Err(AgentError::Unsupported(kind)),
    }
}

/// Load whatever agent kind the model file at `path` records.
pub fn load_any(path: &Path) -> Result<Box<dyn Agent>, AgentError> {
    let kind: AgentKind = model_io::stored_kind(path)?.parse()?;
    load_agent(kind, path)
}
