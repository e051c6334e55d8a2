use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Agent, AgentError, AgentKind};
use crate::engine::{Grid, Move};
use crate::model_io::{self, ModelError};

#[derive(Debug, Serialize, Deserialize)]
struct RandomModel {
    seed: u64,
}

/// Picks one of the four directions uniformly at random.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    seed: u64,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> Self {
        RandomAgent { seed, rng: StdRng::seed_from_u64(seed) }
    }
}

impl Agent for RandomAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Random
    }

    fn choose_action(&mut self, _state: &Grid) -> Result<Move, AgentError> {
        Ok(Move::ALL[self.rng.gen_range(0..Move::ALL.len())])
    }

    fn save_model(&self, path: &Path) -> Result<(), ModelError> {
        model_io::save_model(path, AgentKind::Random.name(), &RandomModel { seed: self.seed })
    }

    fn load_model(path: &Path) -> Result<Self, ModelError> {
        let model: RandomModel = model_io::load_model(path, AgentKind::Random.name())?;
        Ok(RandomAgent::new(model.seed))
    }
}
