//! rl-2048: a 2048 game engine + an episodic reinforcement-learning loop
//!
//! This crate provides:
//! - A `Board` that owns the grid and score (`attempt_move`, `is_terminal`, `reset`, ...)
//! - Pluggable agents behind the `Agent` trait (`agent` module): random and Q-network
//! - A `Trainer` that runs episodes, feeds transitions to the agent and saves it (`trainer`)
//! - A paced `PlaySession` for watching a trained agent (`play`)
//! - Checksummed model files (`model_io`) and a binary game trace format (`trace`)
//!
//! Quick start:
//! ```
//! use rl_2048::engine::{Board, Move};
//!
//! // Deterministic board initialization with a seeded RNG
//! let mut board = Board::seeded(42);
//! assert_eq!(board.grid().count_empty(), 14);
//! let _moved = board.attempt_move(Move::Left);
//! assert!(board.score() >= 4);
//! ```
//!
//! Training loop
//! ```
//! use rl_2048::agent::{Agent, RandomAgent};
//! use rl_2048::trainer::{Trainer, TrainerConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = TrainerConfig {
//!     episodes: 2,
//!     max_steps: Some(100),
//!     model_path: dir.path().join("agent.a2m"),
//!     ..TrainerConfig::default()
//! };
//! let mut agent = RandomAgent::new(7);
//! let mut steps = 0;
//! let mut trainer = Trainer::new(config, StdRng::seed_from_u64(7));
//! trainer.on_step(|_snapshot| steps += 1);
//! let report = trainer.train(&mut agent).unwrap();
//! drop(trainer);
//! assert_eq!(report.episodes.len(), 2);
//! assert_eq!(steps, report.total_steps());
//! assert!(dir.path().join("agent.a2m").exists());
//! ```
//!
pub mod agent;
pub mod engine;
pub mod model_io;
pub mod play;
pub mod trace;
pub mod trainer;
