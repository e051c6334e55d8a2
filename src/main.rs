use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rl_2048::agent::{self, Agent, AgentKind, DEFAULT_MODEL_PATH};
use rl_2048::engine::Board;
use rl_2048::play::{PlayConfig, PlaySession, Tick};
use rl_2048::trace;
use rl_2048::trainer::{Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "rl-2048", version, about = "Train and watch agents playing 2048")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train an agent for a number of episodes and save it
    Train {
        #[arg(short = 'n', long, default_value_t = 1000)]
        episodes: usize,
        /// Agent kind: random | qnet
        #[arg(long, default_value = "qnet")]
        agent: AgentKind,
        #[arg(short = 'm', long = "model", value_name = "FILE", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
        /// Per-episode step cap (0 disables it)
        #[arg(long, default_value_t = 5_000)]
        max_steps: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Continue training the agent stored in --model
        #[arg(long)]
        resume: bool,
        #[arg(short, long)]
        quiet: bool,
    },
    /// Watch a saved agent play one game
    Play {
        #[arg(short = 'm', long = "model", value_name = "FILE", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
        /// Delay between moves
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Write the game to a binary trace file
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
    },
    /// Play one game with random moves and print every board
    Random {
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rl_2048=info,warn"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("logging disabled: {e}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Train { episodes, agent, model, max_steps, seed, resume, quiet } => {
            let mut learner = if resume { agent::load_agent(agent, &model)? } else { agent::build_agent(agent, seed)? };
            let config = TrainerConfig {
                episodes,
                max_steps: (max_steps > 0).then_some(max_steps),
                model_path: model,
                start_grid: None,
            };
            run_training(config, learner.as_mut(), seed, quiet)
        }
        Command::Play { model, interval_ms, seed, trace } => {
            let mut player = agent::load_any(&model)?;
            let config = PlayConfig { interval: Duration::from_millis(interval_ms), ..PlayConfig::default() };
            run_play(player.as_mut(), config, seed, trace)
        }
        Command::Random { seed } => {
            let mut player = agent::build_agent(AgentKind::Random, seed)?;
            let config = PlayConfig { interval: Duration::ZERO, ..PlayConfig::default() };
            run_play(player.as_mut(), config, seed, None)
        }
    }
}

fn run_training(config: TrainerConfig, agent: &mut dyn Agent, seed: u64, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    let pb = if quiet { ProgressBar::hidden() } else { ProgressBar::new(config.episodes as u64) };
    pb.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} [{wide_bar}] {pos}/{len} episodes | {msg}")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut trainer = Trainer::new(config, StdRng::seed_from_u64(seed));
    let pb_step = pb.clone();
    trainer.on_step(move |snap| {
        pb_step.set_position(snap.episode.saturating_sub(1) as u64);
        if snap.step % 50 == 0 || snap.view.game_over {
            pb_step.set_message(format!("episode {} step {} score {}", snap.episode, snap.step, snap.view.score));
        }
    });
    let report = trainer.train(agent)?;
    pb.finish_and_clear();

    println!(
        "Episodes: {} | steps: {} | mean score: {:.1} | best score: {}",
        report.episodes.len(),
        report.total_steps(),
        report.mean_score(),
        report.best_score()
    );
    println!("Agent saved to {}", trainer.config().model_path.display());
    Ok(())
}

fn run_play(agent: &mut dyn Agent, config: PlayConfig, seed: u64, trace_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = PlaySession::new(Board::seeded(seed), config);
    if trace_path.is_some() {
        session = session.record();
    }
    println!("{}", session.board());
    let summary = loop {
        match session.tick(agent)? {
            Tick::Continue { action, next_in, .. } => {
                println!("move: {action}\n{}", session.board());
                // The host paces the game; the session itself never waits.
                thread::sleep(next_in);
            }
            Tick::Finished(summary) => break summary,
        }
    };
    println!("{}", session.board());
    println!(
        "Game over ({:?}) | moves: {} | score: {} | highest tile: {}",
        summary.reason, summary.moves, summary.score, summary.highest_tile
    );

    if let Some(path) = trace_path {
        let name = agent.kind().name().to_string();
        if let Some(run) = session.into_run(Some(name)) {
            trace::write_run_to_path(&path, &run)?;
            println!("Trace written to {}", path.display());
        }
    }
    Ok(())
}
