use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use rl_2048::agent::{Agent, QNetworkAgent, QNetworkConfig, Transition};
use rl_2048::engine::{merge_line, spawn_tile, Board, Grid, Move};
use std::hint::black_box;

fn corpus() -> Vec<Grid> {
    let mut board = Board::seeded(42);
    let mut grids = vec![Grid::EMPTY, *board.grid()];
    // Derive a variety of densities deterministically
    for i in 0..40 {
        if board.is_terminal() {
            board.reset();
        }
        board.attempt_move(Move::ALL[i % 4]);
        grids.push(*board.grid());
    }
    grids
}

fn bench_slide(c: &mut Criterion) {
    let grids = corpus();
    for dir in Move::ALL {
        c.bench_function(&format!("slide/{dir}"), |bch| {
            bch.iter(|| {
                let mut acc = 0u64;
                for &g in &grids {
                    let mut g = g;
                    acc += g.slide(dir).gained;
                }
                black_box(acc)
            })
        });
    }
    c.bench_function("merge_line", |bch| {
        bch.iter(|| black_box(merge_line(black_box([2, 2, 4, 4]))))
    });
}

fn bench_board(c: &mut Criterion) {
    c.bench_function("spawn/fill_empty", |bch| {
        bch.iter_batched(
            || (Grid::EMPTY, StdRng::seed_from_u64(7)),
            |(mut g, mut rng)| {
                while spawn_tile(&mut g, &mut rng).is_some() {}
                black_box(g)
            },
            BatchSize::SmallInput,
        )
    });
    c.bench_function("board/attempt_move_cycle", |bch| {
        bch.iter_batched(
            || Board::seeded(9),
            |mut board| {
                for i in 0..64 {
                    board.attempt_move(Move::ALL[i % 4]);
                }
                black_box(board.score())
            },
            BatchSize::SmallInput,
        )
    });
    let grids = corpus();
    c.bench_function("grid/is_terminal", |bch| {
        bch.iter(|| grids.iter().filter(|g| g.is_terminal()).count())
    });
}

fn bench_agent(c: &mut Criterion) {
    let grids = corpus();
    let mut agent = QNetworkAgent::new(QNetworkConfig::default()).expect("default config is valid");
    agent.set_exploration(false);
    c.bench_function("qnet/choose_action", |bch| {
        bch.iter(|| {
            for g in &grids {
                black_box(agent.choose_action(g).ok());
            }
        })
    });
    let t = Transition { state: grids[5], action: Move::Left, reward: 4, next_state: grids[6], done: false };
    c.bench_function("qnet/learn", |bch| bch.iter(|| agent.learn(black_box(&t)).ok()));
}

criterion_group!(engine_ops, bench_slide, bench_board, bench_agent);
criterion_main!(engine_ops);
