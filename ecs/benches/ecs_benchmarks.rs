use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use moye_core::time::ManualClock;
use moye_ecs::{Behaviour, Empty, Entity, Game, LateUpdate, Update};

// ---------------------------------------------------------------------------
// Helper behaviours
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Mover {
    x: f32,
    speed: f32,
}

impl Update for Mover {
    fn update(&mut self, _entity: &Entity) {
        self.x += self.speed + 1.0;
    }
}

impl LateUpdate for Mover {
    fn late_update(&mut self, _entity: &Entity) {
        self.speed = self.x * 0.001;
    }
}

impl Behaviour for Mover {
    fn as_update(&mut self) -> Option<&mut dyn Update> {
        Some(self)
    }

    fn as_late_update(&mut self) -> Option<&mut dyn LateUpdate> {
        Some(self)
    }
}

fn new_game() -> Game {
    Game::builder()
        .with_clock(ManualClock::new(1_700_000_000_000))
        .build()
        .unwrap()
}

fn game_with_movers(count: usize) -> Game {
    let game = new_game();
    for _ in 0..count {
        game.root().add_child::<Mover>().unwrap();
    }
    game
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

fn bench_add_children_1k(c: &mut Criterion) {
    c.bench_function("add_1k_children", |b| {
        b.iter_batched(
            new_game,
            |game| {
                for _ in 0..1_000 {
                    black_box(game.root().add_child::<Empty>().unwrap());
                }
                game
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_add_dispose_pooled_1k(c: &mut Criterion) {
    c.bench_function("add_dispose_pooled_1k", |b| {
        b.iter_batched(
            new_game,
            |game| {
                for _ in 0..1_000 {
                    let child = game.root().add_child_pooled::<Mover>().unwrap();
                    child.dispose();
                }
                game
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_components_1k(c: &mut Criterion) {
    c.bench_function("add_get_component_1k", |b| {
        b.iter_batched(
            || {
                let game = new_game();
                let owners: Vec<_> = (0..1_000)
                    .map(|_| game.root().add_child::<Empty>().unwrap())
                    .collect();
                (game, owners)
            },
            |(game, owners)| {
                for owner in &owners {
                    owner.add_component::<Mover>().unwrap();
                    black_box(owner.get_component::<Mover>());
                }
                (game, owners)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_dispose_deep_tree(c: &mut Criterion) {
    c.bench_function("dispose_tree_10x100", |b| {
        b.iter_batched(
            || {
                let game = new_game();
                let branches: Vec<_> = (0..10)
                    .map(|_| {
                        let branch = game.root().add_child::<Empty>().unwrap();
                        for _ in 0..100 {
                            branch.add_child::<Mover>().unwrap();
                        }
                        branch
                    })
                    .collect();
                (game, branches)
            },
            |(game, branches)| {
                for branch in &branches {
                    branch.dispose();
                }
                game
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Frame sweeps
// ---------------------------------------------------------------------------

fn bench_tick_10k(c: &mut Criterion) {
    let game = game_with_movers(10_000);
    c.bench_function("tick_10k_movers", |b| {
        b.iter(|| game.tick());
    });
}

fn bench_tick_fragmented_10k(c: &mut Criterion) {
    let game = new_game();
    let movers: Vec<_> = (0..10_000)
        .map(|_| game.root().add_child::<Mover>().unwrap())
        .collect();
    for mover in movers.iter().step_by(2) {
        mover.dispose();
    }
    // First sweep drops the stale ids.
    game.tick();
    c.bench_function("tick_fragmented_10k", |b| {
        b.iter(|| game.tick());
    });
}

criterion_group!(
    benches,
    bench_add_children_1k,
    bench_add_dispose_pooled_1k,
    bench_components_1k,
    bench_dispose_deep_tree,
    bench_tick_10k,
    bench_tick_fragmented_10k,
);
criterion_main!(benches);
