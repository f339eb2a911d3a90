// Benchmark for symbolic move resolution and gantry path planning
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use gantry_chess::board::{BoardMatrix, Indication, MoveResolver, Piece};
use gantry_chess::motion::{MotionPlanner, PieceMove, RehomePolicy};
use gantry_chess::queue::BoundedPoolQueue;
use std::hint::black_box;

fn bench_resolve(c: &mut Criterion) {
    let board = BoardMatrix::new();
    let knight = Piece::from_code('C').unwrap();
    let pawn = Piece::from_code('P').unwrap();
    c.bench_function("resolve opening moves", |b| {
        b.iter(|| {
            let resolver = MoveResolver::new(black_box(&board));
            let a = resolver.resolve(knight, 2, 2, Indication::None);
            let b2 = resolver.resolve(pawn, 4, 3, Indication::None);
            assert!(a.is_ok() && b2.is_ok());
        });
    });
}

fn bench_plan(c: &mut Criterion) {
    let board = BoardMatrix::new();
    let planner = MotionPlanner::new(200, RehomePolicy::default());
    let moves = [
        PieceMove::new(1, 0, 2, 2),
        PieceMove::new(4, 1, 4, 3),
        PieceMove::new(6, 7, 5, 5),
    ];
    c.bench_function("plan dodge paths", |b| {
        b.iter(|| {
            for mv in &moves {
                let plan = planner.plan(black_box(&board), mv).unwrap();
                black_box(plan.len());
            }
        });
    });
}

fn bench_queue_churn(c: &mut Criterion) {
    let mut queue = BoundedPoolQueue::new(32);
    c.bench_function("pool queue push/pop 32", |b| {
        b.iter(|| {
            for i in 0..32u32 {
                queue.push(black_box(i)).unwrap();
            }
            while let Some(v) = queue.pop() {
                black_box(v);
            }
        });
    });
}

criterion_group!(benches, bench_resolve, bench_plan, bench_queue_churn);
criterion_main!(benches);
