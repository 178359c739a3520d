//! Growth-loop benchmarks: steps/second of the two learners.

use criterion::{criterion_group, criterion_main, Criterion};
use neuroplan_core::gng::GngEngine;
use neuroplan_core::oracle::{Classification, FnOracle, Oracle};
use neuroplan_core::params::{GngParams, NnParams, PlanParams};
use neuroplan_core::plan::PlanEngine;
use neuroplan_core::point::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;

fn budget_oracle(steps: usize, seed: u64) -> Box<dyn Oracle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let left = Cell::new(steps);
    Box::new(FnOracle::new(
        move || Point::xy(rng.gen(), rng.gen()),
        |w: &Point| {
            if w.dist(&Point::xy(0.5, 0.5)) < 0.2 {
                Classification::Obst
            } else {
                Classification::Free
            }
        },
        move || {
            if left.get() == 0 {
                return true;
            }
            left.set(left.get() - 1);
            false
        },
    ))
}

fn bench_plan_growth(c: &mut Criterion) {
    c.bench_function("plan_growth_5k_steps_grid", |b| {
        b.iter(|| {
            let params = PlanParams {
                lambda: 100,
                warm_start: 100,
                h: 0.05,
                callback_period: 0,
                nn: NnParams::Grid {
                    aabb: vec![0.0, 1.0, 0.0, 1.0],
                    cells_per_axis: 32,
                },
                ..Default::default()
            };
            let mut engine = PlanEngine::new(params).unwrap();
            engine.add_ops(budget_oracle(5_000, 42));
            engine.run().unwrap();
            engine.graph().vertex_count()
        })
    });
}

fn bench_gng_growth(c: &mut Criterion) {
    c.bench_function("gng_growth_5k_steps_linear", |b| {
        b.iter(|| {
            let params = GngParams { lambda: 100, ..Default::default() };
            let mut engine = GngEngine::new(params).unwrap();
            engine.add_ops(budget_oracle(5_000, 7));
            engine.run().unwrap();
            engine.graph().vertex_count()
        })
    });
}

criterion_group!(benches, bench_plan_growth, bench_gng_growth);
criterion_main!(benches);
