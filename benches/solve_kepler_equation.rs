use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cometfit::kepler::{solve_hyperbolic_kepler_equation, solve_kepler_equation};

const TOLERANCE: f64 = 1e-14;
const MAX_ITER: usize = 50;

/// Random (M, e) pairs with M in [−π, π) and e drawn from `ecc`.
fn cases(rng: &mut StdRng, ecc: std::ops::Range<f64>, samples: usize) -> Vec<(f64, f64)> {
    (0..samples)
        .map(|_| {
            let m = rng.random_range(-std::f64::consts::PI..std::f64::consts::PI);
            (m, rng.random_range(ecc.clone()))
        })
        .collect()
}

fn bench_elliptic(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_kepler_equation");
    for (label, ecc, seed) in [
        ("typical_e<0.7", 0.0..0.7, 0xDEADBEEF_u64),
        ("cometary_e_0.9..0.999", 0.9..0.999, 0xBADF00D),
    ] {
        let mut rng = StdRng::seed_from_u64(seed);
        group.bench_function(label, |b| {
            b.iter_batched(
                || cases(&mut rng, ecc.clone(), 10_000),
                |cases| {
                    for (m, e) in cases {
                        black_box(solve_kepler_equation(black_box(m), e, TOLERANCE, MAX_ITER));
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_hyperbolic(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xFEEDFACE);
    c.bench_function("solve_hyperbolic_kepler_equation/e_1.001..3", |b| {
        b.iter_batched(
            || {
                (0..10_000)
                    .map(|_| (rng.random_range(-20.0..20.0), rng.random_range(1.001..3.0)))
                    .collect::<Vec<(f64, f64)>>()
            },
            |cases| {
                for (m, e) in cases {
                    black_box(solve_hyperbolic_kepler_equation(
                        black_box(m),
                        e,
                        TOLERANCE,
                        MAX_ITER,
                    ));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_elliptic, bench_hyperbolic
);
criterion_main!(benches);
