use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use cometfit::earth_orbit::MeanElementsEarth;
use cometfit::ephemeris::predict_radec;
use cometfit::observations::{AngularPosition, Observation};
use cometfit::orbit_solver::{GaussOrbitSolver, OrbitSolver};
use cometfit::orbit_type::OrbitalElements;
use cometfit::time::{add_days, datetime_to_mjd_tt};

fn halley() -> OrbitalElements {
    OrbitalElements {
        epoch: Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
        semi_major_axis: 17.8,
        perihelion_distance: 17.8 * (1.0 - 0.967),
        eccentricity: 0.967,
        inclination: 162.3,
        ascending_node_longitude: 58.42,
        periapsis_argument: 111.33,
        true_anomaly: 60.0,
    }
}

fn observations(n: usize, arc_days: f64) -> Vec<Observation> {
    let elements = halley();
    let earth = MeanElementsEarth::default();
    (0..n)
        .map(|i| {
            let observed_at =
                add_days(&elements.epoch, arc_days * i as f64 / (n - 1) as f64).unwrap();
            let (ra, dec) =
                predict_radec(&elements, &earth, datetime_to_mjd_tt(&observed_at), false)
                    .unwrap();
            Observation {
                id: i as u64 + 1,
                comet_id: Some(1),
                user_id: 1,
                position: AngularPosition::equatorial(ra, dec),
                observed_at,
                photo_url: None,
            }
        })
        .collect()
}

fn bench_fit(c: &mut Criterion) {
    let solver = GaussOrbitSolver::default();
    let mut group = c.benchmark_group("gauss_orbit_fit");

    for (label, n, arc) in [("3_obs_2d", 3, 2.0), ("5_obs_2d", 5, 2.0), ("30_obs_20d", 30, 20.0)] {
        let set = observations(n, arc);
        group.bench_function(label, |b| {
            b.iter_batched(
                || set.clone(),
                |set| black_box(solver.fit(black_box(&set))),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
