//! Triplet selection for the Gauss method.
//!
//! A comet with many sightings produces `O(n³)` candidate triplets. The set is first
//! thinned to at most `max_obs_for_triplets` sightings spread uniformly in time (edges
//! always kept), then every triplet whose span lies inside `[dt_min, dt_max]` is scored
//! by [`triplet_weight`] and the `max_triplets` lowest-weight ones are kept in a bounded
//! max-heap. When the sightings are so sparse that no triplet fits under `dt_max`, the
//! upper bound is dropped and the widest arcs compete on weight alone; the residuals
//! over the whole set then decide between the candidates.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::comet_errors::CometError;
use crate::initial_orbit_determination::gauss::GaussObs;
use crate::initial_orbit_determination::IODParams;
use crate::observations::Sighting;

#[derive(Debug)]
struct WeightedTriplet {
    weight: f64,
    indices: (usize, usize, usize),
}

// Max-heap on weight: the worst kept triplet sits at the top. Equal weights fall back to
// the indices so that the selection does not depend on enumeration order.
impl Ord for WeightedTriplet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.indices.cmp(&other.indices))
    }
}

impl PartialOrd for WeightedTriplet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for WeightedTriplet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WeightedTriplet {}

/// Spacing score of a triplet (lower is better).
///
/// Each of the two gaps contributes `dtw / dt` when shorter than the preferred
/// interval `dtw`, and `1 + dt / dtw` when longer, so balanced gaps close to `dtw` win.
pub(crate) fn triplet_weight(time1: f64, time2: f64, time3: f64, dtw: f64) -> f64 {
    fn s3dtw(dt: f64, dtw: f64) -> f64 {
        if dt <= dtw {
            dtw / dt
        } else {
            1.0 + dt / dtw
        }
    }

    s3dtw(time2 - time1, dtw) + s3dtw(time3 - time2, dtw)
}

/// Indices of at most `max_keep` samples out of `n`, uniform in rank, first and last kept.
///
/// * `n ≤ max_keep`: every index.
/// * `max_keep ≤ 3`: first, middle and last.
pub(crate) fn downsample_uniform_with_edges_indices(n: usize, max_keep: usize) -> Vec<usize> {
    match n {
        0 => Vec::new(),
        _ if max_keep >= n => (0..n).collect(),
        _ if max_keep <= 3 => vec![0, n / 2, n - 1],
        _ => {
            let slots = max_keep - 2;
            std::iter::once(0)
                .chain((0..slots).map(move |i| {
                    let fraction = (i + 1) as f64 / (slots + 1) as f64;
                    1 + (fraction * (n - 2) as f64).floor() as usize
                }))
                .chain(std::iter::once(n - 1))
                .dedup()
                .collect()
        }
    }
}

/// Keep the `max_triplets` lowest-weight triplets whose span lies in `[dt_min, max_span]`.
fn best_triplets(
    sightings: &[Sighting],
    selected: &[usize],
    params: &IODParams,
    max_span: f64,
) -> BinaryHeap<WeightedTriplet> {
    let max_triplets = params.max_triplets as usize;
    let mut heap = BinaryHeap::with_capacity(max_triplets + 1);

    selected
        .iter()
        .copied()
        .tuple_combinations::<(usize, usize, usize)>()
        .filter_map(|(i, j, k)| {
            let (t1, t2, t3) = (sightings[i].time, sightings[j].time, sightings[k].time);
            let span = t3 - t1;
            if span < params.dt_min || span > max_span {
                return None;
            }
            Some(WeightedTriplet {
                weight: triplet_weight(t1, t2, t3, params.optimal_interval_time),
                indices: (i, j, k),
            })
        })
        .for_each(|candidate| {
            if heap.len() < max_triplets {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        });

    heap
}

/// Build the candidate Gauss triplets from time-sorted sightings.
///
/// Arguments
/// -----------------
/// * `sightings`: sorted by increasing time, with distinct timestamps.
/// * `params`: supplies `dt_min`, `dt_max_triplet`, `optimal_interval_time`,
///   `max_obs_for_triplets` and `max_triplets`.
///
/// Return
/// ----------
/// * At most `max_triplets` [`GaussObs`], best weight first. Ties are broken by the
///   indices so the order is reproducible. Triplets longer than `dt_max_triplet` are
///   only used when no shorter one exists.
/// * `Err(CometError::DegenerateGeometry)` when every triplet spans less than `dt_min`.
pub(crate) fn generate_triplets(
    sightings: &[Sighting],
    params: &IODParams,
) -> Result<Vec<GaussObs>, CometError> {
    let selected =
        downsample_uniform_with_edges_indices(sightings.len(), params.max_obs_for_triplets);

    let mut heap = best_triplets(sightings, &selected, params, params.dt_max_triplet);
    if heap.is_empty() {
        debug!(
            dt_max_triplet = params.dt_max_triplet,
            "no triplet inside the preferred span, widening to the full arc"
        );
        heap = best_triplets(sightings, &selected, params, f64::INFINITY);
    }

    if heap.is_empty() {
        return Err(CometError::DegenerateGeometry(format!(
            "observations are too close in time: no triplet spans at least {} days",
            params.dt_min
        )));
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|WeightedTriplet { indices: (i, j, k), .. }| {
            let (a, b, c) = (&sightings[i], &sightings[j], &sightings[k]);
            GaussObs::with_observer_position(
                Vector3::new(i, j, k),
                Vector3::new(a.ra, b.ra, c.ra),
                Vector3::new(a.dec, b.dec, c.dec),
                Vector3::new(a.time, b.time, c.time),
                Matrix3::from_columns(&[
                    a.observer_position,
                    b.observer_position,
                    c.observer_position,
                ]),
            )
        })
        .collect())
}
