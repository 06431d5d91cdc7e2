//! # Close-approach search
//!
//! Finds the instant of minimum Earth–comet distance inside a bounded forward horizon.
//!
//! The search is a coarse scan followed by a golden-section refinement:
//!
//! 1. The horizon starts at the reference epoch (the elements' epoch by default) and
//!    spans one orbital period for a bound orbit, capped at `max_horizon_days`; open
//!    orbits use the cap alone.
//! 2. The distance is sampled every `coarse_step_days`; the step widens when the horizon
//!    would need more than `max_samples` samples.
//! 3. Every local minimum of the scan, horizon endpoints included, is refined by a
//!    golden-section search on its bracketing interval. The two endpoint samples are
//!    candidates in any case.
//! 4. The smallest refined distance wins; minima within `tie_tolerance_au` of it are
//!    resolved in favour of the earliest one.
//! 5. The date is reported as an offset from the reference epoch, so a minimum at the
//!    start of the window is the reference epoch itself.
//!
//! Comet positions come from [`OrbitalElements::position_at`], Earth positions from an
//! [`EarthEphemeris`].
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comet_errors::CometError;
use crate::constants::{AstronomicalUnit, MJD};
use crate::earth_orbit::{EarthEphemeris, MeanElementsEarth};
use crate::ephemeris::earth_distance;
use crate::orbit_type::OrbitalElements;
use crate::time::{add_days, datetime_to_mjd_tt};

/// Minimum Earth–comet distance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseApproach {
    pub date: DateTime<Utc>,
    pub distance_au: AstronomicalUnit,
}

impl fmt::Display for CloseApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:.6} AU", self.date.to_rfc3339(), self.distance_au)
    }
}

/// Finds the close approach of an orbit to the Earth.
pub trait CloseApproachProjector: Send + Sync {
    /// Search forward from `reference_epoch`, or from the elements' epoch when `None`.
    fn project(
        &self,
        elements: &OrbitalElements,
        reference_epoch: Option<DateTime<Utc>>,
    ) -> Result<CloseApproach, CometError>;
}

/// Tuning of the close-approach search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachParams {
    /// Preferred scan step, days.
    pub coarse_step_days: f64,
    /// Horizon cap, days. Also the horizon of open orbits.
    pub max_horizon_days: f64,
    /// Upper bound on scan samples; the step widens to respect it.
    pub max_samples: usize,
    /// Width of the refined bracket at which golden-section stops, days.
    pub refine_tolerance_days: f64,
    pub refine_max_iter: usize,
    /// Distances closer than this to the minimum count as ties, AU.
    pub tie_tolerance_au: f64,
}

impl Default for ApproachParams {
    fn default() -> Self {
        ApproachParams {
            coarse_step_days: 1.0,
            max_horizon_days: 36525.0,
            max_samples: 50_000,
            refine_tolerance_days: 1e-6,
            refine_max_iter: 200,
            tie_tolerance_au: 1e-9,
        }
    }
}

impl ApproachParams {
    pub fn builder() -> ApproachParamsBuilder {
        ApproachParamsBuilder::default()
    }

    pub fn validate(&self) -> Result<(), CometError> {
        ApproachParamsBuilder {
            params: self.clone(),
        }
        .build()
        .map(|_| ())
    }
}

/// Fluent, validating builder for [`ApproachParams`].
#[derive(Debug, Clone, Default)]
pub struct ApproachParamsBuilder {
    params: ApproachParams,
}

impl ApproachParamsBuilder {
    pub fn coarse_step_days(mut self, v: f64) -> Self {
        self.params.coarse_step_days = v;
        self
    }
    pub fn max_horizon_days(mut self, v: f64) -> Self {
        self.params.max_horizon_days = v;
        self
    }
    pub fn max_samples(mut self, v: usize) -> Self {
        self.params.max_samples = v;
        self
    }
    pub fn refine_tolerance_days(mut self, v: f64) -> Self {
        self.params.refine_tolerance_days = v;
        self
    }
    pub fn refine_max_iter(mut self, v: usize) -> Self {
        self.params.refine_max_iter = v;
        self
    }
    pub fn tie_tolerance_au(mut self, v: f64) -> Self {
        self.params.tie_tolerance_au = v;
        self
    }

    pub fn build(self) -> Result<ApproachParams, CometError> {
        let p = &self.params;
        let positive = |x: f64| x.is_finite() && x > 0.0;

        if !positive(p.coarse_step_days) || !positive(p.max_horizon_days) {
            return Err(CometError::InvalidParameter(
                "coarse_step_days and max_horizon_days must be finite and > 0".into(),
            ));
        }
        if p.max_samples < 3 {
            return Err(CometError::InvalidParameter("max_samples must be >= 3".into()));
        }
        if !positive(p.refine_tolerance_days) || p.refine_max_iter == 0 {
            return Err(CometError::InvalidParameter(
                "refine_tolerance_days must be > 0 and refine_max_iter >= 1".into(),
            ));
        }
        if !(p.tie_tolerance_au >= 0.0) {
            return Err(CometError::InvalidParameter(
                "tie_tolerance_au must be >= 0".into(),
            ));
        }
        Ok(self.params)
    }
}

impl fmt::Display for ApproachParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApproachParams(step={}d, horizon≤{}d, max_samples={}, refine_tol={:.1e}d, refine_max_iter={}, tie_tol={:.1e}AU)",
            self.coarse_step_days,
            self.max_horizon_days,
            self.max_samples,
            self.refine_tolerance_days,
            self.refine_max_iter,
            self.tie_tolerance_au
        )
    }
}

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Golden-section minimisation of `f` on `[lower, upper]`.
///
/// Returns the best abscissa seen together with its value. The bracket endpoints are
/// evaluated too, so a minimum sitting on the boundary is found.
fn golden_section_minimize<F>(
    f: F,
    mut lower: f64,
    mut upper: f64,
    tolerance: f64,
    max_iter: usize,
) -> Result<(f64, f64), CometError>
where
    F: Fn(f64) -> Result<f64, CometError>,
{
    let mut best = (lower, f(lower)?);
    let f_upper = f(upper)?;
    if f_upper < best.1 {
        best = (upper, f_upper);
    }

    let mut x1 = upper - INV_PHI * (upper - lower);
    let mut x2 = lower + INV_PHI * (upper - lower);
    let mut f1 = f(x1)?;
    let mut f2 = f(x2)?;

    for _ in 0..max_iter {
        if upper - lower <= tolerance {
            break;
        }
        if f1 <= f2 {
            upper = x2;
            x2 = x1;
            f2 = f1;
            x1 = upper - INV_PHI * (upper - lower);
            f1 = f(x1)?;
        } else {
            lower = x1;
            x1 = x2;
            f1 = f2;
            x2 = lower + INV_PHI * (upper - lower);
            f2 = f(x2)?;
        }
    }

    for candidate in [(x1, f1), (x2, f2)] {
        if candidate.1 < best.1 || (candidate.1 == best.1 && candidate.0 < best.0) {
            best = candidate;
        }
    }
    Ok(best)
}

/// Kepler propagation against an analytic Earth orbit.
pub struct KeplerCloseApproachProjector {
    params: ApproachParams,
    earth: Box<dyn EarthEphemeris>,
}

impl fmt::Debug for KeplerCloseApproachProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeplerCloseApproachProjector")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Default for KeplerCloseApproachProjector {
    fn default() -> Self {
        Self::new(ApproachParams::default())
    }
}

impl KeplerCloseApproachProjector {
    pub fn new(params: ApproachParams) -> Self {
        Self::with_earth(params, MeanElementsEarth::default())
    }

    pub fn with_earth(params: ApproachParams, earth: impl EarthEphemeris + 'static) -> Self {
        KeplerCloseApproachProjector {
            params,
            earth: Box::new(earth),
        }
    }

    pub fn params(&self) -> &ApproachParams {
        &self.params
    }

    /// Length of the forward search window, days.
    pub fn horizon_days(&self, elements: &OrbitalElements) -> f64 {
        match elements.period_days() {
            Some(period) if period.is_finite() => period.min(self.params.max_horizon_days),
            _ => self.params.max_horizon_days,
        }
    }

    /// Minimum distance over `[start, start + horizon]`, as `(mjd_tt, distance)`.
    fn search(&self, elements: &OrbitalElements, start: MJD, horizon: f64) -> Result<(MJD, f64), CometError> {
        let p = &self.params;
        let distance = |t: MJD| earth_distance(elements, self.earth.as_ref(), t);

        let intervals = ((horizon / p.coarse_step_days).ceil() as usize)
            .clamp(2, p.max_samples.saturating_sub(1).max(2));
        let step = horizon / intervals as f64;

        let times: Vec<MJD> = (0..=intervals).map(|i| start + step * i as f64).collect();
        let samples = times
            .iter()
            .map(|&t| distance(t))
            .collect::<Result<Vec<f64>, CometError>>()?;

        let last = samples.len() - 1;
        let local_minima = (0..=last).filter(|&i| {
            let left_ok = i == 0 || samples[i] <= samples[i - 1];
            let right_ok = i == last || samples[i] <= samples[i + 1];
            left_ok && right_ok
        });

        // both ends of the window always compete, so a flat distance resolves to the start
        let mut refined = vec![(times[0], samples[0]), (times[last], samples[last])];
        for i in local_minima {
            let lower = times[i.saturating_sub(1)];
            let upper = times[(i + 1).min(last)];
            let golden = golden_section_minimize(
                &distance,
                lower,
                upper,
                p.refine_tolerance_days,
                p.refine_max_iter,
            )?;
            let sampled = (times[i], samples[i]);
            refined.push(if golden.1 <= sampled.1 { golden } else { sampled });
        }
        debug!(
            samples = samples.len(),
            step,
            minima = refined.len(),
            "close-approach scan"
        );

        let smallest = refined
            .iter()
            .map(|&(_, d)| d)
            .fold(f64::INFINITY, f64::min);

        refined
            .into_iter()
            .filter(|&(_, d)| d <= smallest + p.tie_tolerance_au)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .ok_or_else(|| CometError::ComputationError("close-approach scan found no minimum".into()))
    }
}

impl CloseApproachProjector for KeplerCloseApproachProjector {
    fn project(
        &self,
        elements: &OrbitalElements,
        reference_epoch: Option<DateTime<Utc>>,
    ) -> Result<CloseApproach, CometError> {
        elements.validate()?;

        let reference = reference_epoch.unwrap_or(elements.epoch);
        let start = datetime_to_mjd_tt(&reference);
        let horizon = self.horizon_days(elements);
        let (mjd, distance_au) = self.search(elements, start, horizon)?;

        if !distance_au.is_finite() {
            return Err(CometError::ComputationError(
                "non-finite close-approach distance".into(),
            ));
        }

        Ok(CloseApproach {
            date: add_days(&reference, mjd - start)?,
            distance_au,
        })
    }
}

/// Deterministic projector returning a preset approach.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedCloseApproachProjector {
    approach: CloseApproach,
}

impl FixedCloseApproachProjector {
    pub fn new(approach: CloseApproach) -> Self {
        FixedCloseApproachProjector { approach }
    }
}

impl CloseApproachProjector for FixedCloseApproachProjector {
    fn project(
        &self,
        elements: &OrbitalElements,
        _reference_epoch: Option<DateTime<Utc>>,
    ) -> Result<CloseApproach, CometError> {
        elements.validate()?;
        Ok(self.approach.clone())
    }
}
