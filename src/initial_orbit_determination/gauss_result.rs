//! Outcome of the Gauss method on one triplet.
//!
//! The Gauss method works in the equatorial frame of the sightings, so its solutions are
//! kept as heliocentric equatorial state vectors ([`EquatorialState`]). They are only
//! turned into [`OrbitalElements`](crate::orbit_type::OrbitalElements) once the solver has
//! picked and refined the best candidate.
use std::fmt;

use nalgebra::Vector3;

use crate::constants::MJD;

/// Heliocentric state, equatorial mean J2000.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquatorialState {
    /// AU
    pub position: Vector3<f64>,
    /// AU/day
    pub velocity: Vector3<f64>,
    /// MJD, TT scale
    pub epoch: MJD,
}

/// A Gauss solution, tagged by whether the f/g correction loop succeeded on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GaussResult {
    /// Straight from the polynomial root and the Herrick–Gibbs velocity.
    PrelimOrbit(EquatorialState),
    /// After the iterative f/g correction.
    CorrectedOrbit(EquatorialState),
}

impl GaussResult {
    pub fn is_prelim(&self) -> bool {
        matches!(self, GaussResult::PrelimOrbit(_))
    }

    pub fn is_corrected(&self) -> bool {
        matches!(self, GaussResult::CorrectedOrbit(_))
    }

    pub fn state(&self) -> &EquatorialState {
        match self {
            GaussResult::PrelimOrbit(state) | GaussResult::CorrectedOrbit(state) => state,
        }
    }

    pub fn into_state(self) -> EquatorialState {
        *self.state()
    }
}

impl fmt::Display for GaussResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, state) = match self {
            GaussResult::PrelimOrbit(state) => ("Preliminary", state),
            GaussResult::CorrectedOrbit(state) => ("Corrected", state),
        };
        writeln!(f, "Gauss solution ({label}) @ MJD {:.6} TT", state.epoch)?;
        writeln!(
            f,
            "  r = [{:+.9}, {:+.9}, {:+.9}] AU",
            state.position.x, state.position.y, state.position.z
        )?;
        write!(
            f,
            "  v = [{:+.9e}, {:+.9e}, {:+.9e}] AU/d",
            state.velocity.x, state.velocity.y, state.velocity.z
        )
    }
}
