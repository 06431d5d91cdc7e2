//! # cometfit
//!
//! Orbit determination and close-approach prediction for comets observed from the Earth.
//!
//! * [`orbit_solver`]: angle-only observations → [`orbit_type::OrbitalElements`] (Gauss
//!   method on selected triplets, then differential correction over the whole set).
//! * [`close_approach`]: minimum Earth–comet distance inside a bounded forward horizon.
//! * [`trajectory`]: comet and Earth heliocentric paths over a time window.
//! * [`comet_state`]: the per-comet orchestration that persists results and keeps them
//!   flagged stale when the observations change.
//!
//! All dynamics are heliocentric two-body motion in AU and days; the Earth follows an
//! analytic orbit ([`earth_orbit`]).
pub mod close_approach;
pub mod comet_errors;
pub mod comet_state;
pub mod constants;
pub mod earth_orbit;
pub mod ephemeris;
pub mod initial_orbit_determination;
pub mod kepler;
pub mod observations;
mod orb_elem;
pub mod orbit_solver;
pub mod orbit_type;
pub mod ref_system;
pub mod time;
pub mod trajectory;
