//! # Constants and type definitions for cometfit
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! definitions** used throughout the crate.
//!
//! ## Overview
//!
//! - Astronomical constants (Gaussian gravitational constant, speed of light, AU)
//! - Unit conversions (degrees ↔ radians, days ↔ seconds)
//! - Core type aliases (angles, dates, record identifiers)
//!
//! All dynamics in the crate are heliocentric two-body motion expressed in
//! **AU** and **days**, so the gravitational parameter of the Sun is `k²`.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Number of days in a Julian century
pub const DAYS_PER_JULIAN_CENTURY: f64 = 36_525.0;

/// Astronomical Unit in kilometers (IAU 2012)
pub const AU: f64 = 149_597_870.7;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Arcseconds → radians
pub const RADSEC: f64 = std::f64::consts::PI / 648000.0;

/// Gaussian gravitational constant k (AU^(3/2) day^-1)
pub const GAUSS_GRAV: f64 = 0.01720209895;

/// k², the heliocentric gravitational parameter in AU³/day²
pub const GAUSS_GRAV_SQUARED: f64 = GAUSS_GRAV * GAUSS_GRAV;

/// Speed of light in km/s
pub const VLIGHT: f64 = 2.99792458e5;

/// Speed of light in astronomical units per day
pub const VLIGHT_AU: f64 = VLIGHT / AU * SECONDS_PER_DAY;

/// Earth equatorial radius in meters (WGS 84)
pub const EARTH_MAJOR_AXIS: f64 = 6_378_137.0;

/// Earth polar radius in meters (WGS 84)
pub const EARTH_MINOR_AXIS: f64 = 6_356_752.3;

/// Earth equatorial radius in astronomical units
pub const ERAU: f64 = (EARTH_MAJOR_AXIS / 1000.) / AU;

/// Eccentricity band around 1 treated as an exactly parabolic orbit.
pub const PARABOLIC_ECC_TOLERANCE: f64 = 1e-9;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in astronomical units
pub type AstronomicalUnit = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// Identifier of a comet record
pub type CometId = u64;
/// Identifier of an observation record
pub type ObservationId = u64;
/// Identifier of an authenticated user
pub type UserId = u64;
