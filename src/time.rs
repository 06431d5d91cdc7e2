//! # Time scale conversions
//!
//! Records carry wall-clock timestamps as [`chrono::DateTime<Utc>`], while every
//! numerical routine works in **Modified Julian Date, TT scale**. This module is the
//! single bridge between the two, built on [`hifitime`] so that leap seconds are
//! accounted for when moving from UTC to TT.
//!
//! It also provides the Greenwich mean sidereal time needed to turn horizontal
//! (azimuth/altitude) sightings into equatorial coordinates.
use chrono::{DateTime, TimeDelta, Utc};
use hifitime::{Epoch, TimeScale};

use crate::comet_errors::CometError;
use crate::constants::{DPI, MJD, SECONDS_PER_DAY, T2000};

/// Convert a UTC timestamp into a Modified Julian Date in the TT time scale.
///
/// Arguments
/// -----------------
/// * `date`: the UTC instant.
///
/// Return
/// ----------
/// * The MJD (TT) of the same instant, leap seconds included.
pub fn datetime_to_mjd_tt(date: &DateTime<Utc>) -> MJD {
    unix_epoch(date).to_mjd_tt_days()
}

/// Convert a UTC timestamp into a Modified Julian Date in the UTC time scale.
pub fn datetime_to_mjd_utc(date: &DateTime<Utc>) -> MJD {
    unix_epoch(date).to_mjd_utc_days()
}

/// Convert a Modified Julian Date (TT) back into a UTC timestamp.
///
/// Return
/// ----------
/// * `Err(CometError::ComputationError)` if the date is not finite or falls outside the
///   range representable by [`chrono`].
pub fn mjd_tt_to_datetime(mjd_tt: MJD) -> Result<DateTime<Utc>, CometError> {
    if !mjd_tt.is_finite() {
        return Err(CometError::ComputationError(format!(
            "non-finite epoch {mjd_tt}"
        )));
    }
    let unix_seconds = Epoch::from_mjd_in_time_scale(mjd_tt, TimeScale::TT).to_unix_seconds();
    let whole = unix_seconds.floor();
    let nanos = ((unix_seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(whole as i64, nanos).ok_or_else(|| {
        CometError::ComputationError(format!("epoch {mjd_tt} outside the supported date range"))
    })
}

/// Parse an RFC 3339 timestamp (e.g. `2024-12-01T00:00:00Z`) into UTC.
///
/// Return
/// ----------
/// * `Err(CometError::InvalidInput)` when the string is not valid RFC 3339.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>, CometError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|date| date.with_timezone(&Utc))
        .map_err(|err| CometError::InvalidInput(format!("unparseable timestamp {raw:?}: {err}")))
}

/// Signed number of days from `from` to `to`.
pub fn days_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    let delta = *to - *from;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / (SECONDS_PER_DAY * 1e9),
        None => delta.num_milliseconds() as f64 / (SECONDS_PER_DAY * 1e3),
    }
}

/// Shift a timestamp by a (possibly fractional) number of days, at microsecond resolution.
pub fn add_days(date: &DateTime<Utc>, days: f64) -> Result<DateTime<Utc>, CometError> {
    let micros = (days * SECONDS_PER_DAY * 1e6).round();
    if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
        return Err(CometError::ComputationError(format!(
            "time offset of {days} days is out of range"
        )));
    }
    date.checked_add_signed(TimeDelta::microseconds(micros as i64))
        .ok_or_else(|| {
            CometError::ComputationError(format!("time offset of {days} days is out of range"))
        })
}

fn unix_epoch(date: &DateTime<Utc>) -> Epoch {
    let seconds = date.timestamp() as f64 + f64::from(date.timestamp_subsec_nanos()) * 1e-9;
    Epoch::from_unix_seconds(seconds)
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians
/// for a given Modified Julian Date (UT1 time scale).
///
/// # Arguments
/// * `tjm` - Modified Julian Date (MJD, UT1 time scale; UTC is an adequate stand-in here)
///
/// # Returns
/// * GMST angle in radians, normalized to the interval [0, 2π).
///
/// # Details
/// A cubic polynomial gives GMST at 0h UT1, then the fraction of the day is added
/// scaled by the sidereal/solar day ratio.
///
/// # References
/// * IAU 1982, IERS Conventions 1996/2000.
pub fn gmst(tjm: f64) -> f64 {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // Ratio of sidereal day to solar day
    const RAP: f64 = 1.00273790934;

    let itjm = tjm.floor();
    let t = (itjm - T2000) / 36525.0;

    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / SECONDS_PER_DAY;
    let h = tjm.fract() * DPI;

    (gmst0 + h * RAP).rem_euclid(DPI)
}
