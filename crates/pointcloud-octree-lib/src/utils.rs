//! Utility functions for Web Mercator conversions used by tile subdivision

use crate::geometry::Angle;
use std::f64::consts::PI;

/// Maximum latitude (degrees) that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Minimum latitude (degrees) that can be represented in Web Mercator
pub const MIN_LATITUDE: f64 = -85.0511287798;

/// Precomputed constant: 4 * PI
const FOUR_PI: f64 = PI * 4.0;

/// Convert a latitude to the normalized Web Mercator vertical coordinate
///
/// `0.0` is the top edge of the Mercator square (north), `1.0` the bottom edge.
/// Latitudes beyond the Web Mercator limits are clamped to the nearest edge.
#[inline]
pub fn mercator_v(latitude: Angle) -> f64 {
    let degrees = latitude.degrees();
    if degrees >= MAX_LATITUDE {
        return 0.0;
    }
    if degrees <= MIN_LATITUDE {
        return 1.0;
    }

    let lat_sin = latitude.radians().sin();
    1.0 - (((1.0 + lat_sin) / (1.0 - lat_sin)).ln() / FOUR_PI + 0.5)
}

/// Inverse of [`mercator_v`]
#[inline]
pub fn latitude_from_mercator_v(v: f64) -> Angle {
    let exp = (-2.0 * PI * (1.0 - v - 0.5)).exp();
    Angle::from_radians(PI / 2.0 - 2.0 * exp.atan())
}
