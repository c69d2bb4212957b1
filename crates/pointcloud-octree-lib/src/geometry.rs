//! Geodetic primitives: angles, 2D/3D geodetic positions and lat/lon sectors
//!
//! All angles are stored in radians. Sectors are backed by a [`geo::Rect`] whose
//! `x` axis is longitude and `y` axis is latitude (both in radians).

use geo::{Coord, Rect};
use std::fmt;
use std::ops::{Add, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An angle stored in radians
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    #[inline]
    pub const fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    #[inline]
    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    #[inline]
    pub const fn radians(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    /// Arithmetic midpoint of two angles
    #[inline]
    pub fn mid_angle(a: Angle, b: Angle) -> Angle {
        Angle((a.0 + b.0) / 2.0)
    }

    /// Inclusive range check
    #[inline]
    pub fn is_between(self, min: Angle, max: Angle) -> bool {
        self.0 >= min.0 && self.0 <= max.0
    }

    /// Limit the angle to `[min, max]`; NaN bounds are ignored instead of panicking
    #[inline]
    pub fn clamp(self, min: Angle, max: Angle) -> Angle {
        Angle(self.0.max(min.0).min(max.0))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}°", self.degrees())
    }
}

/// A latitude/longitude position on the ellipsoid surface
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geodetic2D {
    pub latitude: Angle,
    pub longitude: Angle,
}

impl Geodetic2D {
    pub const fn new(latitude: Angle, longitude: Angle) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub const fn from_radians(latitude: f64, longitude: f64) -> Self {
        Self::new(Angle::from_radians(latitude), Angle::from_radians(longitude))
    }

    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self::new(Angle::from_degrees(latitude), Angle::from_degrees(longitude))
    }
}

/// A latitude/longitude position plus height in meters
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geodetic3D {
    pub latitude: Angle,
    pub longitude: Angle,
    pub height: f64,
}

impl Geodetic3D {
    pub const fn new(latitude: Angle, longitude: Angle, height: f64) -> Self {
        Self {
            latitude,
            longitude,
            height,
        }
    }

    pub const fn from_radians(latitude: f64, longitude: f64, height: f64) -> Self {
        Self::new(
            Angle::from_radians(latitude),
            Angle::from_radians(longitude),
            height,
        )
    }

    pub fn from_degrees(latitude: f64, longitude: f64, height: f64) -> Self {
        Self::new(
            Angle::from_degrees(latitude),
            Angle::from_degrees(longitude),
            height,
        )
    }

    /// Drop the height component
    #[inline]
    pub fn to_2d(self) -> Geodetic2D {
        Geodetic2D::new(self.latitude, self.longitude)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite() && self.height.is_finite()
    }
}

impl fmt::Display for Geodetic3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {:.3}m)",
            self.latitude, self.longitude, self.height
        )
    }
}

/// A latitude/longitude bounding rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sector {
    /// x = longitude, y = latitude, both in radians
    rect: Rect<f64>,
}

impl Sector {
    /// Create a sector from its south-west and north-east corners
    pub fn new(lower: Geodetic2D, upper: Geodetic2D) -> Self {
        Self {
            rect: Rect::new(
                Coord {
                    x: lower.longitude.radians(),
                    y: lower.latitude.radians(),
                },
                Coord {
                    x: upper.longitude.radians(),
                    y: upper.latitude.radians(),
                },
            ),
        }
    }

    pub fn from_radians(
        lower_latitude: f64,
        lower_longitude: f64,
        upper_latitude: f64,
        upper_longitude: f64,
    ) -> Self {
        Self::new(
            Geodetic2D::from_radians(lower_latitude, lower_longitude),
            Geodetic2D::from_radians(upper_latitude, upper_longitude),
        )
    }

    pub fn from_degrees(
        lower_latitude: f64,
        lower_longitude: f64,
        upper_latitude: f64,
        upper_longitude: f64,
    ) -> Self {
        Self::new(
            Geodetic2D::from_degrees(lower_latitude, lower_longitude),
            Geodetic2D::from_degrees(upper_latitude, upper_longitude),
        )
    }

    /// The whole sphere: latitude [-90°, 90°], longitude [-180°, 180°]
    pub fn full_sphere() -> Self {
        Self::from_degrees(-90.0, -180.0, 90.0, 180.0)
    }

    #[inline]
    pub fn lower(&self) -> Geodetic2D {
        let min = self.rect.min();
        Geodetic2D::from_radians(min.y, min.x)
    }

    #[inline]
    pub fn upper(&self) -> Geodetic2D {
        let max = self.rect.max();
        Geodetic2D::from_radians(max.y, max.x)
    }

    /// Boundary-inclusive containment of a position
    #[inline]
    pub fn contains(&self, position: &Geodetic2D) -> bool {
        let lower = self.lower();
        let upper = self.upper();
        position
            .latitude
            .is_between(lower.latitude, upper.latitude)
            && position
                .longitude
                .is_between(lower.longitude, upper.longitude)
    }

    /// True if `that` lies entirely inside this sector (boundaries included)
    #[inline]
    pub fn full_contains(&self, that: &Sector) -> bool {
        self.contains(&that.lower()) && self.contains(&that.upper())
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = self.lower();
        let upper = self.upper();
        write!(
            f,
            "[{}, {}] -> [{}, {}]",
            lower.latitude, lower.longitude, upper.latitude, upper.longitude
        )
    }
}
