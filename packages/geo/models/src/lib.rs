#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate and bounding box types.
//!
//! Every component of the commute risk core (polyline decoding, hazard
//! clustering, route proximity) speaks in terms of [`Coordinate`]. The
//! type is deliberately plain: WGS84 degrees, latitude first.

use serde::{Deserialize, Serialize};

/// Error returned when a coordinate falls outside the valid WGS84 range or
/// is not a finite number.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("invalid coordinate ({lat}, {lng}): expected -90 <= lat <= 90 and -180 <= lng <= 180")]
pub struct InvalidCoordinate {
    /// The rejected latitude.
    pub lat: f64,
    /// The rejected longitude.
    pub lng: f64,
}

/// A point on the earth's surface in floating-point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,
    /// Longitude in degrees, `-180..=180`.
    pub lng: f64,
}

impl Coordinate {
    /// Creates a coordinate, validating the WGS84 range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinate`] if either component is non-finite or
    /// out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinate> {
        let coordinate = Self { lat, lng };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Checks that the coordinate lies within the valid WGS84 range.
    ///
    /// Deserialized coordinates are not validated automatically, so
    /// consumers that accept external input call this at the boundary.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinate`] if either component is non-finite or
    /// out of range.
    pub fn validate(&self) -> Result<(), InvalidCoordinate> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Returns `true` if both components are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Linear interpolation in latitude/longitude space.
    ///
    /// `t` is clamped to `0..=1`; `t >= 1` returns `other` exactly so that
    /// interpolating to the end of a segment never drifts off the vertex.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *other;
        }
        Self {
            lat: (other.lat - self.lat).mul_add(t, self.lat),
            lng: (other.lng - self.lng).mul_add(t, self.lng),
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// An axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern edge (minimum latitude).
    pub south: f64,
    /// Western edge (minimum longitude).
    pub west: f64,
    /// Northern edge (maximum latitude).
    pub north: f64,
    /// Eastern edge (maximum longitude).
    pub east: f64,
}

impl BoundingBox {
    /// The smallest box containing both coordinates.
    #[must_use]
    pub fn from_corners(a: &Coordinate, b: &Coordinate) -> Self {
        Self {
            south: a.lat.min(b.lat),
            west: a.lng.min(b.lng),
            north: a.lat.max(b.lat),
            east: a.lng.max(b.lng),
        }
    }

    /// The smallest box containing every coordinate, or `None` when empty.
    #[must_use]
    pub fn enclosing(coordinates: &[Coordinate]) -> Option<Self> {
        let (first, rest) = coordinates.split_first()?;
        let mut bbox = Self::from_corners(first, first);
        for c in rest {
            bbox.south = bbox.south.min(c.lat);
            bbox.west = bbox.west.min(c.lng);
            bbox.north = bbox.north.max(c.lat);
            bbox.east = bbox.east.max(c.lng);
        }
        Some(bbox)
    }

    /// Grows the box by the given margins in degrees on every side.
    #[must_use]
    pub fn expand(&self, lat_margin: f64, lng_margin: f64) -> Self {
        Self {
            south: self.south - lat_margin,
            west: self.west - lng_margin,
            north: self.north + lat_margin,
            east: self.east + lng_margin,
        }
    }

    /// Returns `true` if the coordinate lies inside or on the edge.
    #[must_use]
    pub fn contains(&self, c: &Coordinate) -> bool {
        (self.south..=self.north).contains(&c.lat) && (self.west..=self.east).contains(&c.lng)
    }
}
