#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route geometry handling for routing-provider polylines.
//!
//! Routing providers deliver geometry in the flexible polyline format: a
//! URL-safe base64 stream of variable-length, zig-zag, delta-encoded
//! integers with a small header describing precision and an optional
//! third dimension. This crate turns that stream into [`Coordinate`]s and
//! then bounds its size for downstream spatial work:
//!
//! - [`decode`] / [`encode`] convert between the wire string and coordinates.
//! - [`sample_polyline_by_distance`] places evenly spaced waypoints along a
//!   long route (one weather lookup every `interval_km` instead of one per
//!   vertex).
//! - [`simplify`] drops vertices that do not materially change the shape.

pub mod codec;
pub mod sample;
pub mod simplify;

pub use codec::{
    DEFAULT_PRECISION, FORMAT_VERSION, Header, ThirdDimension, decode, decode_with_header, encode,
};
pub use commute_risk_geo_models::Coordinate;
pub use sample::{DEFAULT_SAMPLE_INTERVAL_KM, sample_polyline_by_distance};
pub use simplify::{DEFAULT_TOLERANCE_KM, simplify};

/// Errors produced while decoding a polyline string.
///
/// Every variant names the byte offset at which decoding stopped, so the
/// caller can report exactly where provider data went wrong. Decoding never
/// returns a partial coordinate list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the first header value.
    #[error("polyline is empty")]
    Empty,

    /// A byte outside the URL-safe base64 alphabet.
    #[error("invalid character {byte:#04x} at byte offset {offset}")]
    InvalidCharacter {
        /// Offset of the offending byte.
        offset: usize,
        /// The offending byte.
        byte: u8,
    },

    /// The stream ended in the middle of a value, or before a coordinate's
    /// remaining components.
    #[error("polyline truncated: value starting at byte offset {offset} is incomplete")]
    Truncated {
        /// Offset at which the incomplete value starts.
        offset: usize,
    },

    /// The format version is not one this decoder understands.
    #[error("unsupported polyline format version {version}")]
    UnsupportedVersion {
        /// The version found in the header.
        version: u64,
    },

    /// The header names a reserved third-dimension type.
    #[error("reserved third dimension type {value} in header at byte offset {offset}")]
    ReservedThirdDimension {
        /// Offset of the header value.
        offset: usize,
        /// The reserved type code.
        value: u64,
    },

    /// A value has more continuation chunks than fit in 64 bits.
    #[error("value starting at byte offset {offset} overflows 64 bits")]
    Overflow {
        /// Offset at which the oversized value starts.
        offset: usize,
    },

    /// A decoded coordinate lies outside the valid WGS84 range.
    #[error("decoded coordinate #{index} ({lat}, {lng}) is out of range (value ending at byte offset {offset})")]
    OutOfRange {
        /// Index of the coordinate in the decoded list.
        index: usize,
        /// Offset just past the coordinate's last value.
        offset: usize,
        /// Decoded latitude, formatted.
        lat: String,
        /// Decoded longitude, formatted.
        lng: String,
    },
}

/// Errors from geometry operations with invalid parameters.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Resampling interval must be a positive, finite number of kilometres.
    #[error("sample interval must be positive and finite, got {0} km")]
    InvalidInterval(f64),

    /// Simplification tolerance must be non-negative and finite.
    #[error("simplify tolerance must be non-negative and finite, got {0} km")]
    InvalidTolerance(f64),

    /// Encoding precision above 15 cannot be expressed in the header.
    #[error("precision {0} exceeds the maximum of 15")]
    InvalidPrecision(u32),
}
