//! Flexible polyline wire format.
//!
//! Layout: a format version value, a header value, then one signed delta
//! per dimension per vertex. Each value is a little-endian sequence of
//! 5-bit chunks mapped onto a URL-safe base64 alphabet, with bit `0x20`
//! marking "more chunks follow". Signed values are zig-zag encoded and
//! accumulate against the previous vertex.
//!
//! Header bits:
//!
//! | Bits  | Meaning                         |
//! |-------|---------------------------------|
//! | 0-3   | precision (decimal places)      |
//! | 4-6   | third dimension type            |
//! | 7-10  | third dimension precision       |

use commute_risk_geo_models::Coordinate;

use crate::{DecodeError, GeometryError};

/// The only format version this codec reads and writes.
pub const FORMAT_VERSION: u64 = 1;

/// Precision used by most routing providers (five decimal places, ~1 m).
pub const DEFAULT_PRECISION: u32 = 5;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

const INVALID: u8 = 0xFF;

const DECODE_TABLE: [u8; 128] = build_decode_table();

#[allow(clippy::cast_possible_truncation)]
const fn build_decode_table() -> [u8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// What the optional third value of each vertex represents.
///
/// The decoder consumes the third value to keep the stream aligned but
/// discards it; only latitude and longitude are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThirdDimension {
    /// Plain 2D polyline.
    Absent,
    /// Floor level.
    Level,
    /// Height above the ellipsoid.
    Altitude,
    /// Height above mean sea level.
    Elevation,
    /// Provider-defined value.
    Custom1,
    /// Provider-defined value.
    Custom2,
}

impl ThirdDimension {
    /// Maps a header code to a dimension type; codes 4 and 5 are reserved.
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Absent),
            1 => Some(Self::Level),
            2 => Some(Self::Altitude),
            3 => Some(Self::Elevation),
            6 => Some(Self::Custom1),
            7 => Some(Self::Custom2),
            _ => None,
        }
    }

    /// The header code for this dimension type.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Absent => 0,
            Self::Level => 1,
            Self::Altitude => 2,
            Self::Elevation => 3,
            Self::Custom1 => 6,
            Self::Custom2 => 7,
        }
    }

    /// Returns `true` if each vertex carries a third value.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// Decoded polyline header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of decimal places of latitude/longitude.
    pub precision: u32,
    /// Type of the optional third dimension.
    pub third_dimension: ThirdDimension,
    /// Number of decimal places of the third dimension.
    pub third_dimension_precision: u32,
}

impl Header {
    /// Unpacks the header value. Returns `None` for a reserved
    /// third-dimension type.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        let Some(third_dimension) = ThirdDimension::from_code((raw >> 4) & 0x7) else {
            return None;
        };
        Some(Self {
            precision: (raw & 0xF) as u32,
            third_dimension,
            third_dimension_precision: ((raw >> 7) & 0xF) as u32,
        })
    }

    /// Packs the header back into its wire value.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        (self.precision as u64 & 0xF)
            | (self.third_dimension.code() << 4)
            | ((self.third_dimension_precision as u64 & 0xF) << 7)
    }
}

/// Sequential reader of variable-length values.
struct ValueReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ValueReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    const fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn next_unsigned(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0u32;

        loop {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(DecodeError::Truncated { offset: start });
            };
            let value = DECODE_TABLE
                .get(usize::from(byte))
                .copied()
                .filter(|v| *v != INVALID)
                .ok_or(DecodeError::InvalidCharacter {
                    offset: self.pos,
                    byte,
                })?;
            self.pos += 1;

            let chunk = u64::from(value & 0x1F);
            if shift > 60 || (shift == 60 && chunk > 0xF) {
                return Err(DecodeError::Overflow { offset: start });
            }
            result |= chunk << shift;

            if value & 0x20 == 0 {
                return Ok(result);
            }
            shift += 5;
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_signed(&mut self) -> Result<i64, DecodeError> {
        let raw = self.next_unsigned()?;
        // `raw >> 1` always fits in 63 bits.
        let magnitude = (raw >> 1) as i64;
        Ok(if raw & 1 == 1 { !magnitude } else { magnitude })
    }
}

/// Decodes a flexible polyline string into coordinates.
///
/// Runs in a single sequential pass over the input and never indexes past
/// its end. Third-dimension values are consumed and discarded.
///
/// # Errors
///
/// Returns [`DecodeError`] naming the byte offset where the input is
/// malformed: an invalid character, a value cut off mid-stream, a missing
/// coordinate component, an unsupported header, or an out-of-range result.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, DecodeError> {
    decode_with_header(encoded).map(|(_, coordinates)| coordinates)
}

/// Like [`decode`], but also returns the parsed header.
///
/// # Errors
///
/// See [`decode`].
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn decode_with_header(encoded: &str) -> Result<(Header, Vec<Coordinate>), DecodeError> {
    let bytes = encoded.as_bytes();
    let mut reader = ValueReader::new(bytes);
    if reader.is_at_end() {
        return Err(DecodeError::Empty);
    }

    let version = reader.next_unsigned()?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }

    let header_offset = reader.pos;
    let raw_header = reader.next_unsigned()?;
    let header = Header::from_raw(raw_header).ok_or(DecodeError::ReservedThirdDimension {
        offset: header_offset,
        value: (raw_header >> 4) & 0x7,
    })?;

    let divisor = 10f64.powi(header.precision as i32);
    let mut lat = 0i64;
    let mut lng = 0i64;
    let mut coordinates = Vec::with_capacity(bytes.len() / 4);

    while !reader.is_at_end() {
        lat = lat.wrapping_add(reader.next_signed()?);
        lng = lng.wrapping_add(reader.next_signed()?);
        if header.third_dimension.is_present() {
            reader.next_signed()?;
        }

        let coordinate = Coordinate {
            lat: lat as f64 / divisor,
            lng: lng as f64 / divisor,
        };
        if !coordinate.is_valid() {
            return Err(DecodeError::OutOfRange {
                index: coordinates.len(),
                offset: reader.pos,
                lat: coordinate.lat.to_string(),
                lng: coordinate.lng.to_string(),
            });
        }
        coordinates.push(coordinate);
    }

    log::trace!(
        "decoded {} coordinates (precision {}, third dimension {:?})",
        coordinates.len(),
        header.precision,
        header.third_dimension
    );

    Ok((header, coordinates))
}

/// Encodes 2D coordinates as a flexible polyline string.
///
/// Values are rounded half away from zero at the requested precision, so
/// `decode(encode(p))` reproduces `p` to within `0.5 * 10^-precision`.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidPrecision`] if `precision` does not fit
/// in the 4-bit header field.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn encode(coordinates: &[Coordinate], precision: u32) -> Result<String, GeometryError> {
    if precision > 15 {
        return Err(GeometryError::InvalidPrecision(precision));
    }

    let header = Header {
        precision,
        third_dimension: ThirdDimension::Absent,
        third_dimension_precision: 0,
    };
    let factor = 10f64.powi(precision as i32);

    let mut out = String::with_capacity(4 + coordinates.len() * 8);
    push_unsigned(FORMAT_VERSION, &mut out);
    push_unsigned(header.to_raw(), &mut out);

    let mut last_lat = 0i64;
    let mut last_lng = 0i64;
    for c in coordinates {
        let lat = (c.lat * factor).round() as i64;
        let lng = (c.lng * factor).round() as i64;
        push_signed(lat - last_lat, &mut out);
        push_signed(lng - last_lng, &mut out);
        last_lat = lat;
        last_lng = lng;
    }

    Ok(out)
}

#[allow(clippy::cast_sign_loss)]
fn push_signed(value: i64, out: &mut String) {
    push_unsigned(((value << 1) ^ (value >> 63)) as u64, out);
}

#[allow(clippy::cast_possible_truncation)]
fn push_unsigned(mut value: u64, out: &mut String) {
    while value > 0x1F {
        out.push(char::from(ALPHABET[((value & 0x1F) | 0x20) as usize]));
        value >>= 5;
    }
    out.push(char::from(ALPHABET[value as usize]));
}
