//! Byte-level field primitives
//!
//! Extraction and packing of the fixed-width integer and IEEE-11073 float
//! formats used by GATT characteristic values. All multi-byte fields are
//! little-endian. No clamping happens here; range validation is a separate
//! layer in the codec wrapper.

use crate::errors::{CodecError, EncodeError, Result};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// SFLOAT mantissa codings reserved by IEEE 11073-20601 (exponent nibble 0)
const SFLOAT_NAN: u16 = 0x07FF;
const SFLOAT_NRES: u16 = 0x0800;
const SFLOAT_POS_INF: u16 = 0x07FE;
const SFLOAT_NEG_INF: u16 = 0x0802;
const SFLOAT_RESERVED: u16 = 0x0801;

/// FLOAT mantissa codings reserved by IEEE 11073-20601 (exponent byte 0)
const FLOAT_NAN: u32 = 0x7F_FFFF;
const FLOAT_NRES: u32 = 0x80_0000;
const FLOAT_POS_INF: u32 = 0x7F_FFFE;
const FLOAT_NEG_INF: u32 = 0x80_0002;
const FLOAT_RESERVED: u32 = 0x80_0001;

// ----------------------------------------------------------------------------
// Raw Frame Cursor
// ----------------------------------------------------------------------------

/// An immutable byte sequence with a cursor, owned by one parse call.
#[derive(Debug)]
pub struct RawFrame<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> RawFrame<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Current cursor position from the start of the frame
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume `n` bytes, failing with an insufficient-data error on overrun
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::InsufficientData {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Consume everything left in the frame
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.cursor..];
        self.cursor = self.bytes.len();
        slice
    }
}

// ----------------------------------------------------------------------------
// Integer Extraction / Packing
// ----------------------------------------------------------------------------

/// Read an unsigned little-endian integer of `width` bytes (1..=8) at `offset`.
pub fn read_uint(buf: &[u8], offset: usize, width: usize) -> Result<u64> {
    debug_assert!((1..=8).contains(&width));
    let end = offset.saturating_add(width);
    if end > buf.len() {
        return Err(CodecError::InsufficientData {
            needed: end,
            available: buf.len(),
        });
    }
    let mut value = 0u64;
    for (i, b) in buf[offset..end].iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    Ok(value)
}

/// Read a signed (two's complement) little-endian integer of `width` bytes.
pub fn read_int(buf: &[u8], offset: usize, width: usize) -> Result<i64> {
    let raw = read_uint(buf, offset, width)?;
    let shift = 64 - 8 * width as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Pack an unsigned integer into `width` little-endian bytes.
pub fn write_uint(value: u64, width: usize) -> core::result::Result<Vec<u8>, EncodeError> {
    debug_assert!((1..=8).contains(&width));
    if width < 8 && value >= 1u64 << (8 * width) {
        return Err(EncodeError::WidthOverflow {
            value: value as i64,
            width,
        });
    }
    Ok(value.to_le_bytes()[..width].to_vec())
}

/// Pack a signed integer into `width` little-endian bytes.
pub fn write_int(value: i64, width: usize) -> core::result::Result<Vec<u8>, EncodeError> {
    debug_assert!((1..=8).contains(&width));
    if width < 8 {
        let min = -(1i64 << (8 * width - 1));
        let max = (1i64 << (8 * width - 1)) - 1;
        if value < min || value > max {
            return Err(EncodeError::WidthOverflow { value, width });
        }
    }
    Ok(value.to_le_bytes()[..width].to_vec())
}

// ----------------------------------------------------------------------------
// IEEE-11073 SFLOAT (16-bit)
// ----------------------------------------------------------------------------

/// Parse a 16-bit IEEE-11073 SFLOAT: 4-bit signed exponent, 12-bit signed
/// mantissa. NaN and the infinities map to the matching `f64` values; NRes
/// and the reserved coding are rejected.
pub fn parse_sfloat(raw: u16) -> Result<f64> {
    let mantissa_bits = raw & 0x0FFF;
    match mantissa_bits {
        SFLOAT_NAN => return Ok(f64::NAN),
        SFLOAT_POS_INF => return Ok(f64::INFINITY),
        SFLOAT_NEG_INF => return Ok(f64::NEG_INFINITY),
        SFLOAT_NRES | SFLOAT_RESERVED => {
            return Err(CodecError::ReservedFloatCoding(mantissa_bits as u32))
        }
        _ => {}
    }
    let exponent = ((raw as i16) >> 12) as i32;
    let mantissa = ((mantissa_bits << 4) as i16 >> 4) as f64;
    Ok(mantissa * 10f64.powi(exponent))
}

/// Pack a value as a 16-bit IEEE-11073 SFLOAT.
pub fn pack_sfloat(value: f64) -> core::result::Result<u16, EncodeError> {
    if value.is_nan() {
        return Ok(SFLOAT_NAN);
    }
    if value == f64::INFINITY {
        return Ok(SFLOAT_POS_INF);
    }
    if value == f64::NEG_INFINITY {
        return Ok(SFLOAT_NEG_INF);
    }
    // Mantissa range excludes the reserved codings at exponent 0.
    let (mantissa, exponent) = scale_to_mantissa(value, 2045.0, -8, 7)
        .ok_or(EncodeError::FloatUnrepresentable(value, "SFLOAT"))?;
    Ok(((exponent as u16) << 12) | (mantissa as u16 & 0x0FFF))
}

// ----------------------------------------------------------------------------
// IEEE-11073 FLOAT (32-bit)
// ----------------------------------------------------------------------------

/// Parse a 32-bit IEEE-11073 FLOAT: 8-bit signed exponent, 24-bit signed
/// mantissa.
pub fn parse_float(raw: u32) -> Result<f64> {
    let mantissa_bits = raw & 0x00FF_FFFF;
    match mantissa_bits {
        FLOAT_NAN => return Ok(f64::NAN),
        FLOAT_POS_INF => return Ok(f64::INFINITY),
        FLOAT_NEG_INF => return Ok(f64::NEG_INFINITY),
        FLOAT_NRES | FLOAT_RESERVED => return Err(CodecError::ReservedFloatCoding(mantissa_bits)),
        _ => {}
    }
    let exponent = (raw as i32) >> 24;
    let mantissa = ((mantissa_bits << 8) as i32 >> 8) as f64;
    Ok(mantissa * 10f64.powi(exponent))
}

/// Pack a value as a 32-bit IEEE-11073 FLOAT.
pub fn pack_float(value: f64) -> core::result::Result<u32, EncodeError> {
    if value.is_nan() {
        return Ok(FLOAT_NAN);
    }
    if value == f64::INFINITY {
        return Ok(FLOAT_POS_INF);
    }
    if value == f64::NEG_INFINITY {
        return Ok(FLOAT_NEG_INF);
    }
    let (mantissa, exponent) = scale_to_mantissa(value, 8_388_605.0, -128, 127)
        .ok_or(EncodeError::FloatUnrepresentable(value, "FLOAT"))?;
    Ok(((exponent as u32) << 24) | (mantissa as u32 & 0x00FF_FFFF))
}

/// Find (mantissa, exponent) with `value == mantissa * 10^exponent`,
/// |mantissa| <= limit and exponent within the signed field range.
fn scale_to_mantissa(value: f64, limit: f64, exp_min: i32, exp_max: i32) -> Option<(i64, i64)> {
    let mut exponent = 0i32;
    let mut scaled = value;

    // Shrink values too large for the mantissa.
    while scaled.abs() > limit {
        scaled /= 10.0;
        exponent += 1;
        if exponent > exp_max {
            return None;
        }
    }
    // Grow precision for fractional values while the mantissa still fits.
    while scaled.fract().abs() > 1e-9 && scaled.abs() * 10.0 <= limit && exponent > exp_min {
        scaled *= 10.0;
        exponent -= 1;
    }
    let mantissa = scaled.round();
    if (mantissa - scaled).abs() > 1e-6 {
        return None;
    }
    Some((mantissa as i64, exponent as i64))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
