//! Conversion between register bytes and numbers.
//!
//! A single register is a big-endian 16-bit quantity. A "long" spans two
//! consecutive registers and is read as a 32-bit integer whose byte order is
//! chosen by [`ByteOrder`]. Both forms support fixed-point scaling by
//! `10^decimals`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("Value {value} out of range for {format}")]
    ValueOutOfRange { value: f64, format: NumberFormat },

    #[error("Cannot unpack {buffer:02X?} as {format}: expected {} bytes, got {}", .format.width.byte_len(), .buffer.len())]
    BufferLength { buffer: Vec<u8>, format: NumberFormat },

    #[error("Byte swap needs an even-length buffer, got {0:02X?}")]
    OddLength(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Short,
    Long,
}

impl Width {
    pub fn byte_len(self) -> usize {
        match self {
            Width::Short => 2,
            Width::Long => 4,
        }
    }

    fn bits(self) -> u32 {
        match self {
            Width::Short => 16,
            Width::Long => 32,
        }
    }
}

/// The packing format attempted by a conversion, carried by [`CodecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub endian: Endian,
    pub width: Width,
    pub signed: bool,
}

impl NumberFormat {
    pub fn short(endian: Endian, signed: bool) -> Self {
        Self { endian, width: Width::Short, signed }
    }

    pub fn long(endian: Endian, signed: bool) -> Self {
        Self { endian, width: Width::Long, signed }
    }

    fn range(&self) -> (i64, i64) {
        let bits = self.width.bits();
        if self.signed {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        }
    }

    fn unpack(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        let wrong_length = || CodecError::BufferLength {
            buffer: bytes.to_vec(),
            format: *self,
        };

        let value = match self.width {
            Width::Short => {
                let raw: [u8; 2] = bytes.try_into().map_err(|_| wrong_length())?;
                let unsigned = match self.endian {
                    Endian::Big => u16::from_be_bytes(raw),
                    Endian::Little => u16::from_le_bytes(raw),
                };
                if self.signed { unsigned as i16 as i64 } else { unsigned as i64 }
            }
            Width::Long => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| wrong_length())?;
                let unsigned = match self.endian {
                    Endian::Big => u32::from_be_bytes(raw),
                    Endian::Little => u32::from_le_bytes(raw),
                };
                if self.signed { unsigned as i32 as i64 } else { unsigned as i64 }
            }
        };
        Ok(value)
    }

    /// Truncates `value` toward zero and packs it, rejecting anything the
    /// format cannot represent.
    fn pack(&self, value: f64) -> Result<Vec<u8>, CodecError> {
        let out_of_range = || CodecError::ValueOutOfRange { value, format: *self };

        if !value.is_finite() {
            return Err(out_of_range());
        }
        let truncated = value.trunc();
        let (min, max) = self.range();
        if truncated < min as f64 || truncated > max as f64 {
            return Err(out_of_range());
        }
        let integer = truncated as i64;

        let bytes = match (self.width, self.endian) {
            (Width::Short, Endian::Big) => (integer as u16).to_be_bytes().to_vec(),
            (Width::Short, Endian::Little) => (integer as u16).to_le_bytes().to_vec(),
            (Width::Long, Endian::Big) => (integer as u32).to_be_bytes().to_vec(),
            (Width::Long, Endian::Little) => (integer as u32).to_le_bytes().to_vec(),
        };
        Ok(bytes)
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endian = match self.endian {
            Endian::Big => "big-endian",
            Endian::Little => "little-endian",
        };
        let sign = if self.signed { 'i' } else { 'u' };
        write!(f, "{} {}{}", endian, sign, self.width.bits())
    }
}

/// How two registers are reassembled into a 32-bit value.
///
/// The `*Swap` variants exchange the bytes of every pair before the
/// endian-aware unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
    BigSwap,
    LittleSwap,
}

impl ByteOrder {
    pub fn endian(self) -> Endian {
        match self {
            ByteOrder::Big | ByteOrder::BigSwap => Endian::Big,
            ByteOrder::Little | ByteOrder::LittleSwap => Endian::Little,
        }
    }

    pub fn is_swapped(self) -> bool {
        matches!(self, ByteOrder::BigSwap | ByteOrder::LittleSwap)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ByteOrder::Big => "big",
            ByteOrder::Little => "little",
            ByteOrder::BigSwap => "big-swap",
            ByteOrder::LittleSwap => "little-swap",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown byte order '{0}', expected big, little, big-swap or little-swap")]
pub struct ParseByteOrderError(String);

impl FromStr for ByteOrder {
    type Err = ParseByteOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "big" => Ok(ByteOrder::Big),
            "little" => Ok(ByteOrder::Little),
            "big-swap" | "big_swap" => Ok(ByteOrder::BigSwap),
            "little-swap" | "little_swap" => Ok(ByteOrder::LittleSwap),
            _ => Err(ParseByteOrderError(s.to_string())),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded reading: the raw integer when no decimals are requested,
/// otherwise the scaled fixed-point value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Integer(i64),
    Float(f64),
}

impl NumericValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            NumericValue::Integer(v) => v as f64,
            NumericValue::Float(v) => v,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            NumericValue::Integer(v) => Some(v),
            NumericValue::Float(_) => None,
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Integer(v) => write!(f, "{}", v),
            NumericValue::Float(v) => write!(f, "{}", v),
        }
    }
}

fn scale_down(raw: i64, decimals: u8) -> NumericValue {
    if decimals == 0 {
        return NumericValue::Integer(raw);
    }
    NumericValue::Float(raw as f64 / 10f64.powi(decimals as i32))
}

fn scale_up(value: f64, decimals: u8) -> f64 {
    value * 10f64.powi(decimals as i32)
}

/// Decodes one big-endian register.
pub fn decode_register(bytes: &[u8], decimals: u8, signed: bool) -> Result<NumericValue, CodecError> {
    let raw = NumberFormat::short(Endian::Big, signed).unpack(bytes)?;
    Ok(scale_down(raw, decimals))
}

/// Encodes `value` into one register, big-endian unless `lsb_first`.
pub fn encode_register(value: f64, decimals: u8, signed: bool, lsb_first: bool) -> Result<[u8; 2], CodecError> {
    let endian = if lsb_first { Endian::Little } else { Endian::Big };
    let packed = NumberFormat::short(endian, signed).pack(scale_up(value, decimals))?;
    Ok([packed[0], packed[1]])
}

/// Decodes two consecutive registers as a 32-bit integer.
pub fn decode_long(
    bytes: &[u8],
    signed: bool,
    byte_order: ByteOrder,
    decimals: u8,
) -> Result<NumericValue, CodecError> {
    let format = NumberFormat::long(byte_order.endian(), signed);
    let raw = if byte_order.is_swapped() {
        format.unpack(&swap_pairs(bytes)?)?
    } else {
        format.unpack(bytes)?
    };
    Ok(scale_down(raw, decimals))
}

pub fn encode_long(
    value: f64,
    signed: bool,
    byte_order: ByteOrder,
    decimals: u8,
) -> Result<[u8; 4], CodecError> {
    let format = NumberFormat::long(byte_order.endian(), signed);
    let mut packed = format.pack(scale_up(value, decimals))?;
    if byte_order.is_swapped() {
        packed = swap_pairs(&packed)?;
    }
    Ok([packed[0], packed[1], packed[2], packed[3]])
}

/// Exchanges the bytes of every adjacent pair.
pub fn swap_pairs(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.to_vec()));
    }
    Ok(bytes.chunks_exact(2).flat_map(|pair| [pair[1], pair[0]]).collect())
}
