//! Bit-level primitives for the consent string wire format.
//!
//! The format packs fields at fixed bit offsets, big-endian, with bit 0 being
//! the most significant bit of byte 0. Fields routinely straddle byte
//! boundaries, and the encode path patches values into a pre-sized buffer at
//! arbitrary offsets, so a random-access [`BitBuffer`] is used rather than a
//! sequential bit stream.

use num_traits::{PrimInt, Unsigned};
use std::mem::size_of;
use thiserror::Error;

pub mod base64;

/// The error type for [`BitBuffer`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BitBufferError {
    /// A bit index falls outside the buffer.
    #[error("bit index {index} out of range (buffer is {len} bits)")]
    IndexOutOfRange { index: usize, len: usize },
    /// A field width exceeds the capacity of the target integer type.
    #[error("field width {width} exceeds {capacity} bit integer capacity")]
    WidthOverflow { width: usize, capacity: usize },
    /// A value does not fit in the requested field width.
    #[error("value exceeds the maximum representable in {width} bits")]
    ValueOverflow { width: usize },
    /// A letter field width is not a multiple of six bits.
    #[error("letter field width {width} is not a multiple of 6")]
    LetterWidth { width: usize },
    /// A string does not match the letter count of its field.
    #[error("expected {expected} letters, got {found}")]
    LetterCount { expected: usize, found: usize },
    /// A character outside A-Z cannot be six-bit encoded.
    #[error("character {0:?} cannot be encoded as a six-bit letter")]
    InvalidLetter(char),
    /// A timestamp is negative or too large for the decisecond encoding.
    #[error("timestamp {0} out of range for decisecond encoding")]
    TimestampOutOfRange(i64),
}

/// A fixed-size byte buffer addressed as a big-endian bit string.
///
/// Bit `i` lives in byte `i / 8`, at position `7 - i % 8` counted from the
/// most significant bit; a fresh buffer reads all zeroes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BitBuffer {
    bytes: Vec<u8>,
}

impl BitBuffer {
    /// Creates a zero-initialized buffer of `byte_len` bytes.
    pub fn new(byte_len: usize) -> Self {
        Self {
            bytes: vec![0; byte_len],
        }
    }

    /// Wraps an existing byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Number of addressable bits.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn get_bit(&self, index: usize) -> Result<bool, BitBufferError> {
        let byte = self
            .bytes
            .get(index / 8)
            .ok_or(BitBufferError::IndexOutOfRange {
                index,
                len: self.bit_len(),
            })?;
        Ok(byte & (0x80 >> (index % 8)) != 0)
    }

    pub fn set_bit(&mut self, index: usize) -> Result<(), BitBufferError> {
        let len = self.bit_len();
        let byte = self
            .bytes
            .get_mut(index / 8)
            .ok_or(BitBufferError::IndexOutOfRange { index, len })?;
        *byte |= 0x80 >> (index % 8);
        Ok(())
    }

    pub fn clear_bit(&mut self, index: usize) -> Result<(), BitBufferError> {
        let len = self.bit_len();
        let byte = self
            .bytes
            .get_mut(index / 8)
            .ok_or(BitBufferError::IndexOutOfRange { index, len })?;
        *byte &= !(0x80 >> (index % 8));
        Ok(())
    }

    /// Reads `width` bits starting at `start` as a big-endian unsigned
    /// integer, most significant bit first.
    pub fn get_integer<N>(&self, start: usize, width: usize) -> Result<N, BitBufferError>
    where
        N: PrimInt + Unsigned,
    {
        let capacity = size_of::<N>() * 8;
        if width == 0 || width > capacity {
            return Err(BitBufferError::WidthOverflow { width, capacity });
        }

        let mut value = N::zero();
        for i in 0..width {
            value = value << 1;
            if self.get_bit(start + i)? {
                value = value | N::one();
            }
        }
        Ok(value)
    }

    /// Writes the low `width` bits of `value` starting at `start`, most
    /// significant bit first.
    ///
    /// A value larger than `2^width - 1` is rejected, never truncated.
    pub fn set_integer<N>(
        &mut self,
        start: usize,
        width: usize,
        value: N,
    ) -> Result<(), BitBufferError>
    where
        N: PrimInt + Unsigned,
    {
        let capacity = size_of::<N>() * 8;
        if width == 0 || width > capacity {
            return Err(BitBufferError::WidthOverflow { width, capacity });
        }
        if width < capacity {
            let max = (N::one() << width) - N::one();
            if value > max {
                return Err(BitBufferError::ValueOverflow { width });
            }
        }

        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & N::one() == N::one();
            if bit {
                self.set_bit(start + i)?;
            } else {
                self.clear_bit(start + i)?;
            }
        }
        Ok(())
    }

    /// Reads `width / 6` uppercase letters, one 6-bit code per letter,
    /// code 0 mapping to 'A'.
    pub fn get_letters(&self, start: usize, width: usize) -> Result<String, BitBufferError> {
        if width % 6 != 0 {
            return Err(BitBufferError::LetterWidth { width });
        }

        (0..width / 6)
            .map(|i| {
                self.get_integer::<u8>(start + i * 6, 6)
                    .map(|code| (code + b'A') as char)
            })
            .collect()
    }

    /// Writes a string of uppercase letters as consecutive 6-bit codes.
    pub fn set_letters(
        &mut self,
        start: usize,
        width: usize,
        s: &str,
    ) -> Result<(), BitBufferError> {
        if width % 6 != 0 {
            return Err(BitBufferError::LetterWidth { width });
        }
        let expected = width / 6;
        let found = s.chars().count();
        if found != expected {
            return Err(BitBufferError::LetterCount { expected, found });
        }

        for (i, c) in s.chars().enumerate() {
            if !c.is_ascii_uppercase() {
                return Err(BitBufferError::InvalidLetter(c));
            }
            self.set_integer::<u8>(start + i * 6, 6, c as u8 - b'A')?;
        }
        Ok(())
    }

    /// Reads a decisecond timestamp field and returns epoch milliseconds.
    pub fn get_epoch_millis(&self, start: usize, width: usize) -> Result<i64, BitBufferError> {
        let deciseconds = self.get_integer::<u64>(start, width)?;
        i64::try_from(deciseconds)
            .ok()
            .and_then(|ds| ds.checked_mul(100))
            .ok_or(BitBufferError::TimestampOutOfRange(i64::MAX))
    }

    /// Writes epoch milliseconds as a decisecond timestamp field.
    ///
    /// Sub-decisecond precision is floored away; the stored instant is the
    /// truncated one.
    pub fn set_epoch_millis(
        &mut self,
        start: usize,
        width: usize,
        millis: i64,
    ) -> Result<(), BitBufferError> {
        if millis < 0 {
            return Err(BitBufferError::TimestampOutOfRange(millis));
        }
        self.set_integer::<u64>(start, width, millis as u64 / 100)
    }
}
