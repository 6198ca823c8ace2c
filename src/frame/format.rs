//! Length field formatting options.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Byte order used for encoding and decoding length fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

/// Width and byte order of the length field inside a frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthFormat {
    pub bytes: usize,
    pub endianness: Endianness,
}

impl LengthFormat {
    /// Creates a new `LengthFormat` with the specified width and byte order.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not one of `1`, `2`, `4` or `8`.
    #[must_use]
    pub const fn new(bytes: usize, endianness: Endianness) -> Self {
        assert!(matches!(bytes, 1 | 2 | 4 | 8), "invalid length field width");
        Self { bytes, endianness }
    }

    /// Fallible constructor validating the field width.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnsupportedWidth`] if `bytes` is not one of
    /// `1`, `2`, `4` or `8`.
    pub fn try_new(bytes: usize, endianness: Endianness) -> Result<Self, LayoutError> {
        let format = Self { bytes, endianness };
        format.validate()?;
        Ok(format)
    }

    /// 2-byte big-endian length field.
    #[must_use]
    pub const fn u16_be() -> Self { Self::new(2, Endianness::Big) }

    /// 2-byte little-endian length field.
    #[must_use]
    pub const fn u16_le() -> Self { Self::new(2, Endianness::Little) }

    /// 4-byte big-endian length field.
    #[must_use]
    pub const fn u32_be() -> Self { Self::new(4, Endianness::Big) }

    /// 4-byte little-endian length field.
    #[must_use]
    pub const fn u32_le() -> Self { Self::new(4, Endianness::Little) }

    /// Check the width, which may be arbitrary after deserialisation.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnsupportedWidth`] for widths other than
    /// `1`, `2`, `4` or `8`.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if matches!(self.bytes, 1 | 2 | 4 | 8) {
            Ok(())
        } else {
            Err(LayoutError::UnsupportedWidth(self.bytes))
        }
    }

    /// Largest value the field can carry.
    #[must_use]
    pub fn max_value(&self) -> u64 {
        if self.bytes >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.bytes)) - 1
        }
    }

    /// Decode the field from exactly `self.bytes` bytes.
    ///
    /// Returns `None` when `field` has the wrong length.
    #[must_use]
    pub fn read(&self, field: &[u8]) -> Option<u64> {
        if field.len() != self.bytes || self.bytes > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        let value = match self.endianness {
            Endianness::Big => {
                buf[8 - self.bytes..].copy_from_slice(field);
                u64::from_be_bytes(buf)
            }
            Endianness::Little => {
                buf[..self.bytes].copy_from_slice(field);
                u64::from_le_bytes(buf)
            }
        };
        Some(value)
    }

    /// Encode `value` into `field`, which must be exactly `self.bytes` long.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::LengthOverflow`] if `value` does not fit the
    /// field and [`LayoutError::UnsupportedWidth`] if `field` has the wrong
    /// length.
    pub fn write(&self, value: usize, field: &mut [u8]) -> Result<(), LayoutError> {
        self.validate()?;
        if field.len() != self.bytes {
            return Err(LayoutError::UnsupportedWidth(field.len()));
        }
        let wide = u64::try_from(value).map_err(|_| self.overflow(value))?;
        if wide > self.max_value() {
            return Err(self.overflow(value));
        }
        match self.endianness {
            Endianness::Big => field.copy_from_slice(&wide.to_be_bytes()[8 - self.bytes..]),
            Endianness::Little => field.copy_from_slice(&wide.to_le_bytes()[..self.bytes]),
        }
        Ok(())
    }

    fn overflow(&self, len: usize) -> LayoutError {
        LayoutError::LengthOverflow {
            len,
            width: self.bytes,
        }
    }
}

impl Default for LengthFormat {
    fn default() -> Self { Self::u32_be() }
}
