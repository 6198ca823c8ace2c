//! Fixed-size frame header layouts.
//!
//! Every frame starts with a header of `header_len` bytes. Somewhere inside
//! that header sits a length field declaring the total size of the frame,
//! header included. The position, width and byte order of the field are
//! configurable so the same reassembly engine can speak different wire
//! protocols.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use super::format::LengthFormat;
use crate::error::LayoutError;

/// Placement of the total-length field inside a fixed-size header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLayout {
    /// Size of the whole header in bytes.
    pub header_len: usize,
    /// Offset of the length field from the start of the header.
    pub length_offset: usize,
    /// Width and byte order of the length field.
    pub length: LengthFormat,
}

impl HeaderLayout {
    /// Creates a layout, checking that the length field fits in the header.
    ///
    /// # Panics
    ///
    /// Panics if the length field would extend past `header_len`.
    #[must_use]
    pub const fn new(header_len: usize, length_offset: usize, length: LengthFormat) -> Self {
        assert!(
            length_offset + length.bytes <= header_len,
            "length field exceeds header"
        );
        Self {
            header_len,
            length_offset,
            length,
        }
    }

    /// Fallible constructor.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] if the width is unsupported or the field
    /// does not fit inside the header.
    pub fn try_new(
        header_len: usize,
        length_offset: usize,
        length: LengthFormat,
    ) -> Result<Self, LayoutError> {
        let layout = Self {
            header_len,
            length_offset,
            length,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Header consisting solely of the length field.
    #[must_use]
    pub const fn prefix(length: LengthFormat) -> Self { Self::new(length.bytes, 0, length) }

    /// 2-byte big-endian total-length prefix.
    #[must_use]
    pub const fn u16_be() -> Self { Self::prefix(LengthFormat::u16_be()) }

    /// 4-byte big-endian total-length prefix.
    #[must_use]
    pub const fn u32_be() -> Self { Self::prefix(LengthFormat::u32_be()) }

    /// OpenFlow-style 8-byte header: version, type, 16-bit big-endian
    /// length at offset 2, then a 32-bit transaction id.
    #[must_use]
    pub const fn openflow() -> Self { Self::new(8, 2, LengthFormat::u16_be()) }

    /// Check a layout that may have been built field by field.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), LayoutError> {
        self.length.validate()?;
        match self.length_offset.checked_add(self.length.bytes) {
            Some(end) if end <= self.header_len => Ok(()),
            _ => Err(LayoutError::FieldOutOfBounds {
                offset: self.length_offset,
                width: self.length.bytes,
                header_len: self.header_len,
            }),
        }
    }

    /// Largest total frame length the length field can declare.
    #[must_use]
    pub fn max_declarable(&self) -> u64 { self.length.max_value() }

    /// Read the declared total frame length from the start of `src`.
    ///
    /// Returns `None` while fewer than `header_len` bytes are available.
    #[must_use]
    pub fn declared_len(&self, src: &[u8]) -> Option<u64> {
        if src.len() < self.header_len {
            return None;
        }
        let field = src.get(self.length_offset..self.length_offset + self.length.bytes)?;
        self.length.read(field)
    }

    /// Append a header declaring `frame_len` total bytes to `dst`.
    ///
    /// Bytes outside the length field are zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::LengthOverflow`] if `frame_len` cannot be
    /// represented by the length field, or the error from
    /// [`validate`](Self::validate) for a malformed layout.
    pub fn write_header(&self, frame_len: usize, dst: &mut BytesMut) -> Result<(), LayoutError> {
        self.validate()?;
        let start = dst.len();
        dst.put_bytes(0, self.header_len);
        let field = &mut dst[start + self.length_offset..start + self.length_offset + self.length.bytes];
        if let Err(err) = self.length.write(frame_len, field) {
            dst.truncate(start);
            return Err(err);
        }
        Ok(())
    }

    /// Append a complete frame carrying `payload` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::LengthOverflow`] if the frame is too long for
    /// the length field, or a layout error if the layout is malformed.
    pub fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), LayoutError> {
        let frame_len = self
            .header_len
            .checked_add(payload.len())
            .ok_or(LayoutError::LengthOverflow {
                len: usize::MAX,
                width: self.length.bytes,
            })?;
        dst.reserve(frame_len);
        self.write_header(frame_len, dst)?;
        dst.extend_from_slice(payload);
        Ok(())
    }
}

impl Default for HeaderLayout {
    fn default() -> Self { Self::u32_be() }
}
