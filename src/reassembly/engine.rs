//! Carry-over buffer and frame extraction.

use std::iter::FusedIterator;

use bytes::{Bytes, BytesMut};

use super::handler::{Message, MessageHandler};
use crate::{
    config::{SessionConfig, check_frame_cap},
    error::{ConfigError, FramingError, ReassemblyError},
    frame::HeaderLayout,
};

/// A complete frame split off the carry-over buffer.
///
/// Splitting does not copy; the frame shares the engine's allocation until it
/// is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    header_len: usize,
}

impl Frame {
    /// Borrow the frame as a [`Message`].
    #[must_use]
    pub fn as_message(&self) -> Message<'_> { Message::new(&self.bytes, self.header_len) }

    /// The whole frame, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    #[must_use]
    pub fn header(&self) -> &[u8] { &self.bytes[..self.header_len] }

    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.bytes[self.header_len..] }

    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Consume the frame, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.bytes }
}

/// Reassembles length-delimited frames from arbitrarily fragmented chunks.
///
/// After every extraction pass the carry-over holds either nothing or the
/// unconsumed prefix of the next frame: fewer than `header_len` bytes, or a
/// complete header whose declared frame has not fully arrived.
#[derive(Debug)]
pub struct Reassembler {
    layout: HeaderLayout,
    max_frame_len: usize,
    carry: BytesMut,
}

impl Reassembler {
    /// Create an engine decoding `layout` headers and rejecting frames longer
    /// than `max_frame_len` bytes.
    ///
    /// A cap above the largest length the field can declare is accepted; the
    /// field's range then bounds the carry-over instead.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Layout`] for a malformed layout and
    /// [`ConfigError::FrameCapBelowHeader`] if `max_frame_len` cannot hold a
    /// header.
    pub fn new(layout: HeaderLayout, max_frame_len: usize) -> Result<Self, ConfigError> {
        check_frame_cap(&layout, max_frame_len)?;
        Ok(Self::unchecked(layout, max_frame_len))
    }

    /// Engine for an already validated session configuration.
    #[cfg(not(loom))]
    pub(crate) fn for_config(config: &SessionConfig) -> Self {
        Self::unchecked(config.layout(), config.max_frame_len())
    }

    fn unchecked(layout: HeaderLayout, max_frame_len: usize) -> Self {
        Self {
            layout,
            max_frame_len,
            carry: BytesMut::new(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &HeaderLayout { &self.layout }

    #[must_use]
    pub fn max_frame_len(&self) -> usize { self.max_frame_len }

    /// Bytes received but not yet part of a delivered frame.
    #[must_use]
    pub fn carry_over_len(&self) -> usize { self.carry.len() }

    /// Returns `true` when no partial frame is buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.carry.is_empty() }

    /// Discard any buffered partial frame.
    pub fn reset(&mut self) { self.carry.clear(); }

    /// Append a newly received chunk behind the carry-over.
    pub fn extend(&mut self, chunk: &[u8]) { self.carry.extend_from_slice(chunk); }

    /// Split the next complete frame off the carry-over.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Length violations are
    /// reported as soon as the header is complete, without waiting for the
    /// payload; the buffered bytes are discarded because the stream is no
    /// longer aligned on frame boundaries.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the header declares a length below the
    /// header size (including zero) or above the frame cap.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        let Some(declared) = self.layout.declared_len(&self.carry) else {
            return Ok(None);
        };
        let frame_len = match self.check_declared(declared) {
            Ok(len) => len,
            Err(err) => {
                self.carry.clear();
                return Err(err);
            }
        };
        if self.carry.len() < frame_len {
            self.carry.reserve(frame_len - self.carry.len());
            return Ok(None);
        }
        let bytes = self.carry.split_to(frame_len).freeze();
        Ok(Some(Frame {
            bytes,
            header_len: self.layout.header_len,
        }))
    }

    /// Append `chunk` and lazily yield the frames it completes.
    ///
    /// The iterator ends when the carry-over no longer holds a complete frame,
    /// or right after yielding an error.
    pub fn frames(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.extend(chunk);
        Frames {
            engine: self,
            failed: false,
        }
    }

    /// Append `chunk` and hand every completed frame to `handler`, in order.
    ///
    /// Returns the number of messages delivered.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::Framing`] on a length violation and
    /// [`ReassemblyError::Handler`] if the handler rejects a message. Messages
    /// preceding the failure have already been delivered.
    pub fn feed<H>(&mut self, chunk: &[u8], handler: &mut H) -> Result<usize, ReassemblyError>
    where
        H: MessageHandler + ?Sized,
    {
        self.extend(chunk);
        let mut delivered = 0;
        while let Some(frame) = self.next_frame()? {
            handler
                .on_message(frame.as_message())
                .map_err(ReassemblyError::Handler)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn check_declared(&self, declared: u64) -> Result<usize, FramingError> {
        if declared == 0 {
            return Err(FramingError::EmptyFrame);
        }
        let oversized = FramingError::OversizedFrame {
            size: declared,
            max: self.max_frame_len,
        };
        let len = usize::try_from(declared).map_err(|_| oversized.clone())?;
        if len < self.layout.header_len {
            return Err(FramingError::Undersized {
                declared,
                header_len: self.layout.header_len,
            });
        }
        if len > self.max_frame_len {
            return Err(oversized);
        }
        Ok(len)
    }
}

/// Iterator over the frames completed by one chunk.
///
/// Created by [`Reassembler::frames`].
#[derive(Debug)]
pub struct Frames<'a> {
    engine: &'a mut Reassembler,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.engine.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Frames<'_> {}
