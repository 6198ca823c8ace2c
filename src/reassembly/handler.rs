//! Message handler seam and the borrowed message view handed to it.

use crate::error::HandlerError;

/// One complete, contiguous frame borrowed from the reassembly engine.
///
/// The bytes are only valid for the duration of the handler call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message<'a> {
    bytes: &'a [u8],
    header_len: usize,
}

impl<'a> Message<'a> {
    pub(crate) fn new(bytes: &'a [u8], header_len: usize) -> Self { Self { bytes, header_len } }

    /// The whole frame, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] { self.bytes }

    /// The fixed-size header.
    #[must_use]
    pub fn header(&self) -> &'a [u8] { &self.bytes[..self.header_len] }

    /// Everything after the header.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] { &self.bytes[self.header_len..] }

    /// Total frame length.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Frames are never empty; provided for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
}

/// Receives complete messages in stream order.
pub trait MessageHandler {
    /// Handle one complete message.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the session that delivered the message.
    fn on_message(&mut self, message: Message<'_>) -> Result<(), HandlerError>;
}

impl<H: MessageHandler + ?Sized> MessageHandler for &mut H {
    fn on_message(&mut self, message: Message<'_>) -> Result<(), HandlerError> {
        (**self).on_message(message)
    }
}

impl<H: MessageHandler + ?Sized> MessageHandler for Box<H> {
    fn on_message(&mut self, message: Message<'_>) -> Result<(), HandlerError> {
        (**self).on_message(message)
    }
}

/// Handler built from a closure by [`handler_fn`].
#[derive(Clone, Debug)]
pub struct HandlerFn<F>(F);

/// Wrap a closure as a [`MessageHandler`].
///
/// ```
/// use streamwire::reassembly::{Message, handler_fn};
///
/// let mut count = 0usize;
/// let _handler = handler_fn(|_message: Message<'_>| {
///     count += 1;
///     Ok(())
/// });
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: FnMut(Message<'_>) -> Result<(), HandlerError>,
{
    HandlerFn(f)
}

impl<F> MessageHandler for HandlerFn<F>
where
    F: FnMut(Message<'_>) -> Result<(), HandlerError>,
{
    fn on_message(&mut self, message: Message<'_>) -> Result<(), HandlerError> { (self.0)(message) }
}
