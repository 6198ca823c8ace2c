//! Inbound reassembly of length-delimited messages.
//!
//! The transport delivers bytes in chunks whose boundaries have nothing to do
//! with message boundaries: one chunk may hold several messages, a fraction
//! of one, or end in the middle of a header. [`Reassembler`] keeps the bytes
//! that do not yet form a complete frame in a carry-over buffer and emits each
//! frame exactly once, in stream order, byte-identical to what the peer sent
//! regardless of how the stream was fragmented.

mod engine;
mod handler;

pub use engine::{Frame, Frames, Reassembler};
pub use handler::{HandlerFn, Message, MessageHandler, handler_fn};

#[cfg(test)]
mod tests;
