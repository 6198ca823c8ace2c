//! Error taxonomy for the stream session.
//!
//! Errors are grouped by origin so the session can decide a connection's
//! fate from the variant alone:
//!
//! - [`LayoutError`] and [`ConfigError`]: rejected configuration, raised before
//!   any I/O happens.
//! - [`FramingError`]: wire-level protocol violations detected by the reassembly
//!   engine. Always terminal for the session.
//! - [`WriteError`]: outbound failures surfaced by the write scheduler.
//! - [`SessionError`]: the single cause reported when a session ends abnormally.
//!
//! Transport errors stay as [`std::io::Error`] and are sorted into
//! [`TransportErrorClass`] buckets by [`classify_io_error`].

use std::{io, time::Duration};

use thiserror::Error;

/// Boxed error returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid header layout or length field configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// Length fields must be 1, 2, 4 or 8 bytes wide.
    #[error("unsupported length field width: {0} bytes")]
    UnsupportedWidth(usize),

    /// The length field does not fit inside the header.
    #[error("length field at offset {offset} ({width} bytes) exceeds the {header_len}-byte header")]
    FieldOutOfBounds {
        offset: usize,
        width: usize,
        header_len: usize,
    },

    /// A frame length cannot be represented by the length field.
    #[error("frame length {len} does not fit in a {width}-byte length field")]
    LengthOverflow { len: usize, width: usize },
}

/// Rejected [`SessionConfig`](crate::config::SessionConfig) values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The frame cap cannot hold even a bare header.
    #[error("max frame length {max} is smaller than the {header_len}-byte header")]
    FrameCapBelowHeader { max: usize, header_len: usize },

    /// The frame cap is larger than the length field can ever declare.
    #[error("max frame length {max} exceeds the largest declarable length {declarable}")]
    FrameCapBeyondField { max: usize, declarable: u64 },

    #[error("receive buffer size must be non-zero")]
    ZeroReceiveBuffer,

    #[error("outbound queue limit must be non-zero")]
    ZeroQueueLimit,
}

/// Wire-level framing violations.
///
/// A framing error means the byte stream can no longer be trusted to be
/// aligned on frame boundaries, so the session is torn down.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A header declared a total length of zero.
    #[error("empty frame not permitted")]
    EmptyFrame,

    /// A header declared a total length shorter than the header itself.
    #[error("declared frame length {declared} is shorter than the {header_len}-byte header")]
    Undersized { declared: u64, header_len: usize },

    /// A header declared a total length beyond the configured cap.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame { size: u64, max: usize },
}

/// Failure raised while feeding a chunk through the reassembly engine.
#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The message handler rejected a complete message.
    #[error("message handler failed: {0}")]
    Handler(HandlerError),
}

/// Outbound failures reported by the write scheduler.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The session is closing and no longer accepts buffers.
    #[error("session is closing; buffer rejected")]
    Closed,

    /// The outbound queue reached its configured limit.
    #[error("outbound queue full ({limit} buffers waiting)")]
    QueueFull { limit: usize },

    /// An encoded frame would exceed the session's frame cap.
    #[error("outbound frame of {size} bytes exceeds max length {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The transport failed while transmitting a buffer.
    #[error("transmission failed: {0}")]
    Io(#[from] io::Error),

    /// A transmission did not complete within the write deadline.
    #[error("transmission did not complete within {0:?}")]
    Timeout(Duration),
}

/// Single cause reported when a session ends abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unexpected transport failure while reading.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("message handler failed: {0}")]
    Handler(HandlerError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    /// No bytes arrived within the read deadline.
    #[error("no data received within {0:?}")]
    ReadTimeout(Duration),

    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed with {pending} bytes of an incomplete frame buffered")]
    TruncatedFrame { pending: usize },
}

impl From<ReassemblyError> for SessionError {
    fn from(error: ReassemblyError) -> Self {
        match error {
            ReassemblyError::Framing(err) => Self::Framing(err),
            ReassemblyError::Handler(err) => Self::Handler(err),
        }
    }
}

impl SessionError {
    /// Short label used for metrics and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Framing(_) => "framing",
            Self::Handler(_) => "handler",
            Self::Write(_) => "write",
            Self::ReadTimeout(_) => "read_timeout",
            Self::TruncatedFrame { .. } => "truncated_frame",
        }
    }
}

/// How a transport error affects the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorClass {
    /// The peer went away; stop reading without reporting a failure.
    Closed,
    /// Retry the operation.
    Transient,
    /// Log and tear the session down.
    Fatal,
}

/// Sort an I/O error into a [`TransportErrorClass`].
#[must_use]
pub fn classify_io_error(error: &io::Error) -> TransportErrorClass {
    match error.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportErrorClass::Closed,
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => TransportErrorClass::Transient,
        _ => TransportErrorClass::Fatal,
    }
}
