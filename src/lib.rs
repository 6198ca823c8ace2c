#![doc(html_root_url = "https://docs.rs/streamwire/latest")]
//! Per-connection stream sessions for length-delimited binary protocols.
//!
//! A session reassembles a fragmented byte stream into complete frames and
//! serialises outbound buffers from concurrent producers into one ordered
//! write stream, recycling buffers through a pool.
//!
//! - [`frame`]: header layouts and length field encoding.
//! - [`reassembly`]: the carry-over buffer and frame extraction.
//! - [`write`]: single-writer selection and the outbound queue.
//! - [`session`]: the read loop tying both halves to a transport.

pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod pool;
pub mod reassembly;
#[cfg(not(loom))]
pub mod session;
pub mod write;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{
    ConfigError,
    FramingError,
    HandlerError,
    LayoutError,
    ReassemblyError,
    SessionError,
    TransportErrorClass,
    WriteError,
};
pub use frame::{Endianness, HeaderLayout, LengthFormat};
pub use metrics::{Direction, ERRORS_TOTAL, FRAMES_PROCESSED, SESSIONS_ACTIVE};
pub use pool::{BufferPool, PoolStats};
pub use reassembly::{Frame, Message, MessageHandler, Reassembler, handler_fn};
#[cfg(not(loom))]
pub use session::{Session, SessionHandle, SessionId, SessionStats};
