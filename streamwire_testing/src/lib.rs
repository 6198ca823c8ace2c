//! Test helpers for `streamwire` sessions.
//!
//! - [`ScriptedTransport`] replays chosen read outcomes and records writes.
//! - [`encode_frames`] and [`split_at_cuts`] build fragmented inbound streams.
//! - [`LoggerHandle`] serialises access to the global log capture.
//!
//! ```rust
//! use streamwire::HeaderLayout;
//! use streamwire_testing::{ScriptedTransport, encode_frames, split_at_cuts};
//!
//! let wire = encode_frames(HeaderLayout::u16_be(), &[&b"AB"[..], &b"CDE"[..]]);
//! let transport = ScriptedTransport::from_chunks(split_at_cuts(&wire, &[3, 7]));
//! # let _ = transport;
//! ```

pub mod frames;
pub mod logging;
pub mod transport;

pub use frames::{chunked, decode_payloads, encode_frames, split_at_cuts};
pub use logging::{LoggerHandle, logger};
pub use transport::{AfterScript, ReadStep, ScriptedTransport, WireLog, WritePolicy};
