//! Frame header layouts and length field encoding.

pub mod format;
pub mod layout;

pub use format::{Endianness, LengthFormat};
pub use layout::HeaderLayout;
