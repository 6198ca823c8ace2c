//! Outbound write scheduling.
//!
//! Producers on any thread hand buffers to the session; exactly one logical
//! writer transmits them, in acceptance order, one at a time. Transmitted
//! buffers are recycled into a pool so steady-state sending does not
//! allocate.

mod queue;
#[cfg(not(loom))]
mod scheduler;

pub use queue::{Submission, WriteQueue};
#[cfg(not(loom))]
pub use scheduler::{WriteConfig, WriteScheduler, WriteStats};
