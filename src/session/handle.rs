//! Cloneable producer handle onto a running session.

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;

use super::SessionId;
use crate::{
    error::WriteError,
    frame::HeaderLayout,
    pool::PoolStats,
    write::WriteScheduler,
};

/// Sends buffers through a [`Session`](super::Session) from any task or
/// thread.
///
/// Handles stay valid after the session ends; sending then fails with
/// [`WriteError::Closed`].
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    scheduler: WriteScheduler,
    shutdown: CancellationToken,
    layout: HeaderLayout,
    max_frame_len: usize,
}

impl SessionHandle {
    pub(super) fn new(
        id: SessionId,
        scheduler: WriteScheduler,
        shutdown: CancellationToken,
        layout: HeaderLayout,
        max_frame_len: usize,
    ) -> Self {
        Self {
            id,
            scheduler,
            shutdown,
            layout,
            max_frame_len,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    /// Queue an already encoded buffer for transmission.
    ///
    /// The buffer is written verbatim, after every buffer accepted before it.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Closed`] once the session is closing and
    /// [`WriteError::QueueFull`] when the outbound queue limit is reached.
    /// Rejected buffers are recycled.
    pub fn enqueue(&self, buf: BytesMut) -> Result<(), WriteError> {
        if self.shutdown.is_cancelled() {
            self.scheduler.recycle(buf);
            return Err(WriteError::Closed);
        }
        self.scheduler.enqueue(buf)
    }

    /// Encode `payload` into a pooled buffer using the session's header
    /// layout and queue it.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::FrameTooLarge`] if the encoded frame would exceed
    /// the session's frame cap, plus any error [`enqueue`](Self::enqueue)
    /// returns.
    pub fn send_frame(&self, payload: &[u8]) -> Result<(), WriteError> {
        let size = self.layout.header_len.saturating_add(payload.len());
        if size > self.max_frame_len {
            return Err(WriteError::FrameTooLarge {
                size,
                max: self.max_frame_len,
            });
        }
        let mut buf = self.scheduler.acquire();
        if let Err(err) = self.layout.encode_frame(payload, &mut buf) {
            self.scheduler.recycle(buf);
            return Err(err.into());
        }
        self.enqueue(buf)
    }

    /// Draw an empty buffer from the session's pool.
    #[must_use]
    pub fn acquire_buffer(&self) -> BytesMut { self.scheduler.acquire() }

    /// Return a buffer that will not be sent.
    pub fn recycle_buffer(&self, buf: BytesMut) { self.scheduler.recycle(buf); }

    /// Ask the session to stop reading and close.
    ///
    /// Buffers already accepted are still flushed.
    pub fn shutdown(&self) { self.shutdown.cancel(); }

    #[must_use]
    pub fn is_closing(&self) -> bool { self.shutdown.is_cancelled() }

    /// Resolves once the session has started closing.
    pub async fn closing(&self) { self.shutdown.cancelled().await; }

    /// Buffers accepted but not yet flushed.
    #[must_use]
    pub fn pending_writes(&self) -> usize { self.scheduler.pending() }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats { self.scheduler.pool_stats() }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .field("pending_writes", &self.pending_writes())
            .finish_non_exhaustive()
    }
}
