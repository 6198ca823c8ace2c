//! Writer selection and outbound queue bookkeeping.
//!
//! Two pieces of state cooperate here:
//!
//! - `pending`, an atomic count of buffers submitted but not yet flushed. The
//!   submitter that moves it from zero to one becomes the active writer and
//!   nobody else transmits until the active writer's decrement returns it to
//!   zero. No lock takes part in that decision.
//! - `containers`, a mutex over the FIFO queue and the buffer pool. It only
//!   keeps those containers consistent.
//!
//! A submitter increments `pending` while holding the container lock and
//! appends its buffer before releasing it. A completing writer decrements
//! `pending` outside the lock; if buffers remain, it then takes the lock to
//! dequeue, and the lock guarantees that any submission it counted has
//! already been appended. At every release of the lock on the submit path
//! `pending == queued + 1` while a writer is active and `pending == 0`
//! otherwise.

use std::{collections::VecDeque, sync::PoisonError};
#[cfg(not(loom))]
use std::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;
#[cfg(loom)]
use loom::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    error::WriteError,
    pool::{BufferPool, PoolStats},
};

/// Outcome of [`WriteQueue::submit`].
#[derive(Debug)]
#[must_use = "a `Transmit` submission must be written by the caller"]
pub enum Submission {
    /// The caller became the active writer and must transmit this buffer.
    Transmit(BytesMut),
    /// The buffer was queued behind the active writer.
    Queued,
}

#[derive(Debug)]
struct Containers {
    queue: VecDeque<BytesMut>,
    pool: BufferPool,
    closed: bool,
}

/// Ordered outbound queue with single-writer hand-off.
pub struct WriteQueue {
    pending: AtomicUsize,
    containers: Mutex<Containers>,
    max_queued: Option<usize>,
}

impl WriteQueue {
    /// Create a queue around `pool`, optionally limiting how many buffers may
    /// wait behind the active writer.
    #[must_use]
    pub fn new(pool: BufferPool, max_queued: Option<usize>) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            containers: Mutex::new(Containers {
                queue: VecDeque::new(),
                pool,
                closed: false,
            }),
            max_queued,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `buf` over for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Closed`] once the queue has been closed and
    /// [`WriteError::QueueFull`] when the queue limit is reached. A rejected
    /// buffer is recycled into the pool.
    pub fn submit(&self, buf: BytesMut) -> Result<Submission, WriteError> {
        let mut containers = self.lock();
        if containers.closed {
            containers.pool.release(buf);
            return Err(WriteError::Closed);
        }
        if let Some(limit) = self.max_queued
            && containers.queue.len() >= limit
        {
            containers.pool.release(buf);
            return Err(WriteError::QueueFull { limit });
        }
        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            return Ok(Submission::Transmit(buf));
        }
        containers.queue.push_back(buf);
        Ok(Submission::Queued)
    }

    /// Record that the active writer finished transmitting `sent`.
    ///
    /// Returns the next buffer the active writer must transmit, or `None` when
    /// the writer role has been relinquished.
    pub fn complete(&self, sent: BytesMut) -> Option<BytesMut> {
        self.lock().pool.release(sent);
        if self.pending.fetch_sub(1, Ordering::AcqRel) > 1 {
            let next = self.lock().queue.pop_front();
            debug_assert!(next.is_some(), "pending count ran ahead of the queue");
            next
        } else {
            None
        }
    }

    /// Abandon the in-flight buffer and everything queued behind it.
    ///
    /// Only the active writer may call this. The queue is closed, all buffers
    /// return to the pool, and the writer role is relinquished. Returns the
    /// number of queued buffers that were dropped without transmission.
    pub fn abort(&self, in_flight: BytesMut) -> usize {
        let mut containers = self.lock();
        containers.closed = true;
        containers.pool.release(in_flight);
        let dropped = containers.queue.len();
        while let Some(buf) = containers.queue.pop_front() {
            containers.pool.release(buf);
        }
        self.pending.fetch_sub(dropped + 1, Ordering::AcqRel);
        dropped
    }

    /// Stop accepting new buffers. Queued buffers are still transmitted.
    pub fn close(&self) { self.lock().closed = true; }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }

    /// Buffers submitted but not yet flushed, including the in-flight one.
    #[must_use]
    pub fn pending(&self) -> usize { self.pending.load(Ordering::Acquire) }

    /// Buffers waiting behind the active writer.
    #[must_use]
    pub fn queued(&self) -> usize { self.lock().queue.len() }

    /// Draw a scratch buffer from the pool.
    pub fn acquire(&self) -> BytesMut { self.lock().pool.acquire() }

    /// Return an unused buffer to the pool.
    pub fn recycle(&self, buf: BytesMut) { self.lock().pool.release(buf); }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats { self.lock().pool.stats() }
}
