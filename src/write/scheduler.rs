//! Async driver that turns the active-writer role into transmissions.
//!
//! [`WriteScheduler::enqueue`] never blocks and never awaits. The producer
//! that wins the writer role spawns a task which transmits that buffer and
//! then keeps draining the queue for as long as [`WriteQueue::complete`] hands
//! it another buffer. The task exits as soon as the role is relinquished, so
//! a quiet session holds no writer task at all.

use std::{
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::BytesMut;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    runtime::Handle,
    sync::Notify,
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, trace};

use super::queue::{Submission, WriteQueue};
use crate::{
    error::WriteError,
    metrics::{self, Direction},
    pool::{BufferPool, PoolStats},
    session::SessionId,
};

type BoxedSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Settings for a [`WriteScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteConfig {
    /// Deadline for one buffer to be written and flushed.
    pub write_timeout: Option<Duration>,
    /// Maximum buffers waiting behind the active writer.
    pub max_queued: Option<usize>,
    /// Capacity of freshly allocated pool buffers.
    pub buffer_capacity: usize,
    /// Maximum idle buffers the pool keeps.
    pub max_pooled: Option<usize>,
}

/// Transmission counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub buffers_sent: u64,
    pub bytes_sent: u64,
}

struct Shared {
    session: SessionId,
    queue: WriteQueue,
    sink: tokio::sync::Mutex<BoxedSink>,
    runtime: Handle,
    tracker: TaskTracker,
    idle: Notify,
    halt: CancellationToken,
    shutdown: CancellationToken,
    write_timeout: Option<Duration>,
    failure: Mutex<Option<WriteError>>,
    transmitting: AtomicBool,
    buffers_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Serialises outbound buffers from any number of producers onto one sink.
///
/// Cloning is cheap; every clone feeds the same queue.
#[derive(Clone)]
pub struct WriteScheduler {
    shared: Arc<Shared>,
}

impl WriteScheduler {
    /// Wrap `sink`. A failed transmission cancels `shutdown`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<W>(
        sink: W,
        config: WriteConfig,
        session: SessionId,
        shutdown: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let pool = BufferPool::new(config.buffer_capacity).with_max_retained(config.max_pooled);
        Self {
            shared: Arc::new(Shared {
                session,
                queue: WriteQueue::new(pool, config.max_queued),
                sink: tokio::sync::Mutex::new(Box::pin(sink)),
                runtime: Handle::current(),
                tracker: TaskTracker::new(),
                idle: Notify::new(),
                halt: CancellationToken::new(),
                shutdown,
                write_timeout: config.write_timeout,
                failure: Mutex::new(None),
                transmitting: AtomicBool::new(false),
                buffers_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `buf` for transmission after every previously accepted buffer.
    ///
    /// Safe to call from any thread; returns without waiting for the write.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Closed`] once the scheduler is closing or a
    /// transmission has failed, and [`WriteError::QueueFull`] when the queue
    /// limit is reached.
    pub fn enqueue(&self, buf: BytesMut) -> Result<(), WriteError> {
        match self.shared.queue.submit(buf)? {
            Submission::Transmit(buf) => {
                let shared = Arc::clone(&self.shared);
                self.shared
                    .tracker
                    .spawn_on(drive(shared, buf), &self.shared.runtime);
            }
            Submission::Queued => {}
        }
        Ok(())
    }

    /// Draw a buffer from the pool.
    #[must_use]
    pub fn acquire(&self) -> BytesMut { self.shared.queue.acquire() }

    /// Return a buffer that will not be enqueued.
    pub fn recycle(&self, buf: BytesMut) { self.shared.queue.recycle(buf); }

    /// Buffers accepted but not yet flushed.
    #[must_use]
    pub fn pending(&self) -> usize { self.shared.queue.pending() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.queue.is_closed() }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats { self.shared.queue.pool_stats() }

    #[must_use]
    pub fn stats(&self) -> WriteStats {
        WriteStats {
            buffers_sent: self.shared.buffers_sent.load(Ordering::Relaxed),
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Drop queued buffers instead of draining them on [`close`](Self::close).
    pub fn halt(&self) {
        self.shared.queue.close();
        self.shared.halt.cancel();
    }

    /// Wait until no buffer is pending.
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.queue.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refuse further buffers, drain the queue and shut the sink down.
    ///
    /// # Errors
    ///
    /// Returns the recorded transmission failure, if any, exactly once.
    /// Otherwise returns any error raised while shutting the sink down.
    pub async fn close(&self) -> Result<(), WriteError> {
        self.shared.queue.close();
        self.idle().await;
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let mut sink = self.shared.sink.lock().await;
        match self.shared.write_timeout {
            Some(limit) => timeout(limit, sink.shutdown())
                .await
                .map_err(|_| WriteError::Timeout(limit))??,
            None => sink.shutdown().await?,
        }
        Ok(())
    }

    /// Take the recorded transmission failure, if any.
    pub fn take_failure(&self) -> Option<WriteError> {
        self.shared
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Shared {
    async fn transmit(&self, sink: &mut BoxedSink, buf: &[u8]) -> Result<(), WriteError> {
        let write = async {
            sink.write_all(buf).await?;
            sink.flush().await
        };
        match self.write_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .map_err(|_| WriteError::Timeout(limit))?
                .map_err(WriteError::from),
            None => write.await.map_err(WriteError::from),
        }
    }

    fn record_sent(&self, len: usize) {
        self.buffers_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(u64::try_from(len).unwrap_or(u64::MAX), Ordering::Relaxed);
        metrics::inc_frames(Direction::Outbound, 1);
    }

    fn fail(&self, in_flight: BytesMut, err: WriteError) {
        let dropped = self.queue.abort(in_flight);
        debug!(session = %self.session, dropped, error = %err, "transmission failed");
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(err);
        }
        drop(failure);
        self.shutdown.cancel();
    }
}

/// Body of the active writer.
async fn drive(shared: Arc<Shared>, mut buf: BytesMut) {
    let mut sink = shared.sink.lock().await;
    loop {
        let overlapped = shared.transmitting.swap(true, Ordering::AcqRel);
        debug_assert!(!overlapped, "two transmissions in flight");
        let len = buf.len();
        let result = tokio::select! {
            biased;
            () = shared.halt.cancelled() => Err(None),
            res = shared.transmit(&mut *sink, &buf) => res.map_err(Some),
        };
        shared.transmitting.store(false, Ordering::Release);
        match result {
            Ok(()) => {
                shared.record_sent(len);
                trace!(session = %shared.session, len, "buffer transmitted");
                match shared.queue.complete(buf) {
                    Some(next) => buf = next,
                    None => break,
                }
            }
            Err(Some(err)) => {
                shared.fail(buf, err);
                break;
            }
            Err(None) => {
                let dropped = shared.queue.abort(buf);
                debug!(session = %shared.session, dropped, "writer halted");
                break;
            }
        }
    }
    drop(sink);
    shared.idle.notify_waiters();
}
