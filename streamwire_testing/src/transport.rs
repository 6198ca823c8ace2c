//! Scripted in-memory transport.
//!
//! [`ScriptedTransport`] replays a fixed sequence of read outcomes and
//! records everything written to it. It lets tests inject the transport
//! behaviour a real socket only produces under load: chunk boundaries in
//! awkward places, interrupted reads, resets, short writes and failing
//! writes.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// One scripted read outcome.
#[derive(Clone, Debug)]
pub enum ReadStep {
    /// Deliver these bytes. Delivered across several reads if the caller's
    /// buffer is smaller.
    Data(Vec<u8>),
    /// Fail the read with an error of this kind.
    Error(io::ErrorKind),
    /// Report end of stream.
    Eof,
}

/// What happens once the read script is exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AfterScript {
    /// Report end of stream.
    #[default]
    Eof,
    /// Never complete another read.
    Hang,
}

/// How writes behave.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WritePolicy {
    /// Accept at most this many bytes per write call.
    pub max_chunk: Option<usize>,
    /// Return `Pending` before every accepted write, waking immediately.
    pub yield_between_writes: bool,
    /// Fail writes once this many bytes have been accepted.
    pub fail_after: Option<usize>,
    /// Kind of the injected write failure.
    pub failure: Option<io::ErrorKind>,
    /// Never complete a write.
    pub hang: bool,
}

/// Inspects what a [`ScriptedTransport`] saw after it has been moved into a
/// session.
#[derive(Clone, Debug, Default)]
pub struct WireLog {
    inner: Arc<WireLogInner>,
}

#[derive(Debug, Default)]
struct WireLogInner {
    written: Mutex<Vec<u8>>,
    write_calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl WireLog {
    /// Bytes accepted by the transport so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of write calls that accepted at least one byte.
    #[must_use]
    pub fn write_calls(&self) -> usize { self.inner.write_calls.load(Ordering::SeqCst) }

    /// Whether the write side was shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool { self.inner.shut_down.load(Ordering::SeqCst) }
}

/// In-memory transport driven by a read script.
#[derive(Debug)]
pub struct ScriptedTransport {
    reads: VecDeque<ReadStep>,
    after: AfterScript,
    writes: WritePolicy,
    yielded: bool,
    log: WireLog,
}

impl ScriptedTransport {
    /// Replay `reads`, then report end of stream.
    #[must_use]
    pub fn new(reads: impl IntoIterator<Item = ReadStep>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            after: AfterScript::Eof,
            writes: WritePolicy::default(),
            yielded: false,
            log: WireLog::default(),
        }
    }

    /// Replay one data step per chunk, then report end of stream.
    #[must_use]
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self::new(chunks.into_iter().map(|c| ReadStep::Data(c.into())))
    }

    /// Choose what happens once the script runs out.
    #[must_use]
    pub fn then(mut self, after: AfterScript) -> Self {
        self.after = after;
        self
    }

    #[must_use]
    pub fn with_writes(mut self, writes: WritePolicy) -> Self {
        self.writes = writes;
        self
    }

    /// Handle for inspecting written bytes.
    #[must_use]
    pub fn wire(&self) -> WireLog { self.log.clone() }

    fn accepted(&self) -> usize {
        self.log
            .inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl AsyncRead for ScriptedTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.reads.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    this.reads.push_front(ReadStep::Data(rest));
                }
                Poll::Ready(Ok(()))
            }
            Some(ReadStep::Error(kind)) => Poll::Ready(Err(io::Error::new(kind, "scripted failure"))),
            Some(ReadStep::Eof) => Poll::Ready(Ok(())),
            None => match this.after {
                AfterScript::Eof => Poll::Ready(Ok(())),
                AfterScript::Hang => Poll::Pending,
            },
        }
    }
}

impl AsyncWrite for ScriptedTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let policy = this.writes;
        if policy.hang {
            return Poll::Pending;
        }
        if policy.yield_between_writes && !this.yielded {
            this.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        this.yielded = false;

        let accepted = this.accepted();
        let mut n = data.len();
        if let Some(limit) = policy.fail_after {
            if accepted >= limit {
                let kind = policy.failure.unwrap_or(io::ErrorKind::BrokenPipe);
                return Poll::Ready(Err(io::Error::new(kind, "scripted write failure")));
            }
            n = n.min(limit - accepted);
        }
        if let Some(max) = policy.max_chunk {
            n = n.min(max);
        }
        this.log
            .inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&data[..n]);
        if n > 0 {
            this.log.inner.write_calls.fetch_add(1, Ordering::SeqCst);
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.log.inner.shut_down.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
