//! The session read loop and teardown.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use super::{SessionHandle, SessionId};
use crate::{
    config::SessionConfig,
    error::{SessionError, TransportErrorClass, classify_io_error},
    metrics::{self, Direction},
    reassembly::{MessageHandler, Reassembler},
    write::WriteScheduler,
};

static LIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// Number of sessions created and not yet dropped in this process.
#[must_use]
pub fn active_session_count() -> u64 { LIVE_SESSIONS.load(Ordering::Relaxed) }

/// Keeps one session counted in [`active_session_count`] and the sessions
/// gauge until dropped.
struct Liveness;

impl Liveness {
    /// Returns the guard and the live count including the new session.
    fn register() -> (Self, u64) {
        let live = LIVE_SESSIONS.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::inc_sessions();
        (Self, live)
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        LIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        metrics::dec_sessions();
    }
}

/// Counters reported when a session closes cleanly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Messages handed to the handler.
    pub messages_in: u64,
    /// Bytes read from the transport.
    pub bytes_in: u64,
    /// Buffers written to the transport.
    pub buffers_out: u64,
    /// Bytes written to the transport.
    pub bytes_out: u64,
}

/// Why the read loop stopped without an error.
#[derive(Clone, Copy, Debug)]
enum Stop {
    PeerClosed,
    Shutdown,
}

enum ReadFailure {
    Io(std::io::Error),
    Timeout(Duration),
}

/// One connection: a reassembly engine on the read half and a write
/// scheduler on the write half.
///
/// Inbound frames are delivered to the handler passed to [`run`](Self::run)
/// in stream order. Outbound buffers are sent through [`SessionHandle`]s.
pub struct Session<T> {
    id: SessionId,
    config: SessionConfig,
    reader: ReadHalf<T>,
    reassembler: Reassembler,
    scheduler: WriteScheduler,
    shutdown: CancellationToken,
    recv: BytesMut,
    stats: SessionStats,
    _liveness: Liveness,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Bind a session to `transport`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let id = SessionId::next();
        let (reader, writer) = tokio::io::split(transport);
        let shutdown = CancellationToken::new();
        let scheduler = WriteScheduler::new(writer, config.write_config(), id, shutdown.clone());
        let (liveness, live) = Liveness::register();
        info!("session created: id={id}, streamwire_active_sessions={live}");
        Self {
            id,
            config,
            reader,
            reassembler: Reassembler::for_config(&config),
            scheduler,
            shutdown,
            recv: BytesMut::with_capacity(config.recv_buffer_size()),
            stats: SessionStats::default(),
            _liveness: liveness,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    #[must_use]
    pub fn config(&self) -> &SessionConfig { &self.config }

    /// Producer handle onto this session's write path.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.id,
            self.scheduler.clone(),
            self.shutdown.clone(),
            self.config.layout(),
            self.config.max_frame_len(),
        )
    }

    /// Read until the peer closes, a fatal error occurs or shutdown is
    /// requested, then drain the write path.
    ///
    /// # Errors
    ///
    /// Returns the single cause that ended the session: a fatal transport
    /// error, a framing violation, a handler failure, a write failure, a read
    /// deadline expiry or a stream that ended mid-frame.
    pub async fn run<H>(mut self, mut handler: H) -> Result<SessionStats, SessionError>
    where
        H: MessageHandler,
    {
        let outcome = self.read_loop(&mut handler).await;
        self.finish(outcome).await
    }

    async fn read_loop<H>(&mut self, handler: &mut H) -> Result<Stop, SessionError>
    where
        H: MessageHandler + ?Sized,
    {
        let read_timeout = self.config.read_timeout();
        let recv_size = self.config.recv_buffer_size();
        loop {
            self.recv.clear();
            self.recv.reserve(recv_size);
            let read = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(Stop::Shutdown),
                res = read_chunk(&mut self.reader, &mut self.recv, read_timeout) => res,
            };
            match read {
                Ok(0) => return self.end_of_stream(),
                Ok(n) => {
                    self.stats.bytes_in += n as u64;
                    let delivered = self.reassembler.feed(&self.recv, handler)?;
                    self.stats.messages_in += delivered as u64;
                    metrics::inc_frames(Direction::Inbound, delivered as u64);
                }
                Err(ReadFailure::Timeout(limit)) => return Err(SessionError::ReadTimeout(limit)),
                Err(ReadFailure::Io(err)) => match classify_io_error(&err) {
                    TransportErrorClass::Closed => {
                        debug!("peer closed transport: id={}, error={err}", self.id);
                        return self.end_of_stream();
                    }
                    TransportErrorClass::Transient => {
                        debug!("retrying read: id={}, error={err}", self.id);
                        tokio::task::yield_now().await;
                    }
                    TransportErrorClass::Fatal => return Err(err.into()),
                },
            }
        }
    }

    fn end_of_stream(&self) -> Result<Stop, SessionError> {
        match self.reassembler.carry_over_len() {
            0 => Ok(Stop::PeerClosed),
            pending => Err(SessionError::TruncatedFrame { pending }),
        }
    }

    async fn finish(
        &mut self,
        outcome: Result<Stop, SessionError>,
    ) -> Result<SessionStats, SessionError> {
        self.shutdown.cancel();
        let outcome = match outcome {
            Ok(stop) => self.scheduler.close().await.map(|()| stop).map_err(Into::into),
            Err(err) => {
                self.scheduler.halt();
                if let Err(write_err) = self.scheduler.close().await {
                    debug!("write path closed with error: id={}, error={write_err}", self.id);
                }
                Err(err)
            }
        };
        let sent = self.scheduler.stats();
        self.stats.buffers_out = sent.buffers_sent;
        self.stats.bytes_out = sent.bytes_sent;
        match outcome {
            Ok(stop) => {
                let stats = self.stats;
                info!(
                    "session closed: id={}, reason={stop:?}, messages_in={}, bytes_in={}, \
                     buffers_out={}, bytes_out={}",
                    self.id, stats.messages_in, stats.bytes_in, stats.buffers_out, stats.bytes_out
                );
                Ok(stats)
            }
            Err(err) => {
                warn!(
                    "session terminated: id={}, kind={}, error={err}",
                    self.id,
                    err.kind()
                );
                metrics::inc_errors(err.kind());
                Err(err)
            }
        }
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        debug!("session dropped: id={}", self.id);
    }
}

async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    deadline: Option<Duration>,
) -> Result<usize, ReadFailure>
where
    R: AsyncRead + Unpin,
{
    let read = reader.read_buf(buf);
    match deadline {
        Some(limit) => timeout(limit, read)
            .await
            .map_err(|_| ReadFailure::Timeout(limit))?
            .map_err(ReadFailure::Io),
        None => read.await.map_err(ReadFailure::Io),
    }
}
