//! Session configuration.
//!
//! [`SessionConfig`] gathers the wire layout and the resource limits of one
//! session. Values are validated once by [`SessionConfigBuilder::build`] so
//! the read and write paths never see an inconsistent configuration.

use std::time::Duration;

use static_assertions::const_assert;

#[cfg(not(loom))]
use crate::write::WriteConfig;
use crate::{error::ConfigError, frame::HeaderLayout};

/// Default cap on a single frame, header included.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;
/// Default capacity of the per-read receive buffer.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 17_000;
/// Default capacity of freshly allocated outbound buffers.
pub const DEFAULT_POOL_BUFFER_CAPACITY: usize = 4 * 1024;
/// Default number of idle outbound buffers the pool keeps.
pub const DEFAULT_MAX_POOLED: usize = 64;

const_assert!(DEFAULT_MAX_FRAME_LEN <= u32::MAX as usize);
const_assert!(DEFAULT_POOL_BUFFER_CAPACITY <= DEFAULT_MAX_FRAME_LEN);
const_assert!(DEFAULT_RECV_BUFFER_SIZE > 0);

/// Validated settings for a [`Session`](crate::session::Session).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::{config::SessionConfig, frame::HeaderLayout};
///
/// let config = SessionConfig::builder()
///     .layout(HeaderLayout::u16_be())
///     .max_frame_len(1024)
///     .read_timeout(Some(Duration::from_secs(30)))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.max_frame_len(), 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    layout: HeaderLayout,
    max_frame_len: usize,
    recv_buffer_size: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_queued: Option<usize>,
    pool_buffer_capacity: usize,
    max_pooled: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layout: HeaderLayout::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            read_timeout: None,
            write_timeout: None,
            max_queued: None,
            pool_buffer_capacity: DEFAULT_POOL_BUFFER_CAPACITY,
            max_pooled: Some(DEFAULT_MAX_POOLED),
        }
    }
}

impl SessionConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder { SessionConfigBuilder::default() }

    #[must_use]
    pub fn layout(&self) -> HeaderLayout { self.layout }

    /// Largest accepted frame, header included.
    #[must_use]
    pub fn max_frame_len(&self) -> usize { self.max_frame_len }

    #[must_use]
    pub fn recv_buffer_size(&self) -> usize { self.recv_buffer_size }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> { self.read_timeout }

    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> { self.write_timeout }

    #[must_use]
    pub fn max_queued(&self) -> Option<usize> { self.max_queued }

    #[must_use]
    pub fn pool_buffer_capacity(&self) -> usize { self.pool_buffer_capacity }

    #[must_use]
    pub fn max_pooled(&self) -> Option<usize> { self.max_pooled }

    /// Settings handed to the session's write scheduler.
    #[cfg(not(loom))]
    #[must_use]
    pub fn write_config(&self) -> WriteConfig {
        WriteConfig {
            write_timeout: self.write_timeout,
            max_queued: self.max_queued,
            buffer_capacity: self.pool_buffer_capacity,
            max_pooled: self.max_pooled,
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Frame header layout shared by both directions.
    #[must_use]
    pub fn layout(mut self, layout: HeaderLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Cap on a single frame, header included. Also bounds the carry-over
    /// buffer, since a frame is rejected as soon as its header is read.
    #[must_use]
    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.config.max_frame_len = max;
        self
    }

    /// Capacity of the buffer each read fills.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    /// Deadline for each read. `None` waits indefinitely.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Deadline for each outbound buffer to be written and flushed.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Maximum buffers waiting behind the active writer.
    #[must_use]
    pub fn max_queued(mut self, limit: Option<usize>) -> Self {
        self.config.max_queued = limit;
        self
    }

    #[must_use]
    pub fn pool_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_buffer_capacity = capacity;
        self
    }

    /// Maximum idle buffers kept for reuse. `None` keeps all of them.
    #[must_use]
    pub fn max_pooled(mut self, limit: Option<usize>) -> Self {
        self.config.max_pooled = limit;
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the layout is invalid, the frame cap
    /// cannot hold a header or exceeds what the length field can declare,
    /// the receive buffer is empty, or the queue limit is zero.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let config = self.config;
        check_frame_cap(&config.layout, config.max_frame_len)?;
        let declarable = config.layout.max_declarable();
        if u64::try_from(config.max_frame_len).map_or(true, |max| max > declarable) {
            return Err(ConfigError::FrameCapBeyondField {
                max: config.max_frame_len,
                declarable,
            });
        }
        if config.recv_buffer_size == 0 {
            return Err(ConfigError::ZeroReceiveBuffer);
        }
        if config.max_queued == Some(0) {
            return Err(ConfigError::ZeroQueueLimit);
        }
        Ok(config)
    }
}

/// Check that `layout` is well formed and that `max_frame_len` leaves room
/// for at least a bare header.
pub(crate) fn check_frame_cap(layout: &HeaderLayout, max_frame_len: usize) -> Result<(), ConfigError> {
    layout.validate()?;
    if max_frame_len < layout.header_len {
        return Err(ConfigError::FrameCapBelowHeader {
            max: max_frame_len,
            header_len: layout.header_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        error::LayoutError,
        frame::{Endianness, LengthFormat},
    };

    #[test]
    fn defaults_validate() {
        let config = SessionConfig::builder().build().expect("defaults are valid");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.recv_buffer_size(), 17_000);
        assert_eq!(config.layout(), HeaderLayout::u32_be());
        assert!(config.read_timeout().is_none());
    }

    #[test]
    fn frame_cap_must_hold_header() {
        let err = SessionConfig::builder()
            .layout(HeaderLayout::openflow())
            .max_frame_len(4)
            .build()
            .expect_err("cap below header");
        assert_eq!(
            err,
            ConfigError::FrameCapBelowHeader {
                max: 4,
                header_len: 8,
            }
        );
    }

    #[rstest]
    #[case(HeaderLayout::u16_be(), 65_535, true)]
    #[case(HeaderLayout::u16_be(), 65_536, false)]
    #[case(HeaderLayout::prefix(LengthFormat::new(1, Endianness::Big)), 255, true)]
    #[case(HeaderLayout::prefix(LengthFormat::new(1, Endianness::Big)), 256, false)]
    fn frame_cap_must_be_declarable(
        #[case] layout: HeaderLayout,
        #[case] max: usize,
        #[case] ok: bool,
    ) {
        let result = SessionConfig::builder()
            .layout(layout)
            .max_frame_len(max)
            .build();
        assert_eq!(result.is_ok(), ok, "{result:?}");
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let layout = HeaderLayout {
            header_len: 2,
            length_offset: 1,
            length: LengthFormat::u16_be(),
        };
        let err = SessionConfig::builder()
            .layout(layout)
            .max_frame_len(100)
            .build()
            .expect_err("field overruns header");
        assert!(matches!(
            err,
            ConfigError::Layout(LayoutError::FieldOutOfBounds { .. })
        ));
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert_eq!(
            SessionConfig::builder().recv_buffer_size(0).build(),
            Err(ConfigError::ZeroReceiveBuffer)
        );
        assert_eq!(
            SessionConfig::builder().max_queued(Some(0)).build(),
            Err(ConfigError::ZeroQueueLimit)
        );
    }

    #[cfg(not(loom))]
    #[test]
    fn write_config_carries_write_settings() {
        let config = SessionConfig::builder()
            .write_timeout(Some(Duration::from_millis(250)))
            .max_queued(Some(8))
            .pool_buffer_capacity(512)
            .max_pooled(None)
            .build()
            .expect("valid configuration");
        assert_eq!(
            config.write_config(),
            WriteConfig {
                write_timeout: Some(Duration::from_millis(250)),
                max_queued: Some(8),
                buffer_capacity: 512,
                max_pooled: None,
            }
        );
    }
}
