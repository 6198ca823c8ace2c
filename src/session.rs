//! Per-connection stream sessions.
//!
//! A [`Session`] owns one transport. Its read half feeds a
//! [`Reassembler`](crate::reassembly::Reassembler) that hands complete frames
//! to a [`MessageHandler`](crate::reassembly::MessageHandler); its write half
//! sits behind a [`WriteScheduler`](crate::write::WriteScheduler) that any
//! number of [`SessionHandle`]s feed concurrently.
//!
//! ```no_run
//! use streamwire::{
//!     config::SessionConfig,
//!     reassembly::{Message, handler_fn},
//!     session::Session,
//! };
//! use tokio::net::TcpStream;
//!
//! # async fn serve(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(stream, SessionConfig::default());
//! let handle = session.handle();
//! let stats = session
//!     .run(handler_fn(move |msg: Message<'_>| {
//!         // Echo every payload back to the peer.
//!         handle.send_frame(msg.payload())?;
//!         Ok(())
//!     }))
//!     .await?;
//! println!("received {} messages", stats.messages_in);
//! # Ok(())
//! # }
//! ```

mod handle;
mod id;
mod runner;

pub use handle::SessionHandle;
pub use id::SessionId;
pub use runner::{Session, SessionStats, active_session_count};
