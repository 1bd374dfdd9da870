//! FastAGI (Asterisk Gateway Interface over TCP) server library
//!
//! This crate implements the server side of Asterisk's AGI protocol: an
//! Asterisk PBX, while processing a call in its dialplan, opens a TCP
//! connection to this process, streams a header block describing the
//! call, and then exchanges line-oriented commands and responses. Each
//! connection surfaces as an [`AgiChannel`] carrying parsed
//! [`CallMetadata`] and one async method per AGI verb.
//!
//! Commands submitted concurrently (from clones of the channel handle)
//! are serialized onto the socket in strict FIFO order, with per-command
//! context-sensitive timeouts, bounded queueing, and clean rejection of
//! everything pending when the caller hangs up.
//!
//! # Example
//!
//! ```rust,no_run
//! use fastagi_tokio::{AgiResult, AgiServer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> AgiResult<()> {
//!     let server = AgiServer::bind("0.0.0.0:4573").await?;
//!     loop {
//!         let (channel, _events) = server.accept().await?;
//!         tokio::spawn(async move {
//!             channel.answer().await?;
//!             let entry = channel
//!                 .get_data(
//!                     "ivr/ivr-welcome",
//!                     Duration::from_secs(10),
//!                     Some(4),
//!                     Some(Duration::from_secs(3)),
//!                 )
//!                 .await?;
//!             channel.verbose(&format!("caller entered {}", entry.digits), 1).await?;
//!             channel.hangup().await
//!         });
//!     }
//! }
//! ```

pub mod buffer;
pub mod channel;
pub mod command;
pub mod connection;
pub mod constants;
pub mod error;
pub mod events;
pub mod protocol;
pub mod queue;
pub mod response;
pub mod server;
mod verbs;

pub use channel::{
    CallMetadata, ChannelStatus, ControlStreamResult, DialStatus, GetDataResult, PlaybackResult,
    PlaybackStatus, ReceiveResult, RecordResult,
};
pub use command::{AgiCommand, CommandTimeout};
pub use connection::{AgiChannel, ChannelConfig};
pub use error::{AgiError, AgiResult, TerminateReason};
pub use events::{ChannelEvent, ChannelEventStream};
pub use queue::QueueStats;
pub use response::{ArgValue, Arguments, Response};
pub use server::AgiServer;
