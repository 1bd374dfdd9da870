//! Thin TCP listener handing fresh connections to the channel core

use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::info;

use crate::connection::{AgiChannel, ChannelConfig};
use crate::error::AgiResult;
use crate::events::ChannelEventStream;

/// FastAGI listener.
///
/// Binds a TCP socket and turns each inbound connection from Asterisk
/// into an [`AgiChannel`]. Deliberately thin: bind, accept, construct;
/// supervision of per-call tasks belongs to the embedding application.
pub struct AgiServer {
    listener: TcpListener,
    config: ChannelConfig,
}

impl AgiServer {
    /// Bind the listener. Use port `0` to let the OS pick.
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("FastAGI server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config: ChannelConfig::default(),
        })
    }

    /// Replace the per-channel configuration for subsequent accepts
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept the next call. Resolves once the call's header block has
    /// been consumed, so the returned channel is immediately usable.
    pub async fn accept(&self) -> AgiResult<(AgiChannel, ChannelEventStream)> {
        let (stream, addr) = self.listener.accept().await?;
        info!("Inbound AGI connection from {}", addr);
        AgiChannel::accept(stream, self.config.clone()).await
    }
}
