//! Channel construction, lifecycle, and the reader task

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::channel::CallMetadata;
use crate::command::CommandTimeout;
use crate::constants::{DEFAULT_COMMAND_TIMEOUT_MS, MAX_CALL_DURATION_MS, MAX_QUEUE_SIZE, SOCKET_BUF_SIZE};
use crate::error::{AgiError, AgiResult, TerminateReason};
use crate::events::{ChannelEvent, ChannelEventStream, EventBus};
use crate::protocol::{parse_inbound_line, AgiFramer, AgiRecord, InboundMessage};
use crate::queue::{CommandQueue, QueueStats};
use crate::response::Response;

/// Construction-time channel tunables.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Pending commands beyond this are rejected synchronously
    pub max_queue_size: usize,
    /// Default timeout for quick verbs (playback/record/exec classes keep
    /// their own defaults)
    pub default_command_timeout: Duration,
    /// Upper bound on a call, used as the `EXEC` timeout
    pub max_call_duration: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_queue_size: MAX_QUEUE_SIZE,
            default_command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            max_call_duration: Duration::from_millis(MAX_CALL_DURATION_MS),
        }
    }
}

struct ChannelInner {
    metadata: CallMetadata,
    queue: Arc<CommandQueue>,
    events: EventBus,
}

/// One call's AGI control session.
///
/// Cheaply cloneable; clones share the underlying session, and concurrent
/// submissions from clones are serialized in strict FIFO order by the
/// command queue.
#[derive(Clone)]
pub struct AgiChannel {
    inner: Arc<ChannelInner>,
}

impl AgiChannel {
    /// Take ownership of a fresh connection from Asterisk.
    ///
    /// Consumes the initial header block before returning, so a resolved
    /// `accept` *is* the ready signal: the returned channel carries parsed
    /// [`CallMetadata`] and accepts commands immediately.
    pub async fn accept(
        stream: TcpStream,
        config: ChannelConfig,
    ) -> AgiResult<(Self, ChannelEventStream)> {
        if let Ok(peer) = stream.peer_addr() {
            debug!("Accepted AGI connection from {}", peer);
        }
        let (mut read_half, write_half) = stream.into_split();

        // header phase: nothing but header bytes is interpreted until the
        // blank line arrives
        let mut framer = AgiFramer::new();
        let mut read_buf = [0u8; SOCKET_BUF_SIZE];
        let block = loop {
            if let Some(AgiRecord::HeaderBlock(block)) = framer.next_record()? {
                break block;
            }
            let n = read_half.read(&mut read_buf).await?;
            if n == 0 {
                warn!("Connection closed during header block");
                return Err(AgiError::ConnectionClosed);
            }
            framer.push(&read_buf[..n])?;
        };
        let metadata = CallMetadata::parse(&block);
        info!(
            channel = %metadata.channel,
            uniqueid = %metadata.uniqueid,
            request = %metadata.request,
            "AGI session ready"
        );

        let events = EventBus::new();
        let event_stream = events.subscribe();
        let queue = Arc::new(CommandQueue::new(config, events.clone()));
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        tokio::spawn(queue.clone().run_worker(write_half, response_rx));
        tokio::spawn(read_loop(
            read_half,
            framer,
            queue.clone(),
            events.clone(),
            response_tx,
        ));

        let channel = Self {
            inner: Arc::new(ChannelInner {
                metadata,
                queue,
                events,
            }),
        };
        Ok((channel, event_stream))
    }

    /// Call metadata from the header block
    pub fn metadata(&self) -> &CallMetadata {
        &self.inner.metadata
    }

    /// `false` once the session has terminated for any reason
    pub fn is_alive(&self) -> bool {
        self.inner.queue.is_alive()
    }

    /// Subscribe an additional event listener
    pub fn subscribe(&self) -> ChannelEventStream {
        self.inner.events.subscribe()
    }

    /// Terminate the session locally. Pending and in-flight commands are
    /// rejected; the socket is released. Idempotent.
    pub async fn close(&self) {
        self.inner
            .queue
            .terminate(TerminateReason::ChannelClosed)
            .await;
    }

    /// Submit a raw command line with the context-sensitive default
    /// timeout
    pub async fn send_command(&self, command: &str) -> AgiResult<Response> {
        self.inner.queue.submit(command.to_string(), None).await
    }

    /// Submit a raw command line with an explicit timeout
    pub async fn send_command_with_timeout(
        &self,
        command: &str,
        timeout: CommandTimeout,
    ) -> AgiResult<Response> {
        self.inner
            .queue
            .submit(command.to_string(), Some(timeout))
            .await
    }

    /// Drain the queue, rejecting every pending command; returns the
    /// number rejected
    pub async fn clear_command_queue(&self) -> usize {
        self.inner.queue.clear().await
    }

    /// Queue occupancy snapshot
    pub async fn queue_stats(&self) -> QueueStats {
        self.inner.queue.stats().await
    }
}

/// Reader task: socket bytes through the framer, lines to the response
/// channel, hangup and transport failures to termination.
async fn read_loop<R>(
    mut reader: R,
    mut framer: AgiFramer,
    queue: Arc<CommandQueue>,
    events: EventBus,
    response_tx: mpsc::UnboundedSender<Response>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = [0u8; SOCKET_BUF_SIZE];
    'session: loop {
        // drain every complete record before touching the socket again
        loop {
            let record = match framer.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    warn!("Inbound framing error: {}", e);
                    events.emit(ChannelEvent::Error {
                        message: e.to_string(),
                    });
                    queue.terminate(TerminateReason::ChannelClosed).await;
                    break 'session;
                }
            };
            let AgiRecord::Line(line) = record else {
                // the header block was consumed before this task started
                debug!("Ignoring unexpected header record in command phase");
                continue;
            };
            trace!("<- {}", line);
            events.emit(ChannelEvent::Recv { line: line.clone() });

            match parse_inbound_line(&line) {
                Ok(InboundMessage::Hangup) => {
                    // never a reply to a command, always terminal
                    info!("HANGUP received from Asterisk");
                    events.emit(ChannelEvent::Hangup);
                    queue.terminate(TerminateReason::Hangup).await;
                    break 'session;
                }
                Ok(InboundMessage::Response(response)) => {
                    events.emit(ChannelEvent::Response {
                        code: response.code,
                        result: response.result,
                    });
                    let _ = response_tx.send(response);
                }
                Err(e) => {
                    warn!("Unparseable line from Asterisk: {}", e);
                    events.emit(ChannelEvent::Error {
                        message: e.to_string(),
                    });
                    queue.terminate(TerminateReason::ChannelClosed).await;
                    break 'session;
                }
            }
        }

        tokio::select! {
            _ = queue.wait_shutdown() => break,
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    debug!("Socket closed by Asterisk");
                    queue.terminate(TerminateReason::ChannelClosed).await;
                    break;
                }
                Ok(n) => {
                    if let Err(e) = framer.push(&buf[..n]) {
                        events.emit(ChannelEvent::Error { message: e.to_string() });
                        queue.terminate(TerminateReason::ChannelClosed).await;
                        break;
                    }
                }
                Err(e) => {
                    warn!("Socket read failed: {}", e);
                    events.emit(ChannelEvent::Error { message: e.to_string() });
                    queue.terminate(TerminateReason::ChannelClosed).await;
                    break;
                }
            }
        }
    }
    debug!("Reader exiting");
    // dropping response_tx unblocks a worker awaiting a response
}
