//! Typed channel lifecycle and queue observability events

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::TerminateReason;

/// Buffered events per subscriber before slow subscribers start lagging
const EVENT_CAPACITY: usize = 128;

/// Everything a channel announces about itself.
///
/// Events are emit-and-forget: the channel never blocks on subscribers,
/// and a subscriber that falls behind loses the oldest events.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Asterisk sent a `HANGUP` line
    Hangup,
    /// The channel terminated; emitted exactly once
    Close { reason: TerminateReason },
    /// Socket-layer or protocol failure, independent of any in-flight
    /// command
    Error { message: String },
    /// The in-flight command's timer elapsed
    Timeout { command: String },
    /// A command's bytes were written to the wire
    Send { command: String },
    /// A raw line arrived from Asterisk
    Recv { line: String },
    /// A response line was parsed
    Response { code: u16, result: i64 },
    /// A command entered the queue; `size` is the depth after insertion
    CommandQueued { command: String, size: usize },
    /// A command resolved with a response
    CommandProcessed { command: String, duration_ms: u64 },
    /// A command was rejected (timeout, write failure, verb failure is
    /// not included — that is a caller-level concern)
    CommandFailed { command: String, error: String },
    /// The queue drained to empty
    QueueEmpty,
    /// Pending entries were swept, by termination or an explicit clear
    QueueCleared {
        reason: TerminateReason,
        count: usize,
    },
}

/// Receiving side of a channel's event broadcast.
pub struct ChannelEventStream {
    rx: broadcast::Receiver<ChannelEvent>,
}

impl ChannelEventStream {
    /// Next event; `None` once the channel is gone and the backlog is
    /// drained
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, {} events dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant; `None` when no event is ready right now
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, {} events dropped", missed);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Sending side, shared by the queue worker and the reader task.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Fire an event; having no subscribers is not an error
    pub fn emit(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> ChannelEventStream {
        ChannelEventStream {
            rx: self.tx.subscribe(),
        }
    }
}
