//! FIFO command queue serializing user submissions onto the socket

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::command::CommandTimeout;
use crate::connection::ChannelConfig;
use crate::error::{AgiError, AgiResult, TerminateReason};
use crate::events::{ChannelEvent, EventBus};
use crate::response::Response;

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Pending entries (not counting the in-flight command)
    pub size: usize,
    /// `true` while a command is on the wire awaiting its response
    pub processing: bool,
    /// Age of the oldest pending entry
    pub oldest_age: Option<Duration>,
}

/// One pending submission.
struct QueuedCommand {
    command: String,
    reply: oneshot::Sender<AgiResult<Response>>,
    timeout: CommandTimeout,
    enqueued_at: Instant,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueuedCommand>,
    processing: bool,
}

/// Per-channel command queue.
///
/// A single worker drains the queue: it writes one command, awaits the
/// response channel fed by the reader task (under the command's timer),
/// resolves the submitter, and moves on. At most one command is ever in
/// flight. Every entry is eventually resolved with a [`Response`] or
/// rejected with a classified error; nothing is abandoned.
pub(crate) struct CommandQueue {
    state: Mutex<QueueState>,
    alive: AtomicBool,
    dead_reason: OnceLock<TerminateReason>,
    /// Wakes the worker when entries arrive or the channel dies
    wake: Notify,
    /// Wakes the reader when the channel is locally terminated
    shutdown: Notify,
    events: EventBus,
    config: ChannelConfig,
}

impl CommandQueue {
    pub fn new(config: ChannelConfig, events: EventBus) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            alive: AtomicBool::new(true),
            dead_reason: OnceLock::new(),
            wake: Notify::new(),
            shutdown: Notify::new(),
            events,
            config,
        }
    }

    /// Context-sensitive default for `command`, honoring the
    /// construction-time overrides
    fn default_timeout_for(&self, command: &str) -> CommandTimeout {
        if command.starts_with("EXEC") {
            CommandTimeout::After(self.config.max_call_duration)
        } else {
            CommandTimeout::for_command_with_default(command, self.config.default_command_timeout)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn reason(&self) -> TerminateReason {
        *self
            .dead_reason
            .get()
            .unwrap_or(&TerminateReason::ChannelClosed)
    }

    /// Enqueue a command and wait for its resolution.
    ///
    /// Rejects immediately when the channel is dead or the queue is at
    /// capacity. A `None` timeout selects the context-sensitive default
    /// for the command's leading verb.
    pub async fn submit(
        &self,
        command: String,
        timeout: Option<CommandTimeout>,
    ) -> AgiResult<Response> {
        if !self.is_alive() {
            return Err(AgiError::ChannelDead {
                reason: self.reason(),
                command,
            });
        }

        let timeout = timeout.unwrap_or_else(|| self.default_timeout_for(&command));

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.entries.len() >= self.config.max_queue_size {
                warn!(
                    "Queue full ({} entries), rejecting: {}",
                    self.config.max_queue_size, command
                );
                return Err(AgiError::QueueFull { command });
            }
            state.entries.push_back(QueuedCommand {
                command: command.clone(),
                reply: reply_tx,
                timeout,
                enqueued_at: Instant::now(),
            });
            let size = state.entries.len();
            trace!("Command queued ({} pending): {}", size, command);
            self.events.emit(ChannelEvent::CommandQueued {
                command: command.clone(),
                size,
            });
        }
        self.wake.notify_one();

        match reply_rx.await {
            Ok(outcome) => outcome,
            // worker dropped the reply without resolving it; only reachable
            // through termination races
            Err(_) => Err(AgiError::ChannelDead {
                reason: self.reason(),
                command,
            }),
        }
    }

    /// Drain the queue, rejecting every pending entry as manually cleared.
    /// Returns the number rejected. The channel stays alive.
    pub async fn clear(&self) -> usize {
        let drained: Vec<QueuedCommand> = {
            let mut state = self.state.lock().await;
            state.entries.drain(..).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.reply.send(Err(AgiError::Cleared {
                command: entry.command,
            }));
        }
        debug!("Queue manually cleared, {} entries rejected", count);
        self.events.emit(ChannelEvent::QueueCleared {
            reason: TerminateReason::Manual,
            count,
        });
        count
    }

    /// Occupancy snapshot
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            size: state.entries.len(),
            processing: state.processing,
            oldest_age: state.entries.front().map(|e| e.enqueued_at.elapsed()),
        }
    }

    /// Kill the channel: flip the liveness flag, sweep every pending
    /// entry, announce the termination. Idempotent; only the first caller
    /// does the work.
    pub async fn terminate(&self, reason: TerminateReason) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.dead_reason.set(reason);

        let drained: Vec<QueuedCommand> = {
            let mut state = self.state.lock().await;
            state.entries.drain(..).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.reply.send(Err(AgiError::ChannelDead {
                reason,
                command: entry.command,
            }));
        }
        debug!("Channel terminated ({}), {} pending entries rejected", reason, count);
        self.events.emit(ChannelEvent::QueueCleared { reason, count });
        self.events.emit(ChannelEvent::Close { reason });

        self.wake.notify_waiters();
        self.shutdown.notify_waiters();
    }

    /// Resolves once the channel has been terminated locally. Used by the
    /// reader to stop blocking on a socket Asterisk will never close.
    pub async fn wait_shutdown(&self) {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_alive() {
            return;
        }
        notified.await;
    }

    /// Worker loop. Owns the write side of the socket and the response
    /// channel fed by the reader.
    pub async fn run_worker<W>(
        self: Arc<Self>,
        mut writer: W,
        mut responses: mpsc::UnboundedReceiver<Response>,
    ) where
        W: AsyncWrite + Unpin + Send,
    {
        loop {
            let entry = {
                let mut state = self.state.lock().await;
                state.entries.pop_front()
            };
            let Some(entry) = entry else {
                if !self.is_alive() {
                    break;
                }
                self.wake.notified().await;
                continue;
            };

            if !self.is_alive() {
                // popped in the window between a submit and the sweep
                let _ = entry.reply.send(Err(AgiError::ChannelDead {
                    reason: self.reason(),
                    command: entry.command,
                }));
                continue;
            }

            // a response with no in-flight owner belongs to a command that
            // already timed out; its one-shot listener is gone
            while let Ok(stale) = responses.try_recv() {
                trace!("Discarding stale response: {}", stale);
            }

            self.state.lock().await.processing = true;
            let command = entry.command;
            let started = Instant::now();

            trace!("-> {}", command);
            self.events.emit(ChannelEvent::Send {
                command: command.clone(),
            });

            if let Err(e) = writer.write_all(format!("{}\n", command).as_bytes()).await {
                warn!("Socket write failed for {}: {}", command, e);
                self.events.emit(ChannelEvent::CommandFailed {
                    command: command.clone(),
                    error: e.to_string(),
                });
                self.events.emit(ChannelEvent::Error {
                    message: e.to_string(),
                });
                let _ = entry.reply.send(Err(AgiError::Io(e)));
                self.end_cycle().await;
                continue;
            }

            let outcome = match entry.timeout.as_duration() {
                Some(limit) => tokio::time::timeout(limit, responses.recv()).await,
                None => Ok(responses.recv().await),
            };

            match outcome {
                Ok(Some(response)) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!("Command processed in {}ms: {}", duration_ms, command);
                    self.events.emit(ChannelEvent::CommandProcessed {
                        command: command.clone(),
                        duration_ms,
                    });
                    let _ = entry.reply.send(Ok(response));
                }
                Ok(None) => {
                    // reader ended; the channel is dead
                    let reason = self.reason();
                    self.events.emit(ChannelEvent::CommandFailed {
                        command: command.clone(),
                        error: format!("channel terminated ({})", reason),
                    });
                    let _ = entry.reply.send(Err(AgiError::ChannelDead {
                        reason,
                        command: command.clone(),
                    }));
                }
                Err(_) => {
                    let timeout_ms = entry
                        .timeout
                        .as_duration()
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    warn!("Command timeout after {}ms: {}", timeout_ms, command);
                    self.events.emit(ChannelEvent::Timeout {
                        command: command.clone(),
                    });
                    self.events.emit(ChannelEvent::CommandFailed {
                        command: command.clone(),
                        error: format!("Command timeout after {}ms", timeout_ms),
                    });
                    // the channel is not killed by a single timeout; the
                    // next command may still succeed
                    let _ = entry.reply.send(Err(AgiError::Timeout {
                        command: command.clone(),
                        timeout_ms,
                    }));
                }
            }

            self.end_cycle().await;
        }
        debug!("Queue worker exiting");
    }

    /// Close out one worker iteration: clear the in-flight marker, report
    /// an empty queue, and yield so a burst of instantaneous failures
    /// cannot starve concurrent work.
    async fn end_cycle(&self) {
        let empty = {
            let mut state = self.state.lock().await;
            state.processing = false;
            state.entries.is_empty()
        };
        if empty {
            self.events.emit(ChannelEvent::QueueEmpty);
        }
        tokio::task::yield_now().await;
    }
}
