//! Protocol constants and configuration defaults

/// Default FastAGI listen port (the port Asterisk's `AGI()` application
/// dials when given an `agi://` URL without an explicit port).
pub const DEFAULT_AGI_PORT: u16 = 4573;

/// Socket buffer size for reading from the TCP stream (8KB; AGI records
/// are single short text lines)
pub const SOCKET_BUF_SIZE: usize = 8192;

/// Growth chunk for the inbound parse buffer
pub const BUF_CHUNK: usize = 8192;

/// Maximum bytes the inbound buffer may accumulate without yielding a
/// complete record before the channel is treated as desynchronized (1MB)
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Record terminators
pub const HEADER_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Maximum number of queued commands per channel before `submit` rejects
/// synchronously
pub const MAX_QUEUE_SIZE: usize = 100;

/// Default per-command timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for playback-class commands (`STREAM FILE`, `SAY …`,
/// `GET DATA`, `GET OPTION`) in milliseconds
pub const PLAYBACK_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Default timeout for `RECORD FILE` in milliseconds (10 minutes)
pub const RECORD_COMMAND_TIMEOUT_MS: u64 = 600_000;

/// Upper bound on a single call, used as the `EXEC` timeout (6 hours)
pub const MAX_CALL_DURATION_MS: u64 = 21_600_000;

/// Header keys begin with this prefix; the suffix names the metadata field
pub const AGI_HEADER_PREFIX: &str = "agi_";

/// Line Asterisk sends on the command channel when the caller hangs up
pub const HANGUP_LINE: &str = "HANGUP";

/// DTMF set that interrupts the prompt in the composite digit collector
pub const ALL_DTMF: &str = "0123456789*#";
