//! AGI verb formatting and per-command timeout selection

use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, MAX_CALL_DURATION_MS, PLAYBACK_COMMAND_TIMEOUT_MS,
    RECORD_COMMAND_TIMEOUT_MS,
};

/// Effective timeout for one queued command.
///
/// Unbounded is a distinct state rather than a magic number; a command
/// without a timer terminates only with the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTimeout {
    /// Reject the submitter after this long without a response
    After(Duration),
    /// No timer; rely on channel liveness
    Unbounded,
}

impl CommandTimeout {
    /// Explicit caller-provided timeout in milliseconds. Zero or negative
    /// means unbounded.
    pub fn from_millis(ms: i64) -> Self {
        if ms <= 0 {
            Self::Unbounded
        } else {
            Self::After(Duration::from_millis(ms as u64))
        }
    }

    /// Context-sensitive default, selected by the command's leading verb.
    ///
    /// Playback-class verbs wait on audio, `RECORD FILE` on the caller,
    /// and `EXEC` on a whole dialplan application (bounded only by the
    /// maximum call duration). Everything else, including the quick verbs
    /// (`ANSWER`, `HANGUP`, `CHANNEL STATUS`, `GET VARIABLE`,
    /// `SET VARIABLE`, `DATABASE …`), shares the short default.
    pub fn for_command(command: &str) -> Self {
        Self::for_command_with_default(command, Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS))
    }

    /// [`for_command`](Self::for_command) with the short default replaced
    /// by a construction-time configured value
    pub fn for_command_with_default(command: &str, default: Duration) -> Self {
        const PLAYBACK_VERBS: [&str; 4] = ["STREAM FILE", "SAY ", "GET DATA", "GET OPTION"];

        if PLAYBACK_VERBS.iter().any(|v| command.starts_with(v)) {
            Self::After(Duration::from_millis(PLAYBACK_COMMAND_TIMEOUT_MS))
        } else if command.starts_with("RECORD FILE") {
            Self::After(Duration::from_millis(RECORD_COMMAND_TIMEOUT_MS))
        } else if command.starts_with("EXEC") {
            Self::After(Duration::from_millis(MAX_CALL_DURATION_MS))
        } else {
            Self::After(default)
        }
    }

    /// Timer duration, `None` when unbounded
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::After(d) => Some(*d),
            Self::Unbounded => None,
        }
    }
}

/// One AGI verb with its arguments, formatted to the wire by `Display`.
///
/// Argument order follows the Asterisk AGI command reference. Escape-digit
/// sets and free text are double-quoted; single-word operands are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgiCommand {
    Answer,
    AsyncAgiBreak,
    ChannelStatus {
        channel: Option<String>,
    },
    ControlStreamFile {
        file: String,
        escape_digits: String,
        skip_ms: Option<i64>,
    },
    DatabaseDel {
        family: String,
        key: String,
    },
    DatabaseDelTree {
        family: String,
        keytree: Option<String>,
    },
    DatabaseGet {
        family: String,
        key: String,
    },
    DatabasePut {
        family: String,
        key: String,
        value: String,
    },
    Exec {
        application: String,
        options: String,
    },
    GetData {
        file: String,
        timeout_ms: Option<i64>,
        max_digits: Option<u32>,
    },
    GetFullVariable {
        expr: String,
        channel: Option<String>,
    },
    GetOption {
        file: String,
        escape_digits: String,
        timeout_ms: Option<i64>,
    },
    GetVariable {
        name: String,
    },
    Hangup {
        channel: Option<String>,
    },
    Noop,
    ReceiveChar {
        timeout_ms: i64,
    },
    ReceiveText {
        timeout_ms: i64,
    },
    RecordFile {
        file: String,
        format: String,
        escape_digits: String,
        timeout_ms: i64,
        beep: bool,
        silence_secs: Option<u32>,
    },
    SayAlpha {
        text: String,
        escape_digits: String,
    },
    SayDate {
        epoch: i64,
        escape_digits: String,
    },
    SayDateTime {
        epoch: i64,
        escape_digits: String,
        format: Option<String>,
        timezone: Option<String>,
    },
    SayDigits {
        digits: String,
        escape_digits: String,
    },
    SayNumber {
        number: i64,
        escape_digits: String,
    },
    SayPhonetic {
        text: String,
        escape_digits: String,
    },
    SayTime {
        epoch: i64,
        escape_digits: String,
    },
    SendImage {
        image: String,
    },
    SendText {
        text: String,
    },
    SetAutoHangup {
        seconds: u32,
    },
    SetContext {
        context: String,
    },
    SetExtension {
        extension: String,
    },
    SetMusic {
        on: bool,
        class: Option<String>,
    },
    SetPriority {
        priority: String,
    },
    SetVariable {
        name: String,
        value: String,
    },
    StreamFile {
        file: String,
        escape_digits: String,
        offset: Option<i64>,
    },
    TddMode {
        on: bool,
    },
    Verbose {
        message: String,
        level: u8,
    },
    WaitForDigit {
        timeout_secs: i64,
    },
    GoSub {
        context: String,
        extension: String,
        priority: String,
        args: Option<String>,
    },
}

impl fmt::Display for AgiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answer => write!(f, "ANSWER"),
            Self::AsyncAgiBreak => write!(f, "ASYNCAGI BREAK"),
            Self::ChannelStatus { channel } => match channel {
                Some(c) => write!(f, "CHANNEL STATUS {}", c),
                None => write!(f, "CHANNEL STATUS"),
            },
            Self::ControlStreamFile {
                file,
                escape_digits,
                skip_ms,
            } => {
                write!(f, "CONTROL STREAM FILE {} \"{}\"", file, escape_digits)?;
                if let Some(s) = skip_ms {
                    write!(f, " {}", s)?;
                }
                Ok(())
            }
            Self::DatabaseDel { family, key } => write!(f, "DATABASE DEL {} {}", family, key),
            Self::DatabaseDelTree { family, keytree } => {
                write!(f, "DATABASE DELTREE {}", family)?;
                if let Some(kt) = keytree {
                    write!(f, " {}", kt)?;
                }
                Ok(())
            }
            Self::DatabaseGet { family, key } => write!(f, "DATABASE GET {} {}", family, key),
            Self::DatabasePut { family, key, value } => {
                write!(f, "DATABASE PUT {} {} {}", family, key, value)
            }
            Self::Exec {
                application,
                options,
            } => {
                if options.is_empty() {
                    write!(f, "EXEC {}", application)
                } else {
                    write!(f, "EXEC {} {}", application, options)
                }
            }
            Self::GetData {
                file,
                timeout_ms,
                max_digits,
            } => {
                write!(f, "GET DATA {}", file)?;
                if let Some(t) = timeout_ms {
                    write!(f, " {}", t)?;
                }
                if let Some(m) = max_digits {
                    write!(f, " {}", m)?;
                }
                Ok(())
            }
            Self::GetFullVariable { expr, channel } => {
                write!(f, "GET FULL VARIABLE {}", expr)?;
                if let Some(c) = channel {
                    write!(f, " {}", c)?;
                }
                Ok(())
            }
            Self::GetOption {
                file,
                escape_digits,
                timeout_ms,
            } => {
                write!(f, "GET OPTION {} \"{}\"", file, escape_digits)?;
                if let Some(t) = timeout_ms {
                    write!(f, " {}", t)?;
                }
                Ok(())
            }
            Self::GetVariable { name } => write!(f, "GET VARIABLE {}", name),
            // the channel operand defaults to the current channel; Asterisk
            // accepts the bare trailing space
            Self::Hangup { channel } => {
                write!(f, "HANGUP {}", channel.as_deref().unwrap_or(""))
            }
            Self::Noop => write!(f, "NOOP"),
            Self::ReceiveChar { timeout_ms } => write!(f, "RECEIVE CHAR {}", timeout_ms),
            Self::ReceiveText { timeout_ms } => write!(f, "RECEIVE TEXT {}", timeout_ms),
            Self::RecordFile {
                file,
                format,
                escape_digits,
                timeout_ms,
                beep,
                silence_secs,
            } => {
                write!(
                    f,
                    "RECORD FILE {} {} \"{}\" {}",
                    file, format, escape_digits, timeout_ms
                )?;
                if *beep {
                    write!(f, " BEEP")?;
                }
                if let Some(s) = silence_secs {
                    write!(f, " s={}", s)?;
                }
                Ok(())
            }
            Self::SayAlpha {
                text,
                escape_digits,
            } => write!(f, "SAY ALPHA {} \"{}\"", text, escape_digits),
            Self::SayDate {
                epoch,
                escape_digits,
            } => write!(f, "SAY DATE {} \"{}\"", epoch, escape_digits),
            Self::SayDateTime {
                epoch,
                escape_digits,
                format,
                timezone,
            } => {
                write!(f, "SAY DATETIME {} \"{}\"", epoch, escape_digits)?;
                if let Some(fmt) = format {
                    write!(f, " {}", fmt)?;
                }
                if let Some(tz) = timezone {
                    write!(f, " {}", tz)?;
                }
                Ok(())
            }
            Self::SayDigits {
                digits,
                escape_digits,
            } => write!(f, "SAY DIGITS {} \"{}\"", digits, escape_digits),
            Self::SayNumber {
                number,
                escape_digits,
            } => write!(f, "SAY NUMBER {} \"{}\"", number, escape_digits),
            Self::SayPhonetic {
                text,
                escape_digits,
            } => write!(f, "SAY PHONETIC {} \"{}\"", text, escape_digits),
            Self::SayTime {
                epoch,
                escape_digits,
            } => write!(f, "SAY TIME {} \"{}\"", epoch, escape_digits),
            Self::SendImage { image } => write!(f, "SEND IMAGE {}", image),
            Self::SendText { text } => write!(f, "SEND TEXT \"{}\"", text),
            Self::SetAutoHangup { seconds } => write!(f, "SET AUTOHANGUP {}", seconds),
            Self::SetContext { context } => write!(f, "SET CONTEXT {}", context),
            Self::SetExtension { extension } => write!(f, "SET EXTENSION {}", extension),
            Self::SetMusic { on, class } => {
                write!(f, "SET MUSIC {}", if *on { "ON" } else { "OFF" })?;
                if let Some(c) = class {
                    write!(f, " {}", c)?;
                }
                Ok(())
            }
            Self::SetPriority { priority } => write!(f, "SET PRIORITY {}", priority),
            Self::SetVariable { name, value } => {
                write!(f, "SET VARIABLE {} \"{}\"", name, value)
            }
            Self::StreamFile {
                file,
                escape_digits,
                offset,
            } => {
                write!(f, "STREAM FILE {} \"{}\"", file, escape_digits)?;
                if let Some(o) = offset {
                    write!(f, " {}", o)?;
                }
                Ok(())
            }
            Self::TddMode { on } => write!(f, "TDD MODE {}", if *on { "ON" } else { "OFF" }),
            Self::Verbose { message, level } => write!(f, "VERBOSE \"{}\" {}", message, level),
            Self::WaitForDigit { timeout_secs } => write!(f, "WAIT FOR DIGIT {}", timeout_secs),
            Self::GoSub {
                context,
                extension,
                priority,
                args,
            } => {
                write!(f, "GOSUB {} {} {}", context, extension, priority)?;
                if let Some(a) = args {
                    write!(f, " {}", a)?;
                }
                Ok(())
            }
        }
    }
}
