//! Call metadata and channel-related data types parsed from AGI exchanges.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::constants::AGI_HEADER_PREFIX;
use crate::error::AgiError;

/// Call metadata from the initial `agi_*` header block.
///
/// Written exactly once, before the first command is accepted; fields for
/// headers Asterisk did not send are empty strings. Unknown `agi_*`
/// suffixes are dropped silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallMetadata {
    /// `yes` for a FastAGI (network) session
    pub network: String,
    /// Path component of the `agi://` URL, if any
    pub network_script: String,
    /// The `agi://` URL the dialplan invoked
    pub request: String,
    /// Asterisk channel name (e.g. `SIP/1001-00000042`)
    pub channel: String,
    pub language: String,
    /// Channel technology (`SIP`, `PJSIP`, `DAHDI`, …); the wire header
    /// is `agi_type`
    pub channel_type: String,
    /// Unique call identifier (e.g. `1700000000.42`)
    pub uniqueid: String,
    /// Asterisk version string
    pub version: String,
    pub callerid: String,
    pub calleridname: String,
    pub callingpres: String,
    pub callingani2: String,
    pub callington: String,
    pub callingtns: String,
    /// Dialed number identifier
    pub dnid: String,
    /// Redirecting number
    pub rdnis: String,
    /// Dialplan context the call came from
    pub context: String,
    pub extension: String,
    pub priority: String,
    /// `1.0` when the session was started with `EAGI`
    pub enhanced: String,
    pub accountcode: String,
    pub threadid: String,
}

impl CallMetadata {
    /// Parse a header block (the record before the blank line).
    ///
    /// Each line is split on the first `:`, both sides trimmed; only keys
    /// carrying the `agi_` prefix contribute, named by their suffix.
    pub fn parse(block: &str) -> Self {
        let mut meta = Self::default();
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let Some(field) = key.strip_prefix(AGI_HEADER_PREFIX) else {
                continue;
            };
            match field {
                "network" => meta.network = value.to_string(),
                "network_script" => meta.network_script = value.to_string(),
                "request" => meta.request = value.to_string(),
                "channel" => meta.channel = value.to_string(),
                "language" => meta.language = value.to_string(),
                "type" => meta.channel_type = value.to_string(),
                "uniqueid" => meta.uniqueid = value.to_string(),
                "version" => meta.version = value.to_string(),
                "callerid" => meta.callerid = value.to_string(),
                "calleridname" => meta.calleridname = value.to_string(),
                "callingpres" => meta.callingpres = value.to_string(),
                "callingani2" => meta.callingani2 = value.to_string(),
                "callington" => meta.callington = value.to_string(),
                "callingtns" => meta.callingtns = value.to_string(),
                "dnid" => meta.dnid = value.to_string(),
                "rdnis" => meta.rdnis = value.to_string(),
                "context" => meta.context = value.to_string(),
                "extension" => meta.extension = value.to_string(),
                "priority" => meta.priority = value.to_string(),
                "enhanced" => meta.enhanced = value.to_string(),
                "accountcode" => meta.accountcode = value.to_string(),
                "threadid" => meta.threadid = value.to_string(),
                unknown => {
                    tracing::trace!("Ignoring unknown AGI header suffix: {}", unknown);
                }
            }
        }
        meta
    }
}

/// Channel state as reported by `CHANNEL STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelStatus {
    /// Channel is down and available
    Down,
    /// Channel is down but reserved
    DownReserved,
    /// Channel is off hook
    OffHook,
    /// Digits (or equivalent) have been dialed
    DigitsDialed,
    /// Line is ringing
    Ringing,
    /// Remote end is ringing
    RemoteRinging,
    /// Line is up
    Up,
    /// Line is busy
    Busy,
}

impl ChannelStatus {
    /// Map the numeric `result` of `CHANNEL STATUS` to a state
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Down),
            1 => Some(Self::DownReserved),
            2 => Some(Self::OffHook),
            3 => Some(Self::DigitsDialed),
            4 => Some(Self::Ringing),
            5 => Some(Self::RemoteRinging),
            6 => Some(Self::Up),
            7 => Some(Self::Busy),
            _ => None,
        }
    }
}

/// Outcome of a `Dial`, read from the `DIALSTATUS` channel variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DialStatus {
    Answer,
    Busy,
    NoAnswer,
    Cancel,
    Congestion,
    ChanUnavail,
    DontCall,
    Torture,
    InvalidArgs,
}

impl FromStr for DialStatus {
    type Err = AgiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANSWER" => Ok(Self::Answer),
            "BUSY" => Ok(Self::Busy),
            "NOANSWER" => Ok(Self::NoAnswer),
            "CANCEL" => Ok(Self::Cancel),
            "CONGESTION" => Ok(Self::Congestion),
            "CHANUNAVAIL" => Ok(Self::ChanUnavail),
            "DONTCALL" => Ok(Self::DontCall),
            "TORTURE" => Ok(Self::Torture),
            "INVALIDARGS" => Ok(Self::InvalidArgs),
            other => Err(AgiError::UnknownDialStatus {
                status: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Answer => "ANSWER",
            Self::Busy => "BUSY",
            Self::NoAnswer => "NOANSWER",
            Self::Cancel => "CANCEL",
            Self::Congestion => "CONGESTION",
            Self::ChanUnavail => "CHANUNAVAIL",
            Self::DontCall => "DONTCALL",
            Self::Torture => "TORTURE",
            Self::InvalidArgs => "INVALIDARGS",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a controlled playback, read from `CPLAYBACKSTATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackStatus {
    Success,
    UserStopped,
    RemoteStopped,
    Error,
}

impl FromStr for PlaybackStatus {
    type Err = AgiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "USERSTOPPED" => Ok(Self::UserStopped),
            "REMOTESTOPPED" => Ok(Self::RemoteStopped),
            "ERROR" => Ok(Self::Error),
            other => Err(AgiError::UnknownPlaybackStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Digits collected by `GET DATA` (native or composite).
///
/// `timed_out` is `true` only when no digits at all were collected;
/// partial collections report `false` even when the budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataResult {
    pub digits: String,
    pub timed_out: bool,
}

/// Result of `STREAM FILE` / `GET OPTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackResult {
    /// DTMF digit that interrupted playback, if any
    pub digit: Option<char>,
    /// Sample offset where playback ended
    pub endpos: i64,
}

/// Result of `RECORD FILE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordResult {
    /// DTMF digit that stopped the recording, if any
    pub digit: Option<char>,
    /// Sample offset where the recording ended
    pub endpos: i64,
    /// `true` when the recording stopped on timeout
    pub timed_out: bool,
}

/// Result of `RECEIVE TEXT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveResult {
    pub text: String,
    pub timed_out: bool,
}

/// Result of `CONTROL STREAM FILE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlStreamResult {
    pub status: PlaybackStatus,
    /// Playback offset in milliseconds, from `CPLAYBACKOFFSET`
    pub offset_ms: i64,
}
