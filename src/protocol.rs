//! AGI record framing and response-line parsing

use crate::{
    buffer::AgiBuffer,
    constants::*,
    error::{AgiError, AgiResult},
    response::{Arguments, Response},
};

/// A complete inbound record extracted by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgiRecord {
    /// The initial header block (everything before the blank line),
    /// emitted exactly once per connection
    HeaderBlock(String),
    /// One newline-terminated line of the command phase
    Line(String),
}

/// Framer state, driven by the channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    /// Accumulating the header block; a record completes at `\n\n`
    Init,
    /// Command phase; each `\n`-terminated line is one record
    Waiting,
}

/// Splits the inbound byte stream into AGI records.
///
/// Purely data-driven: it accumulates bytes and yields records, it never
/// times out. One arrival may complete several records; keep calling
/// [`next_record`](AgiFramer::next_record) until it returns `None`.
pub struct AgiFramer {
    buffer: AgiBuffer,
    state: FramerState,
}

impl AgiFramer {
    pub fn new() -> Self {
        Self {
            buffer: AgiBuffer::new(),
            state: FramerState::Init,
        }
    }

    /// Append inbound bytes, enforcing the accumulation limit
    pub fn push(&mut self, data: &[u8]) -> AgiResult<()> {
        self.buffer.extend_from_slice(data);
        self.buffer.check_size_limits()?;
        Ok(())
    }

    /// Extract the next complete record, if any
    pub fn next_record(&mut self) -> AgiResult<Option<AgiRecord>> {
        loop {
            match self.state {
                FramerState::Init => {
                    let Some(block) = self.buffer.extract_until_pattern(HEADER_TERMINATOR.as_bytes())
                    else {
                        return Ok(None);
                    };
                    self.buffer.compact();
                    let block = String::from_utf8(block)
                        .map_err(|_| AgiError::protocol("Invalid UTF-8 in header block"))?;
                    self.state = FramerState::Waiting;
                    return Ok(Some(AgiRecord::HeaderBlock(block)));
                }
                FramerState::Waiting => {
                    let Some(line) = self.buffer.extract_until_pattern(LINE_TERMINATOR.as_bytes())
                    else {
                        return Ok(None);
                    };
                    self.buffer.compact();
                    let line = String::from_utf8(line)
                        .map_err(|_| AgiError::protocol("Invalid UTF-8 in response line"))?;
                    let line = line.trim_end_matches('\r');
                    // blank lines between records carry nothing
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(AgiRecord::Line(line.to_string())));
                }
            }
        }
    }
}

impl Default for AgiFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed line of the command phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Asynchronous hangup notification; not a reply to any command
    Hangup,
    /// Reply to the in-flight command
    Response(Response),
}

/// Parse one command-phase line.
///
/// A line whose first token is the literal `HANGUP` is the asynchronous
/// hangup notification. Anything else must start with a numeric response
/// code; the remaining tokens are classified into the argument bag:
/// `key=value` pairs, parenthesized `(flag)` tokens, and bare tokens
/// stored under the synthetic `value` key.
pub fn parse_inbound_line(line: &str) -> AgiResult<InboundMessage> {
    let mut tokens = line.split_whitespace();
    let first = tokens
        .next()
        .ok_or_else(|| AgiError::protocol("Empty response line"))?;

    if first == HANGUP_LINE {
        return Ok(InboundMessage::Hangup);
    }

    let code: u16 = first.parse().map_err(|_| {
        AgiError::protocol(format!("Response line does not start with a code: {}", line))
    })?;

    let mut args = Arguments::new();
    for token in tokens {
        if token.contains('=') {
            // split on the first '=' only; values may embed further '='
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            args.insert_pair(key.trim(), value.trim());
        } else if token.starts_with('(') && token.ends_with(')') {
            args.insert_flag(&token[1..token.len() - 1]);
        } else {
            args.insert_bare(token);
        }
    }

    Ok(InboundMessage::Response(Response::new(code, args)))
}
