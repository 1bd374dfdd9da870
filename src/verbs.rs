//! The AGI command library: one operation per verb.
//!
//! Each operation formats the wire command in the Asterisk-documented
//! argument order, submits it through the command queue, and maps the
//! response `code`/`result` to a typed outcome. The common failure
//! convention: `code != 200`, or `result` at a verb-specific sentinel
//! (`-1` I/O or channel failure, `0` not found / not set, `-2`
//! application not found).

use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::{
    ChannelStatus, ControlStreamResult, DialStatus, GetDataResult, PlaybackResult, ReceiveResult,
    RecordResult,
};
use crate::command::{AgiCommand, CommandTimeout};
use crate::connection::AgiChannel;
use crate::constants::{ALL_DTMF, DEFAULT_COMMAND_TIMEOUT_MS};
use crate::error::{AgiError, AgiResult};

/// Millisecond budget converted for verbs that take whole seconds on the
/// wire; a sub-second remainder still waits a full second.
fn wire_seconds(timeout: Duration) -> i64 {
    let ms = timeout.as_millis() as i64;
    (ms + 999) / 1000
}

impl AgiChannel {
    /// Submit, then require `code == 200` and an exact `result`
    async fn assertive(
        &self,
        command: AgiCommand,
        expected: i64,
        message: &'static str,
    ) -> AgiResult<()> {
        let command = command.to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result != expected {
            return Err(AgiError::command_failed(command, message));
        }
        Ok(())
    }

    /// Submit, require `result == 1`, and return the unnamed payload
    async fn fetch(&self, command: AgiCommand, message: &'static str) -> AgiResult<String> {
        let command = command.to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result != 1 {
            return Err(AgiError::command_failed(command, message));
        }
        Ok(resp.args.nokey().unwrap_or("").to_string())
    }

    /// Submit a playback-class verb and return the interrupting digit
    async fn playback_digit(
        &self,
        command: AgiCommand,
        message: &'static str,
    ) -> AgiResult<Option<char>> {
        let command = command.to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, message));
        }
        Ok(resp.args.char_value("result"))
    }

    /// `ANSWER`: pick up the channel
    pub async fn answer(&self) -> AgiResult<()> {
        self.assertive(AgiCommand::Answer, 0, "Could not answer call")
            .await
    }

    /// `NOOP`: round-trip without side effects
    pub async fn noop(&self) -> AgiResult<()> {
        self.assertive(AgiCommand::Noop, 0, "NOOP failed").await
    }

    /// `HANGUP`: hang up the current channel
    pub async fn hangup(&self) -> AgiResult<()> {
        self.assertive(
            AgiCommand::Hangup { channel: None },
            1,
            "Could not hang up call",
        )
        .await
    }

    /// `SET CONTEXT`: move the dialplan continuation point
    pub async fn set_context(&self, context: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetContext {
                context: context.to_string(),
            },
            0,
            "Could not set context",
        )
        .await
    }

    /// `SET EXTENSION`
    pub async fn set_extension(&self, extension: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetExtension {
                extension: extension.to_string(),
            },
            0,
            "Could not set extension",
        )
        .await
    }

    /// `SET PRIORITY`
    pub async fn set_priority(&self, priority: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetPriority {
                priority: priority.to_string(),
            },
            0,
            "Could not set priority",
        )
        .await
    }

    /// `SET VARIABLE`: set a channel variable
    pub async fn set_variable(&self, name: &str, value: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetVariable {
                name: name.to_string(),
                value: value.to_string(),
            },
            1,
            "Could not set variable",
        )
        .await
    }

    /// `SET AUTOHANGUP`: hang up this channel `seconds` from now (0
    /// cancels)
    pub async fn set_auto_hangup(&self, seconds: u32) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetAutoHangup { seconds },
            0,
            "Could not set autohangup",
        )
        .await
    }

    /// `SET MUSIC`: toggle hold music, optionally naming a class
    pub async fn set_music(&self, on: bool, class: Option<&str>) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SetMusic {
                on,
                class: class.map(str::to_string),
            },
            0,
            "Could not set music",
        )
        .await
    }

    /// `TDD MODE`: toggle TDD transmission on a capable channel
    pub async fn tdd_mode(&self, on: bool) -> AgiResult<()> {
        self.assertive(AgiCommand::TddMode { on }, 1, "Could not set TDD mode")
            .await
    }

    /// `VERBOSE`: write to the Asterisk console at `level`
    pub async fn verbose(&self, message: &str, level: u8) -> AgiResult<()> {
        self.assertive(
            AgiCommand::Verbose {
                message: message.to_string(),
                level,
            },
            1,
            "Could not send verbose message",
        )
        .await
    }

    /// `SEND IMAGE`: send an image on supporting channels
    pub async fn send_image(&self, image: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SendImage {
                image: image.to_string(),
            },
            0,
            "Could not send image",
        )
        .await
    }

    /// `SEND TEXT`: send text on supporting channels
    pub async fn send_text(&self, text: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::SendText {
                text: text.to_string(),
            },
            0,
            "Could not send text",
        )
        .await
    }

    /// `GOSUB`: run a dialplan subroutine, returning here afterwards
    pub async fn go_sub(
        &self,
        context: &str,
        extension: &str,
        priority: &str,
        args: Option<&str>,
    ) -> AgiResult<()> {
        self.assertive(
            AgiCommand::GoSub {
                context: context.to_string(),
                extension: extension.to_string(),
                priority: priority.to_string(),
                args: args.map(str::to_string),
            },
            0,
            "Could not execute Gosub",
        )
        .await
    }

    /// `GET VARIABLE`: read a channel variable
    pub async fn get_variable(&self, name: &str) -> AgiResult<String> {
        self.fetch(
            AgiCommand::GetVariable {
                name: name.to_string(),
            },
            "Variable not set",
        )
        .await
    }

    /// `GET FULL VARIABLE`: evaluate an expression with full variable
    /// substitution, optionally against another channel
    pub async fn get_full_variable(&self, expr: &str, channel: Option<&str>) -> AgiResult<String> {
        self.fetch(
            AgiCommand::GetFullVariable {
                expr: expr.to_string(),
                channel: channel.map(str::to_string),
            },
            "Variable not set",
        )
        .await
    }

    /// `DATABASE GET`: read an AstDB entry
    pub async fn database_get(&self, family: &str, key: &str) -> AgiResult<String> {
        self.fetch(
            AgiCommand::DatabaseGet {
                family: family.to_string(),
                key: key.to_string(),
            },
            "Database entry not found",
        )
        .await
    }

    /// `DATABASE PUT`: write an AstDB entry
    pub async fn database_put(&self, family: &str, key: &str, value: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::DatabasePut {
                family: family.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
            1,
            "Could not write database entry",
        )
        .await
    }

    /// `DATABASE DEL`: remove an AstDB entry
    pub async fn database_del(&self, family: &str, key: &str) -> AgiResult<()> {
        self.assertive(
            AgiCommand::DatabaseDel {
                family: family.to_string(),
                key: key.to_string(),
            },
            1,
            "Could not delete database entry",
        )
        .await
    }

    /// `DATABASE DELTREE`: remove a whole AstDB family or keytree.
    /// Returns whether the tree existed.
    pub async fn database_del_tree(&self, family: &str, keytree: Option<&str>) -> AgiResult<bool> {
        let command = AgiCommand::DatabaseDelTree {
            family: family.to_string(),
            keytree: keytree.map(str::to_string),
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(
                command,
                "Could not delete database tree",
            ));
        }
        Ok(resp.result == 1)
    }

    /// `CHANNEL STATUS`: current state of the channel
    pub async fn channel_status(&self) -> AgiResult<ChannelStatus> {
        let command = AgiCommand::ChannelStatus { channel: None }.to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(
                command,
                "Could not get channel status",
            ));
        }
        ChannelStatus::from_code(resp.result)
            .ok_or(AgiError::UnknownChannelStatus { code: resp.result })
    }

    /// `EXEC`: run any dialplan application; returns the application's
    /// numeric result
    pub async fn exec(&self, application: &str, options: &str) -> AgiResult<i64> {
        let command = AgiCommand::Exec {
            application: application.to_string(),
            options: options.to_string(),
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.result == -2 {
            return Err(AgiError::command_failed(command, "Application not found"));
        }
        if resp.code != 200 {
            return Err(AgiError::command_failed(
                command,
                "Could not execute application",
            ));
        }
        Ok(resp.result)
    }

    /// `EXEC Dial`, then classify the outcome from `DIALSTATUS`
    pub async fn dial(
        &self,
        target: &str,
        timeout_secs: u32,
        params: Option<&str>,
    ) -> AgiResult<DialStatus> {
        let options = match params {
            Some(p) => format!("{},{},{}", target, timeout_secs, p),
            None => format!("{},{}", target, timeout_secs),
        };
        self.exec("Dial", &options).await?;
        let status = self.get_variable("DIALSTATUS").await?;
        status.parse()
    }

    /// `STREAM FILE` without the playback-status check; the composite
    /// digit collector builds on this
    async fn stream_file_raw(&self, file: &str, escape_digits: &str) -> AgiResult<PlaybackResult> {
        let command = AgiCommand::StreamFile {
            file: file.to_string(),
            escape_digits: escape_digits.to_string(),
            offset: None,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error streaming file"));
        }
        Ok(PlaybackResult {
            digit: resp.args.char_value("result"),
            endpos: resp.args.number("endpos"),
        })
    }

    /// `STREAM FILE`: play audio, interruptible by `escape_digits`.
    /// Verifies `PLAYBACKSTATUS` reports `SUCCESS` after the fact.
    pub async fn stream_file(&self, file: &str, escape_digits: &str) -> AgiResult<PlaybackResult> {
        let result = self.stream_file_raw(file, escape_digits).await?;
        let status = self.get_variable("PLAYBACKSTATUS").await?;
        if status != "SUCCESS" {
            return Err(AgiError::command_failed(
                format!("STREAM FILE {} \"{}\"", file, escape_digits),
                format!("Playback failed: {}", status),
            ));
        }
        Ok(result)
    }

    /// `GET OPTION`: play audio and wait up to `timeout` for one digit
    pub async fn get_option(
        &self,
        file: &str,
        escape_digits: &str,
        timeout: Option<Duration>,
    ) -> AgiResult<PlaybackResult> {
        let command = AgiCommand::GetOption {
            file: file.to_string(),
            escape_digits: escape_digits.to_string(),
            timeout_ms: timeout.map(|d| d.as_millis() as i64),
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Could not get option"));
        }
        Ok(PlaybackResult {
            digit: resp.args.char_value("result"),
            endpos: resp.args.number("endpos"),
        })
    }

    /// `SAY ALPHA`: spell a string character by character
    pub async fn say_alpha(&self, text: &str, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayAlpha {
                text: text.to_string(),
                escape_digits: escape_digits.to_string(),
            },
            "Error saying alpha string",
        )
        .await
    }

    /// `SAY DIGITS`: read digits one at a time
    pub async fn say_digits(&self, digits: &str, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayDigits {
                digits: digits.to_string(),
                escape_digits: escape_digits.to_string(),
            },
            "Error saying digits",
        )
        .await
    }

    /// `SAY NUMBER`: read a number in natural form
    pub async fn say_number(&self, number: i64, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayNumber {
                number,
                escape_digits: escape_digits.to_string(),
            },
            "Error saying number",
        )
        .await
    }

    /// `SAY PHONETIC`: spell a string with the phonetic alphabet
    pub async fn say_phonetic(&self, text: &str, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayPhonetic {
                text: text.to_string(),
                escape_digits: escape_digits.to_string(),
            },
            "Error saying phonetic string",
        )
        .await
    }

    /// `SAY DATE`: read a date given as epoch seconds
    pub async fn say_date(&self, epoch: i64, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayDate {
                epoch,
                escape_digits: escape_digits.to_string(),
            },
            "Error saying date",
        )
        .await
    }

    /// `SAY TIME`: read a time of day given as epoch seconds
    pub async fn say_time(&self, epoch: i64, escape_digits: &str) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayTime {
                epoch,
                escape_digits: escape_digits.to_string(),
            },
            "Error saying time",
        )
        .await
    }

    /// `SAY DATETIME`: read a date and time, optionally with an explicit
    /// format and timezone
    pub async fn say_datetime(
        &self,
        epoch: i64,
        escape_digits: &str,
        format: Option<&str>,
        timezone: Option<&str>,
    ) -> AgiResult<Option<char>> {
        self.playback_digit(
            AgiCommand::SayDateTime {
                epoch,
                escape_digits: escape_digits.to_string(),
                format: format.map(str::to_string),
                timezone: timezone.map(str::to_string),
            },
            "Error saying datetime",
        )
        .await
    }

    /// `WAIT FOR DIGIT`: wait up to `timeout` for one DTMF digit;
    /// `None` on timeout
    pub async fn wait_for_digit(&self, timeout: Duration) -> AgiResult<Option<char>> {
        let wire = wire_seconds(timeout);
        let command = AgiCommand::WaitForDigit { timeout_secs: wire }.to_string();
        // the queue timer must outlast the wire timer
        let queue_timeout =
            CommandTimeout::After(timeout + Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS));
        let resp = self
            .send_command_with_timeout(&command, queue_timeout)
            .await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error waiting for digit"));
        }
        Ok(resp.args.char_value("result"))
    }

    /// `RECEIVE CHAR`: receive one character on supporting channels
    pub async fn receive_char(&self, timeout: Duration) -> AgiResult<ReceiveResult> {
        let command = AgiCommand::ReceiveChar {
            timeout_ms: timeout.as_millis() as i64,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error receiving char"));
        }
        Ok(ReceiveResult {
            text: resp.args.char_value("result").map(String::from).unwrap_or_default(),
            timed_out: resp.args.boolean("timeout"),
        })
    }

    /// `RECEIVE TEXT`: receive text on supporting channels
    pub async fn receive_text(&self, timeout: Duration) -> AgiResult<ReceiveResult> {
        let command = AgiCommand::ReceiveText {
            timeout_ms: timeout.as_millis() as i64,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error receiving text"));
        }
        Ok(ReceiveResult {
            text: resp.args.nokey().unwrap_or("").to_string(),
            timed_out: resp.args.boolean("timeout"),
        })
    }

    /// `RECORD FILE`: record channel audio to a file.
    ///
    /// `timeout` of `None` records without a time bound (wire `-1`).
    pub async fn record_file(
        &self,
        file: &str,
        format: &str,
        escape_digits: &str,
        timeout: Option<Duration>,
        beep: bool,
        silence_secs: Option<u32>,
    ) -> AgiResult<RecordResult> {
        let command = AgiCommand::RecordFile {
            file: file.to_string(),
            format: format.to_string(),
            escape_digits: escape_digits.to_string(),
            timeout_ms: timeout.map(|d| d.as_millis() as i64).unwrap_or(-1),
            beep,
            silence_secs,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error recording file"));
        }
        Ok(RecordResult {
            digit: resp.args.char_value("result"),
            endpos: resp.args.number("endpos"),
            timed_out: resp.args.boolean("timeout"),
        })
    }

    /// `CONTROL STREAM FILE`: play audio with caller-side transport
    /// controls, then classify the outcome from `CPLAYBACKSTATUS` /
    /// `CPLAYBACKOFFSET`
    pub async fn control_stream_file(
        &self,
        file: &str,
        escape_digits: &str,
        skip_ms: Option<i64>,
    ) -> AgiResult<ControlStreamResult> {
        let command = AgiCommand::ControlStreamFile {
            file: file.to_string(),
            escape_digits: escape_digits.to_string(),
            skip_ms,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error streaming file"));
        }
        let status = self.get_variable("CPLAYBACKSTATUS").await?.parse()?;
        let offset_ms = self
            .get_variable("CPLAYBACKOFFSET")
            .await?
            .parse()
            .unwrap_or(0);
        Ok(ControlStreamResult { status, offset_ms })
    }

    /// `ASYNCAGI BREAK`: end async AGI processing; the channel is closed
    /// on success
    pub async fn async_break(&self) -> AgiResult<()> {
        self.assertive(AgiCommand::AsyncAgiBreak, 0, "Could not break AGI session")
            .await?;
        self.close().await;
        Ok(())
    }

    /// Collect DTMF digits, playing `file` first.
    ///
    /// **Simple mode** (no `max_digits`, `max_digits <= 1`, or no
    /// `inter_digit_timeout`): one native `GET DATA` round trip.
    ///
    /// **Composite mode** (`max_digits > 1` and an inter-digit bound):
    /// the native verb cannot express an inter-digit timeout distinct from
    /// the total budget, so the collector is built from `STREAM FILE` and
    /// repeated `WAIT FOR DIGIT`. The `timeout` budget starts only after
    /// the audio ends; audio never consumes collection time.
    ///
    /// `timed_out` is `true` only when no digits at all were collected.
    pub async fn get_data(
        &self,
        file: &str,
        timeout: Duration,
        max_digits: Option<u32>,
        inter_digit_timeout: Option<Duration>,
    ) -> AgiResult<GetDataResult> {
        match (max_digits, inter_digit_timeout) {
            (Some(max), Some(inter)) if max > 1 => {
                self.get_data_composite(file, timeout, max, inter).await
            }
            _ => self.get_data_simple(file, timeout, max_digits).await,
        }
    }

    async fn get_data_simple(
        &self,
        file: &str,
        timeout: Duration,
        max_digits: Option<u32>,
    ) -> AgiResult<GetDataResult> {
        let command = AgiCommand::GetData {
            file: file.to_string(),
            timeout_ms: Some(timeout.as_millis() as i64),
            max_digits,
        }
        .to_string();
        let resp = self.send_command(&command).await?;
        if resp.code != 200 || resp.result == -1 {
            return Err(AgiError::command_failed(command, "Error getting data"));
        }
        Ok(GetDataResult {
            // GET DATA carries the digit string in the result field itself
            digits: resp.result_text().unwrap_or("").to_string(),
            timed_out: resp.args.boolean("timeout"),
        })
    }

    async fn get_data_composite(
        &self,
        file: &str,
        total: Duration,
        max_digits: u32,
        inter_digit: Duration,
    ) -> AgiResult<GetDataResult> {
        let mut digits = String::new();

        // any DTMF interrupts the prompt and counts as the first digit
        let play = self.stream_file_raw(file, ALL_DTMF).await?;
        if let Some(d) = play.digit {
            digits.push(d);
        }
        if digits.len() >= max_digits as usize {
            return Ok(GetDataResult {
                digits,
                timed_out: false,
            });
        }

        // the total budget starts only after audio ends
        let deadline = Instant::now() + total;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.wait_for_digit(inter_digit.min(remaining)).await? {
                None => {
                    debug!("Inter-digit timeout with {} digits collected", digits.len());
                    return Ok(GetDataResult {
                        timed_out: digits.is_empty(),
                        digits,
                    });
                }
                Some(d) => {
                    digits.push(d);
                    if digits.len() >= max_digits as usize {
                        return Ok(GetDataResult {
                            digits,
                            timed_out: false,
                        });
                    }
                }
            }
        }
        Ok(GetDataResult {
            timed_out: digits.is_empty(),
            digits,
        })
    }
}
