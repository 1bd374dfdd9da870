//! Integration tests driving a real channel against a mock Asterisk peer


use std::time::Duration;

use fastagi_tokio::{
    AgiError, ChannelConfig, ChannelEvent, ChannelEventStream, ChannelStatus, CommandTimeout,
    DialStatus, TerminateReason,
};
use mock_server::{setup_channel, setup_channel_with};

/// Consume events until `pred` accepts one; panics after 5 s
async fn wait_for_event<F>(events: &mut ChannelEventStream, mut pred: F) -> ChannelEvent
where
    F: FnMut(&ChannelEvent) -> bool,
{
    let deadline = Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout(deadline, events.recv())
            .await
            .expect("timeout waiting for event")
            .expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn metadata_is_parsed_from_headers() {
    let (_mock, channel, _events) = setup_channel().await;
    let meta = channel.metadata();
    assert_eq!(meta.network, "yes");
    assert_eq!(meta.channel, "SIP/1001-00000042");
    assert_eq!(meta.channel_type, "SIP");
    assert_eq!(meta.uniqueid, "1700000000.42");
    assert_eq!(meta.callerid, "1001");
    assert_eq!(meta.calleridname, "Alice");
    assert_eq!(meta.extension, "600");
    assert!(channel.is_alive());
}

// S1: ANSWER then HANGUP, both resolve; exact wire trace
#[tokio::test]
async fn simple_answer_hangup() {
    let (mut mock, channel, _events) = setup_channel().await;

    let flow = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel.answer().await?;
            channel.hangup().await
        }
    });

    assert_eq!(mock.read_command().await, "ANSWER");
    mock.reply("200 result=0").await;
    assert_eq!(mock.read_command().await, "HANGUP ");
    mock.reply("200 result=1").await;

    flow.await.unwrap().unwrap();
}

// S2: GET VARIABLE success returns the parenthesized payload
#[tokio::test]
async fn get_variable_success() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.get_variable("FOO").await }
    });

    assert_eq!(mock.read_command().await, "GET VARIABLE FOO");
    mock.reply("200 result=1 (bar)").await;

    assert_eq!(task.await.unwrap().unwrap(), "bar");
}

// S3: GET VARIABLE unset rejects with "Variable not set"
#[tokio::test]
async fn get_variable_unset() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.get_variable("FOO").await }
    });

    mock.read_command().await;
    mock.reply("200 result=0").await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AgiError::CommandFailed { .. }));
    assert!(err.to_string().contains("Variable not set"));
    // the channel stays alive after a verb rejection
    assert!(channel.is_alive());
}

// S4: concurrent submissions hit the wire in FIFO order and resolve in order
#[tokio::test]
async fn fifo_under_concurrent_submit() {
    let (mut mock, channel, mut events) = setup_channel().await;

    let flow = tokio::spawn({
        let channel = channel.clone();
        async move {
            // join! polls in order, so A is enqueued first, then B, then C,
            // all before any reply arrives
            tokio::join!(
                channel.set_variable("A", "1"),
                channel.set_variable("B", "2"),
                channel.set_variable("C", "3"),
            )
        }
    });

    assert_eq!(mock.read_command().await, "SET VARIABLE A \"1\"");
    mock.reply("200 result=1").await;
    assert_eq!(mock.read_command().await, "SET VARIABLE B \"2\"");
    mock.reply("200 result=1").await;
    assert_eq!(mock.read_command().await, "SET VARIABLE C \"3\"");
    mock.reply("200 result=1").await;

    let (a, b, c) = flow.await.unwrap();
    a.unwrap();
    b.unwrap();
    c.unwrap();

    // commandProcessed fires three times, in submission order
    for expected in ["A", "B", "C"] {
        let event = wait_for_event(&mut events, |e| {
            matches!(e, ChannelEvent::CommandProcessed { .. })
        })
        .await;
        let ChannelEvent::CommandProcessed { command, .. } = event else {
            unreachable!();
        };
        assert!(
            command.contains(&format!("SET VARIABLE {}", expected)),
            "expected {} in {}",
            expected,
            command
        );
    }
}

// S5: a timeout rejects only the in-flight command; the next one succeeds
#[tokio::test]
async fn timeout_then_continue() {
    let config = ChannelConfig {
        default_command_timeout: Duration::from_millis(200),
        ..ChannelConfig::default()
    };
    let (mut mock, channel, _events) = setup_channel_with(config).await;

    let first = tokio::spawn({
        let channel = channel.clone();
        async move { channel.answer().await }
    });
    tokio::task::yield_now().await;
    let second = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });

    // the reply for ANSWER is withheld past its budget
    assert_eq!(mock.read_command().await, "ANSWER");

    let err = first.await.unwrap().unwrap_err();
    match &err {
        AgiError::Timeout {
            timeout_ms,
            command,
        } => {
            assert_eq!(*timeout_ms, 200);
            assert_eq!(command, "ANSWER");
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(err.to_string().contains("Command timeout after 200ms"));
    assert!(channel.is_alive());

    // the queued NOOP goes out after the rejection and succeeds
    assert_eq!(mock.read_command().await, "NOOP");
    mock.reply("200 result=0").await;
    second.await.unwrap().unwrap();

    let stats = channel.queue_stats().await;
    assert_eq!(stats.size, 0);
    assert!(!stats.processing);
}

// S6: composite getData collects digits via WAIT FOR DIGIT primitives
#[tokio::test]
async fn composite_get_data() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .get_data(
                    "prompt",
                    Duration::from_secs(10),
                    Some(4),
                    Some(Duration::from_secs(3)),
                )
                .await
        }
    });

    // prompt is interruptible by any DTMF; no digit interrupts here
    assert_eq!(
        mock.read_command().await,
        "STREAM FILE prompt \"0123456789*#\""
    );
    mock.reply("200 result=0 endpos=16000").await;

    // exactly four WAIT FOR DIGIT round trips: ASCII '1' '2' '3' '4'
    for ascii in [49, 50, 51, 52] {
        let cmd = mock.read_command().await;
        assert!(
            cmd.starts_with("WAIT FOR DIGIT"),
            "unexpected command: {}",
            cmd
        );
        mock.reply(&format!("200 result={}", ascii)).await;
    }

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digits, "1234");
    assert!(!result.timed_out);

    // nothing else was sent after the fourth digit
    let probe = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });
    assert_eq!(mock.read_command().await, "NOOP");
    mock.reply("200 result=0").await;
    probe.await.unwrap().unwrap();
}

// composite mode honours the inter-digit bound even when the total budget
// is larger; a partial collection is not a timeout
#[tokio::test]
async fn composite_get_data_inter_digit_timeout() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .get_data(
                    "prompt",
                    Duration::from_secs(10),
                    Some(2),
                    Some(Duration::from_secs(1)),
                )
                .await
        }
    });

    mock.read_command().await;
    mock.reply("200 result=0 endpos=1000").await;

    // per-call bound is the 1s inter-digit timeout, not the 10s total
    assert_eq!(mock.read_command().await, "WAIT FOR DIGIT 1");
    mock.reply("200 result=55").await;
    assert_eq!(mock.read_command().await, "WAIT FOR DIGIT 1");
    mock.reply("200 result=0").await;

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digits, "7");
    assert!(!result.timed_out);
}

// inter-digit timeout before any digit reports a true timeout
#[tokio::test]
async fn composite_get_data_no_digits_times_out() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .get_data(
                    "prompt",
                    Duration::from_secs(10),
                    Some(4),
                    Some(Duration::from_secs(1)),
                )
                .await
        }
    });

    mock.read_command().await;
    mock.reply("200 result=0 endpos=1000").await;
    mock.read_command().await;
    mock.reply("200 result=0").await;

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digits, "");
    assert!(result.timed_out);
}

// S7: hangup rejects the in-flight and the queued command with the reason
#[tokio::test]
async fn hangup_during_queue() {
    let (mut mock, channel, mut events) = setup_channel().await;

    let first = tokio::spawn({
        let channel = channel.clone();
        async move { channel.answer().await }
    });
    tokio::task::yield_now().await;
    let second = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });

    // ANSWER is in flight, NOOP is waiting; then the caller hangs up
    assert_eq!(mock.read_command().await, "ANSWER");
    mock.send_hangup().await;

    for outcome in [first.await.unwrap(), second.await.unwrap()] {
        match outcome.unwrap_err() {
            AgiError::ChannelDead { reason, .. } => {
                assert_eq!(reason, TerminateReason::Hangup)
            }
            other => panic!("expected ChannelDead, got {:?}", other),
        }
    }

    wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Hangup)).await;
    let cleared = wait_for_event(&mut events, |e| {
        matches!(e, ChannelEvent::QueueCleared { .. })
    })
    .await;
    let ChannelEvent::QueueCleared { reason, count } = cleared else {
        unreachable!();
    };
    assert_eq!(reason, TerminateReason::Hangup);
    // only the waiting entry counts; the in-flight rejection is separate
    assert_eq!(count, 1);

    assert!(!channel.is_alive());

    // submissions against the dead channel are rejected immediately
    let err = channel.noop().await.unwrap_err();
    assert!(matches!(
        err,
        AgiError::ChannelDead {
            reason: TerminateReason::Hangup,
            ..
        }
    ));
}

#[tokio::test]
async fn backpressure_at_capacity() {
    let config = ChannelConfig {
        max_queue_size: 2,
        ..ChannelConfig::default()
    };
    let (mut mock, channel, _events) = setup_channel_with(config).await;

    let first = tokio::spawn({
        let channel = channel.clone();
        async move { channel.answer().await }
    });
    // once the command is on the wire the queue itself is empty again
    assert_eq!(mock.read_command().await, "ANSWER");

    let second = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });
    let third = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = channel.queue_stats().await;
    assert_eq!(stats.size, 2);
    assert!(stats.processing);
    assert!(stats.oldest_age.is_some());

    // the queue is full; the next submission fails synchronously
    let err = channel.noop().await.unwrap_err();
    assert!(matches!(err, AgiError::QueueFull { .. }));

    // manual clear rejects the two pending entries
    assert_eq!(channel.clear_command_queue().await, 2);
    for task in [second, third] {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, AgiError::Cleared { .. }));
        assert!(err.to_string().contains("manually cleared"));
    }

    // the in-flight command is unaffected by the clear
    mock.reply("200 result=0").await;
    first.await.unwrap().unwrap();
    assert!(channel.is_alive());
}

#[tokio::test]
async fn explicit_unbounded_timeout_disables_the_timer() {
    let config = ChannelConfig {
        default_command_timeout: Duration::from_millis(100),
        ..ChannelConfig::default()
    };
    let (mut mock, channel, _events) = setup_channel_with(config).await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .send_command_with_timeout("NOOP", CommandTimeout::from_millis(0))
                .await
        }
    });

    assert_eq!(mock.read_command().await, "NOOP");
    // well past the configured default; only channel death could reject
    tokio::time::sleep(Duration::from_millis(300)).await;
    mock.reply("200 result=0").await;

    let resp = task.await.unwrap().unwrap();
    assert_eq!(resp.code, 200);
    assert_eq!(resp.result, 0);
}

#[tokio::test]
async fn socket_close_rejects_in_flight() {
    let (mut mock, channel, mut events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.answer().await }
    });
    assert_eq!(mock.read_command().await, "ANSWER");
    mock.drop_connection().await;

    match task.await.unwrap().unwrap_err() {
        AgiError::ChannelDead { reason, .. } => {
            assert_eq!(reason, TerminateReason::ChannelClosed)
        }
        other => panic!("expected ChannelDead, got {:?}", other),
    }

    let close = wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Close { .. })).await;
    let ChannelEvent::Close { reason } = close else {
        unreachable!();
    };
    assert_eq!(reason, TerminateReason::ChannelClosed);
    assert!(!channel.is_alive());
}

#[tokio::test]
async fn unparseable_line_terminates_the_channel() {
    let (mut mock, channel, mut events) = setup_channel().await;

    mock.send_raw("this is not agi\n").await;

    wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Error { .. })).await;
    wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Close { .. })).await;
    assert!(!channel.is_alive());

    let err = channel.noop().await.unwrap_err();
    assert!(matches!(err, AgiError::ChannelDead { .. }));
}

#[tokio::test]
async fn local_close_is_idempotent() {
    let (_mock, channel, mut events) = setup_channel().await;

    channel.close().await;
    channel.close().await;

    let close = wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Close { .. })).await;
    let ChannelEvent::Close { reason } = close else {
        unreachable!();
    };
    assert_eq!(reason, TerminateReason::ChannelClosed);

    // exactly one Close despite the double call
    assert!(!matches!(
        events.try_recv(),
        Some(ChannelEvent::Close { .. })
    ));
    assert!(!channel.is_alive());
}

#[tokio::test]
async fn get_data_simple_mode() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .get_data("prompt", Duration::from_secs(5), Some(4), None)
                .await
        }
    });

    assert_eq!(mock.read_command().await, "GET DATA prompt 5000 4");
    mock.reply("200 result=0042").await;

    let result = task.await.unwrap().unwrap();
    // leading zeros survive: digits come from the raw result text
    assert_eq!(result.digits, "0042");
    assert!(!result.timed_out);
}

#[tokio::test]
async fn get_data_simple_mode_timeout_flag() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .get_data("prompt", Duration::from_secs(5), None, None)
                .await
        }
    });

    assert_eq!(mock.read_command().await, "GET DATA prompt 5000");
    mock.reply("200 result= (timeout)").await;

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digits, "");
    assert!(result.timed_out);
}

#[tokio::test]
async fn stream_file_checks_playback_status() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.stream_file("welcome", "#").await }
    });

    assert_eq!(mock.read_command().await, "STREAM FILE welcome \"#\"");
    mock.reply("200 result=0 endpos=8000").await;
    assert_eq!(mock.read_command().await, "GET VARIABLE PLAYBACKSTATUS");
    mock.reply("200 result=1 (SUCCESS)").await;

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digit, None);
    assert_eq!(result.endpos, 8000);
}

#[tokio::test]
async fn stream_file_rejects_failed_playback() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.stream_file("welcome", "").await }
    });

    mock.read_command().await;
    mock.reply("200 result=0 endpos=0").await;
    mock.read_command().await;
    mock.reply("200 result=1 (FAILED)").await;

    let err = task.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("FAILED"));
}

#[tokio::test]
async fn dial_classifies_dialstatus() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.dial("SIP/1002", 30, Some("m")).await }
    });

    assert_eq!(mock.read_command().await, "EXEC Dial SIP/1002,30,m");
    mock.reply("200 result=0").await;
    assert_eq!(mock.read_command().await, "GET VARIABLE DIALSTATUS");
    mock.reply("200 result=1 (ANSWER)").await;

    assert_eq!(task.await.unwrap().unwrap(), DialStatus::Answer);
}

#[tokio::test]
async fn dial_rejects_unknown_dialstatus() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.dial("SIP/1002", 30, None).await }
    });

    assert_eq!(mock.read_command().await, "EXEC Dial SIP/1002,30");
    mock.reply("200 result=0").await;
    mock.read_command().await;
    mock.reply("200 result=1 (SOMETHINGNEW)").await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AgiError::UnknownDialStatus { .. }));
}

#[tokio::test]
async fn exec_application_not_found() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.exec("NoSuchApp", "x").await }
    });

    assert_eq!(mock.read_command().await, "EXEC NoSuchApp x");
    mock.reply("200 result=-2").await;

    let err = task.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("Application not found"));
}

#[tokio::test]
async fn channel_status_maps_the_enumeration() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.channel_status().await }
    });

    assert_eq!(mock.read_command().await, "CHANNEL STATUS");
    mock.reply("200 result=6").await;

    assert_eq!(task.await.unwrap().unwrap(), ChannelStatus::Up);
}

#[tokio::test]
async fn database_round_trip() {
    let (mut mock, channel, _events) = setup_channel().await;

    let put = tokio::spawn({
        let channel = channel.clone();
        async move { channel.database_put("cidname", "1001", "Alice").await }
    });
    assert_eq!(mock.read_command().await, "DATABASE PUT cidname 1001 Alice");
    mock.reply("200 result=1").await;
    put.await.unwrap().unwrap();

    let get = tokio::spawn({
        let channel = channel.clone();
        async move { channel.database_get("cidname", "1001").await }
    });
    assert_eq!(mock.read_command().await, "DATABASE GET cidname 1001");
    mock.reply("200 result=1 (Alice)").await;
    assert_eq!(get.await.unwrap().unwrap(), "Alice");

    let missing = tokio::spawn({
        let channel = channel.clone();
        async move { channel.database_get("cidname", "9999").await }
    });
    mock.read_command().await;
    mock.reply("200 result=0").await;
    let err = missing.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("Database entry not found"));

    let del_tree = tokio::spawn({
        let channel = channel.clone();
        async move { channel.database_del_tree("cidname", None).await }
    });
    assert_eq!(mock.read_command().await, "DATABASE DELTREE cidname");
    mock.reply("200 result=0").await;
    // result 0 reports the tree never existed
    assert!(!del_tree.await.unwrap().unwrap());
}

#[tokio::test]
async fn record_file_reports_digit_endpos_and_timeout() {
    let (mut mock, channel, _events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .record_file(
                    "msg",
                    "wav",
                    "#",
                    Some(Duration::from_secs(30)),
                    true,
                    Some(3),
                )
                .await
        }
    });

    assert_eq!(
        mock.read_command().await,
        "RECORD FILE msg wav \"#\" 30000 BEEP s=3"
    );
    mock.reply("200 result=35 endpos=16000").await;

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.digit, Some('#'));
    assert_eq!(result.endpos, 16000);
    assert!(!result.timed_out);
}

#[tokio::test]
async fn async_break_closes_the_channel() {
    let (mut mock, channel, mut events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.async_break().await }
    });

    assert_eq!(mock.read_command().await, "ASYNCAGI BREAK");
    mock.reply("200 result=0").await;

    task.await.unwrap().unwrap();
    wait_for_event(&mut events, |e| matches!(e, ChannelEvent::Close { .. })).await;
    assert!(!channel.is_alive());
}

#[tokio::test]
async fn queue_events_fire_around_a_command() {
    let (mut mock, channel, mut events) = setup_channel().await;

    let task = tokio::spawn({
        let channel = channel.clone();
        async move { channel.noop().await }
    });

    assert_eq!(mock.read_command().await, "NOOP");
    mock.reply("200 result=0").await;
    task.await.unwrap().unwrap();

    wait_for_event(&mut events, |e| {
        matches!(e, ChannelEvent::CommandQueued { command, .. } if command == "NOOP")
    })
    .await;
    wait_for_event(&mut events, |e| {
        matches!(e, ChannelEvent::Send { command } if command == "NOOP")
    })
    .await;
    wait_for_event(&mut events, |e| {
        matches!(e, ChannelEvent::Response { code: 200, result: 0 })
    })
    .await;
    wait_for_event(&mut events, |e| {
        matches!(e, ChannelEvent::CommandProcessed { command, .. } if command == "NOOP")
    })
    .await;
    wait_for_event(&mut events, |e| matches!(e, ChannelEvent::QueueEmpty)).await;
}
