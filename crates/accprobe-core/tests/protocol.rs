//! Transport, command channel and bulk transfer against a scripted link

mod common;

use accprobe_core::config::LinkConfig;
use accprobe_core::protocol::{
    BulkTransfer, Clock, Command, CommandChannel, FrameStatus, ManualClock, ProtocolError,
    RetryPolicy, SessionContext, Transport,
};
use common::{batch_frame, transport, Scripted, ScriptedOpener};
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_millis(250);

fn init_command() -> Command {
    Command::new("ACCINIT", Duration::from_millis(300))
}

#[test]
fn test_reply_on_late_attempt_is_accepted() {
    let opener = ScriptedOpener::new();
    opener.respond(Scripted::after(36, b":ok\n"));
    let (mut transport, clock) = transport(&opener);

    let reply = CommandChannel::default()
        .request(&mut transport, &init_command())
        .unwrap();

    assert_eq!(reply.line, ":ok");
    assert_eq!(reply.attempts, 37);
    assert_eq!(opener.reads(), 37);
    assert_eq!(clock.count_sleeps(RETRY_DELAY), 36);
    assert_eq!(opener.written(), vec!["ACCINIT"]);
}

#[test]
fn test_silence_exhausts_budget_exactly() {
    let opener = ScriptedOpener::new();
    opener.silence();
    let (mut transport, clock) = transport(&opener);

    let reply = CommandChannel::default()
        .request(&mut transport, &init_command())
        .unwrap();

    assert!(reply.is_empty());
    assert_eq!(reply.attempts, 40);
    assert_eq!(opener.reads(), 40);
    // waits only between attempts, plus the settle after the send
    assert_eq!(clock.count_sleeps(RETRY_DELAY), 39);
    assert_eq!(clock.count_sleeps(Duration::from_millis(300)), 1);
}

#[test]
fn test_require_reports_timeout() {
    let opener = ScriptedOpener::new();
    opener.silence();
    let (mut transport, _) = transport(&opener);

    let err = CommandChannel::default()
        .require(&mut transport, &init_command())
        .unwrap_err();
    assert!(matches!(err, ProtocolError::CommandTimeout { attempts: 40, .. }));
    assert_eq!(err.to_string(), "No response to 'ACCINIT' after 40 attempts");
}

#[test]
fn test_custom_retry_policy() {
    let opener = ScriptedOpener::new();
    opener.silence();
    let (mut transport, clock) = transport(&opener);

    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    let reply = CommandChannel::default()
        .request_with(&mut transport, &init_command(), policy)
        .unwrap();
    assert!(reply.is_empty());
    assert_eq!(opener.reads(), 3);
    assert_eq!(clock.count_sleeps(Duration::from_millis(10)), 2);
}

#[test]
fn test_rejection_is_visible_on_reply() {
    let opener = ScriptedOpener::new();
    opener.respond(Scripted::now(b":er\n"));
    let (mut transport, _) = transport(&opener);

    let reply = CommandChannel::default()
        .request(&mut transport, &init_command())
        .unwrap();
    assert!(reply.is_rejection());
    assert_eq!(reply.attempts, 1);
}

#[test]
fn test_stale_input_is_discarded_before_send() {
    let opener = ScriptedOpener::new();
    opener
        .respond(Scripted::now(b":ok\nleftover\n"))
        .respond(Scripted::after(2, b"second\n"));
    let (mut transport, _) = transport(&opener);
    let channel = CommandChannel::default();

    assert_eq!(channel.request(&mut transport, &init_command()).unwrap().line, ":ok");
    let reply = channel
        .request(&mut transport, &Command::new("VERSION", Duration::ZERO))
        .unwrap();
    assert_eq!(reply.line, "second");
    assert_eq!(reply.attempts, 3);
}

#[test]
fn test_bulk_error_sentinel_with_trailing_bytes() {
    let opener = ScriptedOpener::new();
    opener.respond(Scripted::now(b":er\nXXXX"));
    let (mut transport, _) = transport(&opener);

    let (status, raw) = BulkTransfer::default()
        .request_batch(&mut transport, &Command::new("GETSAMPLEBATCH 0", Duration::ZERO))
        .unwrap();
    assert_eq!(status, FrameStatus::DeviceError);
    assert_eq!(raw, b":er\nXXXX");
}

#[test]
fn test_bulk_frame_with_terminator_bytes_in_payload() {
    // x = 10 → 0x0A in the payload
    let frame = batch_frame(10, 32);
    assert!(frame[..192].contains(&b'\n'));

    let opener = ScriptedOpener::new();
    opener.respond(Scripted::after(5, &frame));
    let (mut transport, clock) = transport(&opener);

    let (status, raw) = BulkTransfer::default()
        .request_batch(&mut transport, &Command::new("GETSAMPLEBATCH 0", Duration::ZERO))
        .unwrap();
    assert_eq!(status, FrameStatus::Data);
    assert_eq!(raw, frame);
    assert_eq!(clock.count_sleeps(Duration::from_micros(100)), 5);
}

#[test]
fn test_bulk_empty_after_poll_budget() {
    let opener = ScriptedOpener::new();
    opener.silence();
    let (mut transport, clock) = transport(&opener);

    let (status, raw) = BulkTransfer::default()
        .request_batch(&mut transport, &Command::new("GETSAMPLEBATCH 3", Duration::ZERO))
        .unwrap();
    assert_eq!(status, FrameStatus::Empty);
    assert!(raw.is_empty());
    assert_eq!(clock.count_sleeps(Duration::from_micros(100)), 500);
}

#[test]
fn test_closed_transport() {
    let opener = ScriptedOpener::new();
    let (mut transport, _) = transport(&opener);
    transport.disconnect();
    transport.disconnect();
    assert!(!transport.is_open());

    let err = CommandChannel::default()
        .request(&mut transport, &init_command())
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));
    assert!(err.is_fatal());
}

#[test]
fn test_unsupported_baud_rate_fails_connect() {
    let config = LinkConfig {
        baud_rate: 1234,
        ..LinkConfig::new("/dev/ttyACM0")
    };
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let mut transport = Transport::new(config, SessionContext::with_clock("bad-baud", clock));

    let err = transport.connect().unwrap_err();
    match &err {
        ProtocolError::ConnectionFailed { port, reason } => {
            assert_eq!(port, "/dev/ttyACM0");
            assert!(reason.contains("1234"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
    assert!(!transport.is_open());
}

#[test]
fn test_counters() {
    let opener = ScriptedOpener::new();
    opener.respond(Scripted::now(b":ok\n"));
    let (mut transport, _) = transport(&opener);
    CommandChannel::default()
        .request(&mut transport, &init_command())
        .unwrap();

    let counters = transport.counters();
    assert_eq!(counters.tx_messages, 1);
    assert_eq!(counters.tx_bytes, "ACCINIT\n".len() as u64);
    assert_eq!(counters.rx_messages, 1);
    assert_eq!(counters.rx_bytes, 3);
}
