//! Session facade against scripted and simulated boards

mod common;

use accprobe_core::acquisition::{AcquisitionConfig, AcquisitionMode, ConfigStep};
use accprobe_core::config::SessionConfig;
use accprobe_core::demo::DemoOpener;
use accprobe_core::protocol::{DeviceSession, ManualClock, ProtocolError, SessionState};
use common::{batch_frame, session, FailingOpener, Scripted, ScriptedOpener};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn config(num_samples: u32) -> AcquisitionConfig {
    AcquisitionConfig {
        num_samples,
        ..AcquisitionConfig::default()
    }
}

/// Session that has been configured and initialised, with counts reset
fn ready_session(opener: &ScriptedOpener, num_samples: u32) -> (DeviceSession, Arc<ManualClock>) {
    opener.ack(7);
    let (mut session, clock) = session(opener);
    session.configure(&config(num_samples)).unwrap();
    session.init().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    opener.reset_counts();
    (session, clock)
}

/// Queue run ack, sample info and every batch frame for `n` samples
fn script_acquisition(opener: &ScriptedOpener, n: u32) {
    opener.ack(1);
    opener.respond(Scripted::now(format!("1;2;8000.00;{};128\n", n).as_bytes()));
    let batches = (n as usize).div_ceil(32);
    for b in 0..batches {
        let count = (n as usize - b * 32).min(32);
        opener.respond(Scripted::now(&batch_frame((b * 32) as i16, count)));
    }
}

fn batch_requests(opener: &ScriptedOpener) -> Vec<String> {
    opener
        .written()
        .into_iter()
        .filter(|l| l.starts_with("GETSAMPLEBATCH"))
        .collect()
}

#[test]
fn test_configuration_stops_at_first_unacknowledged_step() {
    let opener = ScriptedOpener::new();
    opener.ack(2).silence();
    let (mut session, _) = session(&opener);

    let err = session.configure(&config(1024)).unwrap_err();
    match err {
        ProtocolError::ConfigurationFailed { step, index, .. } => {
            assert_eq!(step, ConfigStep::OutputDataRate);
            assert_eq!(index, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        opener.written(),
        vec!["SELECTACC 1", "ACCSCALE 2", "ACCODR 0"]
    );
    assert_eq!(session.state(), SessionState::Unconfigured);
    assert!(session.acquisition_config().is_none());
}

#[test]
fn test_configuration_rejected_by_device() {
    let opener = ScriptedOpener::new();
    opener.ack(4).respond(Scripted::now(b":er\n"));
    let (mut session, _) = session(&opener);

    let err = session.configure(&config(1024)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration failed at step 4 (decimation factor): rejected by device"
    );
    assert_eq!(opener.written().len(), 5);
}

#[test]
fn test_configuration_sends_values_in_order() {
    let opener = ScriptedOpener::new();
    opener.ack(6);
    let (mut session, _) = session(&opener);
    let cfg = AcquisitionConfig {
        accelerometer: 3,
        scale: 1,
        odr: 5,
        num_samples: 4096,
        decimation_factor: 2,
        timer_sample_rate: 16000,
    };
    session.configure(&cfg).unwrap();
    assert_eq!(
        opener.written(),
        vec![
            "SELECTACC 3",
            "ACCSCALE 1",
            "ACCODR 5",
            "ACQNUMSAMPLES 4096",
            "ACQDECFACTOR 2",
            "ACQTIMSAMPLERATE 16000",
        ]
    );
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(session.acquisition_config(), Some(&cfg));
}

#[test]
fn test_full_download_of_1024_samples() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = ready_session(&opener, 1024);
    script_acquisition(&opener, 1024);

    let acquisition = session.acquire(AcquisitionMode::Timer).unwrap();
    assert_eq!(acquisition.info.num_samples, 1024);
    assert_eq!(acquisition.data.len(), 1024);
    assert_eq!(acquisition.data.x[..3], [0, 1, 2]);
    assert_eq!(acquisition.data.x[1023], 1023);
    assert_eq!(acquisition.data.y[1023], -1023);
    assert!(acquisition.data.z.iter().all(|z| *z == 1000));

    let expected: Vec<String> = (0..32).map(|i| format!("GETSAMPLEBATCH {}", i)).collect();
    assert_eq!(batch_requests(&opener), expected);
    assert_eq!(opener.written()[..2], ["ACQTIMERRUN", "GETSAMPLEINFO"]);
    assert_eq!(session.state(), SessionState::DataReady);
}

#[test]
fn test_partial_final_batch() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = ready_session(&opener, 1000);
    script_acquisition(&opener, 1000);

    let acquisition = session.acquire(AcquisitionMode::Odr).unwrap();
    assert_eq!(batch_requests(&opener).len(), 32);
    assert_eq!(acquisition.data.len(), 1000);
    assert_eq!(acquisition.data.x[992..], (992..1000).collect::<Vec<i16>>()[..]);
    assert_eq!(opener.written()[0], "ACQODRRUN");
}

#[test]
fn test_bad_batch_aborts_download() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = ready_session(&opener, 320);
    opener.ack(1);
    session.run_acquisition(AcquisitionMode::Timer).unwrap();

    for b in 0..5 {
        opener.respond(Scripted::now(&batch_frame(b * 32, 32)));
    }
    opener.respond(Scripted::now(b":er\n"));
    opener.respond(Scripted::now(&batch_frame(192, 32)));

    let err = session.fetch_all_batches().unwrap_err();
    match &err {
        ProtocolError::DownloadFailed { batch, total, reason } => {
            assert_eq!((*batch, *total), (5, 10));
            assert_eq!(reason, "error sentinel");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(batch_requests(&opener).len(), 6);
    assert_eq!(session.state(), SessionState::AcquisitionComplete);
}

#[test]
fn test_short_and_empty_batches() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = ready_session(&opener, 64);
    opener.ack(1);
    session.run_acquisition(AcquisitionMode::Timer).unwrap();

    opener.respond(Scripted::now(&batch_frame(0, 32)[..100]));
    let err = session.fetch_batch(0).unwrap_err();
    assert!(matches!(err, ProtocolError::DownloadFailed { batch: 0, total: 2, .. }));
    assert!(err.to_string().contains("short batch frame"));

    opener.silence();
    let err = session.fetch_batch(1).unwrap_err();
    assert!(err.to_string().ends_with("empty buffer"));
}

#[test]
fn test_run_waits_for_long_acquisitions() {
    let opener = ScriptedOpener::new();
    let (mut session, clock) = ready_session(&opener, 32);
    clock.reset();
    opener.respond(Scripted::after(1000, b":ok\n"));

    session.run_acquisition(AcquisitionMode::Timer).unwrap();
    assert_eq!(opener.reads(), 1001);
    assert_eq!(session.state(), SessionState::AcquisitionComplete);

    opener.silence();
    let err = session.run_acquisition(AcquisitionMode::Timer).unwrap_err();
    assert!(matches!(err, ProtocolError::CommandTimeout { attempts: 2400, .. }));
}

#[test]
fn test_spi_override_requires_init_again() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = ready_session(&opener, 32);
    opener.ack(1);
    session.override_spi_speed(2_000_000).unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(opener.written(), vec!["OVRACCSPISPEED 2000000"]);

    let err = session.run_acquisition(AcquisitionMode::Timer).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidState { .. }));
    // nothing sent for the refused run
    assert_eq!(opener.written().len(), 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let opener = ScriptedOpener::new();
    let (mut session, _) = session(&opener);
    assert!(session.check_connection());
    session.disconnect();
    session.disconnect();
    assert!(!session.check_connection());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_failed_initial_connect_is_deferred() {
    let session_config = SessionConfig::for_port("/dev/ttyNOPE");
    let mut session = DeviceSession::with_opener(
        session_config,
        Box::new(FailingOpener),
        Arc::new(ManualClock::new()),
    );
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.configure(&config(32)),
        Err(ProtocolError::NotConnected)
    ));
    assert!(matches!(
        session.connect(),
        Err(ProtocolError::ConnectionFailed { .. })
    ));
}

#[test]
fn test_demo_board_end_to_end() {
    let session_config = SessionConfig::for_port("demo");
    let opener = DemoOpener::new(session_config.commands.clone(), session_config.endianness).with_seed(11);
    let mut session =
        DeviceSession::with_opener(session_config, Box::new(opener), Arc::new(ManualClock::new()));

    let cfg = AcquisitionConfig {
        scale: 0,
        num_samples: 1000,
        timer_sample_rate: 4000,
        ..AcquisitionConfig::default()
    };
    session.configure(&cfg).unwrap();
    session.init().unwrap();
    let acquisition = session.acquire(AcquisitionMode::Timer).unwrap();

    assert_eq!(acquisition.info.accelerometer_id, 1);
    assert_eq!(acquisition.info.sampling_frequency, 4000.0);
    assert_eq!(acquisition.info.acquisition_time_ms, 250);
    assert_eq!(acquisition.data.len(), 1000);

    let mean_z = acquisition.data.z.iter().map(|z| f64::from(*z)).sum::<f64>() / 1000.0;
    assert!((mean_z - 16384.0).abs() < 100.0, "mean z = {mean_z}");
}
