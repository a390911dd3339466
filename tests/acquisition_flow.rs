//! End-to-end acquisition flow against a scripted transport.
//!
//! Exercises the whole chain — constants table, wire framing, session state
//! machine, run log, event bus — the way a control panel would drive it,
//! with the device replaced by `MockTransport`.

use std::sync::mpsc::channel;
use std::time::Duration;

use tapdaq::bus::{signal, EventBus};
use tapdaq::config::{AcquisitionSettings, SerialSettings};
use tapdaq::metadata::{FileHeader, RunParams};
use tapdaq::transport::MockTransport;
use tapdaq::{AcquisitionSession, ProtocolCommands, RunLog, Settings, SymbolTable};
use tempfile::TempDir;

const DEFS: &str = "
#define CMD_STATE_RUN 0x04
#define CMD_START 0x01
#define CMD_STOP 0x00
#define CMD_SET_TEMPO 0x12
#define CMD_SET_ALPHA 0x17
#define CMD_SET_SOUND 0x19
";

fn commands() -> ProtocolCommands {
    ProtocolCommands::from_table(&SymbolTable::parse(DEFS)).unwrap()
}

fn fast_settings() -> Settings {
    Settings {
        acquisition: AcquisitionSettings {
            settle_ms: 0,
            poll_idle_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn params() -> RunParams {
    RunParams {
        tempo: 110,
        alpha: 0.5,
        sound: None,
        windows: 5,
        packet_size: 17,
    }
}

fn initialized_log(dir: &TempDir, runs: usize) -> RunLog {
    let path = dir.path().join("flow.rlg");
    let mut log = RunLog::create(&path, runs).unwrap();
    log.write_file_header(&FileHeader::new("flow", runs, SerialSettings::default()))
        .unwrap();
    log
}

#[test]
fn full_run_streams_chunks_and_stops() {
    let dir = TempDir::new().unwrap();
    let log = initialized_log(&dir, 1);
    let mut bus = EventBus::new();

    // Both listeners feed one channel so cross-signal order is observable.
    let (tx, rx) = channel();
    let tx_start = tx.clone();
    bus.register_listener(
        signal::RUN_START,
        Box::new(move |_| {
            tx_start.send(("run_start", String::new())).ok();
        }),
    );
    bus.register_listener(
        signal::BYTES_RECEIVED,
        Box::new(move |payload| {
            tx.send(("bytes", payload.to_string())).ok();
        }),
    );

    // 10 + 30 + 45 = 85 = windows × packet_size, in arbitrary chunk sizes.
    let chunks = vec![vec![0xA1; 10], vec![0xB2; 30], vec![0xC3; 45]];
    let expected_payload: Vec<u8> = chunks.iter().flatten().copied().collect();
    let mock = MockTransport::scripted(chunks);
    let probe = mock.probe();

    let session = AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 0);
    let outcome = session.run_with(Box::new(mock), log);
    assert!(matches!(outcome.result, Ok(85)));

    // One availability check per chunk; none after the total was reached.
    assert_eq!(probe.lock().available_checks, 3);

    // Wire order: tempo, alpha, state-run, start, then stop last.
    let writes = probe.lock().writes.clone();
    assert_eq!(writes[0], b"\x12110");
    assert_eq!(writes[1], b"\x170.5");
    assert_eq!(writes[2], vec![0x04]);
    assert_eq!(writes[3], vec![0x01]);
    assert_eq!(writes.last().unwrap(), &vec![0x00]);

    // Run-start reaches listeners before any byte-count notification, and
    // the byte counts arrive in publish order.
    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    assert_eq!(events[0], ("run_start", String::new()));
    assert_eq!(events[1], ("bytes", "10".to_string()));
    assert_eq!(events[2], ("bytes", "30".to_string()));
    assert_eq!(events[3], ("bytes", "45".to_string()));

    // The log holds exactly the streamed payload.
    let mut log = outcome.log;
    assert_eq!(log.read_run_payload(0).unwrap(), expected_payload);
    bus.close();
}

#[test]
fn aborted_run_retries_into_same_slot() {
    let dir = TempDir::new().unwrap();
    let log = initialized_log(&dir, 1);
    let mut bus = EventBus::new();

    // First attempt: one 17-byte window arrives, then the operator aborts.
    let mock = MockTransport::scripted(vec![vec![0x11; 17]]);
    {
        let flag = bus.handle();
        mock.lock().on_available = Some(Box::new(move |count| {
            if count >= 2 {
                flag.set_done(true);
            }
        }));
    }
    let session = AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 0);
    let outcome = session.run_with(Box::new(mock), log);
    assert!(matches!(outcome.result, Ok(17)));
    let log = outcome.log;
    let first_offset = log.run_offset(0).unwrap();

    // Operator clears the abort and retries the same run index.
    bus.set_done(false);
    let mock = MockTransport::scripted(vec![vec![0x22; 85]]);
    let session = AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 0);
    let outcome = session.run_with(Box::new(mock), log);
    assert!(matches!(outcome.result, Ok(85)));

    let mut log = outcome.log;
    assert_eq!(log.run_offset(0).unwrap(), first_offset);
    let payload = log.read_run_payload(0).unwrap();
    assert_eq!(&payload[..85], &[0x22; 85][..]);
    bus.close();
}

#[test]
fn closed_log_between_runs_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut log = initialized_log(&dir, 2);
    let mut bus = EventBus::new();

    let mock = MockTransport::scripted(vec![vec![0x33; 85]]);
    let session = AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 0);
    let outcome = session.run_with(Box::new(mock), log);
    log = outcome.log;

    // Caller releases the descriptor between runs, then hands it back.
    log.close().unwrap();
    log.reopen().unwrap();

    let mock = MockTransport::scripted(vec![vec![0x44; 85]]);
    let session = AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 1);
    let outcome = session.run_with(Box::new(mock), log);
    assert!(matches!(outcome.result, Ok(85)));

    let mut log = outcome.log;
    assert_eq!(log.read_run_payload(0).unwrap(), vec![0x33; 85]);
    assert_eq!(log.read_run_payload(1).unwrap(), vec![0x44; 85]);
    bus.close();
}
