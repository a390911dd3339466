//! One-shot acquisition session: drives a single run end to end.
//!
//! A session owns everything a run needs — the run log, a bus handle, the
//! resolved opcode set, and the run parameters — and walks the device
//! through `Idle → Handshaking → SendingParams → Running → Stopping →
//! Terminated`. All serial I/O and log writes for the run happen on the
//! session's thread; presentation consumers hang off the bus and never
//! touch the I/O path.
//!
//! Failure contract: the transport opens before anything is written for
//! the run, so an unopenable port surfaces as a transport error with the
//! log untouched. After the header commits, an abort or a mid-stream fault
//! leaves a truncated but readable run; retrying the same index overwrites
//! the run block in place (see `data::run_log`).

use crate::bus::{signal, BusHandle};
use crate::config::Settings;
use crate::constants::ProtocolCommands;
use crate::data::RunLog;
use crate::error::AcqResult;
use crate::metadata::{RunParams, RunRecord};
use crate::transport::Transport;
use crate::wire::{encode_command, encode_opcode, FieldEncoding, FieldValue};
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Phases of a session, in order. A session passes through each at most
/// once; `Terminated` is reached exactly once on every path that gets past
/// opening the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, transport not yet open.
    Idle,
    /// Consuming the device boot banner.
    Handshaking,
    /// Transmitting per-run parameter commands.
    SendingParams,
    /// Receive loop: streaming payload into the log.
    Running,
    /// Sending the stop opcode.
    Stopping,
    /// Done; the session cannot be reused.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Handshaking => "handshaking",
            SessionState::SendingParams => "sending-params",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a finished session hands back: the log (on every path) and the
/// total payload bytes received, or the error that ended the run.
pub struct SessionOutcome {
    /// The run log, returned so the caller regains descriptor ownership.
    pub log: RunLog,
    /// Total payload bytes streamed, or the fatal error.
    pub result: AcqResult<u64>,
}

/// Join handle for a spawned session thread.
pub struct SessionHandle {
    thread: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Blocks until the session thread finishes.
    pub fn join(self) -> SessionOutcome {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Orchestrates exactly one run. Not reusable: `spawn`/`run_with` consume
/// the session.
pub struct AcquisitionSession {
    bus: BusHandle,
    settings: Settings,
    commands: ProtocolCommands,
    params: RunParams,
    run_index: usize,
    state: SessionState,
}

impl AcquisitionSession {
    /// A session for run `run_index` with the given parameters.
    pub fn new(
        bus: BusHandle,
        settings: &Settings,
        commands: ProtocolCommands,
        params: RunParams,
        run_index: usize,
    ) -> Self {
        Self {
            bus,
            settings: settings.clone(),
            commands,
            params,
            run_index,
            state: SessionState::Idle,
        }
    }

    /// Opens the serial port and runs the session on a dedicated thread,
    /// taking ownership of `log` for the duration.
    ///
    /// The port opens before any log write, so an open failure yields an
    /// outcome whose log is exactly as it was passed in.
    pub fn spawn(self, log: RunLog) -> SessionHandle {
        let thread = thread::spawn(move || {
            #[cfg(feature = "instrument_serial")]
            {
                let transport =
                    match crate::transport::SerialTransport::open(&self.settings.serial) {
                        Ok(t) => Box::new(t),
                        Err(e) => {
                            return SessionOutcome {
                                log,
                                result: Err(e),
                            }
                        }
                    };
                self.run_with(transport, log)
            }
            #[cfg(not(feature = "instrument_serial"))]
            SessionOutcome {
                log,
                result: Err(crate::error::AcqError::Transport(
                    "Serial support not enabled. Rebuild with --features instrument_serial"
                        .to_string(),
                )),
            }
        });
        SessionHandle { thread }
    }

    /// Runs the session synchronously against an already-open transport.
    ///
    /// This is the seam `spawn` uses after opening the serial port; tests
    /// drive it directly with a mock.
    pub fn run_with(mut self, mut transport: Box<dyn Transport>, mut log: RunLog) -> SessionOutcome {
        let result = self.execute(transport.as_mut(), &mut log);
        if let Err(ref e) = result {
            log::error!("Run {} failed while {}: {e}", self.run_index, self.state);
        }
        SessionOutcome { log, result }
    }

    fn advance(&mut self, next: SessionState) {
        log::debug!("Run {}: {} -> {next}", self.run_index, self.state);
        self.state = next;
    }

    fn execute(&mut self, transport: &mut dyn Transport, log: &mut RunLog) -> AcqResult<u64> {
        // Transport is open; the run header may now commit.
        log.write_run_header(self.run_index, &RunRecord::new(self.run_index, self.params.clone()))?;

        self.advance(SessionState::Handshaking);
        let banner = transport.read_line()?;
        log::debug!("Run {}: device banner '{banner}'", self.run_index);

        self.advance(SessionState::SendingParams);
        self.send_params(transport)?;

        // Arm the device, tell listeners the run is on, then fire.
        transport.write_all(&encode_opcode(self.commands.state_run))?;
        self.bus.publish(signal::RUN_START, "");
        transport.write_all(&encode_opcode(self.commands.start))?;

        self.advance(SessionState::Running);
        let total = self.receive_loop(transport, log)?;

        self.advance(SessionState::Stopping);
        transport.write_all(&encode_opcode(self.commands.stop))?;

        self.advance(SessionState::Terminated);
        log::info!(
            "Run {} terminated: {total} of {} expected bytes received",
            self.run_index,
            self.params.expected_bytes()
        );
        Ok(total)
    }

    fn send_params(&mut self, transport: &mut dyn Transport) -> AcqResult<()> {
        let settle = Duration::from_millis(self.settings.acquisition.settle_ms);

        let mut fields: Vec<(&str, u8, FieldValue)> = vec![
            (
                "tempo",
                self.commands.set_tempo,
                FieldValue::Unsigned(u64::from(self.params.tempo)),
            ),
            (
                "alpha",
                self.commands.set_alpha,
                FieldValue::Float(self.params.alpha),
            ),
        ];
        if let Some(sound) = &self.params.sound {
            fields.push((
                "sound",
                self.commands.set_sound,
                FieldValue::Text(sound.clone()),
            ));
        }

        for (name, opcode, value) in fields {
            let frame = encode_command(opcode, &value, FieldEncoding::AsciiDecimal);
            transport.write_all(&frame)?;
            self.bus
                .publish(signal::DISPLAY, &format!("Sent {name} = {value}"));
            log::debug!("Run {}: sent {name} = {value}", self.run_index);
            // Give the firmware time to consume one command before the next.
            thread::sleep(settle);
        }
        Ok(())
    }

    fn receive_loop(&mut self, transport: &mut dyn Transport, log: &mut RunLog) -> AcqResult<u64> {
        let expected = self.params.expected_bytes();
        let idle = Duration::from_millis(self.settings.acquisition.poll_idle_ms);
        let mut total: u64 = 0;

        while !self.bus.check_done() && total < expected {
            let pending = transport.bytes_available()?;
            if pending == 0 {
                thread::sleep(idle);
                continue;
            }
            let mut buf = vec![0u8; pending];
            let got = transport.read_into(&mut buf)?;
            if got > 0 {
                log.append_payload(&buf[..got])?;
                total += got as u64;
                self.bus
                    .publish(signal::BYTES_RECEIVED, &got.to_string());
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::{AcquisitionSettings, SerialSettings};
    use crate::error::AcqError;
    use crate::metadata::FileHeader;
    use crate::transport::MockTransport;
    use tempfile::TempDir;

    fn commands() -> ProtocolCommands {
        ProtocolCommands {
            state_run: 0x04,
            start: 0x01,
            stop: 0x00,
            set_tempo: 0x12,
            set_alpha: 0x17,
            set_sound: 0x19,
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

    fn initialized_log(dir: &TempDir, runs: usize) -> RunLog {
        let path = dir.path().join("session.rlg");
        let mut log = RunLog::create(&path, runs).unwrap();
        log.write_file_header(&FileHeader::new("test", runs, SerialSettings::default()))
            .unwrap();
        log
    }

    #[test]
    fn test_abort_stops_before_next_availability_check() {
        let dir = TempDir::new().unwrap();
        let log = initialized_log(&dir, 1);
        let mut bus = EventBus::new();
        let handle = bus.handle();

        // Chunks never arrive; the abort flag flips during the third poll.
        let mock = MockTransport::default();
        let probe = mock.probe();
        {
            let flag = bus.handle();
            let mut state = mock.lock();
            state.on_available = Some(Box::new(move |count| {
                if count == 3 {
                    flag.set_done(true);
                }
            }));
        }

        let session = AcquisitionSession::new(handle, &fast_settings(), commands(), params(), 0);
        let outcome = session.run_with(Box::new(mock), log);

        assert!(matches!(outcome.result, Ok(n) if n < 85));
        // The observed-done iteration was the last; no fourth check ran.
        assert_eq!(probe.lock().available_checks, 3);
        // Stop opcode still goes out on the abort path.
        assert_eq!(probe.lock().writes.last().map(Vec::as_slice), Some(&[0x00u8][..]));
        bus.close();
    }

    #[test]
    fn test_transport_fault_mid_run_is_fatal() {
        let dir = TempDir::new().unwrap();
        let log = initialized_log(&dir, 1);
        let mut bus = EventBus::new();

        let mock = MockTransport::scripted(vec![vec![1, 2, 3]]);
        mock.lock().fail_reads = true;

        let session =
            AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params(), 0);
        let outcome = session.run_with(Box::new(mock), log);

        assert!(matches!(outcome.result, Err(AcqError::Transport(_))));
        bus.close();
    }

    #[test]
    fn test_sound_param_sent_when_configured() {
        let dir = TempDir::new().unwrap();
        let log = initialized_log(&dir, 1);
        let mut bus = EventBus::new();

        let mut params = params();
        params.windows = 0; // no payload phase; exercise the param phase only
        params.sound = Some("woodblock".to_string());

        let mock = MockTransport::scripted(vec![]);
        let probe = mock.probe();
        let session =
            AcquisitionSession::new(bus.handle(), &fast_settings(), commands(), params, 0);
        let outcome = session.run_with(Box::new(mock), log);

        assert!(outcome.result.is_ok());
        let writes = probe.lock().writes.clone();
        assert_eq!(writes[0], b"\x12110");
        assert_eq!(writes[1], b"\x170.5");
        assert_eq!(writes[2], b"\x19woodblock");
        assert_eq!(writes[3], vec![0x04]);
        assert_eq!(writes[4], vec![0x01]);
        assert_eq!(writes[5], vec![0x00]);
        bus.close();
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_unopenable_port_commits_no_run_header() {
        let dir = TempDir::new().unwrap();
        let log = initialized_log(&dir, 1);
        let mut bus = EventBus::new();

        let mut settings = fast_settings();
        settings.serial.port = dir
            .path()
            .join("no-such-port")
            .to_string_lossy()
            .into_owned();

        let session =
            AcquisitionSession::new(bus.handle(), &settings, commands(), params(), 0);
        let outcome = session.spawn(log).join();

        assert!(matches!(outcome.result, Err(AcqError::Transport(_))));
        // Fail-fast: the run header never landed, the slot is still unset.
        assert_eq!(outcome.log.run_offset(0), None);
        bus.close();
    }
}
