//! Serial transport backed by the `serialport` crate.

use super::Transport;
use crate::config::SerialSettings;
use crate::error::{AcqError, AcqResult};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Instant;

/// A live serial connection to the device.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    settings: SerialSettings,
}

impl SerialTransport {
    /// Opens the port described by `settings`.
    pub fn open(settings: &SerialSettings) -> AcqResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(settings.timeout())
            .open()
            .map_err(|e| {
                AcqError::Transport(format!(
                    "Failed to open serial port '{}' at {} baud: {e}",
                    settings.port, settings.baud_rate
                ))
            })?;
        log::debug!(
            "Serial port '{}' opened at {} baud",
            settings.port,
            settings.baud_rate
        );
        Ok(Self {
            port,
            settings: settings.clone(),
        })
    }
}

impl Transport for SerialTransport {
    fn read_line(&mut self) -> AcqResult<String> {
        // Byte-at-a-time until newline; the configured timeout bounds the
        // whole line, so a silent device yields an empty string rather
        // than an error.
        let deadline = Instant::now() + self.settings.timeout();
        let mut line = String::new();
        let mut buf = [0u8; 1];
        loop {
            if Instant::now() >= deadline {
                break;
            }
            match self.port.read(&mut buf) {
                Ok(1) => {
                    let ch = buf[0] as char;
                    if ch == '\n' {
                        break;
                    }
                    line.push(ch);
                }
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => {
                    return Err(AcqError::Transport(format!(
                        "Serial read failed on '{}': {e}",
                        self.settings.port
                    )))
                }
            }
        }
        Ok(line)
    }

    fn write_all(&mut self, bytes: &[u8]) -> AcqResult<()> {
        self.port
            .write_all(bytes)
            .and_then(|()| self.port.flush())
            .map_err(|e| {
                AcqError::Transport(format!(
                    "Serial write failed on '{}': {e}",
                    self.settings.port
                ))
            })
    }

    fn bytes_available(&mut self) -> AcqResult<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| {
                AcqError::Transport(format!(
                    "Serial status query failed on '{}': {e}",
                    self.settings.port
                ))
            })
    }

    fn read_into(&mut self, buf: &mut [u8]) -> AcqResult<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(AcqError::Transport(format!(
                "Serial read failed on '{}': {e}",
                self.settings.port
            ))),
        }
    }
}

/// Finds a connected port whose name or USB strings contain `hint`
/// (case-insensitive).
///
/// This is a startup-time utility: scanning ports during an active run
/// causes jitter on the acquisition thread.
pub fn lookup_port(hint: &str) -> AcqResult<String> {
    let ports = serialport::available_ports()
        .map_err(|e| AcqError::Transport(format!("Failed to enumerate serial ports: {e}")))?;
    let needle = hint.to_lowercase();

    for info in &ports {
        if info.port_name.to_lowercase().contains(&needle) {
            return Ok(info.port_name.clone());
        }
        if let serialport::SerialPortType::UsbPort(usb) = &info.port_type {
            let product = usb.product.as_deref().unwrap_or("").to_lowercase();
            let manufacturer = usb.manufacturer.as_deref().unwrap_or("").to_lowercase();
            if product.contains(&needle) || manufacturer.contains(&needle) {
                return Ok(info.port_name.clone());
            }
        }
    }

    Err(AcqError::Transport(format!(
        "No serial port matching '{hint}' among {} detected port(s)",
        ports.len()
    )))
}
