//! Application settings for the acquisition core.
//!
//! Settings are plain serde structs with code defaults, optionally layered
//! with a TOML file and `TAPDAQ_*` environment variables via the `config`
//! crate. The core never prompts or guesses: external collaborators (GUI,
//! preset loaders) decide the values; this module only carries them.
//!
//! ## Layering
//!
//! 1. Code defaults (always present, so tests need no file)
//! 2. Optional TOML file passed to [`Settings::new`]
//! 3. Environment variables, e.g. `TAPDAQ_SERIAL__PORT=/dev/ttyACM0`
//!
//! Semantic validation (`validate`) is separate from parsing, so malformed
//! files surface as [`AcqError::Config`] and logically invalid values as
//! [`AcqError::Configuration`].

use crate::error::{AcqError, AcqResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Serial link parameters for the device connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialSettings {
    /// Port path (e.g. "/dev/ttyACM0", "COM3").
    pub port: String,
    /// Baud rate (the device firmware fixes this; 115200 for stock builds).
    pub baud_rate: u32,
    /// Read timeout in milliseconds, bounding any single blocking read.
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
        }
    }
}

impl SerialSettings {
    /// Read timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-experiment acquisition parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Number of runs the log file declares up front.
    pub run_count: usize,
    /// Windows per run (run duration = windows × window period).
    pub windows: u32,
    /// Expected payload bytes per window.
    pub packet_size: u32,
    /// Settle delay between parameter commands, in milliseconds.
    pub settle_ms: u64,
    /// Idle sleep in the receive poll loop when no bytes are pending,
    /// in milliseconds.
    pub poll_idle_ms: u64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            run_count: 1,
            windows: 0,
            packet_size: 0,
            settle_ms: 100,
            poll_idle_ms: 1,
        }
    }
}

impl AcquisitionSettings {
    /// Total payload bytes expected for one run.
    pub fn expected_bytes(&self) -> u64 {
        u64::from(self.windows) * u64::from(self.packet_size)
    }
}

/// Storage locations consumed by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory where run logs are created.
    pub data_dir: PathBuf,
    /// Path to the protocol definitions file (`#define` symbol table).
    pub definitions_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            definitions_path: PathBuf::from("device/protocol_constants.h"),
        }
    }
}

/// Top-level settings for the acquisition core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial link parameters.
    pub serial: SerialSettings,
    /// Acquisition loop parameters.
    pub acquisition: AcquisitionSettings,
    /// Storage locations.
    pub storage: StorageSettings,
}

impl Settings {
    /// Builds settings from defaults, an optional TOML file, and
    /// `TAPDAQ_*` environment variables (in that precedence order).
    pub fn new(config_path: Option<&str>) -> AcqResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let cfg = builder
            .add_source(
                config::Environment::with_prefix("TAPDAQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Semantic validation, distinct from parse errors.
    pub fn validate(&self) -> AcqResult<()> {
        if self.acquisition.run_count == 0 {
            return Err(AcqError::Configuration(
                "run_count must be at least 1".to_string(),
            ));
        }
        if self.acquisition.windows == 0 || self.acquisition.packet_size == 0 {
            return Err(AcqError::Configuration(
                "windows and packet_size must be nonzero".to_string(),
            ));
        }
        if self.serial.port.is_empty() {
            return Err(AcqError::Configuration(
                "serial.port must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
