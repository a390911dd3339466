//! Header records written into the run log.
//!
//! Both records are serialized as JSON with an 8-byte little-endian length
//! prefix (see `data::run_log`), which keeps the log self-describing: an
//! analysis tool can read a file header and know the run count and session
//! context without any side channel.
//!
//! [`FileHeader`] is written once per log file; [`RunRecord`] once per run
//! (or again on a retry, overwriting in place). [`RunParams`] rides inside
//! the run record and also parameterizes the acquisition session itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SerialSettings;

/// Parameters for a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunParams {
    /// Metronome tempo in beats per minute.
    pub tempo: u32,
    /// Adaptivity alpha for this run.
    pub alpha: f64,
    /// Click-sound selection, when the device supports switching sounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Windows in this run.
    pub windows: u32,
    /// Expected payload bytes per window.
    pub packet_size: u32,
}

impl RunParams {
    /// Total payload bytes expected for the run.
    pub fn expected_bytes(&self) -> u64 {
        u64::from(self.windows) * u64::from(self.packet_size)
    }
}

/// Session-level metadata, written once at offset 0 of the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileHeader {
    /// Declared number of runs (fixes the offset-index size).
    pub run_count: usize,
    /// Descriptive experiment name.
    pub experiment_name: String,
    /// UTC time the session (not any particular run) started.
    pub started: DateTime<Utc>,
    /// Snapshot of the serial link parameters in force.
    pub serial: SerialSettings,
    /// Free-form collaborator fields (subject ids, experimenter, presets).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
    /// Version of the acquisition software that wrote the file.
    pub software_version: String,
}

impl FileHeader {
    /// A header for `run_count` runs with the current time and software
    /// version filled in.
    pub fn new(experiment_name: &str, run_count: usize, serial: SerialSettings) -> Self {
        Self {
            run_count,
            experiment_name: experiment_name.to_string(),
            started: Utc::now(),
            serial,
            extra: HashMap::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attaches a collaborator field (subject ids, experimenter id, ...).
    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Per-run metadata, written immediately before the run's payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// Zero-based run number.
    pub run_number: usize,
    /// UTC time this run (or this retry of it) started.
    pub start_time: DateTime<Utc>,
    /// Parameters in force for the run.
    pub params: RunParams,
}

impl RunRecord {
    /// A record for run `run_number` starting now.
    pub fn new(run_number: usize, params: RunParams) -> Self {
        Self {
            run_number,
            start_time: Utc::now(),
            params,
        }
    }
}
