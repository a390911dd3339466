//! Core library for serial acquisition of multi-run tapping experiments.
//!
//! The crate coordinates one long-running hardware session: framed commands
//! go out to an embedded device over a serial link, received bytes stream
//! into a structured binary log, and status/data events fan out to
//! independent consumers (a display, a countdown) without blocking the I/O
//! path.
//!
//! # Architecture
//!
//! ```text
//! caller thread          session thread                dispatch thread
//! ─────────────          ──────────────────────        ───────────────
//! Settings, RunLog  ──►  AcquisitionSession            EventBus
//! register_listener      serial I/O + log writes  ──►  listener callbacks
//! set_done (abort)  ──►  cooperative poll loop
//! ```
//!
//! Exactly one session runs at a time against a given [`data::RunLog`];
//! ownership of the log moves into the session thread and comes back in
//! its [`session::SessionOutcome`].

pub mod bus;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod metadata;
pub mod session;
pub mod transport;
pub mod wire;

pub use bus::{BusHandle, EventBus};
pub use config::Settings;
pub use constants::{ProtocolCommands, SymbolTable};
pub use data::RunLog;
pub use error::{AcqError, AcqResult};
pub use metadata::{FileHeader, RunParams, RunRecord};
pub use session::{AcquisitionSession, SessionHandle, SessionOutcome};
