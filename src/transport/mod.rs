//! Device transport abstraction.
//!
//! The acquisition session talks to the device through the object-safe
//! [`Transport`] trait so the protocol logic never touches `serialport`
//! directly: hardware uses [`SerialTransport`] (behind the
//! `instrument_serial` feature), tests and dry runs use
//! [`mock::MockTransport`].

use crate::error::AcqResult;

#[cfg(feature = "instrument_serial")]
mod serial;
#[cfg(feature = "instrument_serial")]
pub use serial::{lookup_port, SerialTransport};

pub mod mock;
pub use mock::MockTransport;

/// Byte-level access to the device link.
///
/// All calls are blocking; any single blocking call is bounded by the
/// transport's configured read timeout. Implementations map their failures
/// to [`crate::error::AcqError::Transport`].
pub trait Transport: Send {
    /// Consumes one line of input (device boot/ready banner).
    ///
    /// Returns whatever arrived before the newline or the read timeout,
    /// possibly empty — a silent device is not an error during handshake.
    fn read_line(&mut self) -> AcqResult<String>;

    /// Writes a complete command frame.
    fn write_all(&mut self, bytes: &[u8]) -> AcqResult<()>;

    /// Number of received bytes ready to read without blocking.
    fn bytes_available(&mut self) -> AcqResult<usize>;

    /// Reads up to `buf.len()` bytes, returning the count actually read.
    fn read_into(&mut self, buf: &mut [u8]) -> AcqResult<usize>;
}
