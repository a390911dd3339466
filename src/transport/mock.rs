//! Scripted in-memory transport for tests and hardware-less dry runs.

use super::Transport;
use crate::error::{AcqError, AcqResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Hook invoked on every availability check with the running check count.
pub type AvailableHook = Box<dyn FnMut(usize) + Send>;

/// Shared script/recording state behind a [`MockTransport`].
#[derive(Default)]
pub struct MockState {
    /// Lines served to `read_line` (handshake banner), front first.
    pub handshake: VecDeque<String>,
    /// Incoming byte chunks; one chunk becomes available per poll.
    pub chunks: VecDeque<Vec<u8>>,
    /// Every frame the session wrote, in order.
    pub writes: Vec<Vec<u8>>,
    /// Number of `bytes_available` calls so far.
    pub available_checks: usize,
    /// When set, `read_into` fails — simulates a dying link mid-run.
    pub fail_reads: bool,
    /// Observer for availability checks (e.g. flip an abort flag after N).
    pub on_available: Option<AvailableHook>,
}

/// Transport whose device side is a script.
///
/// State lives behind an `Arc` so a test keeps a probe into the transport
/// after moving it into a session thread.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A transport with one handshake line and the given incoming chunks.
    pub fn scripted(chunks: Vec<Vec<u8>>) -> Self {
        let transport = Self::default();
        {
            let mut state = transport.lock();
            state.handshake.push_back("ready".to_string());
            state.chunks = chunks.into();
        }
        transport
    }

    /// A probe into the shared state for inspection and mid-run edits.
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// Locks the shared state.
    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Concatenation of every frame written so far.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock().writes.iter().flatten().copied().collect()
    }
}

impl Transport for MockTransport {
    fn read_line(&mut self) -> AcqResult<String> {
        Ok(self.lock().handshake.pop_front().unwrap_or_default())
    }

    fn write_all(&mut self, bytes: &[u8]) -> AcqResult<()> {
        self.lock().writes.push(bytes.to_vec());
        Ok(())
    }

    fn bytes_available(&mut self) -> AcqResult<usize> {
        let mut state = self.lock();
        state.available_checks += 1;
        let count = state.available_checks;
        if let Some(hook) = state.on_available.as_mut() {
            hook(count);
        }
        Ok(state.chunks.front().map_or(0, Vec::len))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> AcqResult<usize> {
        let mut state = self.lock();
        if state.fail_reads {
            return Err(AcqError::Transport("mock transport failed".to_string()));
        }
        match state.chunks.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                // Put any remainder back so nothing is silently dropped.
                if n < chunk.len() {
                    state.chunks.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }
}
