//! Append-oriented binary log of a multi-run acquisition session.
//!
//! One file holds a whole session:
//!
//! ```text
//! offset 0:      u64 LE   header_length
//! offset 8:      header_length bytes of JSON file-header record
//! offset H:      run_count × 8 bytes, each a u64 LE offset-index slot (0 = unset)
//! offset H+8N:   run blocks, each: u64 LE run_header_length, JSON run header,
//!                raw payload bytes
//! ```
//!
//! The offset index makes an otherwise append-only file randomly accessible:
//! slot `k` holds the absolute offset of run `k`'s currently valid header.
//! Starting a run for the first time appends its block at end-of-file and
//! patches the slot; restarting an aborted run seeks back to the recorded
//! offset and overwrites from there, leaving the slot untouched.
//!
//! A shortened restart can strand stale bytes between the rewritten block
//! and the next run's block (or end-of-file). Those bytes stay on disk,
//! unreferenced — the format records no payload length, so a cheap abort
//! never rewrites the tail. [`RunLog::read_run_payload`] bounds a payload by
//! the next recorded run offset or end-of-file, which means a shortened
//! *final* run reads back with its stale tail attached. Analysis tooling
//! that needs exact counts reconciles against the expected byte total.

use crate::error::{AcqError, AcqResult};
use crate::metadata::{FileHeader, RunRecord};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SLOT_SIZE: u64 = 8;

/// Writer/reader for the session log file.
///
/// A `RunLog` exclusively owns its file descriptor. [`RunLog::close`]
/// releases the descriptor while remembering the write offset, and
/// [`RunLog::reopen`] restores it, so a caller may hand the file back and
/// forth between runs without losing position.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
    run_count: usize,
    /// Absolute offset of the offset index; 0 until the file header exists.
    index_offset: u64,
    /// Current write position, preserved across close/reopen.
    write_pos: u64,
    /// In-memory mirror of the offset index.
    slots: Vec<u64>,
}

impl RunLog {
    /// Creates a fresh log at `path` for `run_count` runs.
    ///
    /// The file must not already exist: whether an existing file may be
    /// overwritten is the caller's policy decision, not this crate's.
    pub fn create(path: &Path, run_count: usize) -> AcqResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        log::info!("Created run log at '{}' ({} runs)", path.display(), run_count);
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            run_count,
            index_offset: 0,
            write_pos: 0,
            slots: vec![0; run_count],
        })
    }

    /// Opens an existing log for post-hoc inspection.
    ///
    /// The run count and offset index are recovered from the file itself.
    pub fn open(path: &Path) -> AcqResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let end = file.metadata()?.len();
        let mut log = Self {
            path: path.to_path_buf(),
            file: Some(file),
            run_count: 0,
            index_offset: 0,
            write_pos: end,
            slots: Vec::new(),
        };
        let header = log.read_file_header()?;
        log.run_count = header.run_count;
        log.load_index()?;
        Ok(log)
    }

    /// The path this log lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared number of runs.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Absolute offset recorded for run `index`, or `None` if the run has
    /// never been started.
    pub fn run_offset(&self, index: usize) -> Option<u64> {
        match self.slots.get(index) {
            Some(&off) if off != 0 => Some(off),
            _ => None,
        }
    }

    /// Writes the file header and reserves the zeroed offset index.
    ///
    /// Must be called exactly once, before any run header.
    pub fn write_file_header(&mut self, header: &FileHeader) -> AcqResult<()> {
        if self.index_offset != 0 {
            return Err(AcqError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "file header already written",
            )));
        }
        if header.run_count != self.run_count {
            log::warn!(
                "File header declares {} runs but the log was created for {}",
                header.run_count,
                self.run_count
            );
        }

        let body = serde_json::to_vec(header).map_err(io_invalid_data)?;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&(body.len() as u64).to_le_bytes())?;
        file.write_all(&body)?;
        self.index_offset = SLOT_SIZE + body.len() as u64;

        // Reserve one zeroed u64 slot per run.
        let zeros = vec![0u8; self.run_count * SLOT_SIZE as usize];
        let file = self.file_mut()?;
        file.write_all(&zeros)?;
        self.write_pos = self.index_offset + zeros.len() as u64;
        log::debug!(
            "File header written; offset index at {} covers {} runs",
            self.index_offset,
            self.run_count
        );
        Ok(())
    }

    /// Writes (or rewrites) the header for run `index` and positions the
    /// log for that run's payload.
    ///
    /// First start: the block is appended at end-of-file and the index slot
    /// is patched with its offset. Restart after an abort: the write pointer
    /// seeks back to the slot's recorded offset and the new header
    /// overwrites the old one in place; the slot itself is not rewritten.
    pub fn write_run_header(&mut self, index: usize, record: &RunRecord) -> AcqResult<()> {
        if index >= self.run_count {
            return Err(AcqError::InvalidRunIndex {
                index,
                run_count: self.run_count,
            });
        }
        if self.index_offset == 0 {
            return Err(AcqError::NotInitialized);
        }

        let body = serde_json::to_vec(record).map_err(io_invalid_data)?;
        let block_offset = match self.run_offset(index) {
            None => {
                let index_offset = self.index_offset;
                let file = self.file_mut()?;
                let end = file.seek(SeekFrom::End(0))?;
                // Patch the slot before the header lands, matching the
                // recorded-offset-first ordering of the format.
                file.seek(SeekFrom::Start(index_offset + index as u64 * SLOT_SIZE))?;
                file.write_all(&end.to_le_bytes())?;
                self.slots[index] = end;
                log::debug!("Run {index} starts at offset {end}");
                end
            }
            Some(offset) => {
                log::info!("Run {index} restarted; overwriting block at offset {offset}");
                offset
            }
        };

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(block_offset))?;
        file.write_all(&(body.len() as u64).to_le_bytes())?;
        file.write_all(&body)?;
        self.write_pos = block_offset + SLOT_SIZE + body.len() as u64;
        Ok(())
    }

    /// Appends raw payload bytes at the current write position.
    pub fn append_payload(&mut self, bytes: &[u8]) -> AcqResult<()> {
        if self.index_offset == 0 {
            return Err(AcqError::NotInitialized);
        }
        let pos = self.write_pos;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(bytes)?;
        self.write_pos += bytes.len() as u64;
        Ok(())
    }

    /// Releases the file descriptor, remembering the write offset.
    /// Idempotent.
    pub fn close(&mut self) -> AcqResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            log::debug!(
                "Run log closed at write offset {} ('{}')",
                self.write_pos,
                self.path.display()
            );
        }
        Ok(())
    }

    /// Restores the file descriptor and seeks back to the remembered write
    /// offset. Idempotent.
    pub fn reopen(&mut self) -> AcqResult<()> {
        if self.file.is_none() {
            let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            file.seek(SeekFrom::Start(self.write_pos))?;
            self.file = Some(file);
            log::debug!(
                "Run log reopened at write offset {} ('{}')",
                self.write_pos,
                self.path.display()
            );
        }
        Ok(())
    }

    /// True while the descriptor is held.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Reads back the file header record.
    pub fn read_file_header(&mut self) -> AcqResult<FileHeader> {
        let body = self.read_prefixed(0)?;
        serde_json::from_slice(&body).map_err(io_invalid_data).map_err(AcqError::Io)
    }

    /// Reads back the header record for run `index` via the offset index.
    pub fn read_run_header(&mut self, index: usize) -> AcqResult<RunRecord> {
        let offset = self.started_run_offset(index)?;
        let body = self.read_prefixed(offset)?;
        serde_json::from_slice(&body).map_err(io_invalid_data).map_err(AcqError::Io)
    }

    /// Reads back the raw payload for run `index`.
    ///
    /// The payload spans from the end of the run's header to the nearest
    /// recorded run offset beyond it, or to end-of-file for the last block.
    pub fn read_run_payload(&mut self, index: usize) -> AcqResult<Vec<u8>> {
        let offset = self.started_run_offset(index)?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        let header_len = read_u64(file)?;
        let payload_start = offset + SLOT_SIZE + header_len;

        let end_of_file = file.metadata()?.len();
        let payload_end = self
            .slots
            .iter()
            .copied()
            .filter(|&s| s > offset)
            .min()
            .unwrap_or(end_of_file);

        let mut payload = vec![0u8; payload_end.saturating_sub(payload_start) as usize];
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(payload_start))?;
        file.read_exact(&mut payload)?;
        self.restore_write_cursor()?;
        Ok(payload)
    }

    // ------------------------------------------------------------------
    // internals

    fn file_mut(&mut self) -> AcqResult<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            AcqError::Io(std::io::Error::new(
                ErrorKind::NotConnected,
                "run log is closed",
            ))
        })
    }

    /// Reads a length-prefixed record starting at `offset`.
    fn read_prefixed(&mut self, offset: u64) -> AcqResult<Vec<u8>> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        let len = read_u64(file)?;
        let mut body = vec![0u8; len as usize];
        file.read_exact(&mut body)?;
        self.restore_write_cursor()?;
        Ok(body)
    }

    /// Slot offset for a run that must have been started.
    fn started_run_offset(&self, index: usize) -> AcqResult<u64> {
        if index >= self.run_count {
            return Err(AcqError::InvalidRunIndex {
                index,
                run_count: self.run_count,
            });
        }
        self.run_offset(index).ok_or_else(|| {
            AcqError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("run {index} was never started"),
            ))
        })
    }

    /// Reloads the offset index from the file (read-side constructor).
    fn load_index(&mut self) -> AcqResult<()> {
        let index_offset = self.index_offset;
        let run_count = self.run_count;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(index_offset))?;
        let mut slots = Vec::with_capacity(run_count);
        for _ in 0..run_count {
            slots.push(read_u64(file)?);
        }
        self.slots = slots;
        Ok(())
    }

    /// Reads leave the OS cursor wherever they finished; put it back so a
    /// subsequent append lands at the write position.
    fn restore_write_cursor(&mut self) -> AcqResult<()> {
        let pos = self.write_pos;
        self.file_mut()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

fn read_u64(file: &mut File) -> AcqResult<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn io_invalid_data(err: serde_json::Error) -> std::io::Error {
    std::io::Error::new(ErrorKind::InvalidData, err)
}
