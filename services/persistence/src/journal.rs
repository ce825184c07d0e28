//! Write-ahead journal
//!
//! Every repository mutation is appended here and flushed before it is
//! applied in memory. Recovery loads the newest snapshot and replays the
//! entries written after it.
//!
//! # Binary Format (per entry)
//! ```text
//! [body_len: u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [kind_len: u16][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum: u32]  // CRC32C over sequence+timestamp+kind+payload
//! ```
//!
//! Entries go to segment files `journal-{index:06}.bin`. Opening a writer
//! always starts a new segment, so a torn tail left by a crash is never
//! appended to. A snapshot seals the active segment; once the snapshot is
//! on disk the sealed segments are removed.

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use types::errors::RepositoryError;

/// Largest body accepted when reading; anything bigger is corruption.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },
}

impl From<JournalError> for RepositoryError {
    fn from(err: JournalError) -> Self {
        RepositoryError::Unavailable(format!("journal: {err}"))
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// fsync after every entry; when off, entries are only flushed to the OS
    pub fsync: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("data/journal"),
            fsync: true,
        }
    }
}

// ── Journal Entry ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Monotonic, starting at 1
    pub sequence: u64,
    /// Unix nanoseconds when the entry was written
    pub timestamp: i64,
    /// Short mutation name, for diagnostics
    pub kind: String,
    /// Bincode-encoded mutation
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalEntry {
    pub fn new(sequence: u64, timestamp: i64, kind: impl Into<String>, payload: Vec<u8>) -> Self {
        let kind = kind.into();
        let checksum = Self::compute_checksum(sequence, timestamp, &kind, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let kind = self.kind.as_bytes();
        let body_len = 8 + 8 + 2 + kind.len() + 4 + self.payload.len() + 4;

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(kind.len() as u16).to_le_bytes());
        buf.extend_from_slice(kind);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode one entry from the front of `data`.
    ///
    /// Returns the entry and the bytes it used. The checksum is not
    /// verified here.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let mut frame = Frame::new(data);
        let body_len = frame.u32()? as usize;
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "implausible body length {body_len}"
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Serialization(format!(
                "incomplete entry: need {total} bytes, have {}",
                data.len()
            )));
        }

        let mut body = Frame::new(&data[4..total]);
        let sequence = body.u64()?;
        let timestamp = body.u64()? as i64;
        let kind_len = body.u16()? as usize;
        let kind = String::from_utf8(body.take(kind_len)?.to_vec())
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        let payload_len = body.u32()? as usize;
        let payload = body.take(payload_len)?.to_vec();
        let checksum = body.u32()?;

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

/// Bounds-checked little-endian cursor.
struct Frame<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Frame<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JournalError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| JournalError::Serialization(format!("entry truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, JournalError> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32, JournalError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, JournalError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Where a snapshot cut the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalMark {
    /// Last sequence covered by the snapshot (0 when nothing was written)
    pub sequence: u64,
    /// Segment opened by the seal; every lower index is covered
    pub segment: u64,
}

pub struct JournalWriter {
    dir: PathBuf,
    fsync: bool,
    writer: BufWriter<File>,
    segment: u64,
    next_sequence: u64,
}

impl JournalWriter {
    /// Open a fresh segment in `config.dir`. The first entry written gets
    /// `next_sequence`.
    pub fn open(config: &JournalConfig, next_sequence: u64) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;
        let segment = list_segments(&config.dir)?
            .last()
            .map(|(index, _)| index + 1)
            .unwrap_or(0);
        let writer = open_segment(&config.dir, segment)?;
        debug!(dir = %config.dir.display(), segment, next_sequence, "journal opened");
        Ok(Self {
            dir: config.dir.clone(),
            fsync: config.fsync,
            writer,
            segment,
            next_sequence: next_sequence.max(1),
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn segment(&self) -> u64 {
        self.segment
    }

    /// Append one entry and flush it (and fsync, if configured) before
    /// returning its sequence.
    ///
    /// A failed append may leave a partial entry behind, so the writer
    /// moves on to a new segment and the sequence is reused there.
    pub fn append(&mut self, timestamp: i64, kind: &str, payload: Vec<u8>) -> Result<u64, JournalError> {
        let entry = JournalEntry::new(self.next_sequence, timestamp, kind, payload);
        if let Err(e) = self.write_entry(&entry) {
            warn!(segment = self.segment, sequence = entry.sequence, error = %e, "journal append failed, rolling segment");
            self.segment += 1;
            self.writer = open_segment(&self.dir, self.segment)?;
            return Err(e);
        }
        self.next_sequence += 1;
        Ok(entry.sequence)
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        self.writer.write_all(&entry.to_bytes())?;
        self.writer.flush()?;
        if self.fsync {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Close the active segment and start the next one.
    pub fn seal(&mut self) -> Result<JournalMark, JournalError> {
        self.sync()?;
        self.segment += 1;
        self.writer = open_segment(&self.dir, self.segment)?;
        Ok(JournalMark {
            sequence: self.next_sequence - 1,
            segment: self.segment,
        })
    }

    /// Delete segments fully covered by a snapshot taken at `mark`.
    pub fn release(&self, mark: JournalMark) -> Result<usize, JournalError> {
        let mut removed = 0;
        for (index, path) in list_segments(&self.dir)? {
            if index < mark.segment {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn open_segment(dir: &Path, index: u64) -> Result<BufWriter<File>, JournalError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(segment_path(dir, index))?;
    Ok(BufWriter::new(file))
}

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{index:06}.bin"))
}

/// Segment files in `dir` as (index, path), ascending.
fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>, JournalError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let index = name
            .strip_prefix("journal-")
            .and_then(|rest| rest.strip_suffix(".bin"))
            .and_then(|index| index.parse::<u64>().ok());
        if let Some(index) = index {
            segments.push((index, entry.path()));
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

// ── Journal Reader ──────────────────────────────────────────────────

/// A segment whose tail could not be read.
#[derive(Debug, Clone)]
pub struct CorruptionRecord {
    pub segment: PathBuf,
    pub byte_offset: usize,
    pub detail: String,
}

/// Every readable entry across all segments, in file order.
#[derive(Debug, Default)]
pub struct JournalScan {
    pub entries: Vec<JournalEntry>,
    pub corruption: Vec<CorruptionRecord>,
}

/// Read all segments in `dir`. A segment is read up to its first
/// undecodable or checksum-failing entry; the rest of it is skipped.
pub fn read_journal(dir: &Path) -> Result<JournalScan, JournalError> {
    let mut scan = JournalScan::default();
    for (_, path) in list_segments(dir)? {
        let data = fs::read(&path)?;
        let mut pos = 0;
        while pos < data.len() {
            let failure = match JournalEntry::from_bytes(&data[pos..]) {
                Ok((entry, _)) if !entry.verify_checksum() => {
                    format!("CRC32C mismatch for seq={}", entry.sequence)
                }
                Ok((entry, consumed)) => {
                    pos += consumed;
                    scan.entries.push(entry);
                    continue;
                }
                Err(e) => e.to_string(),
            };
            warn!(segment = %path.display(), offset = pos, detail = %failure, "journal segment tail skipped");
            scan.corruption.push(CorruptionRecord {
                segment: path.clone(),
                byte_offset: pos,
                detail: failure,
            });
            break;
        }
    }
    Ok(scan)
}

// ── Tests ───────────────────────────────────────────────────────────
