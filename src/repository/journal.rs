//! Append-only mutation journal.
//!
//! Every repository mutation is written as one frame:
//!
//! ```text
//! magic "NTJ\0" | version u8 | length u32 LE | MessagePack entry | crc32 u32 LE
//! ```
//!
//! Replaying the frames in order rebuilds the in-memory state. A frame cut
//! short by a crash is dropped on open; a complete frame with a bad checksum
//! is reported as corruption.

use crate::error::{NtfyError, Result};
use crate::types::{Notification, Subscription, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for journal frames.
const JOURNAL_MAGIC: &[u8; 4] = b"NTJ\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Frame header size (magic + version + length).
const FRAME_HEADER_SIZE: usize = 4 + 1 + 4;

/// Upper bound on a single entry's payload.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One journaled mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum JournalEntry {
    /// Insert or replace a subscription row.
    PutSubscription(Subscription),
    /// Remove a subscription and its notifications.
    RemoveSubscription(SubscriptionId),
    PutNotification(Notification),
    DeleteNotifications {
        subscription: SubscriptionId,
        ids: Vec<String>,
    },
    ClearNotifications(SubscriptionId),
    /// Lowest subscription id that may still be handed out.
    NextSubscriptionId(u64),
}

/// Outcome of reading one frame.
enum Frame {
    Entry(JournalEntry, u64),
    End,
    Torn,
}

/// Journal file handle.
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    size: u64,
    writes_since_sync: u64,
    /// Sync every N writes.
    sync_interval: u64,
}

impl Journal {
    /// Open or create a journal, returning it with the entries to replay.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let (entries, valid_len) = Self::replay(&file)?;

        if valid_len < file_size {
            warn!(
                path = %path.display(),
                dropped_bytes = file_size - valid_len,
                "Discarding torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok((
            Self {
                path,
                file,
                size: valid_len,
                writes_since_sync: 0,
                sync_interval: sync_interval.max(1),
            },
            entries,
        ))
    }

    /// Append one entry.
    ///
    /// On failure the journal is left at its previous length, so a later
    /// append never lands behind a partial frame.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let frame = encode_frame(entry)?;

        let written = self
            .file
            .seek(SeekFrom::Start(self.size))
            .and_then(|_| self.file.write_all(&frame));
        if let Err(e) = written {
            let _ = self.file.set_len(self.size);
            return Err(e.into());
        }
        self.size += frame.len() as u64;

        self.writes_since_sync += 1;
        if self.writes_since_sync >= self.sync_interval {
            self.sync()?;
        }
        Ok(())
    }

    /// Force pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Replace the whole journal with the given entries.
    ///
    /// Written to a sibling temp file first and renamed into place, so a crash
    /// leaves either the old or the new journal.
    pub fn rewrite(&mut self, entries: impl IntoIterator<Item = JournalEntry>) -> Result<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        {
            let tmp = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(tmp);
            for entry in entries {
                writer.write_all(&encode_frame(&entry)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.size = self.file.metadata()?.len();
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read every complete frame; returns the entries and the byte length
    /// they cover.
    fn replay(file: &File) -> Result<(Vec<JournalEntry>, u64)> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut offset = 0u64;
        loop {
            match read_frame(&mut reader)? {
                Frame::Entry(entry, len) => {
                    entries.push(entry);
                    offset += len;
                }
                Frame::End | Frame::Torn => break,
            }
        }
        Ok((entries, offset))
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.file.sync_all();
    }
}

fn encode_frame(entry: &JournalEntry) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(entry)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(NtfyError::Validation(format!(
            "entry of {} bytes exceeds the {} byte journal limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + 4);
    frame.extend_from_slice(JOURNAL_MAGIC);
    frame.push(JOURNAL_VERSION);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(frame)
}

fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match fill(reader, &mut header)? {
        0 => return Ok(Frame::End),
        n if n < FRAME_HEADER_SIZE => return Ok(Frame::Torn),
        _ => {}
    }

    if &header[0..4] != JOURNAL_MAGIC {
        return Err(NtfyError::InvalidFormat("Invalid journal frame magic".into()));
    }
    if header[4] != JOURNAL_VERSION {
        return Err(NtfyError::InvalidFormat(format!(
            "Unsupported journal version: {}",
            header[4]
        )));
    }

    let len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NtfyError::Corruption(format!("journal frame of {} bytes", len)));
    }
    let mut payload = vec![0u8; len];
    if fill(reader, &mut payload)? < len {
        return Ok(Frame::Torn);
    }

    let mut checksum_bytes = [0u8; 4];
    if fill(reader, &mut checksum_bytes)? < 4 {
        return Ok(Frame::Torn);
    }
    let stored = u32::from_le_bytes(checksum_bytes);
    let computed = crc32fast::hash(&payload);
    if stored != computed {
        return Err(NtfyError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    let entry: JournalEntry = rmp_serde::from_slice(&payload)?;
    Ok(Frame::Entry(entry, (FRAME_HEADER_SIZE + len + 4) as u64))
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
