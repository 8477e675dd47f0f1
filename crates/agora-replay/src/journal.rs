//! Journal - Append-only, line-delimited JSON log
//!
//! One record per line. Appends are strictly serialized through a
//! single writer handle; readers open their own handle and observe a
//! consistent prefix. A trailing partial line (torn write from a
//! previous run) is truncated when the journal is opened.

use crate::error::{Error, Result};
use crate::record::Record;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct Writer {
    file: tokio::fs::File,
    len: u64,
}

/// Append-only journal backed by one `.jsonl` file
pub struct Journal {
    path: PathBuf,
    fsync: bool,
    writer: Mutex<Writer>,
}

impl Journal {
    /// Open (or create) a journal file.
    ///
    /// `fsync` makes every append durable before it returns. The
    /// parent directory is created if missing; an incomplete final
    /// record left by a crash is truncated away.
    pub async fn open(path: impl AsRef<Path>, fsync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let repaired = repair_partial_tail(&path)?;
        if repaired > 0 {
            warn!(path = ?path, bytes = repaired, "Truncated incomplete trailing record");
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let len = file.metadata().await?.len();
        debug!(path = ?path, len, fsync, "Journal opened");

        Ok(Self {
            path,
            fsync,
            writer: Mutex::new(Writer { file, len }),
        })
    }

    /// Path of the underlying file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and return the byte offset it starts at.
    ///
    /// The write is visible to readers as soon as this returns; with
    /// `fsync` enabled it is also durable.
    pub async fn append(&self, record: &Record) -> Result<u64> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let offset = writer.len;
        writer.file.write_all(line.as_bytes()).await?;
        writer.file.flush().await?;
        if self.fsync {
            writer.file.sync_data().await?;
        }
        writer.len += line.len() as u64;
        Ok(offset)
    }

    /// Current journal length in bytes
    pub async fn len(&self) -> u64 {
        self.writer.lock().await.len
    }

    /// Whether the journal holds no records yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read every record starting at `from_offset` (a value previously
    /// returned by [`Journal::append`], or 0 for the whole journal).
    ///
    /// Reading does not block the writer. A line that fails to parse
    /// is skipped with a warning so one corrupt record cannot make the
    /// rest of the journal unreadable.
    pub async fn stream(&self, from_offset: u64) -> Result<Vec<Record>> {
        let len = self.len().await;
        if from_offset > len {
            return Err(Error::OffsetOutOfRange {
                offset: from_offset,
                len,
            });
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(from_offset)).await?;

        let mut records = Vec::new();
        let mut lines = BufReader::new(file).lines();
        let mut read = from_offset;
        while let Some(line) = lines.next_line().await? {
            read += line.len() as u64 + 1;
            // Stop at the writer position observed above so readers see
            // a consistent prefix even while appends continue.
            if read > len {
                break;
            }
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "Skipping unparseable journal line");
                }
            }
        }
        Ok(records)
    }
}

/// Truncate a trailing line that is missing its newline terminator.
///
/// Returns the number of bytes removed. Runs synchronously: it is a
/// one-off repair performed before the writer handle exists.
fn repair_partial_tail(path: &Path) -> Result<u64> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last_newline_end: u64 = 0;
    let mut pos: u64 = 0;
    let mut reader = std::io::BufReader::new(file);
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for (i, b) in buf[..n].iter().enumerate() {
            if *b == b'\n' {
                last_newline_end = pos + i as u64 + 1;
            }
        }
        pos += n as u64;
    }

    if last_newline_end < len {
        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_len(last_newline_end)?;
        return Ok(len - last_newline_end);
    }
    Ok(0)
}
