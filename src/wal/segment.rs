//! Segment files and directory management
//!
//! One directory holds the log as a series of append-only segment
//! files. The filename encodes the first sequence number stored in the
//! segment as 16 lowercase hex digits: `<prefix>_<first_seq:016x>.wal`.
//! A `<prefix>.lock` file containing the owner pid enforces a single
//! writer per directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::WalError;

pub const SEGMENT_EXT: &str = "wal";

/// Build a segment filename for the given first sequence.
pub fn segment_file_name(prefix: &str, first_seq: u64) -> String {
    format!("{}_{:016x}.{}", prefix, first_seq, SEGMENT_EXT)
}

/// Parse a segment filename back into its first sequence.
pub fn parse_segment_file_name(prefix: &str, name: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let hex = rest.strip_suffix(".wal")?;
    if hex.len() != 16 {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// List segment files under `dir` matching `prefix`, sorted by their
/// encoded first sequence.
pub fn list_segments(dir: &Path, prefix: &str) -> std::io::Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(first_seq) = parse_segment_file_name(prefix, name) {
                segments.push((first_seq, path));
            }
        }
    }
    segments.sort_by_key(|(seq, _)| *seq);
    Ok(segments)
}

/// Delete every segment whose records all precede `checkpoint_seq`.
/// A segment qualifies when the next segment's encoded first sequence
/// is at or below the checkpoint, so the checkpoint itself always
/// survives. Returns the number of files removed.
pub fn prune_segments_below(
    dir: &Path,
    prefix: &str,
    checkpoint_seq: u64,
) -> std::io::Result<usize> {
    let segments = list_segments(dir, prefix)?;
    let mut removed = 0;
    for pair in segments.windows(2) {
        let (first_seq, path) = &pair[0];
        let next_first = pair[1].0;
        if next_first <= checkpoint_seq {
            info!(segment = %path.display(), first_seq = *first_seq, "pruning segment below checkpoint");
            fs::remove_file(path)?;
            removed += 1;
        } else {
            break;
        }
    }
    Ok(removed)
}

// ============================================================================
// Segment writer
// ============================================================================

/// Append handle on one segment file. `append` lands bytes in the OS
/// buffer; only `sync` makes them durable.
pub struct SegmentWriter {
    file: File,
    path: PathBuf,
    first_seq: u64,
    size: u64,
    records: u64,
}

impl SegmentWriter {
    /// Create a fresh segment whose first record will carry `first_seq`.
    pub fn create(dir: &Path, prefix: &str, first_seq: u64) -> std::io::Result<Self> {
        let path = dir.join(segment_file_name(prefix, first_seq));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        info!(segment = %path.display(), first_seq, "created segment");
        Ok(Self {
            file,
            path,
            first_seq,
            size: 0,
            records: 0,
        })
    }

    /// Reopen an existing segment for append after a clean recovery.
    /// `size`/`records` come from the replay scan of its valid prefix.
    pub fn open_for_append(
        path: &Path,
        first_seq: u64,
        size: u64,
        records: u64,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        info!(segment = %path.display(), first_seq, size, records, "reopened segment for append");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            first_seq,
            size,
            records,
        })
    }

    /// Append one encoded record frame; returns the byte offset the
    /// frame starts at.
    pub fn append(&mut self, bytes: &[u8]) -> std::io::Result<u64> {
        let offset = self.size;
        self.file.write_all(bytes)?;
        self.size += bytes.len() as u64;
        self.records += 1;
        Ok(offset)
    }

    /// Force everything appended so far to stable storage.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    pub fn first_sequence(&self) -> u64 {
        self.first_seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Directory lock
// ============================================================================

/// Exclusive ownership of a WAL directory, backed by `<prefix>.lock`
/// holding the owner pid in ASCII decimal. Dropped on clean shutdown;
/// stale locks from dead processes are reclaimed after `stale_after`.
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    pub fn acquire(dir: &Path, prefix: &str, stale_after: Duration) -> Result<Self, WalError> {
        let path = dir.join(format!("{}.lock", prefix));

        match Self::try_create(&path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => {
                return Err(WalError::Io(e))
            }
            Err(_) => {}
        }

        let holder = fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        if let Some(pid) = holder {
            if pid_exists(pid) {
                return Err(WalError::Locked { pid });
            }
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .unwrap_or(Duration::ZERO);
            if age < stale_after {
                return Err(WalError::Locked { pid });
            }
            warn!(pid, lock = %path.display(), "reclaiming stale lock from dead process");
        } else {
            warn!(lock = %path.display(), "reclaiming unreadable lock file");
        }

        fs::remove_file(&path)?;
        Self::try_create(&path).map_err(WalError::Io)
    }

    fn try_create(path: &Path) -> std::io::Result<DirLock> {
        let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;
        Ok(DirLock {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn pid_exists(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{}", pid)).exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        // Without a portable liveness probe, only the age policy applies.
        let _ = pid;
        false
    }
}
