//! Error types for the order WAL

use thiserror::Error;

/// Failures surfaced to WAL callers
#[derive(Debug, Error)]
pub enum WalError {
    /// Storage failure on open, append or sync. An append failure seals the writer.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer hit an append error earlier and rejects all further writes.
    #[error("WAL is sealed after an I/O failure")]
    Sealed,

    /// Another live process holds the directory lock.
    #[error("WAL directory locked by pid {pid}")]
    Locked { pid: u32 },

    /// A segment file is missing: history before the gap cannot be rebuilt.
    #[error("replay gap: expected sequence {expected}, next segment starts at {found}")]
    ReplayGap { expected: u64, found: u64 },

    /// Caller passed a value outside the documented bounds.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Frame-level decode failures. These never reach callers: replay counts
/// them as corrupted entries and resynchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Bad magic, unknown version/kind, or header checksum mismatch.
    #[error("corrupt record header")]
    CorruptHeader,

    /// Header verified but the payload checksum does not match.
    /// `frame_len` is the full frame size so the caller can skip it.
    #[error("corrupt record payload ({frame_len} byte frame)")]
    CorruptPayload { frame_len: usize },

    /// Header verified but the buffer ends before the payload does.
    #[error("truncated record")]
    Truncated,
}
