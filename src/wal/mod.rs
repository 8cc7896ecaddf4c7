//! Write-ahead log for order state
//!
//! Crash-safe persistence with:
//! - CRC32-framed binary records
//! - Size/count-based segment rotation
//! - Checkpoint snapshots for truncated replay
//! - Corruption-tolerant recovery

pub mod record;
pub mod replay;
pub mod segment;
pub mod writer;

pub use record::{RecordHeader, RecordKind, RecordPayload};
pub use replay::{replay_dir, Recovered, ReplayReport};
pub use segment::{DirLock, SegmentWriter};
pub use writer::{OrderWal, WalStats, WriterState};
