//! WAL replay and recovery
//!
//! Rebuilds the order table from a segment directory: locate the most
//! recent valid checkpoint, seed the store from it, then apply every
//! subsequent valid record. Torn tails and flipped bits are skipped and
//! counted; a missing segment file aborts recovery.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::configure::WalSettings;
use crate::error::{DecodeError, WalError};
use crate::order_store::OrderStore;
use crate::wal::record::{
    decode_payload, decode_record, find_next_frame, Decoded, RecordKind, RecordPayload,
};
use crate::wal::segment::list_segments;

/// Outcome counters for one recovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    /// Valid event records applied to the store.
    pub entries_replayed: u64,
    /// Frames dropped for checksum/truncation damage.
    pub corrupted_entries: u64,
    /// In-stream sequence discontinuities tolerated.
    pub sequence_gaps: u64,
    /// Whether a checkpoint seeded the store.
    pub checkpoint_loaded: bool,
    /// Sequence of the loaded checkpoint (0 when none).
    pub checkpoint_sequence: u64,
    /// Segment files visited during forward replay.
    pub segments_scanned: usize,
}

/// The most recent segment, as found on disk, with the length of its
/// checksum-valid prefix. The writer reopens it for append when the
/// tail is clean, or rotates past it otherwise.
#[derive(Debug, Clone)]
pub struct TailSegment {
    pub path: PathBuf,
    pub first_seq: u64,
    /// Bytes up to the end of the last valid frame.
    pub valid_len: u64,
    /// File length on disk.
    pub file_len: u64,
    /// Valid records in the segment.
    pub records: u64,
}

impl TailSegment {
    pub fn is_clean(&self) -> bool {
        self.valid_len == self.file_len
    }
}

/// Recovered state handed to the writer on startup.
pub struct Recovered {
    pub store: OrderStore,
    pub last_sequence: u64,
    pub report: ReplayReport,
    pub tail: Option<TailSegment>,
}

/// Replay a WAL directory into a fresh order store.
pub fn replay_dir(dir: &Path, settings: &WalSettings) -> Result<Recovered, WalError> {
    let store = OrderStore::new();
    let mut report = ReplayReport::default();

    let segments = list_segments(dir, &settings.file_prefix)?;
    if segments.is_empty() {
        return Ok(Recovered {
            store,
            last_sequence: 0,
            report,
            tail: None,
        });
    }

    // ---- Checkpoint scan: newest segment backwards -------------------------
    let mut base_seq = 0u64;
    for (first_seq, path) in segments.iter().rev() {
        let data = fs::read(path)?;
        if let Some((seq, states)) = last_valid_checkpoint(&data, *first_seq) {
            info!(
                checkpoint_seq = seq,
                orders = states.len(),
                segment = %path.display(),
                "seeding order store from checkpoint"
            );
            store.restore(states);
            base_seq = seq;
            report.checkpoint_loaded = true;
            report.checkpoint_sequence = seq;
            break;
        }
    }

    // ---- Forward replay from the segment containing base_seq + 1 -----------
    let start_idx = match segments
        .partition_point(|(first_seq, _)| *first_seq <= base_seq + 1)
        .checked_sub(1)
    {
        Some(idx) => idx,
        None => {
            // Leading history is missing entirely.
            let missing = segments[0].0 - (base_seq + 1);
            if missing > settings.replay_max_gap_tolerance {
                return Err(WalError::ReplayGap {
                    expected: base_seq + 1,
                    found: segments[0].0,
                });
            }
            warn!(expected = base_seq + 1, found = segments[0].0, "leading sequence gap tolerated");
            report.sequence_gaps += 1;
            0
        }
    };

    let mut last_seq = base_seq;
    let mut prev_tail_corrupt = false;
    let mut tail = None;

    for (idx, (first_seq, path)) in segments.iter().enumerate().skip(start_idx) {
        // A jump between segment files means history is gone. Tolerated
        // only within the configured bound, or when the previous segment
        // ended in damage (the loss is corruption, already counted).
        if idx > start_idx && *first_seq > last_seq + 1 {
            let missing = *first_seq - last_seq - 1;
            if prev_tail_corrupt || missing <= settings.replay_max_gap_tolerance {
                warn!(
                    expected = last_seq + 1,
                    found = first_seq,
                    "sequence gap across segment boundary"
                );
                report.sequence_gaps += 1;
            } else {
                return Err(WalError::ReplayGap {
                    expected: last_seq + 1,
                    found: *first_seq,
                });
            }
        }

        let data = fs::read(path)?;
        let scan = scan_segment(&data, path, base_seq, &mut last_seq, &store, &mut report);
        prev_tail_corrupt = scan.tail_corrupt;
        report.segments_scanned += 1;

        if idx == segments.len() - 1 {
            tail = Some(TailSegment {
                path: path.clone(),
                first_seq: *first_seq,
                valid_len: scan.valid_len,
                file_len: data.len() as u64,
                records: scan.records,
            });
        }
    }

    info!(
        entries_replayed = report.entries_replayed,
        corrupted_entries = report.corrupted_entries,
        last_sequence = last_seq,
        checkpoint_loaded = report.checkpoint_loaded,
        "replay complete"
    );

    Ok(Recovered {
        store,
        last_sequence: last_seq,
        report,
        tail,
    })
}

struct SegmentScan {
    /// Offset past the last frame that verified.
    valid_len: u64,
    /// Valid frames seen in this segment.
    records: u64,
    /// Whether scanning stopped on damage rather than a clean end.
    tail_corrupt: bool,
}

/// Walk one segment, applying valid event records newer than `base_seq`.
fn scan_segment(
    data: &[u8],
    path: &Path,
    base_seq: u64,
    last_seq: &mut u64,
    store: &OrderStore,
    report: &mut ReplayReport,
) -> SegmentScan {
    let mut offset = 0usize;
    let mut valid_len = 0u64;
    let mut records = 0u64;
    let mut tail_corrupt = false;

    while offset < data.len() {
        let rest = &data[offset..];

        // All-zero tails are preallocation padding, not damage.
        if rest.iter().all(|&b| b == 0) {
            break;
        }

        match decode_record(rest) {
            Ok(Decoded::EndOfStream) => {
                // Non-zero partial header at the tail: one torn frame.
                warn!(segment = %path.display(), offset, "torn partial header at tail");
                report.corrupted_entries += 1;
                tail_corrupt = true;
                break;
            }
            Ok(Decoded::Record { header, payload, consumed }) => {
                if header.sequence > base_seq && header.sequence > *last_seq {
                    if header.sequence != *last_seq + 1 {
                        warn!(
                            segment = %path.display(),
                            offset,
                            expected = *last_seq + 1,
                            found = header.sequence,
                            "sequence gap inside segment"
                        );
                        report.sequence_gaps += 1;
                    }
                    if header.kind != RecordKind::Checkpoint {
                        match decode_payload(header.kind, payload) {
                            Ok(event) => {
                                apply_event(store, event, header.timestamp_ns);
                                report.entries_replayed += 1;
                            }
                            Err(e) => {
                                warn!(
                                    segment = %path.display(),
                                    offset,
                                    error = %e,
                                    "undecodable payload despite valid checksum"
                                );
                                report.corrupted_entries += 1;
                            }
                        }
                    }
                    *last_seq = header.sequence;
                }
                offset += consumed;
                valid_len = offset as u64;
                records += 1;
            }
            Err(DecodeError::Truncated) => {
                // Valid header, payload runs past the end: torn tail write.
                warn!(segment = %path.display(), offset, "truncated frame at tail");
                report.corrupted_entries += 1;
                tail_corrupt = true;
                break;
            }
            Err(DecodeError::CorruptPayload { frame_len }) => {
                warn!(segment = %path.display(), offset, "payload checksum mismatch, skipping frame");
                report.corrupted_entries += 1;
                offset += frame_len;
                tail_corrupt = offset >= data.len();
            }
            Err(DecodeError::CorruptHeader) => {
                warn!(segment = %path.display(), offset, "corrupt header, resynchronizing");
                report.corrupted_entries += 1;
                match find_next_frame(data, offset + 1) {
                    Some(next) => offset = next,
                    None => {
                        tail_corrupt = true;
                        break;
                    }
                }
            }
        }
    }

    SegmentScan {
        valid_len,
        records,
        tail_corrupt,
    }
}

fn apply_event(store: &OrderStore, event: RecordPayload, header_ts_ns: i64) {
    match event {
        RecordPayload::OrderNew(order) => store.note_order_params(&order, header_ts_ns),
        RecordPayload::OrderUpdate(u) => store.apply_update(
            &u.client_order_id,
            &u.exchange_order_id,
            u.status,
            &u.reason,
            u.ts_ns,
        ),
        RecordPayload::OrderFill(f) => {
            store.apply_fill(&f.client_order_id, &f.symbol, f.qty, f.price, f.ts_ns)
        }
        RecordPayload::Checkpoint(_) => {}
    }
}

/// Find the newest checksum-valid checkpoint in a segment, if any. A
/// corrupt checkpoint is simply not a candidate, so recovery falls back
/// to an older one.
fn last_valid_checkpoint(data: &[u8], segment_first_seq: u64) -> Option<(u64, Vec<crate::models::OrderState>)> {
    let mut offset = 0usize;
    let mut found = None;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.iter().all(|&b| b == 0) {
            break;
        }
        match decode_record(rest) {
            Ok(Decoded::EndOfStream) => break,
            Ok(Decoded::Record { header, payload, consumed }) => {
                if header.kind == RecordKind::Checkpoint && header.sequence >= segment_first_seq {
                    if let Ok(RecordPayload::Checkpoint(states)) =
                        decode_payload(RecordKind::Checkpoint, payload)
                    {
                        found = Some((header.sequence, states));
                    }
                }
                offset += consumed;
            }
            Err(DecodeError::Truncated) => break,
            Err(DecodeError::CorruptPayload { frame_len }) => {
                offset += frame_len;
            }
            Err(DecodeError::CorruptHeader) => match find_next_frame(data, offset + 1) {
                Some(next) => offset = next,
                None => break,
            },
        }
    }

    found
}
