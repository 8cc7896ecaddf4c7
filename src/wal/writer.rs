//! Order WAL writer
//!
//! Sequences every state-changing event, frames it through the codec,
//! appends it to the current segment and applies it to the in-memory
//! order table, all under one lock: on-disk order equals causal order
//! and memory never runs ahead of what replay would rebuild.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::common_utils::get_current_timestamp_ns;
use crate::configure::WalSettings;
use crate::error::WalError;
use crate::logging::LogEvent;
use crate::models::{
    validate_client_id, validate_price, validate_qty, validate_reason, validate_symbol, NewOrder,
    OrderStatus,
};
use crate::order_store::OrderStore;
use crate::wal::record::{
    encode_checkpoint, encode_order_fill, encode_order_new, encode_order_update, encode_record,
    OrderFillEvent, OrderUpdateEvent, RecordKind,
};
use crate::wal::replay::{replay_dir, ReplayReport};
use crate::wal::segment::{prune_segments_below, DirLock, SegmentWriter};

/// Writer health. `Degraded` keeps accepting writes after a failed
/// sync; `Sealed` is terminal after an append failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriterState {
    Healthy,
    Degraded,
    Sealed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalStats {
    pub entries_written: u64,
    pub bytes_written: u64,
    pub checkpoints: u64,
    pub rotations: u64,
    pub current_sequence: u64,
    pub entries_replayed: u64,
    pub corrupted_entries: u64,
    pub sync_failures: u64,
    pub slow_syncs: u64,
}

struct WalInner {
    segment: SegmentWriter,
    sequence: u64,
    state: WriterState,
    stats: WalStats,
    entries_since_checkpoint: u64,
    last_checkpoint_at: Instant,
}

/// Durable order journal plus the live order table it feeds.
pub struct OrderWal {
    dir: PathBuf,
    settings: WalSettings,
    store: Arc<OrderStore>,
    inner: Mutex<WalInner>,
    replay_report: ReplayReport,
    // Held for the writer's lifetime; releasing it is the last teardown step.
    _lock: DirLock,
}

impl OrderWal {
    /// Open (or create) the WAL directory, recover pre-crash state and
    /// resume appending after the last valid record.
    pub fn open(settings: WalSettings) -> Result<Self, WalError> {
        let dir = settings.directory.clone();
        std::fs::create_dir_all(&dir)?;

        let lock = DirLock::acquire(
            &dir,
            &settings.file_prefix,
            Duration::from_secs(settings.lock_stale_seconds),
        )?;

        let recovered = replay_dir(&dir, &settings)?;
        let last_sequence = recovered.last_sequence;

        // Resume on the tail segment when its end is intact and it still
        // has room; otherwise rotate to a fresh segment.
        let segment = match recovered.tail {
            Some(tail)
                if tail.is_clean()
                    && tail.file_len < settings.segment_max_bytes
                    && tail.records < settings.segment_max_records =>
            {
                SegmentWriter::open_for_append(
                    &tail.path,
                    tail.first_seq,
                    tail.file_len,
                    tail.records,
                )?
            }
            Some(tail) => {
                if !tail.is_clean() {
                    warn!(
                        segment = %tail.path.display(),
                        valid_len = tail.valid_len,
                        file_len = tail.file_len,
                        "tail segment damaged, rotating past it"
                    );
                }
                SegmentWriter::create(&dir, &settings.file_prefix, last_sequence + 1)?
            }
            None => SegmentWriter::create(&dir, &settings.file_prefix, last_sequence + 1)?,
        };

        let stats = WalStats {
            current_sequence: last_sequence,
            entries_replayed: recovered.report.entries_replayed,
            corrupted_entries: recovered.report.corrupted_entries,
            ..WalStats::default()
        };

        info!(
            dir = %dir.display(),
            prefix = %settings.file_prefix,
            resume_sequence = last_sequence,
            entries_replayed = recovered.report.entries_replayed,
            corrupted_entries = recovered.report.corrupted_entries,
            "order WAL opened"
        );

        Ok(Self {
            dir,
            settings,
            store: Arc::new(recovered.store),
            inner: Mutex::new(WalInner {
                segment,
                sequence: last_sequence,
                state: WriterState::Healthy,
                stats,
                entries_since_checkpoint: 0,
                last_checkpoint_at: Instant::now(),
            }),
            replay_report: recovered.report,
            _lock: lock,
        })
    }

    /// Journal a new order submission, then note it in the order table.
    pub fn log_order_new(&self, order: &NewOrder) -> Result<u64, WalError> {
        order.validate()?;
        let ts_ns = get_current_timestamp_ns();
        let payload = encode_order_new(order);

        let mut inner = self.inner.lock();
        let seq = self.append_locked(&mut inner, RecordKind::OrderNew, ts_ns, &payload)?;
        self.store.note_order_params(order, ts_ns);
        self.maybe_checkpoint(&mut inner);
        Ok(seq)
    }

    /// Journal a status change (optionally binding the exchange id).
    pub fn log_order_update(
        &self,
        client_order_id: &str,
        exchange_order_id: &str,
        status: OrderStatus,
        reason: &str,
        ts_ns: i64,
    ) -> Result<u64, WalError> {
        validate_client_id(client_order_id)?;
        validate_reason(reason)?;

        let event = OrderUpdateEvent {
            client_order_id: client_order_id.to_string(),
            exchange_order_id: exchange_order_id.to_string(),
            status,
            reason: reason.to_string(),
            ts_ns,
        };
        let payload = encode_order_update(&event);

        let mut inner = self.inner.lock();
        let seq = self.append_locked(
            &mut inner,
            RecordKind::OrderUpdate,
            get_current_timestamp_ns(),
            &payload,
        )?;
        self.store
            .apply_update(client_order_id, exchange_order_id, status, reason, ts_ns);
        self.maybe_checkpoint(&mut inner);
        Ok(seq)
    }

    /// Journal an execution, then fold it into the order's quantities.
    pub fn log_order_fill(
        &self,
        client_order_id: &str,
        symbol: &str,
        qty: f64,
        price: f64,
        ts_ns: i64,
    ) -> Result<u64, WalError> {
        validate_client_id(client_order_id)?;
        validate_symbol(symbol)?;
        validate_qty(qty)?;
        validate_price(price)?;

        let event = OrderFillEvent {
            client_order_id: client_order_id.to_string(),
            symbol: symbol.to_string(),
            qty,
            price,
            ts_ns,
        };
        let payload = encode_order_fill(&event);

        let mut inner = self.inner.lock();
        let seq = self.append_locked(
            &mut inner,
            RecordKind::OrderFill,
            get_current_timestamp_ns(),
            &payload,
        )?;
        self.store
            .apply_fill(client_order_id, symbol, qty, price, ts_ns);
        self.maybe_checkpoint(&mut inner);
        Ok(seq)
    }

    /// Durability barrier: everything appended before this call is on
    /// stable storage once it returns Ok.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        self.sync_locked(&mut inner)
    }

    /// Snapshot the whole order table into one checkpoint record and
    /// sync it before returning. Older segments become prunable.
    pub fn write_checkpoint(&self) -> Result<u64, WalError> {
        let mut inner = self.inner.lock();
        self.write_checkpoint_locked(&mut inner)
    }

    /// Close the current segment and start a new one.
    pub fn rotate(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        self.rotate_locked(&mut inner)
    }

    pub fn current_sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    pub fn stats(&self) -> WalStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.current_sequence = inner.sequence;
        stats
    }

    pub fn state(&self) -> WriterState {
        self.inner.lock().state
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.lock().state == WriterState::Healthy
    }

    /// Shared read handle on the live order table.
    pub fn store(&self) -> Arc<OrderStore> {
        Arc::clone(&self.store)
    }

    /// Outcome of the recovery pass that produced this writer.
    pub fn replay_report(&self) -> &ReplayReport {
        &self.replay_report
    }

    /// Flush, sync and release the directory lock.
    pub fn close(self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        inner.segment.sync()?;
        info!(sequence = inner.sequence, "order WAL closed");
        Ok(())
    }

    /// Write a final checkpoint, then close.
    pub fn close_with_checkpoint(self) -> Result<(), WalError> {
        {
            let mut inner = self.inner.lock();
            self.write_checkpoint_locked(&mut inner)?;
        }
        self.close()
    }

    // ------------------------------------------------------------------
    // Internals (all require the inner lock)
    // ------------------------------------------------------------------

    fn append_locked(
        &self,
        inner: &mut WalInner,
        kind: RecordKind,
        ts_ns: i64,
        payload: &[u8],
    ) -> Result<u64, WalError> {
        if inner.state == WriterState::Sealed {
            return Err(WalError::Sealed);
        }

        if inner.segment.size() >= self.settings.segment_max_bytes
            || inner.segment.record_count() >= self.settings.segment_max_records
        {
            self.rotate_locked(inner)?;
        }

        let seq = inner.sequence + 1;
        let frame = encode_record(kind, seq, ts_ns, payload);

        if let Err(e) = inner.segment.append(&frame) {
            error!(
                "{}",
                LogEvent::new("WAL_SEALED")
                    .field("sequence", seq)
                    .field("error", e.to_string())
                    .service("orderwal")
                    .with_host()
                    .build()
            );
            inner.state = WriterState::Sealed;
            return Err(WalError::Io(e));
        }

        inner.sequence = seq;
        inner.stats.entries_written += 1;
        inner.stats.bytes_written += frame.len() as u64;
        inner.entries_since_checkpoint += 1;

        if self.settings.sync_on_write {
            // A failed sync degrades the writer but the record stands:
            // memory and the OS buffer agree, durability is behind.
            if let Err(e) = self.sync_locked(inner) {
                warn!(sequence = seq, error = %e, "sync-on-write failed");
            }
        }

        Ok(seq)
    }

    fn sync_locked(&self, inner: &mut WalInner) -> Result<(), WalError> {
        let started = Instant::now();
        match inner.segment.sync() {
            Ok(()) => {
                let elapsed_us = started.elapsed().as_micros() as u64;
                if elapsed_us > self.settings.sync_slow_us {
                    warn!(elapsed_us, bound_us = self.settings.sync_slow_us, "slow sync");
                    inner.stats.slow_syncs += 1;
                }
                if inner.state == WriterState::Degraded {
                    info!("sync recovered, writer healthy again");
                    inner.state = WriterState::Healthy;
                }
                Ok(())
            }
            Err(e) => {
                inner.stats.sync_failures += 1;
                if inner.state == WriterState::Healthy {
                    warn!(error = %e, "sync failed, writer degraded");
                    inner.state = WriterState::Degraded;
                }
                Err(WalError::Io(e))
            }
        }
    }

    fn rotate_locked(&self, inner: &mut WalInner) -> Result<(), WalError> {
        // The old segment must be durable before the new one takes
        // records, so replay sees all of it or none of the new.
        self.sync_locked(inner)?;

        let next_first = inner.sequence + 1;
        match SegmentWriter::create(&self.dir, &self.settings.file_prefix, next_first) {
            Ok(segment) => {
                inner.segment = segment;
                inner.stats.rotations += 1;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "segment creation failed, sealing writer");
                inner.state = WriterState::Sealed;
                Err(WalError::Io(e))
            }
        }
    }

    fn write_checkpoint_locked(&self, inner: &mut WalInner) -> Result<u64, WalError> {
        let snapshot = self.store.snapshot();
        let payload = encode_checkpoint(&snapshot);
        let ts_ns = get_current_timestamp_ns();

        let seq = self.append_locked(inner, RecordKind::Checkpoint, ts_ns, &payload)?;
        // A checkpoint must be durable before older segments can go.
        self.sync_locked(inner)?;

        inner.entries_since_checkpoint = 0;
        inner.last_checkpoint_at = Instant::now();
        inner.stats.checkpoints += 1;

        info!(sequence = seq, orders = snapshot.len(), "checkpoint written");

        if let Err(e) = prune_segments_below(&self.dir, &self.settings.file_prefix, seq) {
            warn!(error = %e, "segment pruning failed");
        }

        Ok(seq)
    }

    fn maybe_checkpoint(&self, inner: &mut WalInner) {
        let due_by_count = inner.entries_since_checkpoint >= self.settings.checkpoint_records;
        let due_by_time = inner.last_checkpoint_at.elapsed()
            >= Duration::from_secs(self.settings.checkpoint_seconds)
            && inner.entries_since_checkpoint > 0;

        if due_by_count || due_by_time {
            if let Err(e) = self.write_checkpoint_locked(inner) {
                warn!(error = %e, "auto-checkpoint failed");
            }
        }
    }
}

impl Drop for OrderWal {
    fn drop(&mut self) {
        // Best effort flush; close() is the clean path.
        let mut inner = self.inner.lock();
        let _ = inner.segment.sync();
    }
}
