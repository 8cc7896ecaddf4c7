#[cfg(test)]
mod tests {
    use orderwal::configure::WalSettings;
    use orderwal::error::WalError;
    use orderwal::models::{NewOrder, OrderStatus, Side};
    use orderwal::wal::segment::list_segments;
    use orderwal::wal::{OrderWal, WriterState};
    use tempfile::TempDir;

    fn order(id: &str) -> NewOrder {
        NewOrder::limit(id, "BTCUSDT", Side::Buy, 1.0, 100.0)
    }

    #[test]
    fn test_sequences_start_at_one() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();

        assert_eq!(wal.current_sequence(), 0);
        assert_eq!(wal.log_order_new(&order("W-1")).unwrap(), 1);
        assert_eq!(wal.log_order_new(&order("W-2")).unwrap(), 2);
        assert_eq!(
            wal.log_order_update("W-1", "EX-1", OrderStatus::Acknowledged, "", 10)
                .unwrap(),
            3
        );
        assert_eq!(wal.log_order_fill("W-1", "BTCUSDT", 0.25, 99.5, 20).unwrap(), 4);
        assert_eq!(wal.current_sequence(), 4);
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();

        let mut bad = order("W-1");
        bad.client_order_id = String::new();
        assert!(matches!(
            wal.log_order_new(&bad),
            Err(WalError::InvalidArgument(_))
        ));

        assert!(matches!(
            wal.log_order_fill("W-1", "BTCUSDT", -0.5, 100.0, 0),
            Err(WalError::InvalidArgument(_))
        ));
        assert!(matches!(
            wal.log_order_fill("W-1", "BTCUSDT", 0.5, f64::NAN, 0),
            Err(WalError::InvalidArgument(_))
        ));
        assert!(matches!(
            wal.log_order_update("", "EX", OrderStatus::Acknowledged, "", 0),
            Err(WalError::InvalidArgument(_))
        ));
        assert!(matches!(
            wal.log_order_update("W-1", "", OrderStatus::Canceled, &"r".repeat(257), 0),
            Err(WalError::InvalidArgument(_))
        ));

        // Nothing was journaled or applied.
        assert_eq!(wal.current_sequence(), 0);
        assert_eq!(wal.store().len(), 0);
    }

    #[test]
    fn test_stats_track_writes() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();

        for i in 0..5 {
            wal.log_order_new(&order(&format!("W-{}", i))).unwrap();
        }
        wal.write_checkpoint().unwrap();

        let stats = wal.stats();
        assert_eq!(stats.entries_written, 6); // 5 orders + checkpoint
        assert_eq!(stats.checkpoints, 1);
        assert_eq!(stats.current_sequence, 6);
        assert!(stats.bytes_written > 0);
        assert_eq!(stats.sync_failures, 0);
        assert!(wal.is_healthy());
        assert_eq!(wal.state(), WriterState::Healthy);
    }

    #[test]
    fn test_rotation_by_bytes() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings {
            segment_max_bytes: 512,
            sync_on_write: false,
            ..WalSettings::in_dir(dir.path())
        })
        .unwrap();

        for i in 0..40 {
            wal.log_order_new(&order(&format!("W-{:02}", i))).unwrap();
        }
        wal.sync().unwrap();

        assert!(wal.stats().rotations > 0);
        let segments = list_segments(dir.path(), "orders").unwrap();
        assert!(segments.len() > 1);
        // Filenames encode each segment's first sequence in order.
        let seqs: Vec<u64> = segments.iter().map(|(s, _)| *s).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
        assert_eq!(seqs[0], 1);
    }

    #[test]
    fn test_auto_checkpoint_by_record_count() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings {
            checkpoint_records: 10,
            sync_on_write: false,
            ..WalSettings::in_dir(dir.path())
        })
        .unwrap();

        for i in 0..25 {
            wal.log_order_new(&order(&format!("W-{:02}", i))).unwrap();
        }

        assert!(wal.stats().checkpoints >= 2);
    }

    #[test]
    fn test_checkpoint_prunes_old_segments() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings {
            segment_max_records: 10,
            sync_on_write: false,
            ..WalSettings::in_dir(dir.path())
        })
        .unwrap();

        for i in 0..25 {
            wal.log_order_new(&order(&format!("W-{:02}", i))).unwrap();
        }
        assert!(list_segments(dir.path(), "orders").unwrap().len() >= 3);

        wal.write_checkpoint().unwrap();

        // Everything before the checkpoint's segment is gone.
        let segments = list_segments(dir.path(), "orders").unwrap();
        assert_eq!(segments.len(), 1);
        wal.close().unwrap();

        // Recovery now runs entirely from the checkpoint.
        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();
        assert_eq!(wal.store().len(), 25);
        assert!(wal.replay_report().checkpoint_loaded);
        assert_eq!(wal.replay_report().entries_replayed, 0);
    }

    #[test]
    fn test_close_with_checkpoint_speeds_restart() {
        let dir = TempDir::new().unwrap();

        {
            let wal = OrderWal::open(WalSettings {
                sync_on_write: false,
                ..WalSettings::in_dir(dir.path())
            })
            .unwrap();
            for i in 0..50 {
                wal.log_order_new(&order(&format!("W-{:02}", i))).unwrap();
            }
            wal.log_order_fill("W-00", "BTCUSDT", 1.0, 99.0, 777).unwrap();
            wal.close_with_checkpoint().unwrap();
        }

        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();
        assert!(wal.replay_report().checkpoint_loaded);
        assert_eq!(wal.replay_report().entries_replayed, 0);
        assert_eq!(wal.store().len(), 50);

        let filled = wal.store().get("W-00").unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.executed_qty, 1.0);

        // Appending continues after the checkpoint's sequence.
        let next = wal.log_order_new(&order("W-99")).unwrap();
        assert_eq!(next, 53); // 50 news + 1 fill + 1 checkpoint + 1
    }

    #[test]
    fn test_update_and_fill_flow_through_store() {
        let dir = TempDir::new().unwrap();
        let wal = OrderWal::open(WalSettings::in_dir(dir.path())).unwrap();
        let store = wal.store();

        wal.log_order_new(&NewOrder::limit("F-1", "BTCUSDT", Side::Sell, 2.0, 50100.0))
            .unwrap();
        assert_eq!(store.get("F-1").unwrap().status, OrderStatus::PendingNew);

        wal.log_order_update("F-1", "EX-55", OrderStatus::Acknowledged, "", 100)
            .unwrap();
        let state = store.get("F-1").unwrap();
        assert_eq!(state.status, OrderStatus::Acknowledged);
        assert_eq!(state.exchange_order_id, "EX-55");

        wal.log_order_fill("F-1", "BTCUSDT", 0.5, 50100.0, 200).unwrap();
        assert_eq!(store.get("F-1").unwrap().status, OrderStatus::PartiallyFilled);
        assert_eq!(store.count_open(), 1);

        wal.log_order_update("F-1", "", OrderStatus::Canceled, "user_cancel", 300)
            .unwrap();
        let state = store.get("F-1").unwrap();
        assert_eq!(state.status, OrderStatus::Canceled);
        assert_eq!(state.reason, "user_cancel");
        assert_eq!(state.executed_qty, 0.5);
        assert_eq!(store.count_terminal(), 1);
    }
}
