use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Tunables for one WAL instance. Construct directly for embedded use,
/// or through `load_settings` for file/env-driven deployments.
#[derive(Debug, Clone, Deserialize)]
pub struct WalSettings {
    /// Directory holding segment and lock files.
    pub directory: PathBuf,
    /// Filename stem for segments and the lock file.
    pub file_prefix: String,
    /// fsync after every record. Safest, slowest.
    pub sync_on_write: bool,
    /// Segment rotation threshold in bytes.
    pub segment_max_bytes: u64,
    /// Segment rotation threshold in records.
    pub segment_max_records: u64,
    /// Auto-checkpoint after this many records.
    pub checkpoint_records: u64,
    /// Auto-checkpoint after this many seconds.
    pub checkpoint_seconds: u64,
    /// Largest tolerated sequence hole before recovery aborts.
    pub replay_max_gap_tolerance: u64,
    /// Age before a dead process's lock file may be reclaimed.
    pub lock_stale_seconds: u64,
    /// Sync latency bound; slower syncs are counted and logged.
    pub sync_slow_us: u64,
}

impl Default for WalSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("wal"),
            file_prefix: "orders".to_string(),
            sync_on_write: true,
            segment_max_bytes: 64 * 1024 * 1024,
            segment_max_records: 1_000_000,
            checkpoint_records: 100_000,
            checkpoint_seconds: 60,
            replay_max_gap_tolerance: 0,
            lock_stale_seconds: 30,
            sync_slow_us: 50_000,
        }
    }
}

impl WalSettings {
    /// Settings rooted at `dir` with defaults everywhere else.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            directory: dir.into(),
            ..Self::default()
        }
    }
}

/// Load settings layered as defaults, then `config/orderwal.yaml` if
/// present, then `ORDERWAL_*` environment overrides.
pub fn load_settings() -> Result<WalSettings, ConfigError> {
    let s = Config::builder()
        .set_default("directory", "wal")?
        .set_default("file_prefix", "orders")?
        .set_default("sync_on_write", true)?
        .set_default("segment_max_bytes", 64 * 1024 * 1024i64)?
        .set_default("segment_max_records", 1_000_000i64)?
        .set_default("checkpoint_records", 100_000i64)?
        .set_default("checkpoint_seconds", 60i64)?
        .set_default("replay_max_gap_tolerance", 0i64)?
        .set_default("lock_stale_seconds", 30i64)?
        .set_default("sync_slow_us", 50_000i64)?
        .add_source(File::with_name("config/orderwal").required(false))
        .add_source(config::Environment::with_prefix("ORDERWAL"))
        .build()?;

    s.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = WalSettings::default();
        assert_eq!(s.file_prefix, "orders");
        assert!(s.sync_on_write);
        assert_eq!(s.segment_max_bytes, 64 * 1024 * 1024);
        assert_eq!(s.checkpoint_records, 100_000);
        assert_eq!(s.checkpoint_seconds, 60);
        assert_eq!(s.replay_max_gap_tolerance, 0);
        assert_eq!(s.lock_stale_seconds, 30);
    }

    #[test]
    fn test_in_dir() {
        let s = WalSettings::in_dir("/tmp/wal-test");
        assert_eq!(s.directory, PathBuf::from("/tmp/wal-test"));
        assert_eq!(s.file_prefix, "orders");
    }

    #[test]
    fn test_load_settings_defaults() {
        let s = load_settings().expect("defaults should load");
        assert_eq!(s.segment_max_records, 1_000_000);
        assert_eq!(s.sync_slow_us, 50_000);
    }
}
