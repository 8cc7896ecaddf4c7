//! Offline WAL inspection tool
//!
//! `waltool inspect` walks segment files frame by frame and prints an
//! integrity verdict for each; `waltool replay` runs full recovery and
//! prints the report plus the rebuilt order table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use orderwal::configure::WalSettings;
use orderwal::error::DecodeError;
use orderwal::wal::record::{decode_record, Decoded};
use orderwal::wal::replay::replay_dir;
use orderwal::wal::segment::list_segments;

#[derive(Parser)]
#[command(name = "waltool", about = "Inspect and replay order WAL directories")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk segments and print per-record header summaries
    Inspect {
        /// WAL directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Segment filename prefix
        #[arg(short, long, default_value = "orders")]
        prefix: String,
    },
    /// Run recovery and print the report and recovered orders
    Replay {
        /// WAL directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Segment filename prefix
        #[arg(short, long, default_value = "orders")]
        prefix: String,
        /// Print recovered orders as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = orderwal::logging::setup::setup_async_file_logging("waltool", "logs");

    match cli.command {
        Command::Inspect { dir, prefix } => inspect(&dir, &prefix),
        Command::Replay { dir, prefix, json } => replay(&dir, &prefix, json),
    }
}

fn inspect(dir: &PathBuf, prefix: &str) -> Result<()> {
    let segments = list_segments(dir, prefix).context("list segments")?;
    if segments.is_empty() {
        println!("no segments matching {}_*.wal in {}", prefix, dir.display());
        return Ok(());
    }

    for (first_seq, path) in segments {
        let data = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        println!(
            "segment {} (first_seq={}, {} bytes)",
            path.display(),
            first_seq,
            data.len()
        );

        let mut offset = 0usize;
        while offset < data.len() {
            let rest = &data[offset..];
            if rest.iter().all(|&b| b == 0) {
                println!("  [{:>10}] zero padding to end", offset);
                break;
            }
            match decode_record(rest) {
                Ok(Decoded::EndOfStream) => {
                    println!("  [{:>10}] partial header ({} trailing bytes)", offset, rest.len());
                    break;
                }
                Ok(Decoded::Record { header, consumed, .. }) => {
                    println!(
                        "  [{:>10}] seq={} kind={:?} ts={} payload={}B",
                        offset, header.sequence, header.kind, header.timestamp_ns, header.payload_len
                    );
                    offset += consumed;
                }
                Err(DecodeError::Truncated) => {
                    println!("  [{:>10}] TRUNCATED frame", offset);
                    break;
                }
                Err(DecodeError::CorruptPayload { frame_len }) => {
                    println!("  [{:>10}] CORRUPT payload ({} byte frame)", offset, frame_len);
                    offset += frame_len;
                }
                Err(DecodeError::CorruptHeader) => {
                    println!("  [{:>10}] CORRUPT header, stopping segment walk", offset);
                    break;
                }
            }
        }
    }
    Ok(())
}

fn replay(dir: &PathBuf, prefix: &str, json: bool) -> Result<()> {
    let mut settings = WalSettings::in_dir(dir.clone());
    settings.file_prefix = prefix.to_string();

    let recovered = replay_dir(dir, &settings).context("replay")?;

    println!("{}", serde_json::to_string_pretty(&recovered.report)?);
    println!("last_sequence: {}", recovered.last_sequence);
    println!("orders: {}", recovered.store.len());

    if json {
        let mut orders = recovered.store.snapshot();
        orders.sort_by(|a, b| a.client_order_id.cmp(&b.client_order_id));
        println!("{}", serde_json::to_string_pretty(&orders)?);
    }
    Ok(())
}
