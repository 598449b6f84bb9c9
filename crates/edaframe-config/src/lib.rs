//! Global configuration for the edaframe runtime.
//!
//! Values are initialized from environment variables on first access and
//! can be overridden at runtime via setter functions.
//!
//! - `EDAFRAME_PARTITION_BYTES`: Target in-memory size of one partition when
//!   an in-memory table is repartitioned. Accepts plain integers and
//!   `K`/`KB`, `M`/`MB`, `G`/`GB` suffixes. Default: 128 MiB.
//!
//! - `EDAFRAME_SAMPLE_ROWS`: Number of leading rows materialized once to
//!   feed semantic type detection. Default: 100.
//!
//! - `EDAFRAME_HEAD_ROWS`: Default size of a frame's cached head sample.
//!   Default: 5.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_PARTITION_BYTES: usize = 128 * 1024 * 1024; // 128 MiB
const DEFAULT_SAMPLE_ROWS: usize = 100;
const DEFAULT_HEAD_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Atomic globals
// ---------------------------------------------------------------------------

static PARTITION_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_PARTITION_BYTES);
static SAMPLE_ROWS: AtomicUsize = AtomicUsize::new(DEFAULT_SAMPLE_ROWS);
static HEAD_ROWS: AtomicUsize = AtomicUsize::new(DEFAULT_HEAD_ROWS);

static INIT: Once = Once::new();

/// Ensure environment variable overrides are applied (idempotent).
fn ensure_init() {
    INIT.call_once(|| {
        if let Some(n) = env_value("EDAFRAME_PARTITION_BYTES", parse_byte_size) {
            PARTITION_BYTES.store(n, Ordering::Relaxed);
        }
        if let Some(n) = env_value("EDAFRAME_SAMPLE_ROWS", parse_count) {
            SAMPLE_ROWS.store(n, Ordering::Relaxed);
        }
        if let Some(n) = env_value("EDAFRAME_HEAD_ROWS", parse_count) {
            HEAD_ROWS.store(n, Ordering::Relaxed);
        }
    });
}

fn env_value(name: &str, parse: fn(&str) -> Option<usize>) -> Option<usize> {
    std::env::var(name).ok().as_deref().and_then(parse).filter(|&n| n > 0)
}

/// Parse a byte size string. Supports plain integers and suffixes:
/// `K`/`KB`, `M`/`MB`, `G`/`GB` (case-insensitive).
fn parse_byte_size(s: &str) -> Option<usize> {
    let upper = s.trim().to_ascii_uppercase();
    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("GB").or_else(|| upper.strip_suffix('G')) {
        (n.trim(), 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB").or_else(|| upper.strip_suffix('M')) {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB").or_else(|| upper.strip_suffix('K')) {
        (n.trim(), 1024)
    } else {
        (upper.as_str(), 1)
    };
    num_str.parse::<usize>().ok().map(|n| n * multiplier)
}

fn parse_count(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Target bytes per partition when repartitioning an in-memory table.
pub fn get_partition_bytes() -> usize {
    ensure_init();
    PARTITION_BYTES.load(Ordering::Relaxed)
}

/// Set the target bytes per partition. Zero is ignored.
pub fn set_partition_bytes(bytes: usize) {
    ensure_init();
    if bytes > 0 {
        PARTITION_BYTES.store(bytes, Ordering::Relaxed);
    }
}

/// Rows sampled for semantic type detection.
pub fn get_sample_rows() -> usize {
    ensure_init();
    SAMPLE_ROWS.load(Ordering::Relaxed)
}

/// Default size of the cached head sample.
pub fn get_head_rows() -> usize {
    ensure_init();
    HEAD_ROWS.load(Ordering::Relaxed)
}

/// Set the default head size. Zero is ignored.
pub fn set_head_rows(rows: usize) {
    ensure_init();
    if rows > 0 {
        HEAD_ROWS.store(rows, Ordering::Relaxed);
    }
}
