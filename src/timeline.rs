//! Timeline reconstruction from per-rank logs
//!
//! Discovers `rank_<N>_output.t` files by probing indices from 0 until the
//! first gap, parses each into rank-tagged records, and answers the
//! point-in-time queries the synthesizer renders from. Read-only once built.

use std::path::Path;

use anyhow::{Context, Result};

use crate::logfile::log_path;
use crate::record::Operation;

/// Default stretch from log microseconds to audio seconds
///
/// Matches the historical tool: 500 ms of traced communication becomes one
/// second of audio.
pub const DEFAULT_TIME_SCALE: f64 = 1.0 / 500_000.0;

/// One call record tagged with its owning rank, times already scaled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedRecord {
    pub rank: usize,
    pub op: Operation,
    /// Seconds of audio time at call entry
    pub start: f64,
    /// Seconds of audio time spent in the call
    pub duration: f64,
}

/// Aggregated records across all discovered ranks
#[derive(Debug, Default)]
pub struct Timeline {
    num_ranks: usize,
    records: Vec<RankedRecord>,
}

/// Count ranks by probing for rank-indexed filenames starting at 0
///
/// Stops at the first missing index. A gap ends discovery even if
/// higher-numbered files exist - a known sharp edge preserved for
/// compatibility with the established naming convention.
pub fn discover_ranks(dir: &Path) -> usize {
    let mut rank = 0;
    while log_path(dir, rank as i32).is_file() {
        rank += 1;
    }
    rank
}

impl Timeline {
    /// Build the timeline from every discovered log in `dir`
    ///
    /// `scale` converts the logs' process-local microseconds into audio
    /// seconds (see [`DEFAULT_TIME_SCALE`]).
    pub fn load(dir: &Path, scale: f64) -> Result<Self> {
        let num_ranks = discover_ranks(dir);
        let mut records = Vec::new();

        for rank in 0..num_ranks {
            let path = log_path(dir, rank as i32);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read log '{}'", path.display()))?;
            let parsed = parse_log(&text, rank, scale);
            tracing::debug!(rank, records = parsed.len(), "parsed rank log");
            records.extend(parsed);
        }

        Ok(Self { num_ranks, records })
    }

    /// Build directly from records; used by the renderer's callers and tests
    pub fn from_records(num_ranks: usize, records: Vec<RankedRecord>) -> Self {
        Self { num_ranks, records }
    }

    /// Number of contiguous ranks discovered (0 for an empty directory)
    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    pub fn records(&self) -> &[RankedRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Greatest `start + duration` over all records; the authoritative audio
    /// length. 0.0 for an empty timeline.
    pub fn max_time(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.start + r.duration)
            .fold(0.0, f64::max)
    }

    /// Operation `rank` is performing at `time`, or `None` when idle
    ///
    /// Interval boundaries are open: a time equal to a record's start or end
    /// is idle. First match in record order wins if intervals overlap; a
    /// single-threaded rank never produces overlapping own-operations, so the
    /// order is not a contract.
    pub fn operation_at(&self, time: f64, rank: usize) -> Option<Operation> {
        self.records
            .iter()
            .find(|r| r.rank == rank && time > r.start && time < r.start + r.duration)
            .map(|r| r.op)
    }
}

/// Parse one rank's log text with per-line partial recovery
///
/// A malformed line stops consumption of the remainder of that file;
/// already-parsed records are kept.
fn parse_log(text: &str, rank: usize, scale: f64) -> Vec<RankedRecord> {
    let mut records = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        match parse_line(line) {
            Some((op, start_us, duration_us)) => records.push(RankedRecord {
                rank,
                op,
                start: start_us * scale,
                duration: duration_us * scale,
            }),
            None => {
                tracing::warn!(
                    rank,
                    line = lineno + 1,
                    "malformed log line; keeping {} records, dropping the rest of this file",
                    records.len()
                );
                break;
            }
        }
    }

    records
}

/// Parse a `<tag> <start> <duration>` line into its typed fields
pub fn parse_line(line: &str) -> Option<(Operation, f64, f64)> {
    let mut fields = line.split_whitespace();
    let tag = fields.next()?;
    let start = fields.next()?.parse::<f64>().ok()?;
    let duration = fields.next()?.parse::<f64>().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let mut chars = tag.chars();
    let tag_char = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    let op = Operation::from_tag(tag_char)?;
    Some((op, start, duration))
}
