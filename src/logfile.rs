//! Per-rank log persistence
//!
//! One text file per rank, named `rank_<N>_output.t`, one record per line in
//! original call order: `<tag> <start> <duration>`, tag `s` or `r`. The file
//! is written exactly once, at finalize, and is immutable afterward.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::CallRecord;

/// Destination could not be opened or written at teardown
///
/// Recoverable at the process level: the rank's timeline contribution is
/// forfeit, the host program still exits cleanly.
#[derive(Debug, Error)]
#[error("cannot write log '{path}': {source}")]
pub struct LogWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Deterministic log filename for a rank, the discovery contract of the reader
pub fn log_path(dir: &Path, rank: i32) -> PathBuf {
    dir.join(format!("rank_{rank}_output.t"))
}

/// Serialize `records` for `rank` into `dir`, one shot, in call order
pub fn write_log(dir: &Path, rank: i32, records: &[CallRecord]) -> Result<(), LogWriteError> {
    let path = log_path(dir, rank);
    let file = File::create(&path).map_err(|source| LogWriteError {
        path: path.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    for rec in records {
        writeln!(out, "{} {} {}", rec.op.tag(), rec.start_us, rec.duration_us).map_err(
            |source| LogWriteError {
                path: path.clone(),
                source,
            },
        )?;
    }

    out.flush().map_err(|source| LogWriteError { path, source })
}
