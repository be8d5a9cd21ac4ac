//! Per-rank summary of a loaded timeline (-c mode)

use serde::{Deserialize, Serialize};

use crate::record::Operation;
use crate::timeline::Timeline;

/// Counts and busy time for a single rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSummary {
    pub rank: usize,
    pub sends: u64,
    pub recvs: u64,
    /// Total audio seconds this rank spends inside send/recv calls
    pub busy_seconds: f64,
}

/// Whole-run summary, printable as text or JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub num_ranks: usize,
    pub total_records: usize,
    /// Length of the rendered audio in seconds
    pub audio_seconds: f64,
    pub ranks: Vec<RankSummary>,
}

impl TimelineSummary {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let mut ranks: Vec<RankSummary> = (0..timeline.num_ranks())
            .map(|rank| RankSummary {
                rank,
                sends: 0,
                recvs: 0,
                busy_seconds: 0.0,
            })
            .collect();

        for rec in timeline.records() {
            let entry = &mut ranks[rec.rank];
            match rec.op {
                Operation::Send => entry.sends += 1,
                Operation::Recv => entry.recvs += 1,
            }
            entry.busy_seconds += rec.duration;
        }

        Self {
            num_ranks: timeline.num_ranks(),
            total_records: timeline.records().len(),
            audio_seconds: timeline.max_time(),
            ranks,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} ranks, {} records, {:.3} s of audio\n",
            self.num_ranks, self.total_records, self.audio_seconds
        ));
        out.push_str("rank     sends     recvs  busy (s)\n");
        for rank in &self.ranks {
            out.push_str(&format!(
                "{:>4} {:>9} {:>9} {:>9.3}\n",
                rank.rank, rank.sends, rank.recvs, rank.busy_seconds
            ));
        }
        out
    }
}
