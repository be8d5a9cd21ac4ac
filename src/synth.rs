//! Timeline sonification
//!
//! Walks the timeline at a fixed sample rate and renders one rank per stereo
//! channel: a send is heard as C4, a recv as D4 (a whole tone apart, easily
//! told by ear), idle is silence. The exact pitches are a design choice, not
//! a contract - only "send and recv sound different" is.

use std::f64::consts::TAU;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::Operation;
use crate::timeline::Timeline;
use crate::wav::{WavSpec, WavWriter};

/// Tone and format parameters for a render
#[derive(Debug, Clone, Copy)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Peak sample value; kept just under i16::MAX
    pub amplitude: f64,
    /// Send tone (middle C)
    pub send_hz: f64,
    /// Recv tone (D above middle C)
    pub recv_hz: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            amplitude: 32_760.0,
            send_hz: 261.626,
            recv_hz: 293.66,
        }
    }
}

impl SynthConfig {
    /// Tone frequency for an operation; idle renders as 0 Hz, whose sine is
    /// identically zero and therefore silent by construction
    fn frequency(&self, op: Option<Operation>) -> f64 {
        match op {
            Some(Operation::Send) => self.send_hz,
            Some(Operation::Recv) => self.recv_hz,
            None => 0.0,
        }
    }

    fn sample(&self, op: Option<Operation>, t: f64) -> i16 {
        (self.amplitude * (TAU * self.frequency(op) * t).sin()) as i16
    }
}

/// Render `timeline` into a stereo WAV stream
///
/// Left channel carries `left_rank`, right channel `right_rank`. The audio
/// length is `max_time() * sample_rate` frames. Any I/O failure is fatal; a
/// stream that fails after the header was written is surfaced as an error so
/// no silently corrupt file goes unnoticed.
pub fn render<W: Write + Seek>(
    timeline: &Timeline,
    left_rank: usize,
    right_rank: usize,
    config: &SynthConfig,
    out: W,
) -> Result<W> {
    let mut wav = WavWriter::new(out, WavSpec::stereo_16(config.sample_rate))
        .context("cannot write WAV header")?;

    let seconds = timeline.max_time();
    let rate = f64::from(config.sample_rate);
    let frames = (seconds * rate).round() as u64;

    tracing::info!(seconds, frames, left_rank, right_rank, "rendering timeline");

    for n in 0..frames {
        let t = n as f64 / rate;
        let left = config.sample(timeline.operation_at(t, left_rank), t);
        let right = config.sample(timeline.operation_at(t, right_rank), t);
        wav.write_frame(left, right)
            .context("cannot write audio frame")?;
    }

    wav.finish().context("cannot patch WAV chunk sizes")
}

/// Render straight to a file on disk
pub fn render_to_file(
    timeline: &Timeline,
    left_rank: usize,
    right_rank: usize,
    config: &SynthConfig,
    path: &Path,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create output file '{}'", path.display()))?;
    render(timeline, left_rank, right_rank, config, BufWriter::new(file))?;
    Ok(())
}
