//! Streaming RIFF/WAVE writer for 16-bit PCM
//!
//! Two-pass against a single seekable stream: the header goes out first with
//! placeholder size fields, frames are streamed, and [`WavWriter::finish`]
//! seeks back to patch the RIFF and data chunk sizes once the total length is
//! known. A writer dropped without `finish` leaves the placeholders in place,
//! so callers must treat an unfinished file as invalid.

use std::io::{self, Seek, SeekFrom, Write};

/// PCM format parameters for the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// Stereo 16-bit at the given rate, the only format the sonifier emits
    pub fn stereo_16(sample_rate: u32) -> Self {
        Self {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }
}

/// Incremental WAV encoder over any `Write + Seek` stream
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    /// Stream offset of the first data byte; the data size field sits 4
    /// bytes before it, the RIFF size field at offset 4.
    data_start: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    /// Write the header with placeholder sizes and position for frame data
    pub fn new(mut inner: W, spec: WavSpec) -> io::Result<Self> {
        inner.write_all(b"RIFF")?;
        inner.write_all(&0u32.to_le_bytes())?; // patched by finish
        inner.write_all(b"WAVE")?;

        inner.write_all(b"fmt ")?;
        inner.write_all(&16u32.to_le_bytes())?; // PCM fmt chunk size
        inner.write_all(&1u16.to_le_bytes())?; // PCM integer samples
        inner.write_all(&spec.channels.to_le_bytes())?;
        inner.write_all(&spec.sample_rate.to_le_bytes())?;
        inner.write_all(&spec.byte_rate().to_le_bytes())?;
        inner.write_all(&spec.block_align().to_le_bytes())?;
        inner.write_all(&spec.bits_per_sample.to_le_bytes())?;

        inner.write_all(b"data")?;
        inner.write_all(&0u32.to_le_bytes())?; // patched by finish

        let data_start = inner.stream_position()?;
        Ok(Self { inner, data_start })
    }

    /// Append one interleaved stereo frame, little-endian
    pub fn write_frame(&mut self, left: i16, right: i16) -> io::Result<()> {
        self.inner.write_all(&left.to_le_bytes())?;
        self.inner.write_all(&right.to_le_bytes())
    }

    /// Patch the chunk sizes and return the underlying stream
    pub fn finish(mut self) -> io::Result<W> {
        let end = self.inner.stream_position()?;
        let data_size = (end - self.data_start) as u32;
        let riff_size = (end - 8) as u32;

        self.inner.seek(SeekFrom::Start(self.data_start - 4))?;
        self.inner.write_all(&data_size.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(4))?;
        self.inner.write_all(&riff_size.to_le_bytes())?;

        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_header_layout() {
        let writer = WavWriter::new(Cursor::new(Vec::new()), WavSpec::stereo_16(44_100)).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16); // fmt chunk size
        assert_eq!(u16_at(&bytes, 20), 1); // PCM
        assert_eq!(u16_at(&bytes, 22), 2); // channels
        assert_eq!(u32_at(&bytes, 24), 44_100);
        assert_eq!(u32_at(&bytes, 28), 176_400); // byte rate
        assert_eq!(u16_at(&bytes, 32), 4); // block align
        assert_eq!(u16_at(&bytes, 34), 16); // bits per sample
        assert_eq!(&bytes[36..40], b"data");
    }

    #[test]
    fn test_sizes_patched_after_finish() {
        let mut writer =
            WavWriter::new(Cursor::new(Vec::new()), WavSpec::stereo_16(44_100)).unwrap();
        for i in 0..10 {
            writer.write_frame(i, -i).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(bytes.len(), 44 + 10 * 4);
        assert_eq!(u32_at(&bytes, 40), 40); // data size: 10 frames * 4 bytes
        assert_eq!(u32_at(&bytes, 4), bytes.len() as u32 - 8);
    }

    #[test]
    fn test_frames_interleave_little_endian() {
        let mut writer =
            WavWriter::new(Cursor::new(Vec::new()), WavSpec::stereo_16(44_100)).unwrap();
        writer.write_frame(0x1234, -2).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(&bytes[44..46], &0x1234i16.to_le_bytes());
        assert_eq!(&bytes[46..48], &(-2i16).to_le_bytes());
    }
}
