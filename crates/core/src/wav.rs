//! WAV ingestion and writing.
//!
//! Reading accepts any channel count and the usual PCM depths. Every sample
//! is normalized to the signed 16-bit scale the decoder works in:
//!
//! | Format       | Normalization          |
//! |--------------|------------------------|
//! | 8-bit PCM    | centred, × 256         |
//! | 16-bit PCM   | as is                  |
//! | 24-bit PCM   | >> 8                   |
//! | 32-bit PCM   | >> 16                  |
//! | 32-bit float | × 32767, clamped       |
//!
//! Writing always produces 16-bit integer PCM.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{Result, WavError};

/// De-interleaved PCM, one vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WavData {
    pub sample_rate: u32,
    pub channels: Vec<Vec<i16>>,
}

impl WavData {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Encode back to a 16-bit WAV.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let channels: Vec<&[i16]> = self.channels.iter().map(Vec::as_slice).collect();
        write_wav(&channels, self.sample_rate)
    }
}

/// Parse a RIFF/WAVE byte buffer.
///
/// # Errors
/// `WavError::Malformed` for anything the reader rejects (missing chunks,
/// truncated data), `UnsupportedBitDepth` for depths it cannot normalize.
pub fn parse_wav(bytes: &[u8]) -> Result<WavData> {
    let mut reader = WavReader::new(Cursor::new(bytes)).map_err(WavError::from)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(WavError::ChannelCount {
            expected: "at least 1",
            actual: 0,
        }
        .into());
    }

    let decoded: std::result::Result<Vec<i16>, hound::Error> = match (
        spec.sample_format,
        spec.bits_per_sample,
    ) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| i16::from(v) * 256))
            .collect(),
        (SampleFormat::Int, 16) => reader.samples::<i16>().collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| (v >> 8) as i16))
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| (v >> 16) as i16))
            .collect(),
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect(),
        (format, bits) => {
            return Err(WavError::UnsupportedBitDepth {
                bits,
                format: match format {
                    SampleFormat::Int => "integer PCM",
                    SampleFormat::Float => "float",
                },
            }
            .into())
        }
    };
    let interleaved = decoded.map_err(WavError::from)?;

    let channel_count = usize::from(spec.channels);
    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    debug!(
        sample_rate = spec.sample_rate,
        channels = channel_count,
        bits = spec.bits_per_sample,
        frames = channels[0].len(),
        "parsed WAV"
    );

    Ok(WavData {
        sample_rate: spec.sample_rate,
        channels,
    })
}

fn float_to_i16(value: f32) -> i16 {
    (value * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Write equal-length channels as an interleaved 16-bit PCM WAV.
///
/// # Errors
/// `ChannelCount` when no channels are given, `ChannelLength` when the
/// channels differ in length.
pub fn write_wav(channels: &[&[i16]], sample_rate: u32) -> Result<Vec<u8>> {
    let Some(first) = channels.first() else {
        return Err(WavError::ChannelCount {
            expected: "at least 1",
            actual: 0,
        }
        .into());
    };
    let frames = first.len();

    if let Some((channel, samples)) = channels
        .iter()
        .enumerate()
        .find(|(_, samples)| samples.len() != frames)
    {
        return Err(WavError::ChannelLength {
            channel,
            expected: frames,
            actual: samples.len(),
        }
        .into());
    }

    let spec = WavSpec {
        channels: u16::try_from(channels.len()).map_err(|_| WavError::ChannelCount {
            expected: "at most 65535",
            actual: u16::MAX,
        })?,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + frames * channels.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(WavError::from)?;
        for index in 0..frames {
            for channel in channels {
                writer.write_sample(channel[index]).map_err(WavError::from)?;
            }
        }
        writer.finalize().map_err(WavError::from)?;
    }

    Ok(cursor.into_inner())
}

/// Stereo 16-bit WAV from two channels, truncated to the shorter one.
pub fn build_stereo_wav(left: &[i16], right: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let frames = left.len().min(right.len());
    write_wav(&[&left[..frames], &right[..frames]], sample_rate)
}
