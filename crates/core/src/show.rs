//! End-to-end show assembly.
//!
//! Two directions:
//! - export: events -> scheduled TD/BD tracks -> 4-channel WAV
//!   (music L, music R, TD, BD)
//! - ingestion: 4-channel WAV -> decoded frames -> show container
//!
//! The container can also be built straight from scheduler output, which
//! skips the decode step entirely.

use tracing::{debug, info, warn};

use crate::channels::Track;
use crate::container::ShowContainer;
use crate::decoder::{DecoderConfig, LineDecoder};
use crate::encoder::{Level, LineEncoder};
use crate::error::{Result, WavError};
use crate::scheduler::{ChannelEvent, FrameScheduler, RenderedTrack};
use crate::signal::{encode_signal_codes, signal_frame_count};
use crate::sync::chunk_frames;
use crate::timing::{LEVEL_HIGH, SAMPLE_RATE};
use crate::wav::{build_stereo_wav, parse_wav, write_wav, WavData};

/// Channel index of each stream in a 4-channel show WAV.
pub const MUSIC_LEFT_CHANNEL: usize = 0;
pub const MUSIC_RIGHT_CHANNEL: usize = 1;
pub const TD_CHANNEL: usize = 2;
pub const BD_CHANNEL: usize = 3;

/// Both scheduled tracks of a show.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedShow {
    pub td: RenderedTrack,
    pub bd: RenderedTrack,
}

impl RenderedShow {
    pub fn track(&self, track: Track) -> &RenderedTrack {
        match track {
            Track::Td => &self.td,
            Track::Bd => &self.bd,
        }
    }

    /// Length of the longer track in samples.
    pub fn samples(&self) -> usize {
        self.td.samples.len().max(self.bd.samples.len())
    }

    pub fn frame_count(&self) -> usize {
        self.td.frames.len() + self.bd.frames.len()
    }
}

/// Schedule both tracks from one event list.
///
/// Events are routed by their explicit track or, failing that, by channel
/// name. Every event is routed before anything is rendered, so a bad event
/// aborts the call with no partial output.
pub fn render_show(events: &[ChannelEvent], duration_seconds: f64) -> Result<RenderedShow> {
    let mut td_events = Vec::new();
    let mut bd_events = Vec::new();

    for event in events {
        event.sample_position()?;
        match event.resolve_track()? {
            Track::Td => td_events.push(event.clone()),
            Track::Bd => bd_events.push(event.clone()),
        }
    }

    let td = FrameScheduler::new(Track::Td).render(&td_events, duration_seconds)?;
    let bd = FrameScheduler::new(Track::Bd).render(&bd_events, duration_seconds)?;

    info!(
        td_events = td_events.len(),
        bd_events = bd_events.len(),
        td_frames = td.frames.len(),
        bd_frames = bd.frames.len(),
        "rendered show"
    );

    Ok(RenderedShow { td, bd })
}

/// Write the 4-channel show WAV at 44.1 kHz.
///
/// The shorter signal track is extended by retransmitting its last frame so
/// both tracks stay decodable to the end. Music is padded with silence or
/// truncated to the signal length; a mono music file feeds both sides.
///
/// # Errors
/// `ChannelCount` if `music` has no channels.
pub fn write_show_wav(show: &RenderedShow, music: Option<&WavData>) -> Result<Vec<u8>> {
    let length = show.samples();
    let td = extend_track(&show.td, length);
    let bd = extend_track(&show.bd, length);
    let (left, right) = music_channels(music, length)?;

    debug!(samples = length, has_music = music.is_some(), "writing show WAV");
    write_wav(&[&left[..], &right[..], &td[..], &bd[..]], SAMPLE_RATE)
}

/// Build a show container directly from scheduler output.
///
/// Signal codes are derived from the scheduled frames, and the audio is
/// the music (or silence) over the show length.
pub fn show_from_rendered(show: &RenderedShow, music: Option<&WavData>) -> Result<ShowContainer> {
    let length = show.samples();
    let (left, right) = music_channels(music, length)?;

    let frame_count = signal_frame_count(length, SAMPLE_RATE);
    let codes = encode_signal_codes(&show.td.frames, &show.bd.frames, frame_count);
    let audio = build_stereo_wav(&left, &right, SAMPLE_RATE)?;

    Ok(ShowContainer::new(audio, codes))
}

/// Decode both signal tracks and package the show.
///
/// The decoder runs at `sample_rate` with the hardware defaults otherwise.
/// Frames are cut from bit 0 without a lock search, matching how the
/// playback engine reads the stream.
pub fn build_show(
    audio_left: &[i16],
    audio_right: &[i16],
    td_samples: &[i16],
    bd_samples: &[i16],
    sample_rate: u32,
) -> Result<ShowContainer> {
    let decoder = LineDecoder::new(DecoderConfig {
        sample_rate,
        ..DecoderConfig::default()
    });

    let td = decoder.decode(td_samples);
    let bd = decoder.decode(bd_samples);
    if !td.errors.is_empty() || !bd.errors.is_empty() {
        warn!(
            td_errors = td.errors.len(),
            bd_errors = bd.errors.len(),
            "decode errors while building show"
        );
    }

    let td_frames: Vec<Vec<u8>> = chunk_frames(&td.bit_values(), Track::Td.channel_map())
        .into_iter()
        .map(|frame| frame.bits)
        .collect();
    let bd_frames: Vec<Vec<u8>> = chunk_frames(&bd.bit_values(), Track::Bd.channel_map())
        .into_iter()
        .map(|frame| frame.bits)
        .collect();

    let frame_count = signal_frame_count(audio_left.len(), sample_rate);
    let codes = encode_signal_codes(&td_frames, &bd_frames, frame_count);
    let audio = build_stereo_wav(audio_left, audio_right, sample_rate)?;

    info!(
        td_frames = td_frames.len(),
        bd_frames = bd_frames.len(),
        signal_frames = frame_count,
        codes = codes.len(),
        "built show container"
    );

    Ok(ShowContainer::new(audio, codes))
}

/// Convert a 4-channel show WAV (music L, music R, TD, BD) to a container.
///
/// # Errors
/// `ChannelCount` unless the WAV has exactly 4 channels, plus any WAV
/// parsing error.
pub fn convert_4ch_wav(bytes: &[u8]) -> Result<ShowContainer> {
    let wav = parse_wav(bytes)?;
    if wav.channel_count() != 4 {
        return Err(WavError::ChannelCount {
            expected: "4",
            actual: wav.channel_count() as u16,
        }
        .into());
    }

    build_show(
        &wav.channels[MUSIC_LEFT_CHANNEL],
        &wav.channels[MUSIC_RIGHT_CHANNEL],
        &wav.channels[TD_CHANNEL],
        &wav.channels[BD_CHANNEL],
        wav.sample_rate,
    )
}

/// Samples of `track` stretched to `length` by repeating its last frame.
fn extend_track(track: &RenderedTrack, length: usize) -> Vec<i16> {
    let mut samples = track.samples.clone();
    let Some(last_frame) = track.frames.last() else {
        samples.resize(length, 0);
        return samples;
    };

    let level = match samples.last() {
        Some(&LEVEL_HIGH) => Level::High,
        _ => Level::Low,
    };
    let mut encoder = LineEncoder::new(level);
    while samples.len() < length {
        for &bit in last_frame {
            encoder.encode_bit_into(bit, &mut samples);
        }
    }
    samples.truncate(length);
    samples
}

fn music_channels(music: Option<&WavData>, length: usize) -> Result<(Vec<i16>, Vec<i16>)> {
    let Some(music) = music else {
        return Ok((vec![0; length], vec![0; length]));
    };

    let Some(left) = music.channels.first() else {
        return Err(WavError::ChannelCount {
            expected: "at least 1",
            actual: 0,
        }
        .into());
    };
    let right = music.channels.get(1).unwrap_or(left);

    if music.sample_rate != SAMPLE_RATE {
        warn!(
            sample_rate = music.sample_rate,
            expected = SAMPLE_RATE,
            "music sample rate differs from show rate, samples used as is"
        );
    }

    let fit = |channel: &Vec<i16>| {
        let mut out = channel.clone();
        out.resize(length, 0);
        out
    };
    Ok((fit(left), fit(right)))
}
