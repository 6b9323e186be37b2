//! Frame scheduler: sparse channel events -> continuous encoded track.
//!
//! The hardware expects a frame stream that never stops. Between events the
//! current frame state is retransmitted as whole frames, so the output is a
//! seamless sequence of complete frames from sample 0.
//!
//! # Timing
//!
//! Every event is anchored independently at `floor(time * SAMPLE_RATE)` and
//! then snapped down to the enclosing frame boundary. No floating-point
//! offsets accumulate between events. Events that land in a frame that has
//! already been emitted are coalesced: they change the state, and the change
//! shows up in the next frame.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channels::{BitFrame, Track};
use crate::encoder::{self, Level, LineEncoder};
use crate::error::ConfigurationError;
use crate::timing::{MAX_SHOW_SECONDS, SAMPLES_PER_BIT, SAMPLE_RATE};

/// One timestamped channel change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Absolute time in seconds, must be >= 0
    #[serde(alias = "time")]
    pub time_seconds: f64,
    /// Channel name from the track's channel map
    pub channel: String,
    /// true = activate, false = deactivate
    pub active: bool,
    /// Explicit track; when absent the track is found from the channel name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
}

impl ChannelEvent {
    pub fn new(time_seconds: f64, channel: impl Into<String>, active: bool) -> Self {
        Self {
            time_seconds,
            channel: channel.into(),
            active,
            track: None,
        }
    }

    /// Integer sample position of this event.
    ///
    /// # Errors
    /// `InvalidEventTime` for negative or non-finite times.
    pub fn sample_position(&self) -> Result<usize, ConfigurationError> {
        if !self.time_seconds.is_finite() || self.time_seconds < 0.0 {
            return Err(ConfigurationError::InvalidEventTime {
                time: self.time_seconds,
                channel: self.channel.clone(),
            });
        }
        Ok((self.time_seconds * SAMPLE_RATE as f64) as usize)
    }

    /// Track this event belongs to, explicit or resolved by name.
    pub fn resolve_track(&self) -> Result<Track, ConfigurationError> {
        match self.track {
            Some(track) => Ok(track),
            None => Track::for_channel(&self.channel),
        }
    }
}

/// PCM and per-frame bit snapshots of one scheduled track.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTrack {
    pub track: Track,
    /// Encoded samples, a whole number of frames long
    pub samples: Vec<i16>,
    /// Bit state of every emitted frame, in order
    pub frames: Vec<Vec<u8>>,
    /// Events at or past the end of the track: applied, never transmitted
    pub late_events: usize,
}

/// Sample count for a show duration, before rounding up to whole frames.
///
/// # Errors
/// `InvalidDuration` for negative or non-finite durations and for anything
/// longer than [`MAX_SHOW_SECONDS`].
pub fn duration_samples(duration_seconds: f64) -> Result<usize, ConfigurationError> {
    if !(0.0..=MAX_SHOW_SECONDS).contains(&duration_seconds) {
        return Err(ConfigurationError::InvalidDuration {
            seconds: duration_seconds,
            max: MAX_SHOW_SECONDS,
        });
    }
    Ok((duration_seconds * SAMPLE_RATE as f64) as usize)
}

impl RenderedTrack {
    /// Samples as 16-bit little-endian PCM bytes.
    pub fn pcm_bytes(&self) -> Vec<u8> {
        encoder::to_le_bytes(&self.samples)
    }

    /// Duration in seconds at the native sample rate.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }
}

/// Owns one track's frame state and turns events into an encoded stream.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    frame: BitFrame,
    frame_samples: usize,
}

impl FrameScheduler {
    pub fn new(track: Track) -> Self {
        let frame = BitFrame::new(track);
        let frame_samples = frame.map().frame_bits() * SAMPLES_PER_BIT;
        Self {
            frame,
            frame_samples,
        }
    }

    pub fn track(&self) -> Track {
        self.frame.map().track()
    }

    /// Samples per encoded frame (846 for TD, 864 for BD).
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Activate or deactivate a named channel in the current frame.
    ///
    /// # Errors
    /// `UnknownChannel` or `BlankBit`; the frame is left unchanged.
    pub fn set_channel(&mut self, name: &str, active: bool) -> Result<(), ConfigurationError> {
        self.frame.set(name, active)
    }

    /// Deactivate every channel.
    pub fn clear_all(&mut self) {
        self.frame.clear();
    }

    /// Names of all currently active channels, in bit order.
    pub fn get_active_channels(&self) -> Vec<&'static str> {
        self.frame.active_channels()
    }

    /// Copy of the current frame bits.
    pub fn frame_snapshot(&self) -> Vec<u8> {
        self.frame.bits().to_vec()
    }

    /// Build the encoded PCM byte stream for `events` over `duration_seconds`.
    ///
    /// See [`FrameScheduler::render`].
    pub fn build(
        &mut self,
        events: &[ChannelEvent],
        duration_seconds: f64,
    ) -> Result<Vec<u8>, ConfigurationError> {
        Ok(self.render(events, duration_seconds)?.pcm_bytes())
    }

    /// Schedule `events` over `duration_seconds` and encode the result.
    ///
    /// The output length is `floor(duration * SAMPLE_RATE)` rounded up to a
    /// whole number of frames. Events are applied in sample order; events
    /// sharing a frame boundary keep their input order.
    ///
    /// # Errors
    /// Any invalid event time, unknown channel or blank write aborts the
    /// whole render, as does a duration rejected by [`duration_samples`].
    /// Times and duration are checked before any state changes.
    pub fn render(
        &mut self,
        events: &[ChannelEvent],
        duration_seconds: f64,
    ) -> Result<RenderedTrack, ConfigurationError> {
        let total_samples = self.total_samples(duration_seconds)?;
        let mut anchored = events
            .iter()
            .map(|event| Ok((event.sample_position()?, event)))
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        anchored.sort_by_key(|(sample, _)| *sample);

        self.clear_all();

        let mut encoder = LineEncoder::new(Level::Low);
        let mut samples = Vec::with_capacity(total_samples);
        let mut frames = Vec::with_capacity(total_samples / self.frame_samples);
        let mut cursor = 0;
        let mut coalesced = 0usize;
        let mut late_events = 0usize;

        for (sample, event) in anchored {
            let snapped = sample - sample % self.frame_samples;

            if snapped >= total_samples {
                late_events += 1;
                warn!(
                    track = %self.track(),
                    channel = %event.channel,
                    time = event.time_seconds,
                    "event past end of track, state updated but never transmitted"
                );
            }

            let next = snapped.min(total_samples);
            if next > cursor {
                self.fill_frames(&mut encoder, cursor, next, &mut samples, &mut frames);
                cursor = next;
            } else {
                coalesced += 1;
            }

            self.set_channel(&event.channel, event.active)?;
        }

        self.fill_frames(&mut encoder, cursor, total_samples, &mut samples, &mut frames);

        debug!(
            track = %self.track(),
            events = events.len(),
            coalesced,
            late_events,
            frames = frames.len(),
            samples = samples.len(),
            "rendered track"
        );

        Ok(RenderedTrack {
            track: self.track(),
            samples,
            frames,
            late_events,
        })
    }

    fn total_samples(&self, duration_seconds: f64) -> Result<usize, ConfigurationError> {
        let requested = duration_samples(duration_seconds)?;
        Ok(requested.div_ceil(self.frame_samples) * self.frame_samples)
    }

    /// Emit whole frames of the current state over `[start, end)`.
    fn fill_frames(
        &self,
        encoder: &mut LineEncoder,
        start: usize,
        end: usize,
        samples: &mut Vec<i16>,
        frames: &mut Vec<Vec<u8>>,
    ) {
        let mut pos = start;
        while pos < end {
            for &bit in self.frame.bits() {
                encoder.encode_bit_into(bit, samples);
            }
            frames.push(self.frame_snapshot());
            pos += self.frame_samples;
        }
    }
}
