//! Frame synchronizer: recovers frame boundaries from an unmarked bitstream.
//!
//! Frames carry no preamble. The only structural guarantee is that blank bit
//! positions are always 0, so lock is found by sliding a frame-sized window
//! over the start of the stream and counting consecutive candidate frames
//! whose blank positions are clean.
//!
//! # Lock search
//!
//! - Candidates are bit offsets `0..min(search_window, total - frame_bits + 1)`.
//! - A candidate's score is the number of consecutive clean frames starting
//!   there, capped at [`LOCK_THRESHOLD`].
//! - The first candidate with a strictly better score replaces the best one,
//!   and the search stops as soon as a candidate reaches the threshold.
//!
//! Once the offset is chosen, every complete frame from there on is extracted.
//! Trailing bits that do not fill a frame are dropped.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::channels::ChannelMap;
use crate::timing::BAUD_RATE;

/// Consecutive clean frames needed to declare lock.
pub const LOCK_THRESHOLD: usize = 3;

/// Default number of bit offsets tried during the lock search.
pub const DEFAULT_SEARCH_WINDOW: usize = 500;

/// One extracted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Sequential frame number from the lock offset
    pub frame_index: usize,
    /// Index into the bitstream where this frame starts
    pub bit_offset: usize,
    pub bits: Vec<u8>,
    pub active_channels: Vec<&'static str>,
    /// Every blank position reads 0
    pub blank_ok: bool,
}

/// Outcome of a synchronization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub locked: bool,
    pub lock_offset: usize,
    /// Best score seen during the lock search
    pub score: usize,
    pub frames: Vec<DecodedFrame>,
    /// Bits before the lock offset that were discarded
    pub orphan_bits: usize,
}

impl SyncResult {
    /// Fraction of extracted frames with clean blanks (0 when empty).
    pub fn blank_ok_rate(&self) -> f64 {
        if self.frames.is_empty() {
            0.0
        } else {
            self.frames.iter().filter(|f| f.blank_ok).count() as f64 / self.frames.len() as f64
        }
    }
}

/// Find lock with the default search window and extract all frames.
pub fn sync_frames(bits: &[u8], map: &ChannelMap) -> SyncResult {
    sync_frames_within(bits, map, DEFAULT_SEARCH_WINDOW)
}

/// Find lock within `search_window` offsets and extract all frames.
///
/// When no candidate reaches [`LOCK_THRESHOLD`] the result is unlocked and
/// frames are extracted from offset 0 so the caller still sees the data.
pub fn sync_frames_within(bits: &[u8], map: &ChannelMap, search_window: usize) -> SyncResult {
    let frame_bits = map.frame_bits();
    let candidates = if bits.len() >= frame_bits {
        search_window.min(bits.len() - frame_bits + 1)
    } else {
        0
    };

    let mut best_offset = 0;
    let mut best_score = 0;

    for candidate in 0..candidates {
        let score = (0..LOCK_THRESHOLD)
            .map(|k| candidate + k * frame_bits)
            .take_while(|&start| {
                bits.get(start..start + frame_bits)
                    .is_some_and(|frame| map.blanks_clear(frame))
            })
            .count();

        if score > best_score {
            best_score = score;
            best_offset = candidate;
            if score >= LOCK_THRESHOLD {
                break;
            }
        }
    }

    let locked = best_score >= LOCK_THRESHOLD;
    let lock_offset = if locked { best_offset } else { 0 };

    if locked {
        info!(
            track = %map.track(),
            lock_offset,
            score = best_score,
            "frame lock acquired"
        );
    } else {
        warn!(
            track = %map.track(),
            bits = bits.len(),
            best_score,
            "no frame lock, extracting from offset 0"
        );
    }

    let frames = extract_frames(bits, map, lock_offset);
    debug!(track = %map.track(), frames = frames.len(), "extracted frames");

    SyncResult {
        locked,
        lock_offset,
        score: best_score,
        frames,
        orphan_bits: lock_offset,
    }
}

/// Cut the stream into frames from offset 0 without a lock search.
pub fn chunk_frames(bits: &[u8], map: &ChannelMap) -> Vec<DecodedFrame> {
    extract_frames(bits, map, 0)
}

fn extract_frames(bits: &[u8], map: &ChannelMap, offset: usize) -> Vec<DecodedFrame> {
    bits.get(offset..)
        .unwrap_or_default()
        .chunks_exact(map.frame_bits())
        .enumerate()
        .map(|(frame_index, frame)| DecodedFrame {
            frame_index,
            bit_offset: offset + frame_index * map.frame_bits(),
            bits: frame.to_vec(),
            active_channels: map.active_channels(frame),
            blank_ok: map.blanks_clear(frame),
        })
        .collect()
}

/// Active interval of one channel, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub on: f64,
    pub off: f64,
}

/// Collapse frames into per-channel active intervals.
///
/// Frame `i` starts at `i * frame_bits / baud_rate` seconds. Channels still
/// active after the last frame close at the end of the stream.
pub fn channel_timeline(
    frames: &[DecodedFrame],
    map: &ChannelMap,
) -> BTreeMap<&'static str, Vec<Interval>> {
    channel_timeline_at(frames, map, BAUD_RATE)
}

/// [`channel_timeline`] for an arbitrary baud rate.
pub fn channel_timeline_at(
    frames: &[DecodedFrame],
    map: &ChannelMap,
    baud_rate: u32,
) -> BTreeMap<&'static str, Vec<Interval>> {
    let seconds_per_frame = map.frame_bits() as f64 / baud_rate as f64;
    let mut timeline: BTreeMap<&'static str, Vec<Interval>> = BTreeMap::new();
    let mut active_since: BTreeMap<&'static str, f64> = BTreeMap::new();

    for frame in frames {
        let t = frame.frame_index as f64 * seconds_per_frame;

        for &channel in &frame.active_channels {
            active_since.entry(channel).or_insert(t);
        }

        let closed: Vec<_> = active_since
            .keys()
            .copied()
            .filter(|channel| !frame.active_channels.contains(channel))
            .collect();
        for channel in closed {
            if let Some(on) = active_since.remove(channel) {
                timeline.entry(channel).or_default().push(Interval { on, off: t });
            }
        }
    }

    if let Some(last) = frames.last() {
        let end = (last.frame_index + 1) as f64 * seconds_per_frame;
        for (channel, on) in active_since {
            timeline.entry(channel).or_default().push(Interval { on, off: end });
        }
    }

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{BitFrame, Track};

    fn frame_with(track: Track, channels: &[&str]) -> Vec<u8> {
        let mut frame = BitFrame::new(track);
        for name in channels {
            frame.set(name, true).unwrap();
        }
        frame.bits().to_vec()
    }

    fn repeat(frame: &[u8], count: usize) -> Vec<u8> {
        frame.iter().copied().cycle().take(frame.len() * count).collect()
    }

    #[test]
    fn test_lock_on_clean_frames() {
        let map = Track::Td.channel_map();
        let bits = repeat(&frame_with(Track::Td, &["rolfe_mouth"]), 5);
        let result = sync_frames(&bits, map);

        assert!(result.locked);
        assert_eq!(result.lock_offset, 0);
        assert_eq!(result.score, 3);
        assert_eq!(result.frames.len(), 5);
        assert_eq!(result.orphan_bits, 0);
        assert!(result.frames.iter().all(|f| f.blank_ok));
        assert_eq!(result.frames[0].active_channels, vec!["rolfe_mouth"]);
        assert_eq!(result.frames[4].bit_offset, 4 * 94);
    }

    #[test]
    fn test_short_stream_scores_frame_count() {
        let map = Track::Bd.channel_map();
        let frame = frame_with(Track::Bd, &[]);
        for k in 1..=2 {
            let result = sync_frames(&repeat(&frame, k), map);
            assert_eq!(result.score, k);
            assert!(!result.locked);
            assert_eq!(result.frames.len(), k);
        }
    }

    #[test]
    fn test_too_short_for_one_frame() {
        let result = sync_frames(&[0; 50], Track::Td.channel_map());
        assert!(!result.locked);
        assert_eq!(result.score, 0);
        assert!(result.frames.is_empty());
    }

    #[test]
    fn test_lock_skips_leading_garbage() {
        let map = Track::Bd.channel_map();
        // All channels on: blank at index 44 is the only 0 in each frame
        let all: Vec<_> = map.channels().iter().map(|(name, _)| *name).collect();
        let frame = frame_with(Track::Bd, &all);

        let mut bits = vec![1u8; 10];
        bits.extend(repeat(&frame, 4));
        bits.extend([1, 1, 1]);

        let result = sync_frames(&bits, map);
        assert!(result.locked);
        assert_eq!(result.lock_offset, 10);
        assert_eq!(result.orphan_bits, 10);
        assert_eq!(result.frames.len(), 4);
        assert_eq!(result.frames[0].active_channels.len(), 95);
    }

    #[test]
    fn test_unlocked_extracts_from_zero() {
        let map = Track::Td.channel_map();
        let bits = vec![1u8; 94 * 4];
        let result = sync_frames(&bits, map);

        assert!(!result.locked);
        assert_eq!(result.score, 0);
        assert_eq!(result.lock_offset, 0);
        assert_eq!(result.orphan_bits, 0);
        assert_eq!(result.frames.len(), 4);
        assert!(result.frames.iter().all(|f| !f.blank_ok));
        assert_eq!(result.blank_ok_rate(), 0.0);
    }

    #[test]
    fn test_search_window_limits_candidates() {
        let map = Track::Bd.channel_map();
        let all: Vec<_> = map.channels().iter().map(|(name, _)| *name).collect();
        let mut bits = vec![1u8; 20];
        bits.extend(repeat(&frame_with(Track::Bd, &all), 4));

        let result = sync_frames_within(&bits, map, 10);
        assert!(!result.locked);
    }

    #[test]
    fn test_chunk_frames_no_search() {
        let map = Track::Td.channel_map();
        let mut bits = vec![1u8; 3];
        bits.extend(repeat(&frame_with(Track::Td, &["spot_earl"]), 2));

        let frames = chunk_frames(&bits, map);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].bit_offset, 94);
    }

    #[test]
    fn test_timeline_intervals() {
        let map = Track::Td.channel_map();
        let on = frame_with(Track::Td, &["rolfe_mouth"]);
        let off = frame_with(Track::Td, &[]);
        let both = frame_with(Track::Td, &["rolfe_mouth", "spot_rolfe"]);

        let mut bits = Vec::new();
        for frame in [&on, &on, &off, &both] {
            bits.extend(frame.iter());
        }
        let frames = chunk_frames(&bits, map);
        let timeline = channel_timeline(&frames, map);

        let spf = 94.0 / 4800.0;
        assert_eq!(
            timeline["rolfe_mouth"],
            vec![
                Interval { on: 0.0, off: 2.0 * spf },
                Interval { on: 3.0 * spf, off: 4.0 * spf },
            ]
        );
        assert_eq!(timeline["spot_rolfe"], vec![Interval { on: 3.0 * spf, off: 4.0 * spf }]);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn test_timeline_empty() {
        assert!(channel_timeline(&[], Track::Bd.channel_map()).is_empty());
    }
}
