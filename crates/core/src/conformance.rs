//! Hardware conformance simulator.
//!
//! Runs each control track through the decoder and synchronizer the way the
//! show controller would, then applies acceptance thresholds. The verdict is
//! PASS only when every simulated track meets all three limits:
//!
//! - decode error rate `errors / (bits + errors)` at most `max_error_rate`
//! - lock score at least `min_lock_score`
//! - fraction of frames with clean blanks at least `min_blank_ok_rate`
//!
//! A failing signal is a normal outcome, not an error. Only unreadable input
//! (a malformed WAV or an unsupported channel layout) returns `Err`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channels::Track;
use crate::decoder::{DecodeError, DecoderConfig, LineDecoder};
use crate::error::{ConfigurationError, Result, WavError};
use crate::sync::{self, Interval, SyncResult, DEFAULT_SEARCH_WINDOW};
use crate::wav::{self, WavData};

/// Number of decode errors kept per track for reporting.
pub const KEPT_ERRORS: usize = 5;

/// Acceptance limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max_error_rate: f64,
    pub min_blank_ok_rate: f64,
    pub min_lock_score: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.02,
            min_blank_ok_rate: 0.98,
            min_lock_score: sync::LOCK_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Check every limit is reachable.
    ///
    /// Rates must lie in `[0, 1]`. Lock scores are capped at
    /// [`sync::LOCK_THRESHOLD`], so `min_lock_score` must be in
    /// `1..=LOCK_THRESHOLD`; anything higher fails every input.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        for (name, value) in [
            ("max_error_rate", self.max_error_rate),
            ("min_blank_ok_rate", self.min_blank_ok_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::InvalidThreshold {
                    name,
                    value: value.to_string(),
                    expected: "must be between 0 and 1".to_string(),
                });
            }
        }

        if !(1..=sync::LOCK_THRESHOLD).contains(&self.min_lock_score) {
            return Err(ConfigurationError::InvalidThreshold {
                name: "min_lock_score",
                value: self.min_lock_score.to_string(),
                expected: format!("must be between 1 and {}", sync::LOCK_THRESHOLD),
            });
        }
        Ok(())
    }
}

/// Decode and sync results for one track.
#[derive(Debug, Clone)]
pub struct TrackReport {
    pub track: Track,
    /// Source channel in the WAV, when simulated from a file
    pub channel_index: Option<usize>,
    pub bits: usize,
    pub errors: usize,
    /// Bits decoded but flagged as out of tolerance
    pub marginal: usize,
    /// First few decode errors, in stream order
    pub first_errors: Vec<DecodeError>,
    pub sync: SyncResult,
    pub timeline: BTreeMap<&'static str, Vec<Interval>>,
}

impl TrackReport {
    /// `errors / (bits + errors)`, 0 when nothing was seen.
    pub fn error_rate(&self) -> f64 {
        self.errors as f64 / (self.bits + self.errors).max(1) as f64
    }

    /// Fraction of frames with clean blanks, 0 when no frames.
    pub fn blank_ok_rate(&self) -> f64 {
        self.sync.blank_ok_rate()
    }
}

/// Overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Per-track reports plus the combined verdict.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub tracks: Vec<TrackReport>,
    pub thresholds: Thresholds,
    pub verdict: Verdict,
    /// One line per violated limit, prefixed with the track name
    pub reasons: Vec<String>,
}

impl ConformanceReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn track(&self, track: Track) -> Option<&TrackReport> {
        self.tracks.iter().find(|report| report.track == track)
    }
}

/// Decoder + synchronizer + thresholds.
#[derive(Debug, Clone)]
pub struct ConformanceSimulator {
    decoder_config: DecoderConfig,
    thresholds: Thresholds,
    search_window: usize,
}

impl ConformanceSimulator {
    pub fn new(decoder_config: DecoderConfig, thresholds: Thresholds) -> Self {
        Self {
            decoder_config,
            thresholds,
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }

    /// Override the lock search window (in bit offsets).
    pub fn with_search_window(mut self, search_window: usize) -> Self {
        self.search_window = search_window;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn decoder_config(&self) -> &DecoderConfig {
        &self.decoder_config
    }

    /// Decoder for input recorded at `sample_rate`; every other setting
    /// comes from the configuration.
    pub fn decoder_for(&self, sample_rate: u32) -> LineDecoder {
        LineDecoder::new(DecoderConfig {
            sample_rate,
            ..self.decoder_config
        })
    }

    /// Decode and sync one track's samples at the configured sample rate.
    pub fn simulate_track(&self, track: Track, samples: &[i16]) -> TrackReport {
        self.run_track(&LineDecoder::new(self.decoder_config), track, samples, None)
    }

    fn run_track(
        &self,
        decoder: &LineDecoder,
        track: Track,
        samples: &[i16],
        channel_index: Option<usize>,
    ) -> TrackReport {
        let map = track.channel_map();
        let decoded = decoder.decode(samples);
        let sync = sync::sync_frames_within(&decoded.bit_values(), map, self.search_window);
        let timeline =
            sync::channel_timeline_at(&sync.frames, map, decoder.config().baud_rate);

        debug!(
            track = %track,
            bits = decoded.bits.len(),
            errors = decoded.errors.len(),
            frames = sync.frames.len(),
            "simulated track"
        );

        TrackReport {
            track,
            channel_index,
            bits: decoded.bits.len(),
            errors: decoded.errors.len(),
            marginal: decoded.marginal_count(),
            first_errors: decoded.errors.iter().take(KEPT_ERRORS).copied().collect(),
            sync,
            timeline,
        }
    }

    /// Simulate both tracks from raw sample arrays.
    pub fn simulate(&self, td: &[i16], bd: &[i16]) -> ConformanceReport {
        let reports = vec![
            self.simulate_track(Track::Td, td),
            self.simulate_track(Track::Bd, bd),
        ];
        self.evaluate(reports)
    }

    /// Simulate the selected tracks of a WAV file.
    ///
    /// Accepts the 4-channel show layout (music L, music R, TD, BD) and the
    /// 2-channel recording layout (TD, BD). The decoder runs at the file's
    /// sample rate.
    ///
    /// # Errors
    /// Malformed WAV data, or a channel count other than 2 or 4.
    pub fn simulate_wav(&self, bytes: &[u8], tracks: &[Track]) -> Result<ConformanceReport> {
        let wav = wav::parse_wav(bytes)?;
        self.simulate_wav_data(&wav, tracks)
    }

    /// [`ConformanceSimulator::simulate_wav`] on already parsed data.
    pub fn simulate_wav_data(&self, wav: &WavData, tracks: &[Track]) -> Result<ConformanceReport> {
        let layout = TrackLayout::for_channels(wav.channel_count())?;
        let decoder = self.decoder_for(wav.sample_rate);

        let reports = tracks
            .iter()
            .map(|&track| {
                let index = layout.channel_of(track);
                self.run_track(&decoder, track, &wav.channels[index], Some(index))
            })
            .collect();

        Ok(self.evaluate(reports))
    }

    /// Apply thresholds to track reports.
    pub fn evaluate(&self, tracks: Vec<TrackReport>) -> ConformanceReport {
        let limits = self.thresholds;
        let mut reasons = Vec::new();

        for report in &tracks {
            let error_rate = report.error_rate();
            if error_rate > limits.max_error_rate {
                reasons.push(format!(
                    "{}: error rate {:.2}% exceeds {}% limit",
                    report.track,
                    error_rate * 100.0,
                    percent(limits.max_error_rate)
                ));
            }

            if report.sync.score < limits.min_lock_score {
                reasons.push(format!(
                    "{}: failed to lock on frame boundaries (score {} < {})",
                    report.track, report.sync.score, limits.min_lock_score
                ));
            }

            let blank_ok_rate = report.blank_ok_rate();
            if blank_ok_rate < limits.min_blank_ok_rate {
                reasons.push(format!(
                    "{}: blank-bit integrity {:.1}% below {}% limit",
                    report.track,
                    blank_ok_rate * 100.0,
                    percent(limits.min_blank_ok_rate)
                ));
            }
        }

        let verdict = if reasons.is_empty() {
            info!(tracks = tracks.len(), "conformance PASS");
            Verdict::Pass
        } else {
            warn!(tracks = tracks.len(), reasons = reasons.len(), "conformance FAIL");
            Verdict::Fail
        };

        ConformanceReport {
            tracks,
            thresholds: limits,
            verdict,
            reasons,
        }
    }
}

impl Default for ConformanceSimulator {
    fn default() -> Self {
        Self::new(DecoderConfig::default(), Thresholds::default())
    }
}

/// Where each track lives in a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLayout {
    /// music L, music R, TD, BD
    FourChannel,
    /// TD, BD
    TwoChannel,
}

impl TrackLayout {
    pub fn for_channels(count: usize) -> Result<Self> {
        match count {
            4 => Ok(TrackLayout::FourChannel),
            2 => Ok(TrackLayout::TwoChannel),
            other => Err(WavError::ChannelCount {
                expected: "2 or 4",
                actual: u16::try_from(other).unwrap_or(u16::MAX),
            }
            .into()),
        }
    }

    /// 0-based channel index of a track.
    pub fn channel_of(self, track: Track) -> usize {
        match (self, track) {
            (TrackLayout::FourChannel, Track::Td) => 2,
            (TrackLayout::FourChannel, Track::Bd) => 3,
            (TrackLayout::TwoChannel, Track::Td) => 0,
            (TrackLayout::TwoChannel, Track::Bd) => 1,
        }
    }
}

/// Percentage with trailing zeros trimmed: 0.02 -> "2", 0.025 -> "2.5".
fn percent(fraction: f64) -> String {
    let text = format!("{:.2}", fraction * 100.0);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::BitFrame;
    use crate::encoder::{Level, LineEncoder};
    use crate::error::{ContainerFormatError, Error};
    use crate::scheduler::{ChannelEvent, FrameScheduler};
    use crate::sync::DecodedFrame;

    fn clean_track(track: Track, channels: &[&str], seconds: f64) -> Vec<i16> {
        let events: Vec<_> = channels
            .iter()
            .map(|name| ChannelEvent::new(0.0, *name, true))
            .collect();
        FrameScheduler::new(track).render(&events, seconds).unwrap().samples
    }

    fn synthetic_report(track: Track, bits: usize, errors: usize, blank_ok: &[bool]) -> TrackReport {
        let frames = blank_ok
            .iter()
            .enumerate()
            .map(|(frame_index, &ok)| DecodedFrame {
                frame_index,
                bit_offset: 0,
                bits: Vec::new(),
                active_channels: Vec::new(),
                blank_ok: ok,
            })
            .collect();
        TrackReport {
            track,
            channel_index: None,
            bits,
            errors,
            marginal: 0,
            first_errors: Vec::new(),
            sync: SyncResult {
                locked: true,
                lock_offset: 0,
                score: 3,
                frames,
                orphan_bits: 0,
            },
            timeline: BTreeMap::new(),
        }
    }

    #[test]
    fn test_clean_signal_passes() {
        let td = clean_track(Track::Td, &["rolfe_mouth", "spot_rolfe"], 0.2);
        let bd = clean_track(Track::Bd, &["billybob_mouth"], 0.2);

        let report = ConformanceSimulator::default().simulate(&td, &bd);
        assert!(report.passed(), "reasons: {:?}", report.reasons);

        let td_report = report.track(Track::Td).unwrap();
        assert_eq!(td_report.errors, 0);
        assert!(td_report.sync.locked);
        assert_eq!(td_report.blank_ok_rate(), 1.0);
        assert!(td_report.timeline.contains_key("rolfe_mouth"));
    }

    #[test]
    fn test_error_rate_failure_names_track() {
        let simulator = ConformanceSimulator::default();
        let report = simulator.evaluate(vec![
            synthetic_report(Track::Td, 97, 3, &[true; 10]),
            synthetic_report(Track::Bd, 100, 0, &[true; 10]),
        ]);

        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.reasons, vec!["TD: error rate 3.00% exceeds 2% limit".to_string()]);
    }

    #[test]
    fn test_error_rate_at_limit_passes() {
        let report = ConformanceSimulator::default()
            .evaluate(vec![synthetic_report(Track::Bd, 98, 2, &[true; 5])]);
        assert!(report.passed());
    }

    #[test]
    fn test_blank_integrity_failure() {
        let mut blank_ok = vec![true; 49];
        blank_ok.push(false);
        blank_ok.push(false);
        let report = ConformanceSimulator::default()
            .evaluate(vec![synthetic_report(Track::Bd, 100, 0, &blank_ok)]);

        assert_eq!(report.reasons.len(), 1);
        assert!(report.reasons[0].starts_with("BD: blank-bit integrity 96.1%"));
        assert!(report.reasons[0].ends_with("below 98% limit"));
    }

    #[test]
    fn test_empty_track_fails_every_limit_but_error_rate() {
        let report = ConformanceSimulator::default().simulate(&[], &[]);
        assert_eq!(report.verdict, Verdict::Fail);
        // Per track: lock and blank integrity
        assert_eq!(report.reasons.len(), 4);
        assert_eq!(report.track(Track::Td).unwrap().error_rate(), 0.0);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds {
            max_error_rate: 0.05,
            ..Thresholds::default()
        };
        let simulator = ConformanceSimulator::new(DecoderConfig::default(), thresholds);
        let report = simulator.evaluate(vec![synthetic_report(Track::Td, 97, 3, &[true; 10])]);
        assert!(report.passed());
    }

    #[test]
    fn test_unlocked_random_bits_fail() {
        // Every bit 1: blanks never clear
        let mut encoder = LineEncoder::new(Level::Low);
        let td = encoder.encode_bits(&vec![1u8; 94 * 6]);
        let report = ConformanceSimulator::default().simulate(&td, &clean_track(Track::Bd, &[], 0.2));

        assert!(!report.passed());
        assert!(report
            .reasons
            .iter()
            .any(|r| r.starts_with("TD: failed to lock on frame boundaries")));
        assert!(report.reasons.iter().all(|r| r.starts_with("TD")));
    }

    #[test]
    fn test_simulate_four_channel_wav() {
        let td = clean_track(Track::Td, &["rolfe_mouth"], 0.1);
        let bd = clean_track(Track::Bd, &["spot_sun"], 0.1);
        let frames = td.len().min(bd.len());
        let silence = vec![0i16; frames];
        let bytes =
            wav::write_wav(&[&silence[..], &silence[..], &td[..frames], &bd[..frames]], 44_100).unwrap();

        let report = ConformanceSimulator::default()
            .simulate_wav(&bytes, &Track::ALL)
            .unwrap();
        assert!(report.passed(), "reasons: {:?}", report.reasons);
        assert_eq!(report.track(Track::Td).unwrap().channel_index, Some(2));
        assert_eq!(report.track(Track::Bd).unwrap().channel_index, Some(3));
    }

    #[test]
    fn test_simulate_two_channel_wav_single_track() {
        let td = clean_track(Track::Td, &[], 0.1);
        let frame = BitFrame::new(Track::Bd);
        let bd = LineEncoder::new(Level::Low).encode_bits(&frame.bits().repeat(5));
        let frames = td.len().min(bd.len());
        let bytes = wav::write_wav(&[&td[..frames], &bd[..frames]], 44_100).unwrap();

        let report = ConformanceSimulator::default()
            .simulate_wav(&bytes, &[Track::Bd])
            .unwrap();
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].channel_index, Some(1));
    }

    #[test]
    fn test_three_channel_wav_rejected() {
        let ch = [0i16; 10];
        let bytes = wav::write_wav(&[&ch[..], &ch[..], &ch[..]], 44_100).unwrap();
        let err = ConformanceSimulator::default()
            .simulate_wav(&bytes, &Track::ALL)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ContainerFormat(ContainerFormatError::Wav(WavError::ChannelCount { actual: 3, .. }))
        ));
    }

    #[test]
    fn test_threshold_limits() {
        assert!(Thresholds::default().validate().is_ok());

        for score in [0, sync::LOCK_THRESHOLD + 1] {
            let thresholds = Thresholds {
                min_lock_score: score,
                ..Thresholds::default()
            };
            assert!(matches!(
                thresholds.validate(),
                Err(ConfigurationError::InvalidThreshold { name: "min_lock_score", .. })
            ));
        }

        let thresholds = Thresholds {
            max_error_rate: 1.5,
            ..Thresholds::default()
        };
        assert!(matches!(
            thresholds.validate(),
            Err(ConfigurationError::InvalidThreshold { name: "max_error_rate", .. })
        ));
    }

    #[test]
    fn test_highest_lock_score_is_reachable() {
        let thresholds = Thresholds {
            min_lock_score: sync::LOCK_THRESHOLD,
            ..Thresholds::default()
        };
        let simulator = ConformanceSimulator::new(DecoderConfig::default(), thresholds);
        let td = clean_track(Track::Td, &[], 0.1);
        let bd = clean_track(Track::Bd, &[], 0.1);

        let report = simulator.simulate(&td, &bd);
        assert!(report.passed(), "reasons: {:?}", report.reasons);
    }

    #[test]
    fn test_decoder_follows_input_rate() {
        let simulator = ConformanceSimulator::default();
        let native = simulator.decoder_for(44_100);
        let faster = simulator.decoder_for(48_000);

        assert_eq!(native.config().sample_rate, 44_100);
        assert_eq!(faster.config().sample_rate, 48_000);
        assert!(faster.full_window().hi > native.full_window().hi);
        assert!(faster.tolerance_summary().contains("48000 Hz"));
        assert_eq!(faster.config().tolerance, simulator.decoder_config().tolerance);
    }

    #[test]
    fn test_percent_formatting() {
        assert_eq!(percent(0.02), "2");
        assert_eq!(percent(0.98), "98");
        assert_eq!(percent(0.025), "2.5");
    }
}
