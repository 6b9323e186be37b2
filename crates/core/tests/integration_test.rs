//! Integration tests for the full showtape pipeline.
//!
//! These tests verify end-to-end behavior: events -> schedule -> encode ->
//! WAV -> decode -> sync -> verdict, and WAV -> show container -> reader,
//! with checks that what comes out matches what went in.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use showtape_core::{
    channels::{BitFrame, Track},
    conformance::{ConformanceSimulator, Verdict},
    container::ShowContainer,
    decoder::LineDecoder,
    encoder::{Level, LineEncoder},
    impairment::{ImpairmentConfig, LineImpairment},
    scheduler::{ChannelEvent, FrameScheduler},
    show::{convert_4ch_wav, render_show, show_from_rendered, write_show_wav, TD_CHANNEL},
    signal::{decode_signal_codes, signal_frame_count},
    sync::{sync_frames, LOCK_THRESHOLD},
    timing::{SAMPLES_PER_BIT, SAMPLE_RATE},
    wav::{parse_wav, write_wav},
};

fn sample_events() -> Vec<ChannelEvent> {
    vec![
        ChannelEvent::new(0.0, "rolfe_mouth", true),
        ChannelEvent::new(0.05, "rolfe_mouth", false),
        ChannelEvent::new(0.1, "beachbear_mouth", true),
        ChannelEvent::new(0.3, "spot_rolfe", true),
        ChannelEvent::new(0.4, "beachbear_mouth", false),
    ]
}

/// Random bits survive encode -> decode with no errors.
#[test]
fn test_line_round_trip_random_bits() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let bits: Vec<u8> = (0..5000).map(|_| rng.gen_range(0..=1)).collect();

    let samples = LineEncoder::new(Level::Low).encode_bits(&bits);
    let out = LineDecoder::default().decode(&samples);

    assert!(out.errors.is_empty(), "errors: {:?}", &out.errors[..out.errors.len().min(3)]);
    assert_eq!(out.bit_values(), bits);
}

/// A single TD frame with one channel set is recovered by name.
#[test]
fn test_single_frame_channel_recovered() {
    let mut frame = BitFrame::new(Track::Td);
    frame.set("rolfe_mouth", true).unwrap();

    let samples = LineEncoder::new(Level::Low).encode_bits(frame.bits());
    let bits = LineDecoder::default().decode(&samples).bit_values();
    let sync = sync_frames(&bits, Track::Td.channel_map());

    assert_eq!(sync.frames.len(), 1);
    assert_eq!(sync.frames[0].active_channels, vec!["rolfe_mouth"]);
    assert!(sync.frames[0].blank_ok);
}

/// The scheduler's one-frame TD track with only rolfe_mouth active decodes
/// and syncs back to that channel.
#[test]
fn test_scheduled_frame_channel_recovered() {
    let mut scheduler = FrameScheduler::new(Track::Td);
    let frame_seconds = scheduler.frame_samples() as f64 / SAMPLE_RATE as f64;
    let events = vec![ChannelEvent::new(0.0, "rolfe_mouth", true)];

    let track = scheduler.render(&events, frame_seconds).unwrap();
    assert_eq!(track.frames.len(), 1);
    assert_eq!(track.samples.len(), 94 * SAMPLES_PER_BIT);

    let out = LineDecoder::default().decode(&track.samples);
    assert!(out.errors.is_empty());
    let sync = sync_frames(&out.bit_values(), Track::Td.channel_map());

    assert_eq!(sync.frames.len(), 1);
    assert_eq!(sync.frames[0].active_channels, vec!["rolfe_mouth"]);
    assert!(sync.frames[0].blank_ok);
    assert_eq!(sync.score, 1);
}

/// K copies of a random frame score min(LOCK_THRESHOLD, K), on both tracks.
#[test]
fn test_lock_score_of_repeated_random_frames() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for track in Track::ALL {
        let map = track.channel_map();
        for k in 1..=6 {
            let mut frame = BitFrame::new(track);
            for (name, _) in map.channels() {
                frame.set(name, rng.gen_bool(0.5)).unwrap();
            }

            let bits = frame.bits().repeat(k);
            let samples = LineEncoder::new(Level::Low).encode_bits(&bits);
            let decoded = LineDecoder::default().decode(&samples).bit_values();
            assert_eq!(decoded, bits);

            let sync = sync_frames(&decoded, map);
            assert_eq!(sync.score, k.min(LOCK_THRESHOLD), "{track} with {k} frames");
            assert_eq!(sync.locked, k >= LOCK_THRESHOLD);
            assert_eq!(sync.frames.len(), k);
        }
    }
}

/// 3% decode errors on one track fails the show and names the track.
#[test]
fn test_error_rate_over_limit_fails() {
    let simulator = ConformanceSimulator::default();
    let show = render_show(&sample_events(), 0.5).unwrap();

    let mut td = simulator.simulate_track(Track::Td, &show.td.samples);
    let bd = simulator.simulate_track(Track::Bd, &show.bd.samples);
    td.bits = 97;
    td.errors = 3;

    let report = simulator.evaluate(vec![td, bd]);
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.reasons, vec!["TD: error rate 3.00% exceeds 2% limit".to_string()]);
}

/// Rendered show written as a 4-channel WAV passes conformance and yields
/// the scheduled channel timeline.
#[test]
fn test_render_to_wav_passes_simulation() {
    let show = render_show(&sample_events(), 0.5).unwrap();
    let bytes = write_show_wav(&show, None).unwrap();

    let report = ConformanceSimulator::default()
        .simulate_wav(&bytes, &Track::ALL)
        .unwrap();

    assert!(report.passed(), "reasons: {:?}", report.reasons);

    let td = report.track(Track::Td).unwrap();
    assert_eq!(td.channel_index, Some(TD_CHANNEL));
    assert!(td.sync.locked);
    assert_eq!(td.sync.lock_offset, 0);

    let frame_seconds = 94.0 / 4800.0;
    let mouth = &td.timeline["rolfe_mouth"];
    assert_eq!(mouth.len(), 1);
    assert_eq!(mouth[0].on, 0.0);
    assert!((mouth[0].off - 2.0 * frame_seconds).abs() < 1e-9);

    let bd = report.track(Track::Bd).unwrap();
    assert!(bd.timeline.contains_key("beachbear_mouth"));
}

/// The 2-channel recording layout (TD, BD) is accepted.
#[test]
fn test_two_channel_recording() {
    let show = render_show(&sample_events(), 0.3).unwrap();
    let length = show.td.samples.len().min(show.bd.samples.len());
    let bytes = write_wav(&[&show.td.samples[..length], &show.bd.samples[..length]], SAMPLE_RATE).unwrap();

    let report = ConformanceSimulator::default()
        .simulate_wav(&bytes, &Track::ALL)
        .unwrap();
    assert_eq!(report.track(Track::Td).unwrap().channel_index, Some(0));
    assert_eq!(report.track(Track::Bd).unwrap().channel_index, Some(1));
    assert!(report.track(Track::Td).unwrap().sync.locked);
}

/// 4-channel WAV -> container -> reader -> signal codes.
#[test]
fn test_convert_and_read_back() {
    let show = render_show(&sample_events(), 0.5).unwrap();
    let wav = write_show_wav(&show, None).unwrap();

    let container = convert_4ch_wav(&wav).unwrap();
    let bytes = container.serialize().unwrap();
    let parsed = ShowContainer::parse(&bytes).unwrap();
    assert_eq!(parsed, container);
    assert!(parsed.video.is_none());

    // Stored audio is a stereo WAV of the music channels
    let audio = parse_wav(&parsed.audio).unwrap();
    assert_eq!(audio.channel_count(), 2);
    assert_eq!(audio.frames(), show.samples());

    let frames = decode_signal_codes(&parsed.signal_codes).unwrap();
    assert_eq!(frames.len(), signal_frame_count(show.samples(), SAMPLE_RATE));

    let rolfe = Track::Td.channel_map().bit_of("rolfe_mouth").unwrap();
    assert!(frames[0].td_bits.contains(&rolfe));
    assert!(!frames[frames.len() - 1].td_bits.contains(&rolfe));

    // Building straight from scheduler frames gives the same codes
    let direct = show_from_rendered(&show, None).unwrap();
    assert_eq!(direct.signal_codes, parsed.signal_codes);
}

/// Heavy line impairment turns a passing show into a failing one.
#[test]
fn test_impaired_line_fails() {
    let show = render_show(&sample_events(), 0.5).unwrap();
    let config = ImpairmentConfig {
        jitter_samples: 5,
        dropout_rate: 0.02,
        seed: 99,
    };

    let mut line = LineImpairment::new(config);
    let td = line.apply(&show.td.samples);
    let bd = line.apply(&show.bd.samples);

    let report = ConformanceSimulator::default().simulate(&td, &bd);
    assert_eq!(report.verdict, Verdict::Fail);
    assert!(report.reasons.iter().any(|r| r.starts_with("TD:")));
    assert!(line.stats().runs_dropped > 0);
}

/// Garbage bits before the first frame are skipped by the lock search.
#[test]
fn test_lock_after_leading_garbage() {
    let map = Track::Bd.channel_map();
    let mut frame = BitFrame::new(Track::Bd);
    for (name, _) in map.channels() {
        frame.set(name, true).unwrap();
    }

    // With every channel set, any misaligned window puts a 1 on the blank bit
    let mut bits = vec![1u8; 13];
    for _ in 0..5 {
        bits.extend_from_slice(frame.bits());
    }

    let samples = LineEncoder::new(Level::Low).encode_bits(&bits);
    let decoded = LineDecoder::default().decode(&samples).bit_values();
    let sync = sync_frames(&decoded, map);

    assert!(sync.locked);
    assert_eq!(sync.lock_offset, 13);
    assert_eq!(sync.orphan_bits, 13);
    assert_eq!(sync.frames.len(), 5);
    assert!(sync.frames.iter().all(|f| f.blank_ok && f.active_channels.len() == 95));
}
