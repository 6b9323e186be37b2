//! Flat signal-code array stored in the show container.
//!
//! The playback engine samples both drawers at 60 Hz. Each 60 Hz frame is
//! written as a `0` delimiter followed by one code per set bit:
//!
//! - TD bit `n` (1-based) -> code `n`
//! - BD bit `n` (1-based) -> code `n + 150`
//!
//! Frame `k` at 60 Hz reads TD frame `k * baud / (60 * 94)` and BD frame
//! `k * baud / (60 * 96)`, computed in integers so that long shows never
//! drift. Frames past the end of the decoded data contribute no codes.

use tracing::debug;

use crate::error::NrbfError;
use crate::timing::{BAUD_RATE, BD_SIGNAL_OFFSET, SIGNAL_FPS};

/// Highest valid code (BD drawer has 150 slots in the engine).
pub const MAX_SIGNAL_CODE: i32 = BD_SIGNAL_OFFSET + 150;

/// Number of 60 Hz frames covering `audio_frames` samples at `sample_rate`.
pub fn signal_frame_count(audio_frames: usize, sample_rate: u32) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    (audio_frames as u64 * u64::from(SIGNAL_FPS) / u64::from(sample_rate)) as usize
}

/// Build the signal-code array from per-track frame bits.
///
/// `td_frames` and `bd_frames` hold one 0/1 vector per hardware frame.
pub fn encode_signal_codes<T, B>(td_frames: &[T], bd_frames: &[B], frame_count: usize) -> Vec<i32>
where
    T: AsRef<[u8]>,
    B: AsRef<[u8]>,
{
    encode_signal_codes_at(td_frames, bd_frames, frame_count, BAUD_RATE)
}

/// [`encode_signal_codes`] for an arbitrary baud rate.
pub fn encode_signal_codes_at<T, B>(
    td_frames: &[T],
    bd_frames: &[B],
    frame_count: usize,
    baud_rate: u32,
) -> Vec<i32>
where
    T: AsRef<[u8]>,
    B: AsRef<[u8]>,
{
    let mut codes = Vec::with_capacity(frame_count * 8);
    let baud = u64::from(baud_rate);
    let fps = u64::from(SIGNAL_FPS);

    for n in 0..frame_count as u64 {
        codes.push(0);

        if let Some(frame) = nth_frame(td_frames, n * baud / (fps * 94)) {
            push_set_bits(&mut codes, frame.as_ref(), 0);
        }
        if let Some(frame) = nth_frame(bd_frames, n * baud / (fps * 96)) {
            push_set_bits(&mut codes, frame.as_ref(), BD_SIGNAL_OFFSET);
        }
    }

    debug!(
        frames = frame_count,
        td_frames = td_frames.len(),
        bd_frames = bd_frames.len(),
        codes = codes.len(),
        "encoded signal codes"
    );
    codes
}

fn nth_frame<F>(frames: &[F], index: u64) -> Option<&F> {
    usize::try_from(index).ok().and_then(|index| frames.get(index))
}

fn push_set_bits(codes: &mut Vec<i32>, bits: &[u8], offset: i32) {
    codes.extend(
        bits.iter()
            .enumerate()
            .filter(|(_, &bit)| bit != 0)
            .map(|(index, _)| index as i32 + 1 + offset),
    );
}

/// One 60 Hz frame of set bit numbers (1-based, per drawer).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFrame {
    pub td_bits: Vec<usize>,
    pub bd_bits: Vec<usize>,
}

/// Split a signal-code array back into 60 Hz frames.
///
/// # Errors
/// `InvalidSignalCode` for codes outside `0..=300` or before the first
/// delimiter.
pub fn decode_signal_codes(codes: &[i32]) -> Result<Vec<SignalFrame>, NrbfError> {
    let mut frames: Vec<SignalFrame> = Vec::new();

    for (index, &value) in codes.iter().enumerate() {
        if value == 0 {
            frames.push(SignalFrame::default());
            continue;
        }

        let invalid = || NrbfError::InvalidSignalCode { index, value };
        let frame = frames.last_mut().ok_or_else(invalid)?;
        match value {
            1..=BD_SIGNAL_OFFSET => frame.td_bits.push(value as usize),
            v if v > BD_SIGNAL_OFFSET && v <= MAX_SIGNAL_CODE => {
                frame.bd_bits.push((v - BD_SIGNAL_OFFSET) as usize)
            }
            _ => return Err(invalid()),
        }
    }

    Ok(frames)
}
