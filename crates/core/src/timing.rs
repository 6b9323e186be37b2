//! Hardware timing constants for the control tracks.
//!
//! The true samples-per-bit ratio is 44100 / 4800 = 9.1875. The hardware runs
//! on a fixed 9-sample grid, so every derived length uses integer
//! truncation. Rounding here would drift the signal off the grid.

/// Native sample rate of the control tracks (Hz)
pub const SAMPLE_RATE: u32 = 44_100;

/// Line code baud rate (bits per second)
pub const BAUD_RATE: u32 = 4_800;

/// Samples per bit period: floor(SAMPLE_RATE / BAUD_RATE) = 9
pub const SAMPLES_PER_BIT: usize = samples_per_bit(SAMPLE_RATE, BAUD_RATE);

/// First half of a `1` bit: SAMPLES_PER_BIT / 2 = 4
pub const HALF_A: usize = SAMPLES_PER_BIT / 2;

/// Second half of a `1` bit: SAMPLES_PER_BIT - HALF_A = 5
pub const HALF_B: usize = SAMPLES_PER_BIT - HALF_A;

/// PCM value of the high line level
pub const LEVEL_HIGH: i16 = i16::MAX;

/// PCM value of the low line level
pub const LEVEL_LOW: i16 = i16::MIN;

/// Frame rate of the signal-code array inside the show container
pub const SIGNAL_FPS: u32 = 60;

/// Offset added to BD bit numbers in the flat signal-code numbering
pub const BD_SIGNAL_OFFSET: i32 = 150;

/// Longest show a track may be rendered for (seconds): six hours
pub const MAX_SHOW_SECONDS: f64 = 6.0 * 60.0 * 60.0;

/// Integer samples per bit for an arbitrary rate pair.
pub const fn samples_per_bit(sample_rate: u32, baud_rate: u32) -> usize {
    (sample_rate / baud_rate) as usize
}
