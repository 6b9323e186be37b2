//! Biphase mark line encoder.
//!
//! Every bit period starts with a level transition. A `1` bit carries a second
//! transition after `HALF_A` samples; a `0` bit holds the new level for the
//! whole period. Because each bit flips on entry, the output never contains a
//! run longer than one bit period, no matter how the input is chunked.
//!
//! # Phase continuity
//!
//! The encoder owns its current level and carries it across calls. Encoding a
//! frame in two halves produces exactly the same samples as encoding it in
//! one call. Use [`LineEncoder::reset`] only between unrelated streams.
//!
//! # Example
//! ```
//! use showtape_core::encoder::{Level, LineEncoder};
//!
//! let mut encoder = LineEncoder::new(Level::Low);
//! let samples = encoder.encode_bits(&[1, 0]);
//! assert_eq!(samples.len(), 18);
//! assert_eq!(samples[0], i16::MAX);  // flipped high on entry
//! assert_eq!(samples[4], i16::MIN);  // mid-bit flip of the `1`
//! assert_eq!(samples[9], i16::MAX);  // flipped again for the `0`
//! ```

use crate::timing::{self, LEVEL_HIGH, LEVEL_LOW};

/// Two-valued line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

impl Level {
    /// Opposite level.
    pub fn flipped(self) -> Self {
        match self {
            Level::High => Level::Low,
            Level::Low => Level::High,
        }
    }

    /// PCM sample value for this level.
    pub fn sample(self) -> i16 {
        match self {
            Level::High => LEVEL_HIGH,
            Level::Low => LEVEL_LOW,
        }
    }
}

/// Stateful bit -> PCM translator.
///
/// # Invariants
/// - `half_a + half_b == samples_per_bit`
/// - `level` is the level of the last emitted sample
#[derive(Debug, Clone)]
pub struct LineEncoder {
    level: Level,
    samples_per_bit: usize,
    half_a: usize,
    half_b: usize,
}

impl LineEncoder {
    /// Encoder on the hardware grid (44.1 kHz, 4800 baud).
    pub fn new(initial: Level) -> Self {
        Self::with_timing(timing::SAMPLE_RATE, timing::BAUD_RATE, initial)
    }

    /// Encoder for an arbitrary rate pair. Bit length is truncated.
    pub fn with_timing(sample_rate: u32, baud_rate: u32, initial: Level) -> Self {
        let samples_per_bit = timing::samples_per_bit(sample_rate, baud_rate);
        let half_a = samples_per_bit / 2;
        Self {
            level: initial,
            samples_per_bit,
            half_a,
            half_b: samples_per_bit - half_a,
        }
    }

    /// Current output level (level of the last emitted sample).
    pub fn level(&self) -> Level {
        self.level
    }

    /// Samples emitted per bit.
    pub fn samples_per_bit(&self) -> usize {
        self.samples_per_bit
    }

    /// Restart at a given level. Only between independent streams.
    pub fn reset(&mut self, level: Level) {
        self.level = level;
    }

    /// Append the samples for one bit to `out`.
    ///
    /// Any non-zero `bit` is treated as `1`.
    pub fn encode_bit_into(&mut self, bit: u8, out: &mut Vec<i16>) {
        self.level = self.level.flipped();

        if bit == 0 {
            out.extend(std::iter::repeat(self.level.sample()).take(self.samples_per_bit));
            return;
        }

        out.extend(std::iter::repeat(self.level.sample()).take(self.half_a));
        self.level = self.level.flipped();
        out.extend(std::iter::repeat(self.level.sample()).take(self.half_b));
    }

    /// Encode one bit into `samples_per_bit` samples.
    pub fn encode_bit(&mut self, bit: u8) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.samples_per_bit);
        self.encode_bit_into(bit, &mut out);
        out
    }

    /// Encode a bit sequence with no gaps and no level reset.
    pub fn encode_bits(&mut self, bits: &[u8]) -> Vec<i16> {
        let mut out = Vec::with_capacity(bits.len() * self.samples_per_bit);
        for &bit in bits {
            self.encode_bit_into(bit, &mut out);
        }
        out
    }

    /// Encode the 8 bits of a byte, MSB first.
    pub fn encode_byte(&mut self, byte: u8) -> Vec<i16> {
        let bits: Vec<u8> = (0..8).rev().map(|shift| (byte >> shift) & 1).collect();
        self.encode_bits(&bits)
    }
}

/// Pack samples as signed 16-bit little-endian PCM.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Lengths of maximal constant-value runs in a sample slice.
pub fn run_lengths(samples: &[i16]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut iter = samples.iter().peekable();
    while let Some(&value) = iter.next() {
        let mut length = 1;
        while iter.next_if_eq(&&value).is_some() {
            length += 1;
        }
        runs.push(length);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: i16 = LEVEL_HIGH;
    const L: i16 = LEVEL_LOW;

    #[test]
    fn test_zero_bit_is_one_full_run() {
        let mut encoder = LineEncoder::new(Level::Low);
        assert_eq!(encoder.encode_bit(0), vec![H; 9]);
        assert_eq!(encoder.level(), Level::High);

        assert_eq!(encoder.encode_bit(0), vec![L; 9]);
        assert_eq!(encoder.level(), Level::Low);
    }

    #[test]
    fn test_one_bit_has_mid_transition() {
        let mut encoder = LineEncoder::new(Level::Low);
        let samples = encoder.encode_bit(1);
        assert_eq!(samples, vec![H, H, H, H, L, L, L, L, L]);
        // Ends where it started: two flips
        assert_eq!(encoder.level(), Level::Low);
    }

    #[test]
    fn test_reference_sequence() {
        let mut encoder = LineEncoder::new(Level::Low);
        let samples = encoder.encode_bits(&[1, 0, 1, 1, 0, 0, 1, 0]);

        assert_eq!(samples.len(), 72);
        assert_eq!(run_lengths(&samples), vec![4, 5, 9, 4, 5, 4, 5, 9, 9, 4, 5, 9]);

        let mut expected = Vec::new();
        for (level, count) in [
            (H, 4),
            (L, 5),
            (H, 9),
            (L, 4),
            (H, 5),
            (L, 4),
            (H, 5),
            (L, 9),
            (H, 9),
            (L, 4),
            (H, 5),
            (L, 9),
        ] {
            expected.extend(std::iter::repeat(level).take(count));
        }
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_phase_continuity_across_calls() {
        let bits = [1u8, 1, 0, 1, 0, 0, 0, 1, 1, 0];

        let mut whole = LineEncoder::new(Level::Low);
        let expected = whole.encode_bits(&bits);

        let mut split = LineEncoder::new(Level::Low);
        let mut joined = split.encode_bits(&bits[..3]);
        joined.extend(split.encode_bits(&bits[3..]));

        assert_eq!(joined, expected);
        assert!(run_lengths(&joined).iter().all(|&run| run <= 9));
    }

    #[test]
    fn test_encode_byte_msb_first() {
        let mut a = LineEncoder::new(Level::High);
        let mut b = LineEncoder::new(Level::High);
        assert_eq!(a.encode_byte(0b1011_0010), b.encode_bits(&[1, 0, 1, 1, 0, 0, 1, 0]));
    }

    #[test]
    fn test_reset() {
        let mut encoder = LineEncoder::new(Level::Low);
        encoder.encode_bit(0);
        encoder.reset(Level::Low);
        assert_eq!(encoder.encode_bit(0)[0], H);
    }

    #[test]
    fn test_custom_timing() {
        let mut encoder = LineEncoder::with_timing(48_000, 4_800, Level::Low);
        assert_eq!(encoder.samples_per_bit(), 10);
        assert_eq!(run_lengths(&encoder.encode_bit(1)), vec![5, 5]);
    }

    #[test]
    fn test_le_bytes() {
        assert_eq!(to_le_bytes(&[H, L, 1]), vec![0xFF, 0x7F, 0x00, 0x80, 0x01, 0x00]);
    }
}
