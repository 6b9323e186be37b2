//! Line impairment simulator with run-length jitter and dropouts.
//!
//! Models a degraded tape or cable between the encoder and the decoder.
//! The signal is treated as a sequence of constant-level runs, and each run
//! is independently:
//!
//! - **Dropped**: replaced by silence of the same length (Bernoulli)
//! - **Jittered**: lengthened or shortened by a uniform `±jitter_samples`
//!
//! A jittered run never shrinks below one sample.
//!
//! # Determinism
//!
//! All randomness comes from a seeded ChaCha8 RNG. Given the same seed and
//! input, the output is sample-identical.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Impairment parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpairmentConfig {
    /// Uniform run-length jitter in samples (±)
    pub jitter_samples: usize,

    /// Probability that a run is replaced by silence [0.0, 1.0]
    pub dropout_rate: f64,

    /// Random seed for determinism
    pub seed: u64,
}

impl ImpairmentConfig {
    /// No impairments; output equals input.
    pub fn perfect(seed: u64) -> Self {
        Self {
            jitter_samples: 0,
            dropout_rate: 0.0,
            seed,
        }
    }

    /// Moderate impairments: ±1 sample jitter and 0.1% dropouts.
    pub fn default_with_seed(seed: u64) -> Self {
        Self {
            jitter_samples: 1,
            dropout_rate: 0.001,
            seed,
        }
    }

    pub fn is_perfect(&self) -> bool {
        self.jitter_samples == 0 && self.dropout_rate <= 0.0
    }
}

impl Default for ImpairmentConfig {
    fn default() -> Self {
        Self::perfect(0)
    }
}

/// Applies [`ImpairmentConfig`] to PCM channels.
///
/// Not thread-safe; the RNG state advances with every call.
pub struct LineImpairment {
    config: ImpairmentConfig,
    rng: ChaCha8Rng,

    // Statistics
    runs_seen: u64,
    runs_dropped: u64,
    runs_jittered: u64,
    samples_in: u64,
    samples_out: u64,
}

impl LineImpairment {
    pub fn new(config: ImpairmentConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            runs_seen: 0,
            runs_dropped: 0,
            runs_jittered: 0,
            samples_in: 0,
            samples_out: 0,
        }
    }

    pub fn config(&self) -> &ImpairmentConfig {
        &self.config
    }

    /// Impair one channel. The output length changes with jitter.
    pub fn apply(&mut self, samples: &[i16]) -> Vec<i16> {
        let mut out = Vec::with_capacity(samples.len() + samples.len() / 8);
        let mut index = 0;

        while index < samples.len() {
            let value = samples[index];
            let length = samples[index..]
                .iter()
                .take_while(|&&sample| sample == value)
                .count();
            index += length;
            self.runs_seen += 1;

            if self.config.dropout_rate > 0.0 && self.rng.gen::<f64>() < self.config.dropout_rate {
                self.runs_dropped += 1;
                out.extend(std::iter::repeat(0).take(length));
                continue;
            }

            let length = self.jitter(length);
            out.extend(std::iter::repeat(value).take(length));
        }

        self.samples_in += samples.len() as u64;
        self.samples_out += out.len() as u64;

        debug!(
            samples_in = samples.len(),
            samples_out = out.len(),
            runs_dropped = self.runs_dropped,
            runs_jittered = self.runs_jittered,
            "impaired channel"
        );
        out
    }

    fn jitter(&mut self, length: usize) -> usize {
        let jitter = self.config.jitter_samples as i64;
        if jitter == 0 {
            return length;
        }

        let offset = self.rng.gen_range(-jitter..=jitter);
        if offset != 0 {
            self.runs_jittered += 1;
        }
        (length as i64 + offset).max(1) as usize
    }

    pub fn stats(&self) -> ImpairmentStats {
        ImpairmentStats {
            runs_seen: self.runs_seen,
            runs_dropped: self.runs_dropped,
            runs_jittered: self.runs_jittered,
            samples_in: self.samples_in,
            samples_out: self.samples_out,
        }
    }
}

/// Counters from a [`LineImpairment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpairmentStats {
    pub runs_seen: u64,
    pub runs_dropped: u64,
    pub runs_jittered: u64,
    pub samples_in: u64,
    pub samples_out: u64,
}

impl ImpairmentStats {
    pub fn dropout_rate(&self) -> f64 {
        if self.runs_seen == 0 {
            0.0
        } else {
            self.runs_dropped as f64 / self.runs_seen as f64
        }
    }

    pub fn jitter_rate(&self) -> f64 {
        if self.runs_seen == 0 {
            0.0
        } else {
            self.runs_jittered as f64 / self.runs_seen as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::LineDecoder;
    use crate::encoder::{run_lengths, Level, LineEncoder};

    fn test_signal() -> Vec<i16> {
        let bits: Vec<u8> = (0..400).map(|i| ((i * 7) % 3 == 0) as u8).collect();
        LineEncoder::new(Level::Low).encode_bits(&bits)
    }

    #[test]
    fn test_perfect_line() {
        let signal = test_signal();
        let mut line = LineImpairment::new(ImpairmentConfig::perfect(42));

        assert_eq!(line.apply(&signal), signal);

        let stats = line.stats();
        assert_eq!(stats.runs_seen, run_lengths(&signal).len() as u64);
        assert_eq!(stats.runs_dropped, 0);
        assert_eq!(stats.runs_jittered, 0);
        assert_eq!(stats.samples_in, stats.samples_out);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let signal = test_signal();
        let mut line = LineImpairment::new(ImpairmentConfig {
            jitter_samples: 2,
            dropout_rate: 0.0,
            seed: 7,
        });
        let impaired = line.apply(&signal);
        assert!(line.stats().runs_jittered > 0);

        let before = run_lengths(&signal);
        let after = run_lengths(&impaired);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert!(a.abs_diff(*b) <= 2);
            assert!(*b >= 1);
        }
    }

    #[test]
    fn test_heavy_jitter_causes_errors() {
        let signal = test_signal();
        let mut line = LineImpairment::new(ImpairmentConfig {
            jitter_samples: 6,
            dropout_rate: 0.0,
            seed: 3,
        });

        let out = LineDecoder::default().decode(&line.apply(&signal));
        assert!(!out.errors.is_empty());
    }

    #[test]
    fn test_full_dropout_is_silence() {
        let signal = test_signal();
        let mut line = LineImpairment::new(ImpairmentConfig {
            jitter_samples: 0,
            dropout_rate: 1.0,
            seed: 1,
        });

        let impaired = line.apply(&signal);
        assert!(impaired.iter().all(|&s| s == 0));
        assert_eq!(line.stats().dropout_rate(), 1.0);

        let out = LineDecoder::default().decode(&impaired);
        assert!(out.bits.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_dropout_rate_roughly_matches() {
        let signal = test_signal();
        let mut line = LineImpairment::new(ImpairmentConfig {
            jitter_samples: 0,
            dropout_rate: 0.5,
            seed: 42,
        });
        line.apply(&signal);

        // Allow a wide band around 50%
        let rate = line.stats().dropout_rate();
        assert!(rate > 0.3 && rate < 0.7, "rate = {rate}");
    }

    #[test]
    fn test_determinism() {
        let signal = test_signal();
        let config = ImpairmentConfig {
            jitter_samples: 3,
            dropout_rate: 0.05,
            seed: 12345,
        };

        let mut first = LineImpairment::new(config);
        let mut second = LineImpairment::new(config);

        assert_eq!(first.apply(&signal), second.apply(&signal));
        assert_eq!(first.stats(), second.stats());
    }
}
