//! Line decoder: PCM samples -> classified bits with timing diagnostics.
//!
//! Models what the show controller's transition detector accepts. The signal
//! is split into runs of constant polarity, and each run is classified
//! against two tolerance windows around the nominal full-bit and half-bit
//! lengths.
//!
//! # Classification
//!
//! | Runs                              | Result                         |
//! |-----------------------------------|--------------------------------|
//! | FULL                              | `0`                            |
//! | HALF, HALF                        | `1`                            |
//! | HALF, non-HALF with FULL-sized sum| `1`, marked out of tolerance   |
//! | HALF at end of stream             | `1`, marked out of tolerance   |
//! | HALF, anything else               | error, consumes the first run  |
//! | outside both windows              | error                          |
//!
//! A run that fits both windows is FULL. Timing problems never abort the
//! decode: they come back as [`DecodeError`] records next to the bits.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timing;

/// Decoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub sample_rate: u32,
    pub baud_rate: u32,
    /// Fractional window half-width (0.30 = ±30%)
    pub tolerance: f64,
    /// Samples with |s| below this are gaps, not signal
    pub zero_threshold: u16,
    /// Accept a HALF run followed by a non-HALF run when their sum is FULL
    pub accept_marginal_pairs: bool,
}

impl DecoderConfig {
    /// Hardware defaults with a different tolerance.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: timing::SAMPLE_RATE,
            baud_rate: timing::BAUD_RATE,
            tolerance: 0.30,
            zero_threshold: 200,
            accept_marginal_pairs: true,
        }
    }
}

/// Inclusive run-length window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: usize,
    pub hi: usize,
}

impl Window {
    /// `[floor(nominal * (1 - tol)), ceil(nominal * (1 + tol))]`
    pub fn around(nominal: f64, tolerance: f64) -> Self {
        Self {
            lo: (nominal * (1.0 - tolerance)).floor().max(0.0) as usize,
            hi: (nominal * (1.0 + tolerance)).ceil() as usize,
        }
    }

    pub fn contains(&self, length: usize) -> bool {
        (self.lo..=self.hi).contains(&length)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.lo, self.hi)
    }
}

/// Sign of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// Maximal stretch of same-sign, above-threshold samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub length: usize,
    pub polarity: Polarity,
}

/// One recovered bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedBit {
    /// 0 or 1
    pub value: u8,
    /// Sample index where the bit period starts
    pub sample_pos: usize,
    pub run_a: usize,
    /// Second run of a `1` bit
    pub run_b: Option<usize>,
    /// false = the hardware would likely reject this bit
    pub in_tolerance: bool,
}

/// Why a run could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Run fits neither window
    OutOfWindow { full: Window, half: Window },
    /// HALF run followed by a run that does not complete a `1`
    IncompleteOne { next: usize, sum: usize },
}

/// Diagnostic record for an undecodable run. Data, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub sample_pos: usize,
    pub run_length: usize,
    pub kind: DecodeErrorKind,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::OutOfWindow { full, half } => write!(
                f,
                "@{}: run={} outside full={} and half={}",
                self.sample_pos, self.run_length, full, half
            ),
            DecodeErrorKind::IncompleteOne { next, sum } => write!(
                f,
                "@{}: half-run ({}) followed by non-half ({}), sum={}",
                self.sample_pos, self.run_length, next, sum
            ),
        }
    }
}

/// Result of decoding one PCM channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutput {
    pub bits: Vec<DecodedBit>,
    pub errors: Vec<DecodeError>,
}

impl DecodeOutput {
    /// Plain 0/1 values in stream order.
    pub fn bit_values(&self) -> Vec<u8> {
        self.bits.iter().map(|bit| bit.value).collect()
    }

    /// Number of bits flagged as out of tolerance.
    pub fn marginal_count(&self) -> usize {
        self.bits.iter().filter(|bit| !bit.in_tolerance).count()
    }
}

/// Outcome of classifying the run at the head of the stream.
enum Step {
    Bit(DecodedBit),
    Error(DecodeError),
}

/// Stateless-per-call decoder over a fixed configuration.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    config: DecoderConfig,
    nominal_full: f64,
    full: Window,
    half: Window,
}

impl LineDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        let nominal_full = config.sample_rate as f64 / config.baud_rate as f64;
        Self {
            config,
            nominal_full,
            full: Window::around(nominal_full, config.tolerance),
            half: Window::around(nominal_full / 2.0, config.tolerance),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn full_window(&self) -> Window {
        self.full
    }

    pub fn half_window(&self) -> Window {
        self.half
    }

    /// Decode a whole PCM channel.
    pub fn decode(&self, samples: &[i16]) -> DecodeOutput {
        let output = self.classify(&self.runs(samples));
        debug!(
            samples = samples.len(),
            bits = output.bits.len(),
            errors = output.errors.len(),
            marginal = output.marginal_count(),
            "decoded channel"
        );
        output
    }

    /// Split samples into polarity runs, skipping gaps.
    pub fn runs(&self, samples: &[i16]) -> Vec<Run> {
        let threshold = self.config.zero_threshold;
        let polarity_of = |s: i16| {
            if s.unsigned_abs() < threshold {
                None
            } else if s > 0 {
                Some(Polarity::Positive)
            } else {
                Some(Polarity::Negative)
            }
        };

        let mut runs: Vec<Run> = Vec::new();
        let mut current: Option<Run> = None;

        for (index, &sample) in samples.iter().enumerate() {
            let polarity = polarity_of(sample);
            if let (Some(p), Some(run)) = (polarity, current.as_mut()) {
                if run.polarity == p {
                    run.length += 1;
                    continue;
                }
            }
            runs.extend(current.take());
            current = polarity.map(|polarity| Run {
                start: index,
                length: 1,
                polarity,
            });
        }
        runs.extend(current);
        runs
    }

    /// Classify a run list into bits and errors.
    pub fn classify(&self, runs: &[Run]) -> DecodeOutput {
        let mut output = DecodeOutput::default();
        let mut index = 0;

        while index < runs.len() {
            let (step, consumed) = self.step(runs[index], runs.get(index + 1).copied());
            match step {
                Step::Bit(bit) => output.bits.push(bit),
                Step::Error(error) => output.errors.push(error),
            }
            index += consumed;
        }

        output
    }

    fn step(&self, run: Run, next: Option<Run>) -> (Step, usize) {
        let bit = |value, run_b, in_tolerance| DecodedBit {
            value,
            sample_pos: run.start,
            run_a: run.length,
            run_b,
            in_tolerance,
        };
        let error = |kind| DecodeError {
            sample_pos: run.start,
            run_length: run.length,
            kind,
        };

        if self.full.contains(run.length) {
            return (Step::Bit(bit(0, None, true)), 1);
        }

        if !self.half.contains(run.length) {
            let kind = DecodeErrorKind::OutOfWindow {
                full: self.full,
                half: self.half,
            };
            return (Step::Error(error(kind)), 1);
        }

        let Some(next) = next else {
            return (Step::Bit(bit(1, None, false)), 1);
        };

        if self.half.contains(next.length) {
            return (Step::Bit(bit(1, Some(next.length), true)), 2);
        }

        let sum = run.length + next.length;
        if self.config.accept_marginal_pairs && self.full.contains(sum) {
            return (Step::Bit(bit(1, Some(next.length), false)), 2);
        }

        let kind = DecodeErrorKind::IncompleteOne {
            next: next.length,
            sum,
        };
        (Step::Error(error(kind)), 1)
    }

    /// Human-readable description of the active windows.
    pub fn tolerance_summary(&self) -> String {
        format!(
            "  Nominal bit period : {:.2} samp  ({} int at {} Hz / {} baud)\n\
             \x20 Full-run window    : {} - {} samp\n\
             \x20 Half-run window    : {} - {} samp  (tol={}%)",
            self.nominal_full,
            self.nominal_full as usize,
            self.config.sample_rate,
            self.config.baud_rate,
            self.full.lo,
            self.full.hi,
            self.half.lo,
            self.half.hi,
            (self.config.tolerance * 100.0).round() as i64,
        )
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}
