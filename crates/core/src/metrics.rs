//! Metrics collection and reporting for a codec run.
//!
//! Counters are filled in explicitly at each pipeline stage:
//! - Rendering (events in, frames and samples out)
//! - Line impairment (runs dropped and jittered)
//! - Decoding and frame sync
//! - Container assembly
//!
//! Single-threaded; merge per-run values by hand if several runs share one
//! report.

use std::time::{Duration, Instant};

use crate::conformance::{ConformanceReport, TrackReport};
use crate::container::ShowContainer;
use crate::impairment::ImpairmentStats;
use crate::show::RenderedShow;

/// Pipeline counters and timing.
#[derive(Debug, Clone)]
pub struct Metrics {
    // === Timing ===
    /// When the run started
    pub start_time: Instant,

    /// When the run ended (set on completion)
    pub end_time: Option<Instant>,

    // === Rendering ===
    /// Channel events scheduled
    pub events: u64,

    /// PCM samples rendered across both signal tracks
    pub samples_rendered: u64,

    /// Hardware frames emitted across both tracks
    pub frames_emitted: u64,

    // === Line ===
    /// Runs replaced by silence
    pub runs_dropped: u64,

    /// Runs with altered length
    pub runs_jittered: u64,

    // === Decoding ===
    /// Bits recovered by the decoder
    pub bits_decoded: u64,

    /// Runs the decoder could not classify
    pub decode_errors: u64,

    /// Bits accepted outside the strict windows
    pub marginal_bits: u64,

    /// Frames extracted after sync
    pub frames_synced: u64,

    /// Synced frames with a set blank bit
    pub blank_violations: u64,

    // === Container ===
    /// Entries in the signal-code array
    pub signal_codes: u64,

    /// Serialized container size
    pub container_bytes: u64,
}

impl Metrics {
    /// Create new metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            events: 0,
            samples_rendered: 0,
            frames_emitted: 0,
            runs_dropped: 0,
            runs_jittered: 0,
            bits_decoded: 0,
            decode_errors: 0,
            marginal_bits: 0,
            frames_synced: 0,
            blank_violations: 0,
            signal_codes: 0,
            container_bytes: 0,
        }
    }

    /// Mark the run as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Total duration (or current elapsed if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    pub fn record_render(&mut self, events: usize, show: &RenderedShow) {
        self.events += events as u64;
        self.samples_rendered += (show.td.samples.len() + show.bd.samples.len()) as u64;
        self.frames_emitted += show.frame_count() as u64;
    }

    pub fn record_impairment(&mut self, stats: &ImpairmentStats) {
        self.runs_dropped += stats.runs_dropped;
        self.runs_jittered += stats.runs_jittered;
    }

    pub fn record_track(&mut self, report: &TrackReport) {
        self.bits_decoded += report.bits as u64;
        self.decode_errors += report.errors as u64;
        self.marginal_bits += report.marginal as u64;
        self.frames_synced += report.sync.frames.len() as u64;
        self.blank_violations += report.sync.frames.iter().filter(|f| !f.blank_ok).count() as u64;
    }

    pub fn record_report(&mut self, report: &ConformanceReport) {
        for track in &report.tracks {
            self.record_track(track);
        }
    }

    pub fn record_container(&mut self, container: &ShowContainer, serialized_len: usize) {
        self.signal_codes += container.signal_codes.len() as u64;
        self.container_bytes += serialized_len as u64;
    }

    /// Decode errors over all classified runs.
    pub fn error_rate(&self) -> f64 {
        let total = self.bits_decoded + self.decode_errors;
        if total == 0 {
            0.0
        } else {
            self.decode_errors as f64 / total as f64
        }
    }

    /// Rendered samples per second of wall time.
    pub fn samples_per_second(&self) -> f64 {
        let duration_secs = self.duration().as_secs_f64();
        if duration_secs == 0.0 {
            0.0
        } else {
            self.samples_rendered as f64 / duration_secs
        }
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===");
        println!("Duration: {} ms", self.duration().as_millis());
        println!();

        println!("=== Rendering ===");
        println!("Events: {}", self.events);
        println!("Frames emitted: {}", self.frames_emitted);
        println!("Samples rendered: {}", self.samples_rendered);
        println!();

        if self.runs_dropped > 0 || self.runs_jittered > 0 {
            println!("=== Line ===");
            println!("Runs dropped: {}", self.runs_dropped);
            println!("Runs jittered: {}", self.runs_jittered);
            println!();
        }

        println!("=== Decoding ===");
        println!("Bits decoded: {}", self.bits_decoded);
        println!("Decode errors: {} ({:.2}%)", self.decode_errors, self.error_rate() * 100.0);
        println!("Marginal bits: {}", self.marginal_bits);
        println!("Frames synced: {}", self.frames_synced);
        println!("Blank violations: {}", self.blank_violations);
        println!();

        if self.container_bytes > 0 {
            println!("=== Container ===");
            println!("Signal codes: {}", self.signal_codes);
            println!("Container: {} bytes", self.container_bytes);
            println!();
        }

        println!("=== Performance ===");
        println!("Render rate: {:.2} Msamples/s", self.samples_per_second() / 1_000_000.0);
        println!();
    }

    /// Export metrics as `key=value` lines.
    pub fn export_text(&self) -> String {
        format!(
            "duration_ms={}\n\
             events={}\n\
             samples_rendered={}\n\
             frames_emitted={}\n\
             runs_dropped={}\n\
             runs_jittered={}\n\
             bits_decoded={}\n\
             decode_errors={}\n\
             error_rate={:.4}\n\
             marginal_bits={}\n\
             frames_synced={}\n\
             blank_violations={}\n\
             signal_codes={}\n\
             container_bytes={}\n",
            self.duration().as_millis(),
            self.events,
            self.samples_rendered,
            self.frames_emitted,
            self.runs_dropped,
            self.runs_jittered,
            self.bits_decoded,
            self.decode_errors,
            self.error_rate(),
            self.marginal_bits,
            self.frames_synced,
            self.blank_violations,
            self.signal_codes,
            self.container_bytes,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
