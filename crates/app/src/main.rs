//! showtape: render, convert and verify animatronic show tapes.
//!
//! Subcommands:
//! - `render`: event list -> 4-channel show WAV (and optionally a container)
//! - `convert`: 4-channel show WAV -> show container
//! - `simulate`: run a recording through the hardware conformance check
//! - `inspect`: summarize a show container
//! - `demo`: random show -> render -> impaired line -> simulate -> metrics

mod config;
mod input_gen;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use showtape_core::channels::Track;
use showtape_core::conformance::{ConformanceReport, TrackReport};
use showtape_core::container::ShowContainer;
use showtape_core::impairment::LineImpairment;
use showtape_core::metrics::Metrics;
use showtape_core::scheduler::duration_samples;
use showtape_core::show::{self, RenderedShow};
use showtape_core::signal::decode_signal_codes;
use showtape_core::timing::SIGNAL_FPS;
use showtape_core::wav::{self, WavData};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{CodecConfig, Overrides};

const DEFAULT_LOG_FILTER: &str = "showtape=info,showtape_core=info";

#[derive(Parser, Debug)]
#[command(name = "showtape", version)]
#[command(about = "Render, convert and verify animatronic control-signal show tapes")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the resolved configuration before running
    #[arg(long, global = true)]
    print_config: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule events into a 4-channel show WAV
    Render {
        /// JSON array of {time_seconds, channel, active[, track]}
        #[arg(long, value_name = "FILE")]
        events: PathBuf,

        /// Show length in seconds
        #[arg(long)]
        duration: f64,

        /// Output WAV (music L, music R, TD, BD)
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        /// Music WAV for the first two channels (default: silence)
        #[arg(long, value_name = "FILE")]
        music: Option<PathBuf>,

        /// Also write a show container built from the scheduled frames
        #[arg(long, value_name = "FILE")]
        rshw: Option<PathBuf>,
    },

    /// Convert a 4-channel show WAV into a show container
    Convert {
        /// Input WAV (music L, music R, TD, BD)
        wav: PathBuf,

        /// Output container
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Check a recording against the hardware acceptance limits
    Simulate {
        /// 4-channel show WAV or 2-channel (TD, BD) recording
        wav: PathBuf,

        /// Tracks to check
        #[arg(long, value_enum, default_value_t = TrackChoice::Both)]
        track: TrackChoice,

        /// Print every synced frame
        #[arg(long)]
        dump_frames: bool,
    },

    /// Summarize a show container
    Inspect {
        rshw: PathBuf,

        /// Print the first N 60 Hz frames
        #[arg(long, value_name = "N")]
        frames: Option<usize>,
    },

    /// Generate a random show and run it through an impaired line
    Demo {
        /// Random seed (default: config file seed, else time-based)
        #[arg(long)]
        seed: Option<u64>,

        /// Show length in seconds
        #[arg(long, default_value_t = 10.0)]
        duration: f64,

        /// Run-length jitter in samples (±)
        #[arg(long, value_name = "SAMPLES")]
        jitter: Option<usize>,

        /// Probability of a run dropping out
        #[arg(long, value_name = "RATE")]
        dropout: Option<f64>,

        /// Write the generated events here
        #[arg(long, value_name = "FILE")]
        events_out: Option<PathBuf>,

        /// Write the impaired 4-channel WAV here
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Print metrics as key=value lines instead of the summary
        #[arg(long)]
        metrics_text: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TrackChoice {
    Td,
    Bd,
    Both,
}

impl TrackChoice {
    fn tracks(self) -> &'static [Track] {
        match self {
            TrackChoice::Td => &[Track::Td],
            TrackChoice::Bd => &[Track::Bd],
            TrackChoice::Both => &Track::ALL,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = CodecConfig::load(cli.config.as_deref())?;
    config.apply(&cli.overrides)?;

    if cli.print_config {
        config.print();
        println!("# Resolved configuration (usable with --config)");
        println!("{}", config.to_toml()?);
    }

    let Some(command) = cli.command else {
        if !cli.print_config {
            Cli::command().print_help()?;
        }
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Command::Render {
            events,
            duration,
            out,
            music,
            rshw,
        } => render(&events, duration, &out, music.as_deref(), rshw.as_deref()),
        Command::Convert { wav, out } => convert(&wav, &out),
        Command::Simulate {
            wav,
            track,
            dump_frames,
        } => simulate(&config, &wav, track, dump_frames),
        Command::Inspect { rshw, frames } => inspect(&rshw, frames),
        Command::Demo {
            seed,
            duration,
            jitter,
            dropout,
            events_out,
            out,
            metrics_text,
        } => {
            if let Some(jitter) = jitter {
                config.impairment.jitter_samples = jitter;
            }
            if let Some(dropout) = dropout {
                anyhow::ensure!(
                    (0.0..=1.0).contains(&dropout),
                    "--dropout must be between 0 and 1, got {dropout}"
                );
                config.impairment.dropout_rate = dropout;
            }
            match seed {
                Some(seed) => config.impairment.seed = seed,
                None if cli.config.is_none() => config.impairment.seed = time_seed(),
                None => {}
            }
            demo(&config, duration, events_out.as_deref(), out.as_deref(), metrics_text)
        }
    }
}

fn time_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_millis() as u64)
        .unwrap_or_default()
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn read_music(path: Option<&Path>) -> Result<Option<WavData>> {
    path.map(|path| {
        let bytes = read_file(path)?;
        wav::parse_wav(&bytes).with_context(|| format!("parsing music {}", path.display()))
    })
    .transpose()
}

fn render(
    events_path: &Path,
    duration: f64,
    out: &Path,
    music: Option<&Path>,
    rshw: Option<&Path>,
) -> Result<ExitCode> {
    duration_samples(duration).context("--duration")?;
    let events = input_gen::load_events(events_path)?;
    let music = read_music(music)?;

    let rendered = show::render_show(&events, duration).context("scheduling events")?;
    let bytes = show::write_show_wav(&rendered, music.as_ref())?;
    write_file(out, &bytes)?;
    info!(path = %out.display(), bytes = bytes.len(), "wrote show WAV");

    if let Some(rshw) = rshw {
        let container = show::show_from_rendered(&rendered, music.as_ref())?;
        write_file(rshw, &container.serialize()?)?;
        info!(path = %rshw.display(), codes = container.signal_codes.len(), "wrote show container");
    }

    print_render_summary(&events, &rendered);
    Ok(ExitCode::SUCCESS)
}

fn print_render_summary(events: &[showtape_core::scheduler::ChannelEvent], rendered: &RenderedShow) {
    println!("=== Render ===");
    println!("Events: {}", events.len());
    for track in Track::ALL {
        let rendered = rendered.track(track);
        println!(
            "{}: {} frames, {} samples ({:.3} s)",
            track,
            rendered.frames.len(),
            rendered.samples.len(),
            rendered.duration_seconds()
        );
    }
}

fn convert(wav_path: &Path, out: &Path) -> Result<ExitCode> {
    let bytes = read_file(wav_path)?;
    let container = show::convert_4ch_wav(&bytes)
        .with_context(|| format!("converting {}", wav_path.display()))?;
    let serialized = container.serialize()?;
    write_file(out, &serialized)?;

    println!("=== Convert ===");
    println!("Audio: {} bytes", container.audio.len());
    println!("Signal codes: {}", container.signal_codes.len());
    println!("Container: {} bytes -> {}", serialized.len(), out.display());
    Ok(ExitCode::SUCCESS)
}

fn simulate(config: &CodecConfig, wav_path: &Path, track: TrackChoice, dump_frames: bool) -> Result<ExitCode> {
    let bytes = read_file(wav_path)?;
    let wav = wav::parse_wav(&bytes).with_context(|| format!("reading {}", wav_path.display()))?;
    let simulator = config.simulator();
    let report = simulator
        .simulate_wav_data(&wav, track.tracks())
        .with_context(|| format!("simulating {}", wav_path.display()))?;

    println!("=== Decoder ===");
    println!("{}", simulator.decoder_for(wav.sample_rate).tolerance_summary());
    println!();
    print_report(&report, dump_frames);

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &ConformanceReport, dump_frames: bool) {
    for track in &report.tracks {
        print_track(track, dump_frames);
    }

    println!("=== Verdict: {} ===", report.verdict);
    for reason in &report.reasons {
        println!("  - {reason}");
    }
}

fn print_track(report: &TrackReport, dump_frames: bool) {
    match report.channel_index {
        Some(index) => println!("=== {} (channel {}) ===", report.track, index),
        None => println!("=== {} ===", report.track),
    }
    println!("Bits decoded: {}", report.bits);
    println!("Decode errors: {} ({:.2}%)", report.errors, report.error_rate() * 100.0);
    println!("Marginal bits: {}", report.marginal);
    for error in &report.first_errors {
        println!("  {error}");
    }

    let sync = &report.sync;
    if sync.locked {
        println!("Lock: offset {} (score {}, {} orphan bits)", sync.lock_offset, sync.score, sync.orphan_bits);
    } else {
        println!("Lock: NONE (best score {})", sync.score);
    }
    println!("Frames: {}", sync.frames.len());
    println!("Blank integrity: {:.1}%", report.blank_ok_rate() * 100.0);

    if !report.timeline.is_empty() {
        println!("Active channels:");
        for (channel, intervals) in &report.timeline {
            let held: f64 = intervals.iter().map(|i| i.off - i.on).sum();
            println!("  {channel:<32} {:>4} cues, {:>8.3} s", intervals.len(), held);
        }
    }

    if dump_frames {
        for frame in &sync.frames {
            println!(
                "  [{:>5}] bit {:>7} {} {}",
                frame.frame_index,
                frame.bit_offset,
                if frame.blank_ok { "ok " } else { "BAD" },
                frame.active_channels.join(",")
            );
        }
    }
    println!();
}

fn inspect(path: &Path, dump: Option<usize>) -> Result<ExitCode> {
    let bytes = read_file(path)?;
    let container = ShowContainer::parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    let frames = decode_signal_codes(&container.signal_codes)?;

    println!("=== Container ===");
    println!("Size: {} bytes", bytes.len());
    match wav::parse_wav(&container.audio) {
        Ok(audio) => println!(
            "Audio: {} channels, {} Hz, {:.3} s",
            audio.channel_count(),
            audio.sample_rate,
            audio.duration_seconds()
        ),
        Err(err) => {
            warn!(%err, "audio payload is not a readable WAV");
            println!("Audio: {} bytes (unreadable: {err})", container.audio.len());
        }
    }
    match &container.video {
        Some(video) => println!("Video: {} bytes", video.len()),
        None => println!("Video: none"),
    }
    println!("Signal codes: {}", container.signal_codes.len());
    println!(
        "Signal frames: {} ({:.3} s at {} Hz)",
        frames.len(),
        frames.len() as f64 / f64::from(SIGNAL_FPS),
        SIGNAL_FPS
    );
    println!();

    for track in Track::ALL {
        let map = track.channel_map();
        let mut usage: BTreeMap<&'static str, usize> = BTreeMap::new();
        for frame in &frames {
            let bits = match track {
                Track::Td => &frame.td_bits,
                Track::Bd => &frame.bd_bits,
            };
            for &bit in bits {
                *usage.entry(map.name_at(bit).unwrap_or("(blank)")).or_default() += 1;
            }
        }

        let mut busiest: Vec<_> = usage.into_iter().collect();
        busiest.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        println!("=== {} ({} channels used) ===", track, busiest.len());
        for (name, count) in busiest.iter().take(10) {
            println!("  {name:<32} {count:>6} frames");
        }
        println!();
    }

    if let Some(count) = dump {
        for (index, frame) in frames.iter().take(count).enumerate() {
            println!("  [{index:>5}] TD {:?} BD {:?}", frame.td_bits, frame.bd_bits);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn demo(
    config: &CodecConfig,
    duration: f64,
    events_out: Option<&Path>,
    out: Option<&Path>,
    metrics_text: bool,
) -> Result<ExitCode> {
    duration_samples(duration).context("--duration")?;
    let seed = config.impairment.seed;
    println!("=== Demo (seed {seed}) ===");

    let mut metrics = Metrics::new();

    let events = input_gen::generate_show(seed, duration);
    if let Some(path) = events_out {
        input_gen::write_events(path, &events)?;
    }

    let rendered = show::render_show(&events, duration)?;
    metrics.record_render(events.len(), &rendered);

    let mut line = LineImpairment::new(config.impairment);
    let td = line.apply(&rendered.td.samples);
    let bd = line.apply(&rendered.bd.samples);
    metrics.record_impairment(&line.stats());

    if let Some(path) = out {
        let length = td.len().max(bd.len());
        let silence = vec![0i16; length];
        let pad = |samples: &[i16]| {
            let mut padded = samples.to_vec();
            padded.resize(length, 0);
            padded
        };
        let bytes = wav::write_wav(
            &[&silence[..], &silence[..], &pad(&td)[..], &pad(&bd)[..]],
            showtape_core::timing::SAMPLE_RATE,
        )?;
        write_file(path, &bytes)?;
    }

    let report = config.simulator().simulate(&td, &bd);
    metrics.record_report(&report);

    let container = show::show_from_rendered(&rendered, None)?;
    let serialized = container.serialize()?;
    metrics.record_container(&container, serialized.len());
    metrics.complete();

    print_report(&report, false);
    if metrics_text {
        print!("{}", metrics.export_text());
    } else {
        metrics.print_summary();
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
