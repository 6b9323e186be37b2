//! Sample show generation and event files.
//!
//! When no event file is given, `demo` generates a random but valid show:
//! every event names a real, non-blank channel, every activation is later
//! released, and all times fall inside the show.
//!
//! # Design
//!
//! Generated shows mix:
//! - Mouth channels flapping quickly (short on/off pairs)
//! - Body movements held for a second or two
//! - Lights and curtains held for long stretches
//!
//! so both coalesced events and long steady runs show up in the metrics.

use std::path::Path;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use showtape_core::channels::Track;
use showtape_core::scheduler::ChannelEvent;

/// Generate a seeded random show lasting `duration_seconds`.
///
/// Events come back sorted by time; ties keep generation order.
pub fn generate_show(seed: u64, duration_seconds: f64) -> Vec<ChannelEvent> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut events = Vec::new();

    if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
        return events;
    }

    for track in Track::ALL {
        let channels = track.channel_map().channels();
        // Roughly one cue per channel every four seconds
        let cues = ((duration_seconds / 4.0) * channels.len() as f64).ceil() as usize;

        for _ in 0..cues {
            let (name, _) = channels[rng.gen_range(0..channels.len())];
            let hold = match hold_class(name) {
                Hold::Flap => rng.gen_range(0.03..0.25),
                Hold::Move => rng.gen_range(0.3..2.0),
                Hold::Long => rng.gen_range(2.0..10.0),
            };

            let on = rng.gen_range(0.0..duration_seconds);
            let off = (on + hold).min(duration_seconds);

            events.push(ChannelEvent {
                track: Some(track),
                ..ChannelEvent::new(on, name, true)
            });
            events.push(ChannelEvent {
                track: Some(track),
                ..ChannelEvent::new(off, name, false)
            });
        }
    }

    events.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));
    events
}

enum Hold {
    Flap,
    Move,
    Long,
}

fn hold_class(name: &str) -> Hold {
    if name.ends_with("mouth") || name.contains("eyelid") || name.ends_with("blink") {
        Hold::Flap
    } else if name.starts_with("spot") || name.starts_with("curtain") || name.contains("flood") {
        Hold::Long
    } else {
        Hold::Move
    }
}

/// Read a JSON array of events.
pub fn load_events(path: &Path) -> Result<Vec<ChannelEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing events {}", path.display()))
}

/// Write events as a pretty-printed JSON array.
pub fn write_events(path: &Path, events: &[ChannelEvent]) -> Result<()> {
    let text = serde_json::to_string_pretty(events)?;
    std::fs::write(path, text).with_context(|| format!("writing events {}", path.display()))
}
