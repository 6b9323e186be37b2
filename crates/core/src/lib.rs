//! showtape-core: control-track codec for animatronic show tapes
//!
//! Show controllers receive movement data as a biphase mark coded (BMC)
//! square wave carried on two audio channels, TD (94-bit frames) and BD
//! (96-bit frames). This library:
//! - Schedules timestamped channel events into continuous frame streams
//! - Encodes and decodes the line signal with tolerance windows
//! - Locks onto frame boundaries and reconstructs channel timelines
//! - Judges recordings against hardware acceptance limits
//! - Packs shows into the binary container the playback engine loads
//!
//! # Architecture
//!
//! - `timing`: Sample rate, baud rate and line levels
//! - `channels`: TD/BD channel maps and bit frames
//! - `encoder`: BMC line encoder
//! - `scheduler`: Event-driven frame scheduler
//! - `decoder`: Run-length BMC decoder
//! - `sync`: Frame synchronizer and channel timelines
//! - `conformance`: Hardware conformance simulator
//! - `wav`: WAV ingestion and writing
//! - `byteio`: Little-endian record I/O
//! - `container`: Show container serializer and reader
//! - `signal`: 60 Hz signal-code array
//! - `show`: End-to-end render, export and ingestion
//! - `impairment`: Seeded line impairment simulator
//! - `metrics`: Observable pipeline behavior
//!
//! # Design Principles
//!
//! - **No panics**: Structural failures are `Err`, codec failures are data
//! - **Integer timing**: Event and frame positions never accumulate float drift
//! - **Deterministic**: Seeded randomness makes impaired runs reproducible

pub mod byteio;
pub mod channels;
pub mod conformance;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod impairment;
pub mod metrics;
pub mod scheduler;
pub mod show;
pub mod signal;
pub mod sync;
pub mod timing;
pub mod wav;

// Re-export commonly used types
pub use channels::{ChannelMap, Track};
pub use error::{Error, Result};
