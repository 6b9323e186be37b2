//! Error types for the showtape system.
//!
//! Only structural failures are errors here. Codec-level problems (runs that
//! fall outside the tolerance windows, a stream that never reaches frame
//! lock) are diagnostic data and are returned alongside the results instead,
//! see [`crate::decoder::DecodeError`] and [`crate::sync::SyncResult`].

use thiserror::Error;

/// Top-level error type for all fallible operations.
///
/// Each variant corresponds to a specific failure domain:
/// - Configuration: bad channel names, writes to reserved bits, bad tracks
/// - Container format: malformed WAV input or malformed show container
/// - I/O: file system operations at the edges
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid channel, track or event supplied by the caller
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// WAV or show container could not be read or written
    #[error("container format error: {0}")]
    ContainerFormat(#[from] ContainerFormatError),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-side configuration mistakes. Always fatal to the triggering call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Channel name is not present in the track's channel map
    #[error("unknown {track} channel: {name:?}")]
    UnknownChannel { track: &'static str, name: String },

    /// Channel name is not present in either channel map
    #[error("channel {0:?} is not mapped on any track")]
    UnmappedChannel(String),

    /// Write to a blank (reserved) bit position
    #[error("bit {bit} is a blank/reserved slot in the {track} frame and must remain 0")]
    BlankBit { track: &'static str, bit: usize },

    /// Track identifier is neither TD nor BD
    #[error("unknown track {0:?}: expected TD or BD")]
    UnknownTrack(String),

    /// Event timestamp is negative or not a finite number
    #[error("invalid event time {time} for channel {channel:?}")]
    InvalidEventTime { time: f64, channel: String },

    /// Show duration is negative, not finite, or longer than a track can hold
    #[error("invalid show duration {seconds} s (must be between 0 and {max} s)")]
    InvalidDuration { seconds: f64, max: f64 },

    /// Acceptance threshold outside its meaningful range
    #[error("invalid threshold {name} = {value}: {expected}")]
    InvalidThreshold {
        name: &'static str,
        value: String,
        expected: String,
    },
}

/// Malformed input or output containers. Always fatal.
#[derive(Debug, Error)]
pub enum ContainerFormatError {
    /// WAV parsing or writing failed
    #[error("WAV: {0}")]
    Wav(#[from] WavError),

    /// Show container (binary object graph) parsing failed
    #[error("show container: {0}")]
    Nrbf(#[from] NrbfError),
}

/// WAV container errors.
#[derive(Debug, Error)]
pub enum WavError {
    /// The underlying reader rejected the file (missing chunk, bad header...)
    #[error("malformed WAV: {0}")]
    Malformed(String),

    /// Sample format the codec cannot normalize
    #[error("unsupported bit depth: {bits} bits ({format})")]
    UnsupportedBitDepth { bits: u16, format: &'static str },

    /// Channel layout does not match what the operation needs
    #[error("expected {expected} channels, got {actual}")]
    ChannelCount { expected: &'static str, actual: u16 },

    /// Channels passed to the writer have different lengths
    #[error("channel {channel} has {actual} samples, expected {expected}")]
    ChannelLength {
        channel: usize,
        expected: usize,
        actual: usize,
    },
}

impl From<hound::Error> for WavError {
    fn from(err: hound::Error) -> Self {
        WavError::Malformed(err.to_string())
    }
}

/// Show container parsing errors.
#[derive(Debug, Error, PartialEq)]
pub enum NrbfError {
    /// Ran out of bytes in the middle of a record
    #[error("unexpected end of data at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    /// Record tag not valid at this point in the stream
    #[error("unexpected record tag {tag:#04x} at offset {offset} (expected {expected})")]
    UnexpectedRecord {
        tag: u8,
        offset: usize,
        expected: &'static str,
    },

    /// Length prefix of a string is malformed or too long
    #[error("invalid string length prefix at offset {offset}")]
    InvalidLengthPrefix { offset: usize },

    /// String bytes are not valid UTF-8
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Class descriptor does not describe the show object
    #[error("unexpected class layout: {0}")]
    ClassLayout(String),

    /// Array length field is negative
    #[error("negative array length {length} for object {object_id}")]
    NegativeLength { object_id: i32, length: i32 },

    /// Array is too long for the format's 32-bit length field
    #[error("array object {object_id} has {length} elements, more than the format can hold")]
    ArrayTooLong { object_id: i32, length: usize },

    /// Array record does not match any member reference
    #[error("array object {object_id} is not referenced by any member")]
    UnknownObject { object_id: i32 },

    /// A referenced array never appeared before the end marker
    #[error("member {member} references object {object_id} which was never written")]
    MissingObject { member: &'static str, object_id: i32 },

    /// Bytes remain after the end marker
    #[error("{count} trailing bytes after message end")]
    TrailingBytes { count: usize },

    /// Signal code outside 0..=300 or before the first frame delimiter
    #[error("invalid signal code {value} at index {index}")]
    InvalidSignalCode { index: usize, value: i32 },
}

impl From<WavError> for Error {
    fn from(err: WavError) -> Self {
        Error::ContainerFormat(err.into())
    }
}

impl From<NrbfError> for Error {
    fn from(err: NrbfError) -> Self {
        Error::ContainerFormat(err.into())
    }
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
