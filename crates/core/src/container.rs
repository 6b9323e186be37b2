//! Show container serialization and parsing.
//!
//! The playback engine loads shows as a serialized object graph in the .NET
//! binary remoting format. Only one graph shape is ever produced: a single
//! `rshwFormat` object with three array members.
//!
//! # Record Sequence
//!
//! ```text
//! +---------------------------------------------+
//! | 0x00 SerializedStreamHeader                 |  rootId=1 headerId=-1 v1.0
//! +---------------------------------------------+
//! | 0x0C BinaryLibrary                          |  id=2, "Assembly-CSharp, ..."
//! +---------------------------------------------+
//! | 0x05 ClassWithMembersAndTypes               |  id=1, "rshwFormat", 3 members
//! |      member names                           |  <audioData>k__BackingField ...
//! |      binary types   7, 7, 7                 |  primitive arrays
//! |      primitive types 2, 8, 2                |  byte[], int[], byte[]
//! |      library id 2                           |
//! +---------------------------------------------+
//! | 0x09 MemberReference -> 3                   |  audioData
//! | 0x09 MemberReference -> 4                   |  signalData
//! | 0x0A ObjectNull                             |  videoData
//! +---------------------------------------------+
//! | 0x0F ArraySinglePrimitive id=3 byte[]       |  audio WAV bytes
//! | 0x0F ArraySinglePrimitive id=4 int[]        |  signal codes, i32 LE
//! +---------------------------------------------+
//! | 0x0B MessageEnd                             |
//! +---------------------------------------------+
//! ```
//!
//! The parser accepts exactly this shape (video may also be a byte array
//! reference) and reports every deviation as an [`NrbfError`].

use tracing::debug;

use crate::byteio::{ByteReader, ByteWriter};
use crate::error::{NrbfError, Result};

const RECORD_STREAM_HEADER: u8 = 0x00;
const RECORD_CLASS_WITH_MEMBERS_AND_TYPES: u8 = 0x05;
const RECORD_MEMBER_REFERENCE: u8 = 0x09;
const RECORD_OBJECT_NULL: u8 = 0x0A;
const RECORD_MESSAGE_END: u8 = 0x0B;
const RECORD_BINARY_LIBRARY: u8 = 0x0C;
const RECORD_ARRAY_SINGLE_PRIMITIVE: u8 = 0x0F;

const BINARY_TYPE_PRIMITIVE_ARRAY: u8 = 7;
const PRIMITIVE_BYTE: u8 = 2;
const PRIMITIVE_INT32: u8 = 8;

const ROOT_ID: i32 = 1;
const HEADER_ID: i32 = -1;
const LIBRARY_ID: i32 = 2;
const AUDIO_ID: i32 = 3;
const SIGNAL_ID: i32 = 4;
const VIDEO_ID: i32 = 5;

/// Assembly that owns the show class in the playback engine.
pub const LIBRARY_NAME: &str = "Assembly-CSharp, Version=0.0.0.0, Culture=neutral, PublicKeyToken=null";

/// Class name of the show object.
pub const CLASS_NAME: &str = "rshwFormat";

/// (member name, primitive element type), in record order.
const MEMBERS: [(&str, u8); 3] = [
    ("<audioData>k__BackingField", PRIMITIVE_BYTE),
    ("<signalData>k__BackingField", PRIMITIVE_INT32),
    ("<videoData>k__BackingField", PRIMITIVE_BYTE),
];

/// Contents of a show file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowContainer {
    /// Stereo 16-bit WAV file bytes
    pub audio: Vec<u8>,
    /// Flat 60 Hz signal-code array
    pub signal_codes: Vec<i32>,
    /// Video payload; always absent in produced shows
    pub video: Option<Vec<u8>>,
}

impl ShowContainer {
    pub fn new(audio: Vec<u8>, signal_codes: Vec<i32>) -> Self {
        Self {
            audio,
            signal_codes,
            video: None,
        }
    }

    /// Serialize into container bytes.
    ///
    /// # Errors
    /// `ArrayTooLong` if any array exceeds the format's `i32` length field.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let video_len = self.video.as_ref().map_or(0, |video| video.len() + 10);
        let mut writer =
            ByteWriter::with_capacity(256 + self.audio.len() + self.signal_codes.len() * 4 + video_len);

        writer.write_u8(RECORD_STREAM_HEADER);
        writer.write_i32(ROOT_ID);
        writer.write_i32(HEADER_ID);
        writer.write_i32(1);
        writer.write_i32(0);

        writer.write_u8(RECORD_BINARY_LIBRARY);
        writer.write_i32(LIBRARY_ID);
        writer.write_string(LIBRARY_NAME);

        writer.write_u8(RECORD_CLASS_WITH_MEMBERS_AND_TYPES);
        writer.write_i32(ROOT_ID);
        writer.write_string(CLASS_NAME);
        writer.write_i32(MEMBERS.len() as i32);
        for (name, _) in MEMBERS {
            writer.write_string(name);
        }
        for _ in MEMBERS {
            writer.write_u8(BINARY_TYPE_PRIMITIVE_ARRAY);
        }
        for (_, primitive) in MEMBERS {
            writer.write_u8(primitive);
        }
        writer.write_i32(LIBRARY_ID);

        writer.write_u8(RECORD_MEMBER_REFERENCE);
        writer.write_i32(AUDIO_ID);
        writer.write_u8(RECORD_MEMBER_REFERENCE);
        writer.write_i32(SIGNAL_ID);
        match self.video {
            Some(_) => {
                writer.write_u8(RECORD_MEMBER_REFERENCE);
                writer.write_i32(VIDEO_ID);
            }
            None => writer.write_u8(RECORD_OBJECT_NULL),
        }

        write_array_header(&mut writer, AUDIO_ID, self.audio.len(), PRIMITIVE_BYTE)?;
        writer.write_bytes(&self.audio);

        write_array_header(&mut writer, SIGNAL_ID, self.signal_codes.len(), PRIMITIVE_INT32)?;
        for &code in &self.signal_codes {
            writer.write_i32(code);
        }

        if let Some(video) = &self.video {
            write_array_header(&mut writer, VIDEO_ID, video.len(), PRIMITIVE_BYTE)?;
            writer.write_bytes(video);
        }

        writer.write_u8(RECORD_MESSAGE_END);

        debug!(
            audio_bytes = self.audio.len(),
            signal_codes = self.signal_codes.len(),
            total_bytes = writer.len(),
            "serialized show container"
        );
        Ok(writer.finish())
    }

    /// Parse container bytes.
    ///
    /// # Errors
    /// `NrbfError` (wrapped in `ContainerFormatError`) for a wrong record
    /// order, truncated data, a different class layout, dangling or unknown
    /// object ids, or bytes after the end marker.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Parser::new(bytes).parse()?)
    }
}

fn write_array_header(
    writer: &mut ByteWriter,
    object_id: i32,
    length: usize,
    primitive: u8,
) -> std::result::Result<(), NrbfError> {
    let length = array_length(object_id, length)?;
    writer.write_u8(RECORD_ARRAY_SINGLE_PRIMITIVE);
    writer.write_i32(object_id);
    writer.write_i32(length);
    writer.write_u8(primitive);
    Ok(())
}

fn array_length(object_id: i32, length: usize) -> std::result::Result<i32, NrbfError> {
    i32::try_from(length).map_err(|_| NrbfError::ArrayTooLong { object_id, length })
}

/// Member value slot: reference to an array record, or null.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Null,
    Reference(i32),
}

/// Decoded array payload.
enum ArrayData {
    Bytes(Vec<u8>),
    Ints(Vec<i32>),
}

struct Parser<'a> {
    reader: ByteReader<'a>,
}

impl<'a> Parser<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes),
        }
    }

    fn expect_tag(&mut self, tag: u8, expected: &'static str) -> std::result::Result<(), NrbfError> {
        let offset = self.reader.position();
        let found = self.reader.read_u8()?;
        if found != tag {
            return Err(NrbfError::UnexpectedRecord {
                tag: found,
                offset,
                expected,
            });
        }
        Ok(())
    }

    fn parse(mut self) -> std::result::Result<ShowContainer, NrbfError> {
        self.expect_tag(RECORD_STREAM_HEADER, "SerializedStreamHeader")?;
        let root_id = self.reader.read_i32()?;
        let _header_id = self.reader.read_i32()?;
        let major = self.reader.read_i32()?;
        let minor = self.reader.read_i32()?;
        if (major, minor) != (1, 0) {
            return Err(NrbfError::ClassLayout(format!(
                "unsupported stream version {major}.{minor}"
            )));
        }

        self.expect_tag(RECORD_BINARY_LIBRARY, "BinaryLibrary")?;
        let library_id = self.reader.read_i32()?;
        let _library_name = self.reader.read_string()?;

        self.expect_tag(RECORD_CLASS_WITH_MEMBERS_AND_TYPES, "ClassWithMembersAndTypes")?;
        self.parse_class(root_id, library_id)?;

        let mut slots = [Slot::Null; 3];
        for slot in &mut slots {
            *slot = self.parse_member_value()?;
        }

        let mut arrays: [Option<ArrayData>; 3] = [None, None, None];
        loop {
            let offset = self.reader.position();
            match self.reader.read_u8()? {
                RECORD_MESSAGE_END => break,
                RECORD_ARRAY_SINGLE_PRIMITIVE => {
                    let object_id = self.reader.read_i32()?;
                    let member = slots
                        .iter()
                        .position(|slot| *slot == Slot::Reference(object_id))
                        .ok_or(NrbfError::UnknownObject { object_id })?;
                    arrays[member] = Some(self.parse_array(object_id, MEMBERS[member])?);
                }
                tag => {
                    return Err(NrbfError::UnexpectedRecord {
                        tag,
                        offset,
                        expected: "ArraySinglePrimitive or MessageEnd",
                    })
                }
            }
        }

        if !self.reader.is_empty() {
            return Err(NrbfError::TrailingBytes {
                count: self.reader.remaining(),
            });
        }

        let [audio, signal, video] = arrays;
        let audio = match (slots[0], audio) {
            (_, Some(ArrayData::Bytes(bytes))) => bytes,
            (Slot::Reference(object_id), _) => {
                return Err(NrbfError::MissingObject {
                    member: "audioData",
                    object_id,
                })
            }
            (Slot::Null, _) => Vec::new(),
        };
        let signal_codes = match (slots[1], signal) {
            (_, Some(ArrayData::Ints(codes))) => codes,
            (Slot::Reference(object_id), _) => {
                return Err(NrbfError::MissingObject {
                    member: "signalData",
                    object_id,
                })
            }
            (Slot::Null, _) => Vec::new(),
        };
        let video = match (slots[2], video) {
            (_, Some(ArrayData::Bytes(bytes))) => Some(bytes),
            (Slot::Reference(object_id), _) => {
                return Err(NrbfError::MissingObject {
                    member: "videoData",
                    object_id,
                })
            }
            (Slot::Null, _) => None,
        };

        debug!(
            audio_bytes = audio.len(),
            signal_codes = signal_codes.len(),
            "parsed show container"
        );

        Ok(ShowContainer {
            audio,
            signal_codes,
            video,
        })
    }

    fn parse_class(&mut self, root_id: i32, library_id: i32) -> std::result::Result<(), NrbfError> {
        let object_id = self.reader.read_i32()?;
        if object_id != root_id {
            return Err(NrbfError::ClassLayout(format!(
                "class object id {object_id} is not the root id {root_id}"
            )));
        }

        let name = self.reader.read_string()?;
        if name != CLASS_NAME {
            return Err(NrbfError::ClassLayout(format!("unexpected class {name:?}")));
        }

        let count = self.reader.read_i32()?;
        if count != MEMBERS.len() as i32 {
            return Err(NrbfError::ClassLayout(format!(
                "expected {} members, found {count}",
                MEMBERS.len()
            )));
        }

        for (expected, _) in MEMBERS {
            let member = self.reader.read_string()?;
            if member != expected {
                return Err(NrbfError::ClassLayout(format!(
                    "expected member {expected:?}, found {member:?}"
                )));
            }
        }

        let binary_types = self.reader.read_bytes(MEMBERS.len())?;
        if binary_types.iter().any(|&t| t != BINARY_TYPE_PRIMITIVE_ARRAY) {
            return Err(NrbfError::ClassLayout(format!(
                "members must be primitive arrays, found binary types {binary_types:?}"
            )));
        }

        let primitives = self.reader.read_bytes(MEMBERS.len())?;
        for ((name, expected), &found) in MEMBERS.iter().zip(primitives) {
            if found != *expected {
                return Err(NrbfError::ClassLayout(format!(
                    "member {name} has primitive type {found}, expected {expected}"
                )));
            }
        }

        let class_library = self.reader.read_i32()?;
        if class_library != library_id {
            return Err(NrbfError::ClassLayout(format!(
                "class references library {class_library}, stream declares {library_id}"
            )));
        }

        Ok(())
    }

    fn parse_member_value(&mut self) -> std::result::Result<Slot, NrbfError> {
        let offset = self.reader.position();
        match self.reader.read_u8()? {
            RECORD_MEMBER_REFERENCE => Ok(Slot::Reference(self.reader.read_i32()?)),
            RECORD_OBJECT_NULL => Ok(Slot::Null),
            tag => Err(NrbfError::UnexpectedRecord {
                tag,
                offset,
                expected: "MemberReference or ObjectNull",
            }),
        }
    }

    fn parse_array(
        &mut self,
        object_id: i32,
        (member, declared): (&str, u8),
    ) -> std::result::Result<ArrayData, NrbfError> {
        let length = self.reader.read_i32()?;
        let count =
            usize::try_from(length).map_err(|_| NrbfError::NegativeLength { object_id, length })?;

        let primitive = self.reader.read_u8()?;
        if primitive != declared {
            return Err(NrbfError::ClassLayout(format!(
                "array {object_id} for {member} has element type {primitive}, expected {declared}"
            )));
        }

        match primitive {
            PRIMITIVE_INT32 => {
                let raw = self.reader.read_bytes(count.saturating_mul(4))?;
                Ok(ArrayData::Ints(
                    raw.chunks_exact(4)
                        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                        .collect(),
                ))
            }
            _ => Ok(ArrayData::Bytes(self.reader.read_bytes(count)?.to_vec())),
        }
    }
}
