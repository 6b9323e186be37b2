//! Channel maps and bit frames for the two control tracks.
//!
//! Each track (TD, BD) transmits a fixed-width frame of bits, one bit per
//! actuator or light. Bit numbers are 1-based, matching the hardware bit
//! chart. A few positions are blank: reserved slots that must always read 0.
//! The synchronizer relies on them as its only structural anchor, so every
//! write path checks them.
//!
//! | Track | Frame bits | Blank bits (1-based) | Named channels |
//! |-------|------------|----------------------|----------------|
//! | TD    | 94         | 56, 65, 70           | 91             |
//! | BD    | 96         | 45                   | 95             |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// One of the two independent control tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Track {
    /// Top drawer, 94-bit frames
    Td,
    /// Bottom drawer, 96-bit frames
    Bd,
}

impl Track {
    /// Both tracks, in container order.
    pub const ALL: [Track; 2] = [Track::Td, Track::Bd];

    /// Static channel map for this track.
    pub fn channel_map(self) -> &'static ChannelMap {
        match self {
            Track::Td => &TD_MAP,
            Track::Bd => &BD_MAP,
        }
    }

    /// Short uppercase label ("TD" / "BD").
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Td => "TD",
            Track::Bd => "BD",
        }
    }

    /// Find the track that carries a channel name.
    ///
    /// Channel names are unique across both maps, so at most one matches.
    pub fn for_channel(name: &str) -> Result<Track, ConfigurationError> {
        Track::ALL
            .into_iter()
            .find(|track| track.channel_map().bit_of(name).is_some())
            .ok_or_else(|| ConfigurationError::UnmappedChannel(name.to_string()))
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TD" => Ok(Track::Td),
            "BD" => Ok(Track::Bd),
            _ => Err(ConfigurationError::UnknownTrack(s.to_string())),
        }
    }
}

/// Immutable name <-> bit table for one track.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelMap {
    track: Track,
    frame_bits: usize,
    /// 1-based blank bit numbers
    blank_bits: &'static [usize],
    /// (name, 1-based bit number)
    channels: &'static [(&'static str, usize)],
}

impl ChannelMap {
    /// Track this map belongs to.
    pub fn track(&self) -> Track {
        self.track
    }

    /// Frame width in bits, blanks included.
    pub fn frame_bits(&self) -> usize {
        self.frame_bits
    }

    /// 1-based blank bit numbers.
    pub fn blank_bits(&self) -> &'static [usize] {
        self.blank_bits
    }

    /// 0-based blank indices into a frame.
    pub fn blank_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.blank_bits.iter().map(|bit| bit - 1)
    }

    /// Whether a 1-based bit number is a blank slot.
    pub fn is_blank(&self, bit: usize) -> bool {
        self.blank_bits.contains(&bit)
    }

    /// All (name, 1-based bit) pairs in bit order.
    pub fn channels(&self) -> &'static [(&'static str, usize)] {
        self.channels
    }

    /// 1-based bit number for a channel name.
    pub fn bit_of(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .find(|(channel, _)| *channel == name)
            .map(|(_, bit)| *bit)
    }

    /// Channel name at a 1-based bit number (None for blanks and out of range).
    pub fn name_at(&self, bit: usize) -> Option<&'static str> {
        self.channels
            .iter()
            .find(|(_, b)| *b == bit)
            .map(|(name, _)| *name)
    }

    /// Resolve a channel name to a writable 0-based frame index.
    ///
    /// # Errors
    /// - `UnknownChannel` if the name is not in this map
    /// - `BlankBit` if the name resolves to a reserved position
    pub fn resolve(&self, name: &str) -> Result<usize, ConfigurationError> {
        let bit = self
            .bit_of(name)
            .ok_or_else(|| ConfigurationError::UnknownChannel {
                track: self.track.as_str(),
                name: name.to_string(),
            })?;

        if self.is_blank(bit) {
            return Err(ConfigurationError::BlankBit {
                track: self.track.as_str(),
                bit,
            });
        }

        Ok(bit - 1)
    }

    /// True if every blank index in `bits` is 0.
    ///
    /// `bits` must be at least `frame_bits` long.
    pub fn blanks_clear(&self, bits: &[u8]) -> bool {
        self.blank_indices().all(|index| bits[index] == 0)
    }

    /// Names of all channels set in a frame, in bit order.
    pub fn active_channels(&self, bits: &[u8]) -> Vec<&'static str> {
        bits.iter()
            .enumerate()
            .filter(|(_, &value)| value == 1)
            .filter_map(|(index, _)| self.name_at(index + 1))
            .collect()
    }
}

/// Fixed-width frame of 0/1 values owned by one scheduler.
///
/// # Invariants
/// - `bits.len() == map.frame_bits()`
/// - every blank index is 0
#[derive(Debug, Clone, PartialEq)]
pub struct BitFrame {
    map: &'static ChannelMap,
    bits: Vec<u8>,
}

impl BitFrame {
    /// All-zero frame for a track.
    pub fn new(track: Track) -> Self {
        let map = track.channel_map();
        Self {
            map,
            bits: vec![0; map.frame_bits()],
        }
    }

    /// Channel map this frame is validated against.
    pub fn map(&self) -> &'static ChannelMap {
        self.map
    }

    /// Set or clear a named channel.
    pub fn set(&mut self, name: &str, active: bool) -> Result<(), ConfigurationError> {
        let index = self.map.resolve(name)?;
        self.bits[index] = u8::from(active);
        Ok(())
    }

    /// Whether a named channel is currently set.
    pub fn is_set(&self, name: &str) -> Result<bool, ConfigurationError> {
        let index = self.map.resolve(name)?;
        Ok(self.bits[index] == 1)
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|bit| *bit = 0);
    }

    /// Raw bit values, index = bit number - 1.
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// Names of all set channels, in bit order.
    pub fn active_channels(&self) -> Vec<&'static str> {
        self.map.active_channels(&self.bits)
    }
}

static TD_MAP: ChannelMap = ChannelMap {
    track: Track::Td,
    frame_bits: 94,
    blank_bits: &[56, 65, 70],
    channels: &TD_CHANNELS,
};

static BD_MAP: ChannelMap = ChannelMap {
    track: Track::Bd,
    frame_bits: 96,
    blank_bits: &[45],
    channels: &BD_CHANNELS,
};

const TD_CHANNELS: [(&str, usize); 91] = [
    // Rolfe
    ("rolfe_mouth", 1),
    ("rolfe_left_eyelid", 2),
    ("rolfe_right_eyelid", 3),
    ("rolfe_eyes_left", 4),
    ("rolfe_eyes_right", 5),
    ("rolfe_head_left", 6),
    ("rolfe_head_right", 7),
    ("rolfe_head_up", 8),
    ("rolfe_left_ear", 9),
    ("rolfe_right_ear", 10),
    ("rolfe_left_arm_raise", 11),
    ("rolfe_left_arm_twist", 12),
    ("rolfe_left_elbow", 13),
    ("rolfe_body_twist_left", 14),
    ("rolfe_body_twist_right", 15),
    ("rolfe_body_lean", 16),
    ("rolfe_right_arm_raise", 17),
    ("rolfe_right_arm_twist", 18),
    ("rolfe_right_elbow_twist", 19),
    ("rolfe_earl_head_tilt", 20),
    // Duke
    ("duke_head_right", 21),
    ("duke_head_up", 22),
    ("duke_left_ear", 23),
    ("duke_right_ear", 24),
    ("duke_head_left", 25),
    ("duke_left_eyelid", 26),
    ("duke_right_eyelid", 27),
    ("duke_eyes_left", 28),
    ("duke_eyes_right", 29),
    ("duke_mouth", 30),
    ("duke_right_elbow", 31),
    ("duke_left_foot_hihat", 32),
    ("duke_left_arm_swing", 33),
    ("duke_right_arm_swing", 34),
    ("duke_left_elbow", 35),
    // Earl
    ("earl_mouth", 36),
    ("earl_eyebrow", 37),
    // Props
    ("props_sun_mouth", 38),
    ("props_sun_raise", 39),
    ("specials_dual_pressure_td", 40),
    // Fats
    ("fats_left_eyelid", 41),
    ("fats_right_eyelid", 42),
    ("fats_eyes_left", 43),
    ("fats_eyes_right", 44),
    ("fats_mouth", 45),
    ("props_moon_mouth", 46),
    ("props_moon_raise", 47),
    ("props_looney_bird_hands", 48),
    ("props_antioch_down", 49),
    ("props_baby_bear_raise", 50),
    ("fats_head_tip_left", 51),
    ("fats_head_tip_right", 52),
    ("fats_head_up", 53),
    ("fats_head_left", 54),
    ("fats_head_right", 55),
    // 56 blank
    ("fats_left_arm_swing", 57),
    ("fats_right_arm_swing", 58),
    ("fats_left_elbow", 59),
    ("fats_right_elbow", 60),
    ("fats_foot_tap", 61),
    ("fats_body_lean", 62),
    ("duke_right_foot_bass_drum", 63),
    ("duke_body_lean", 64),
    // 65 blank
    // Organ lights
    ("organ_top_blue", 66),
    ("organ_top_red", 67),
    ("organ_top_amber", 68),
    ("organ_top_green", 69),
    // 70 blank
    ("organ_leg_top", 71),
    ("organ_leg_mid", 72),
    ("organ_leg_bottom", 73),
    ("organ_cont_strobe", 74),
    ("organ_flash_strobe", 75),
    // Sign lights
    ("sign_inner", 76),
    ("sign_mid", 77),
    ("sign_outer", 78),
    ("sign_cont_strobe", 79),
    ("sign_flash_strobe", 80),
    // Spotlights
    ("spot_mitzi", 81),
    ("spot_beach_bear", 82),
    ("spot_looney_bird", 83),
    ("spot_billy_bob", 84),
    ("spot_fats", 85),
    ("spot_duke", 86),
    ("spot_rolfe", 87),
    ("spot_earl", 88),
    // Curtains
    ("curtain_stage_right_open", 89),
    ("curtain_stage_right_close", 90),
    ("curtain_center_stage_open", 91),
    ("curtain_center_stage_close", 92),
    ("curtain_stage_left_open", 93),
    ("curtain_stage_left_close", 94),
];

const BD_CHANNELS: [(&str, usize); 95] = [
    // Beach Bear
    ("beachbear_left_eyelid", 1),
    ("beachbear_right_eyelid", 2),
    ("beachbear_eye_cross", 3),
    ("beachbear_left_hand_slide", 4),
    ("beachbear_guitar_raise", 5),
    ("beachbear_head_left", 6),
    ("beachbear_head_right", 7),
    ("beachbear_head_up", 8),
    ("beachbear_left_leg_kick", 9),
    ("beachbear_right_leg_kick", 10),
    ("beachbear_right_arm_raise", 11),
    ("beachbear_right_arm_twist", 12),
    ("beachbear_right_elbow_twist", 13),
    ("beachbear_right_wrist", 14),
    ("beachbear_body_lean", 15),
    ("beachbear_mouth", 16),
    // Looney Bird / Mitzi
    ("looneybird_mouth", 17),
    ("mitzi_right_arm_raise", 18),
    ("mitzi_right_elbow", 19),
    ("mitzi_right_arm_twist", 20),
    ("looneybird_head_right", 21),
    ("looneybird_raise", 22),
    ("mitzi_left_arm_raise", 23),
    ("mitzi_left_elbow", 24),
    ("mitzi_left_arm_twist", 25),
    ("mitzi_left_ear", 26),
    ("mitzi_right_ear", 27),
    ("mitzi_head_left", 28),
    ("mitzi_head_right", 29),
    ("mitzi_head_up", 30),
    ("mitzi_left_eyelid", 31),
    ("mitzi_right_eyelid", 32),
    ("mitzi_eyes_left", 33),
    ("mitzi_eyes_right", 34),
    ("mitzi_mouth", 35),
    ("mitzi_body_twist_left", 36),
    ("mitzi_body_twist_right", 37),
    ("mitzi_body_lean", 38),
    // Billy Bob
    ("billybob_left_arm_slide", 39),
    ("billybob_guitar_raise", 40),
    ("looneybird_left_eyelid", 41),
    ("looneybird_right_eyelid", 42),
    ("looneybird_eye_cross", 43),
    ("billybob_foot_tap", 44),
    // 45 blank
    ("billybob_mouth", 46),
    ("billybob_left_eyelid", 47),
    ("billybob_right_eyelid", 48),
    ("billybob_eyes_left", 49),
    ("billybob_eyes_right", 50),
    ("billybob_head_left", 51),
    ("billybob_head_right", 52),
    ("billybob_head_tip_left", 53),
    ("billybob_head_tip_right", 54),
    ("billybob_head_up", 55),
    ("billybob_right_arm_raise", 56),
    ("billybob_right_arm_twist", 57),
    ("billybob_right_elbow_twist", 58),
    ("billybob_right_wrist", 59),
    ("specials_dual_pressure_bd", 60),
    ("billybob_body_twist_left", 61),
    ("billybob_body_twist_right", 62),
    ("billybob_body_lean", 63),
    // Tape control
    ("specials_tape_stop", 64),
    ("specials_tape_rewind", 65),
    // Flood lights
    ("flood_stage_right_blue", 66),
    ("flood_stage_right_green", 67),
    ("flood_stage_right_amber", 68),
    ("flood_stage_right_red", 69),
    ("prop_light_applause", 70),
    ("flood_center_stage_blue", 71),
    ("flood_center_stage_green", 72),
    ("flood_center_stage_amber", 73),
    ("flood_center_stage_red", 74),
    ("prop_light_drums", 75),
    ("flood_stage_left_blue", 76),
    ("flood_stage_left_green", 77),
    ("flood_stage_left_amber", 78),
    ("flood_stage_left_red", 79),
    ("prop_light_fire_still", 80),
    ("flood_backdrop_outside_blue", 81),
    ("flood_backdrop_inside_amber", 82),
    ("flood_treeline_blue", 83),
    ("flood_backdrop_inside_blue", 84),
    ("flood_treeline_red", 85),
    ("flood_bushes_green", 86),
    ("flood_bushes_red_amber", 87),
    // Spotlights and stage lights
    ("spot_sun", 88),
    ("spot_moon", 89),
    ("spot_spider", 90),
    ("prop_light_gas_pump", 91),
    ("stage_light_service_stn_red", 92),
    ("stage_light_service_stn_blue", 93),
    ("stage_light_rainbow_1_red", 94),
    ("stage_light_rainbow_2_yellow", 95),
    ("spot_guitar", 96),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_map(map: &ChannelMap, expected_channels: usize) {
        let bits: Vec<usize> = map.channels().iter().map(|(_, bit)| *bit).collect();
        let unique: HashSet<_> = bits.iter().collect();

        assert_eq!(map.channels().len(), expected_channels);
        assert_eq!(unique.len(), bits.len(), "duplicate bit numbers");
        assert!(bits.iter().all(|&b| (1..=map.frame_bits()).contains(&b)));
        assert!(map.blank_bits().iter().all(|b| !bits.contains(b)));
        assert_eq!(
            expected_channels + map.blank_bits().len(),
            map.frame_bits(),
            "every position is either a channel or a blank"
        );
    }

    #[test]
    fn test_td_map_integrity() {
        check_map(Track::Td.channel_map(), 91);
    }

    #[test]
    fn test_bd_map_integrity() {
        check_map(Track::Bd.channel_map(), 95);
    }

    #[test]
    fn test_names_unique_across_tracks() {
        let td: HashSet<_> = Track::Td.channel_map().channels().iter().map(|(n, _)| *n).collect();
        let bd: HashSet<_> = Track::Bd.channel_map().channels().iter().map(|(n, _)| *n).collect();
        assert!(td.is_disjoint(&bd));
    }

    #[test]
    fn test_bidirectional_lookup() {
        let map = Track::Td.channel_map();
        assert_eq!(map.bit_of("rolfe_mouth"), Some(1));
        assert_eq!(map.name_at(1), Some("rolfe_mouth"));
        assert_eq!(map.name_at(56), None);
        assert_eq!(map.name_at(95), None);
        assert_eq!(map.resolve("curtain_stage_left_close"), Ok(93));
    }

    #[test]
    fn test_unknown_channel() {
        let err = Track::Bd.channel_map().resolve("rolfe_mouth").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownChannel { track: "BD", .. }));
    }

    #[test]
    fn test_track_parsing() {
        assert_eq!("td".parse::<Track>(), Ok(Track::Td));
        assert_eq!(" BD ".parse::<Track>(), Ok(Track::Bd));
        assert!(matches!(
            "XD".parse::<Track>(),
            Err(ConfigurationError::UnknownTrack(_))
        ));
    }

    #[test]
    fn test_track_for_channel() {
        assert_eq!(Track::for_channel("spot_rolfe"), Ok(Track::Td));
        assert_eq!(Track::for_channel("spot_guitar"), Ok(Track::Bd));
        assert!(Track::for_channel("nobody_mouth").is_err());
    }

    #[test]
    fn test_bit_frame_set_and_clear() {
        let mut frame = BitFrame::new(Track::Bd);
        frame.set("billybob_mouth", true).unwrap();
        frame.set("spot_guitar", true).unwrap();

        assert_eq!(frame.bits()[45], 1);
        assert_eq!(frame.bits()[95], 1);
        assert_eq!(frame.active_channels(), vec!["billybob_mouth", "spot_guitar"]);
        assert!(frame.is_set("billybob_mouth").unwrap());

        frame.set("billybob_mouth", false).unwrap();
        assert_eq!(frame.active_channels(), vec!["spot_guitar"]);

        frame.clear();
        assert!(frame.bits().iter().all(|&b| b == 0));
        assert_eq!(frame.bits().len(), 96);
    }

    #[test]
    fn test_frames_compare_by_track_and_bits() {
        let mut a = BitFrame::new(Track::Td);
        let mut b = BitFrame::new(Track::Td);
        assert_eq!(a, b);
        assert_ne!(a, BitFrame::new(Track::Bd));

        a.set("rolfe_mouth", true).unwrap();
        assert_ne!(a, b);
        b.set("rolfe_mouth", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.map(), Track::Td.channel_map());
    }

    #[test]
    fn test_blanks_clear_check() {
        let map = Track::Td.channel_map();
        let mut bits = vec![1u8; 94];
        assert!(!map.blanks_clear(&bits));
        for index in map.blank_indices().collect::<Vec<_>>() {
            bits[index] = 0;
        }
        assert!(map.blanks_clear(&bits));
        assert_eq!(map.active_channels(&bits).len(), 91);
    }
}
