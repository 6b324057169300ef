//! Pitch shift applied during voice conversion.
//!
//! Three representations exist: the enum used in code, the wire string
//! accepted from clients, and the signed semitone count the conversion
//! service consumes. All three are tied together by [`PITCH_TABLE`]; nothing
//! is derived from variant names.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Musical interval by which the converted voice is transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PitchShift {
    /// Down twelve semitones.
    OctaveDown,
    /// Down seven semitones.
    FifthDown,
    /// Down five semitones.
    FourthDown,
    /// No transposition.
    #[default]
    SameOctave,
    /// Up five semitones.
    FourthUp,
    /// Up seven semitones.
    FifthUp,
    /// Up twelve semitones.
    OctaveUp,
}

/// `(variant, wire string, semitones)` for every pitch shift.
pub const PITCH_TABLE: [(PitchShift, &str, i32); 7] = [
    (PitchShift::OctaveDown, "octave_down", -12),
    (PitchShift::FifthDown, "fifth_down", -7),
    (PitchShift::FourthDown, "fourth_down", -5),
    (PitchShift::SameOctave, "same_octave", 0),
    (PitchShift::FourthUp, "fourth_up", 5),
    (PitchShift::FifthUp, "fifth_up", 7),
    (PitchShift::OctaveUp, "octave_up", 12),
];

/// A wire string or semitone count with no pitch shift mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownPitchShift {
    /// Unrecognised wire string.
    #[error("unknown pitch shift '{0}'")]
    Name(String),
    /// Semitone count outside the table.
    #[error("no pitch shift for {0} semitones")]
    Semitones(i32),
}

impl PitchShift {
    /// The wire string for this shift.
    pub fn as_wire_str(self) -> &'static str {
        PITCH_TABLE
            .iter()
            .find(|(shift, _, _)| *shift == self)
            .map(|(_, wire, _)| *wire)
            .unwrap_or("same_octave")
    }

    /// Parse a wire string.
    pub fn from_wire_str(value: &str) -> Result<Self, UnknownPitchShift> {
        PITCH_TABLE
            .iter()
            .find(|(_, wire, _)| *wire == value)
            .map(|(shift, _, _)| *shift)
            .ok_or_else(|| UnknownPitchShift::Name(value.to_string()))
    }

    /// Signed semitone offset sent to the conversion service.
    pub fn semitones(self) -> i32 {
        PITCH_TABLE
            .iter()
            .find(|(shift, _, _)| *shift == self)
            .map(|(_, _, semitones)| *semitones)
            .unwrap_or(0)
    }

    /// Reverse lookup from a semitone offset.
    pub fn from_semitones(semitones: i32) -> Result<Self, UnknownPitchShift> {
        PITCH_TABLE
            .iter()
            .find(|(_, _, value)| *value == semitones)
            .map(|(shift, _, _)| *shift)
            .ok_or(UnknownPitchShift::Semitones(semitones))
    }

    /// Whether the shift changes pitch at all.
    pub fn is_transposed(self) -> bool {
        self != Self::SameOctave
    }
}

impl fmt::Display for PitchShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

// Persisted as a SMALLINT semitone count.
impl TryFrom<i16> for PitchShift {
    type Error = UnknownPitchShift;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_semitones(i32::from(value))
    }
}

impl Serialize for PitchShift {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for PitchShift {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_wire_str(&value).map_err(serde::de::Error::custom)
    }
}
