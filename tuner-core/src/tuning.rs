//! # Musical Tuning Module
//!
//! Equal-temperament note mapping for the tuner display, referenced to
//! A4 = 440 Hz.
//!
//! ## Features
//! - Frequency to nearest note name and octave
//! - Note to equal-tempered frequency
//! - Cent deviation calculations
//! - Note name parsing (`"A4"`, `"C#3"`, `"Bb2"`)
//! - Six-string guitar standard tuning

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// Reference pitch of A4 in Hz.
pub const A4_HZ: f32 = 440.0;

/// Label shown when there is no note to display.
pub const NO_NOTE: &str = "N/A";

/// Chromatic names starting at C, indexed by [`PitchClass::index`].
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Standard guitar tuning, string 1 (high E) first.
pub const GUITAR_STANDARD: [&str; 6] = ["E4", "B3", "G3", "D3", "A2", "E2"];

/// One of the twelve pitch classes of the chromatic scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Position in the chromatic table, C = 0 … B = 11.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.index()]
    }
}

/// A note of the equal-tempered scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self {
            pitch_class,
            octave,
        }
    }

    /// Signed distance from A4 in semitones.
    pub fn semitones_from_a4(&self) -> i32 {
        (self.octave - 4) * 12 + self.pitch_class.index() as i32 - 9
    }

    /// Equal-tempered frequency in Hz.
    pub fn frequency(&self) -> f32 {
        A4_HZ * 2.0_f32.powf(self.semitones_from_a4() as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class.name(), self.octave)
    }
}

impl FromStr for Note {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self> {
        parse_note(s)
    }
}

/// Lookup from spelled pitch names (sharps and flats) to pitch classes.
static PITCH_CLASS_MAP: Lazy<HashMap<&'static str, PitchClass>> = Lazy::new(|| {
    const FLATS: [(&str, PitchClass); 5] = [
        ("Db", PitchClass::CSharp),
        ("Eb", PitchClass::DSharp),
        ("Gb", PitchClass::FSharp),
        ("Ab", PitchClass::GSharp),
        ("Bb", PitchClass::ASharp),
    ];
    PitchClass::ALL
        .iter()
        .map(|&pc| (pc.name(), pc))
        .chain(FLATS)
        .collect()
});

/// Finds the nearest equal-tempered note to a frequency.
///
/// # Returns
/// * `Some(note)` - Nearest note
/// * `None` - The frequency is not positive or not finite
pub fn note_for_frequency(freq: f32) -> Option<Note> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let semitones = (12.0 * (freq / A4_HZ).log2()).round() as i32;
    // Floor division: truncating `%` would go negative below C4.
    let from_c4 = semitones + 9;
    let pitch_class = PitchClass::ALL[from_c4.rem_euclid(12) as usize];
    let octave = 4 + from_c4.div_euclid(12);
    Some(Note::new(pitch_class, octave))
}

/// Display label for an optional note, `"N/A"` when absent.
pub fn note_label(note: Option<Note>) -> String {
    note.map_or_else(|| NO_NOTE.to_string(), |n| n.to_string())
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents make a
/// semitone.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Cents between a frequency and its nearest equal-tempered note.
pub fn cents_from_nearest(freq: f32) -> Option<f32> {
    let note = note_for_frequency(freq)?;
    Some(calculate_cents_deviation(freq, note.frequency()))
}

/// Parses a note name such as `"A4"`, `"C#3"`, `"Bb2"` or `"D#-1"`.
pub fn parse_note(name: &str) -> Result<Note> {
    let unknown = || TunerError::UnknownNote(name.to_string());
    let trimmed = name.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .ok_or_else(unknown)?;
    let (pitch, octave) = trimmed.split_at(split);

    let mut pitch = pitch.to_string();
    if let Some(first) = pitch.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    let pitch_class = *PITCH_CLASS_MAP.get(pitch.as_str()).ok_or_else(unknown)?;
    let octave = octave.parse::<i32>().map_err(|_| unknown())?;
    Ok(Note::new(pitch_class, octave))
}

/// Note of a guitar string in standard tuning, numbered 1 (high E) to 6.
pub fn guitar_string(number: u8) -> Option<Note> {
    let name = GUITAR_STANDARD.get(usize::from(number).checked_sub(1)?)?;
    parse_note(name).ok()
}
