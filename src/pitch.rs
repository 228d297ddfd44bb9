use std::fmt;
use strum::{EnumCount, EnumIter, FromRepr, IntoEnumIterator};

/// A MIDI note number, from C-1 (0) to G9 (127).
///
/// Variants are named after scientific pitch notation, `Neg1` standing
/// for octave -1.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, EnumCount, EnumIter, FromRepr,
)]
#[repr(u8)]
pub enum Pitch {
    CNeg1,
    CSharpNeg1,
    DNeg1,
    DSharpNeg1,
    ENeg1,
    FNeg1,
    FSharpNeg1,
    GNeg1,
    GSharpNeg1,
    ANeg1,
    ASharpNeg1,
    BNeg1,
    C0,
    CSharp0,
    D0,
    DSharp0,
    E0,
    F0,
    FSharp0,
    G0,
    GSharp0,
    A0,
    ASharp0,
    B0,
    C1,
    CSharp1,
    D1,
    DSharp1,
    E1,
    F1,
    FSharp1,
    G1,
    GSharp1,
    A1,
    ASharp1,
    B1,
    C2,
    CSharp2,
    D2,
    DSharp2,
    E2,
    F2,
    FSharp2,
    G2,
    GSharp2,
    A2,
    ASharp2,
    B2,
    C3,
    CSharp3,
    D3,
    DSharp3,
    E3,
    F3,
    FSharp3,
    G3,
    GSharp3,
    A3,
    ASharp3,
    B3,
    C4,
    CSharp4,
    D4,
    DSharp4,
    E4,
    F4,
    FSharp4,
    G4,
    GSharp4,
    A4,
    ASharp4,
    B4,
    C5,
    CSharp5,
    D5,
    DSharp5,
    E5,
    F5,
    FSharp5,
    G5,
    GSharp5,
    A5,
    ASharp5,
    B5,
    C6,
    CSharp6,
    D6,
    DSharp6,
    E6,
    F6,
    FSharp6,
    G6,
    GSharp6,
    A6,
    ASharp6,
    B6,
    C7,
    CSharp7,
    D7,
    DSharp7,
    E7,
    F7,
    FSharp7,
    G7,
    GSharp7,
    A7,
    ASharp7,
    B7,
    C8,
    CSharp8,
    D8,
    DSharp8,
    E8,
    F8,
    FSharp8,
    G8,
    GSharp8,
    A8,
    ASharp8,
    B8,
    C9,
    CSharp9,
    D9,
    DSharp9,
    E9,
    F9,
    FSharp9,
    G9,
}

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Equal-tempered frequencies in Hz, A4 = 440 Hz, indexed by note number.
#[rustfmt::skip]
const FREQUENCIES: [f32; Pitch::COUNT] = [
    // CNeg1..=BNeg1
    8.1758, 8.66196, 9.17702, 9.72272, 10.3009, 10.9134,
    11.5623, 12.2499, 12.9783, 13.75, 14.5676, 15.4339,
    // C0..=B0
    16.3516, 17.3239, 18.3540, 19.4454, 20.6017, 21.8268,
    23.1247, 24.4997, 25.9565, 27.5, 29.1352, 30.8677,
    // C1..=B1
    32.7032, 34.6478, 36.7081, 38.8909, 41.2034, 43.6535,
    46.2493, 48.9994, 51.9131, 55.0, 58.2705, 61.7354,
    // C2..=B2
    65.4064, 69.2957, 73.4162, 77.7817, 82.4069, 87.3071,
    92.4986, 97.9989, 103.826, 110.0, 116.541, 123.471,
    // C3..=B3
    130.813, 138.591, 146.832, 155.563, 164.814, 174.614,
    184.997, 195.998, 207.652, 220.0, 233.082, 246.942,
    // C4..=B4
    261.626, 277.183, 293.665, 311.127, 329.628, 349.228,
    369.994, 391.995, 415.305, 440.0, 466.164, 493.883,
    // C5..=B5
    523.251, 554.365, 587.330, 622.254, 659.255, 698.456,
    739.989, 783.991, 830.609, 880.0, 932.328, 987.767,
    // C6..=B6
    1046.50, 1108.73, 1174.66, 1244.51, 1318.51, 1396.91,
    1479.98, 1567.98, 1661.22, 1760.0, 1864.66, 1975.53,
    // C7..=B7
    2093.0, 2217.46, 2349.32, 2489.02, 2637.02, 2793.83,
    2959.96, 3135.96, 3322.44, 3520.0, 3729.31, 3951.07,
    // C8..=B8
    4186.01, 4434.92, 4698.64, 4978.03, 5274.04, 5587.65,
    5919.91, 6271.93, 6644.88, 7040.0, 7458.62, 7902.13,
    // C9..=G9
    8372.02, 8869.84, 9397.27, 9956.06, 10548.1, 11175.3,
    11839.8, 12543.9,
];

impl Pitch {
    /// Concert pitch, tuned at 440 Hz.
    pub const CONCERT: Pitch = Pitch::A4;

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::from_repr(ordinal)
    }

    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub const fn octave(self) -> i8 {
        (self as u8 / 12) as i8 - 1
    }

    pub fn frequency(self) -> f32 {
        frequency_of(self)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            NAMES[(self.ordinal() % 12) as usize],
            self.octave()
        )
    }
}

/// Returns the frequency of `pitch` in Hz.
pub fn frequency_of(pitch: Pitch) -> f32 {
    FREQUENCIES[pitch as usize]
}

/// Returns the frequency of `pitch` in Hz if `low <= pitch <= high`.
///
/// Pitches outside the window are never clamped nor wrapped. If `low` is
/// above `high`, the window is empty.
pub fn frequency_if_in_range(pitch: Pitch, low: Pitch, high: Pitch) -> Option<f32> {
    PitchRange::new(low, high).frequency_of(pitch)
}

/// An inclusive window of playable pitches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PitchRange {
    pub low: Pitch,
    pub high: Pitch,
}

impl PitchRange {
    pub const FULL: PitchRange = PitchRange::new(Pitch::CNeg1, Pitch::G9);

    /// Three octaves centered on concert pitch.
    pub const CONCERT: PitchRange = PitchRange::new(Pitch::DSharp3, Pitch::DSharp6);

    /// The two octaves from A3 to A5, 220 Hz to 880 Hz.
    pub const TWO_OCTAVES: PitchRange = PitchRange::new(Pitch::A3, Pitch::A5);

    pub const fn new(low: Pitch, high: Pitch) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, pitch: Pitch) -> bool {
        self.low <= pitch && pitch <= self.high
    }

    pub fn frequency_of(&self, pitch: Pitch) -> Option<f32> {
        self.contains(pitch).then(|| frequency_of(pitch))
    }

    pub fn iter(&self) -> impl Iterator<Item = Pitch> {
        let range = *self;
        Pitch::iter().filter(move |pitch| range.contains(*pitch))
    }
}

impl Default for PitchRange {
    fn default() -> Self {
        Self::FULL
    }
}
