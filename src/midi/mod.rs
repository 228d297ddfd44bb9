mod error;
pub use error::Error;

#[cfg(feature = "midi-io")]
mod io;

pub mod msg;
pub use msg::{HexBytes, RawControl, RawKind, RawMessage, RawNote};

#[cfg(feature = "midi-io")]
pub mod port;
#[cfg(feature = "midi-io")]
pub use port::{MidirDevice, MidirTransport};

use std::fmt;

pub type Velocity = u8;
pub type ControlValue = u8;

/// Session-relative time in seconds.
pub type Timestamp = f64;

pub const DATA_MASK: u8 = 0x7f;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tag(u8);

impl Tag {
    pub const NOTE_OFF: Tag = Tag::from(0x80);
    pub const NOTE_ON: Tag = Tag::from(0x90);
    pub const CONTROL_CHANGE: Tag = Tag::from(0xb0);

    pub const fn from(byte: u8) -> Self {
        Self(byte & 0xf0)
    }
}

/// One of the 16 MIDI channels, `0..=15`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Channel(u8);

impl Channel {
    pub const fn from(byte: u8) -> Self {
        Self(byte & 0x0f)
    }

    pub const fn ordinal(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Users count channels from 1.
        write!(f, "Channel {}", self.0 + 1)
    }
}

/// Continuous controller identifier carried by a control change message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Control(u8);

impl Control {
    pub const SUSTAIN_PEDAL: Control = Control(64);
    pub const REVERB_LEVEL: Control = Control(91);

    pub const fn from(byte: u8) -> Self {
        Self(byte & DATA_MASK)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Control::SUSTAIN_PEDAL => f.write_str("Sustain Pedal"),
            Control::REVERB_LEVEL => f.write_str("Reverb Level"),
            Control(other) => write!(f, "CC {other}"),
        }
    }
}
