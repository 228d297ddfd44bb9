use std::{borrow::Cow, fmt};

use super::{Channel, Control, ControlValue, Error, Tag, Timestamp, Velocity, DATA_MASK};

/// Hex rendering of a MIDI msg for logs and errors.
#[derive(Debug)]
pub struct HexBytes<'a>(Cow<'a, [u8]>);

impl<'a> From<&'a [u8]> for HexBytes<'a> {
    fn from(msg: &'a [u8]) -> Self {
        Self(Cow::Borrowed(msg))
    }
}

impl HexBytes<'_> {
    pub fn to_owned(&self) -> HexBytes<'static> {
        HexBytes(Cow::Owned(self.0.to_vec()))
    }
}

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.0.iter();

        match iter.next() {
            Some(first) => write!(f, "(hex): {first:02x}")?,
            None => return f.write_str("(empty)"),
        };

        for val in iter {
            write!(f, ", {val:02x}")?;
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RawKind {
    NoteOn,
    NoteOff,
    ControlChange,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawNote {
    pub channel: Channel,
    /// Note number, `0..=127`.
    pub pitch: u8,
    pub velocity: Velocity,
    pub time: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawControl {
    pub channel: Channel,
    pub control: Control,
    pub value: ControlValue,
    pub time: Timestamp,
}

/// A channel msg as the transport hands it over, before normalization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawMessage {
    NoteOn(RawNote),
    NoteOff(RawNote),
    ControlChange(RawControl),
}

impl RawMessage {
    pub fn kind(&self) -> RawKind {
        match self {
            RawMessage::NoteOn(_) => RawKind::NoteOn,
            RawMessage::NoteOff(_) => RawKind::NoteOff,
            RawMessage::ControlChange(_) => RawKind::ControlChange,
        }
    }

    pub fn time(&self) -> Timestamp {
        match self {
            RawMessage::NoteOn(note) | RawMessage::NoteOff(note) => note.time,
            RawMessage::ControlChange(control) => control.time,
        }
    }

    /// Decodes a complete msg received at `time`.
    ///
    /// Returns `Ok(None)` for well-formed msgs this layer doesn't route
    /// (pitch bend, system msgs, ...).
    ///
    /// A note on with velocity 0 is decoded as a note off.
    pub fn decode(time: Timestamp, buf: &[u8]) -> Result<Option<Self>, Error> {
        let invalid = || Error::InvalidMessage(HexBytes::from(buf).to_owned());

        let (&status, data) = buf.split_first().ok_or_else(invalid)?;
        if status & 0x80 == 0 {
            return Err(invalid());
        }

        let tag = Tag::from(status);
        if tag != Tag::NOTE_ON && tag != Tag::NOTE_OFF && tag != Tag::CONTROL_CHANGE {
            log::trace!("Ignoring MIDI msg {}", HexBytes::from(buf));
            return Ok(None);
        }

        let (first, second) = match *data {
            [first, second] if first <= DATA_MASK && second <= DATA_MASK => (first, second),
            _ => return Err(invalid()),
        };

        let channel = Channel::from(status);
        let msg = if tag == Tag::CONTROL_CHANGE {
            RawMessage::ControlChange(RawControl {
                channel,
                control: Control::from(first),
                value: second,
                time,
            })
        } else {
            let note = RawNote {
                channel,
                pitch: first,
                velocity: second,
                time,
            };

            if tag == Tag::NOTE_ON && second > 0 {
                RawMessage::NoteOn(note)
            } else {
                RawMessage::NoteOff(note)
            }
        };

        Ok(Some(msg))
    }
}

/// Converts a transport timestamp in microseconds to seconds.
pub fn seconds_from_micros(micros: u64) -> Timestamp {
    micros as f64 / 1_000_000f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_note_on() {
        let msg = RawMessage::decode(1.5, &[0x90, 69, 100]).unwrap().unwrap();
        assert_eq!(
            msg,
            RawMessage::NoteOn(RawNote {
                channel: Channel::from(0),
                pitch: 69,
                velocity: 100,
                time: 1.5,
            })
        );
        assert_eq!(msg.kind(), RawKind::NoteOn);
    }

    #[test]
    fn decode_note_on_without_velocity_is_note_off() {
        let msg = RawMessage::decode(0.0, &[0x92, 60, 0]).unwrap().unwrap();
        assert_eq!(msg.kind(), RawKind::NoteOff);
        match msg {
            RawMessage::NoteOff(note) => {
                assert_eq!(note.channel.ordinal(), 2);
                assert_eq!(note.pitch, 60);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_control_change() {
        let msg = RawMessage::decode(2.0, &[0xbf, 64, 127]).unwrap().unwrap();
        assert_eq!(
            msg,
            RawMessage::ControlChange(RawControl {
                channel: Channel::from(15),
                control: Control::SUSTAIN_PEDAL,
                value: 127,
                time: 2.0,
            })
        );
    }

    #[test]
    fn decode_ignores_other_msgs() {
        // pitch bend
        assert!(RawMessage::decode(0.0, &[0xe0, 0x00, 0x40]).unwrap().is_none());
        // timing clock
        assert!(RawMessage::decode(0.0, &[0xf8]).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(matches!(
            RawMessage::decode(0.0, &[]),
            Err(Error::InvalidMessage(_))
        ));
        assert!(matches!(
            RawMessage::decode(0.0, &[0x45, 0x10]),
            Err(Error::InvalidMessage(_))
        ));
        assert!(matches!(
            RawMessage::decode(0.0, &[0x90, 60]),
            Err(Error::InvalidMessage(_))
        ));
        assert!(matches!(
            RawMessage::decode(0.0, &[0x90, 0x80, 0x10]),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn hex_display() {
        assert_eq!(
            HexBytes::from([0x90u8, 0x45, 0x64].as_slice()).to_string(),
            "(hex): 90, 45, 64"
        );
        assert_eq!(HexBytes::from(&[] as &[u8]).to_string(), "(empty)");
    }

    #[test]
    fn micros_to_seconds() {
        assert_eq!(seconds_from_micros(1_500_000), 1.5);
    }
}
