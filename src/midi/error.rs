use super::HexBytes;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "midi-io")]
    #[error("MIDI initialization failed")]
    Init(#[from] midir::InitError),

    #[cfg(feature = "midi-io")]
    #[error("Couldn't retrieve a MIDI port name")]
    PortInfo(#[from] midir::PortInfoError),

    #[error("Couldn't spawn MIDI worker thread")]
    Spawn(#[from] std::io::Error),

    #[error("Error connecting to MIDI device {}", .0)]
    Connection(Arc<str>),

    #[error("MIDI device {} is not open", .0)]
    NotOpen(Arc<str>),

    #[error("Invalid MIDI msg {}", .0)]
    InvalidMessage(HexBytes<'static>),
}
