use std::sync::Arc;

use super::{msg, Error, RawMessage};
use crate::transport::RawHandlers;

/// midir input client state.
///
/// midir has no separate open and start steps: connecting a port starts
/// its receiver thread and closing the connection hands the client back.
#[derive(Default)]
pub enum InputConnection {
    Connected(midir::MidiInputConnection<RawHandlers>),
    Disconnected((midir::MidiInput, RawHandlers)),
    #[default]
    None,
}

impl InputConnection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    pub fn open(&mut self, client_name: &str, handlers: RawHandlers) -> Result<(), Error> {
        if matches!(self, Self::None) {
            *self = Self::Disconnected((midir::MidiInput::new(client_name)?, handlers));
        }

        Ok(())
    }

    pub fn connect(
        &mut self,
        port_name: Arc<str>,
        port: &midir::MidiInputPort,
        client_port_name: &str,
    ) -> Result<(), Error> {
        match std::mem::take(self) {
            Self::Disconnected((midi_input, handlers)) => {
                match midi_input.connect(port, client_port_name, receive, handlers.clone()) {
                    Ok(conn) => {
                        *self = Self::Connected(conn);
                    }
                    Err(err) => {
                        *self = Self::Disconnected((err.into_inner(), handlers));
                        let err = Error::Connection(port_name);
                        log::error!("{}", err);
                        return Err(err);
                    }
                }
            }
            Self::Connected(conn) => {
                *self = Self::Connected(conn);
            }
            Self::None => return Err(Error::NotOpen(port_name)),
        }

        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.is_connected() {
            if let Self::Connected(conn) = std::mem::take(self) {
                let (io, handlers) = conn.close();
                *self = Self::Disconnected((io, handlers));
            }
        }
    }

    pub fn close(&mut self) {
        self.disconnect();
        *self = Self::None;
    }
}

/// midir receiver thread callback.
fn receive(micros: u64, buf: &[u8], handlers: &mut RawHandlers) {
    match RawMessage::decode(msg::seconds_from_micros(micros), buf) {
        Ok(Some(msg)) => handlers.invoke(&msg),
        Ok(None) => (),
        Err(err) => log::error!("{err}"),
    }
}
