//! In-process transport.
//!
//! Devices are plugged in by name and msgs are injected from whatever
//! thread the caller chooses, standing in for a backend receiver thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{InputDevice, RawHandler, RawHandlers, Transport};
use crate::midi::{msg, Error, RawKind, RawMessage};

#[derive(Debug, Default)]
struct PortState {
    is_open: bool,
    is_receiving: bool,
    open_count: usize,
}

#[derive(Debug)]
struct Port {
    name: Arc<str>,
    state: Mutex<PortState>,
    handlers: RawHandlers,
}

impl Port {
    fn state(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transport whose devices live in memory.
///
/// Clones share the same devices.
#[derive(Clone, Debug, Default)]
pub struct LoopbackTransport {
    ports: Arc<Mutex<Vec<Arc<Port>>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, name: &str) -> Self {
        self.plug(name);
        self
    }

    /// Adds a device. Duplicate names are allowed, as with hardware.
    pub fn plug(&self, name: &str) {
        self.ports().push(Arc::new(Port {
            name: name.into(),
            state: Mutex::new(PortState::default()),
            handlers: RawHandlers::default(),
        }));
    }

    /// Removes every device called `name` from the list of installed devices.
    ///
    /// Handles already obtained keep working, like a device which
    /// disappeared while in use.
    pub fn unplug(&self, name: &str) {
        self.ports().retain(|port| port.name.as_ref() != name);
    }

    /// Delivers `msg` as the receiver thread of the first device called `name` would.
    ///
    /// Returns `false` if no such device is receiving.
    pub fn inject(&self, name: &str, msg: RawMessage) -> bool {
        match self.capture(name, msg) {
            Some(in_flight) => {
                in_flight.deliver();
                true
            }
            None => false,
        }
    }

    /// Decodes `buf` and delivers it, see [`Self::inject`].
    pub fn inject_bytes(&self, name: &str, micros: u64, buf: &[u8]) -> Result<bool, Error> {
        match RawMessage::decode(msg::seconds_from_micros(micros), buf)? {
            Some(msg) => Ok(self.inject(name, msg)),
            None => Ok(false),
        }
    }

    /// Takes the handlers a receiver thread would use for `msg` without calling them yet.
    ///
    /// This models a msg in flight: the transport already decided to
    /// deliver it, whatever happens to the device before [`InFlight::deliver`].
    pub fn capture(&self, name: &str, msg: RawMessage) -> Option<InFlight> {
        let port = self.find(name)?;
        if !port.state().is_receiving {
            log::trace!("Dropping msg for {name}: not receiving");
            return None;
        }

        Some(InFlight {
            handlers: port.handlers.snapshot(msg.kind()),
            msg,
        })
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.find(name).is_some_and(|port| port.state().is_open)
    }

    pub fn is_receiving(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|port| port.state().is_receiving)
    }

    /// Number of times the device was opened since it was plugged.
    pub fn open_count(&self, name: &str) -> usize {
        self.find(name).map_or(0, |port| port.state().open_count)
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.find(name).map_or(0, |port| port.handlers.len())
    }

    fn ports(&self) -> MutexGuard<'_, Vec<Arc<Port>>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, name: &str) -> Option<Arc<Port>> {
        self.ports()
            .iter()
            .find(|port| port.name.as_ref() == name)
            .cloned()
    }
}

impl Transport for LoopbackTransport {
    type Device = LoopbackDevice;

    fn input_devices(&self) -> Result<Vec<LoopbackDevice>, Error> {
        Ok(self
            .ports()
            .iter()
            .map(|port| LoopbackDevice {
                port: Arc::clone(port),
            })
            .collect())
    }
}

/// A msg captured on its way to the handlers.
pub struct InFlight {
    handlers: Vec<RawHandler>,
    msg: RawMessage,
}

impl InFlight {
    pub fn deliver(self) {
        for handler in self.handlers {
            handler(&self.msg);
        }
    }
}

#[derive(Debug)]
pub struct LoopbackDevice {
    port: Arc<Port>,
}

impl InputDevice for LoopbackDevice {
    fn name(&self) -> Arc<str> {
        self.port.name.clone()
    }

    fn open(&mut self) -> Result<(), Error> {
        let mut state = self.port.state();
        if !state.is_open {
            state.is_open = true;
            state.open_count += 1;
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.state().is_open
    }

    fn close(&mut self) {
        let mut state = self.port.state();
        state.is_receiving = false;
        state.is_open = false;
    }

    fn start_receiving(&mut self) -> Result<(), Error> {
        let mut state = self.port.state();
        if !state.is_open {
            return Err(Error::NotOpen(self.port.name.clone()));
        }

        state.is_receiving = true;

        Ok(())
    }

    fn is_receiving(&self) -> bool {
        self.port.state().is_receiving
    }

    fn stop_receiving(&mut self) {
        self.port.state().is_receiving = false;
    }

    fn add_handler(&mut self, kind: RawKind, handler: RawHandler) {
        self.port.handlers.add(kind, handler);
    }

    fn remove_all_handlers(&mut self) {
        self.port.handlers.clear();
    }
}
