use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    dispatch::{EventDispatcher, EventKind, Subscriber, SubscriptionToken},
    midi::Error,
    registry::DeviceRegistry,
    transport::{InputDevice, Transport},
};

/// Owns the single input device receiving at any time.
///
/// Activation and deactivation are serialized by the controller's own
/// lock, which is always taken before the dispatcher's. Transport calls
/// are never made while holding the dispatcher's lock.
///
/// Opening, closing and starting the device are bounded by the transport
/// only: a transport hanging in one of these calls hangs the caller.
pub struct ActiveDeviceController<T: Transport> {
    registry: DeviceRegistry<T>,
    dispatcher: Arc<EventDispatcher>,
    active: Mutex<Option<T::Device>>,
}

impl<T: Transport> ActiveDeviceController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: DeviceRegistry::new(transport),
            dispatcher: Arc::new(EventDispatcher::new()),
            active: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry<T> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn list_device_names(&self) -> Result<Vec<Arc<str>>, Error> {
        self.registry.list_device_names()
    }

    /// Makes the device called `name` the active one.
    ///
    /// Returns `Ok(false)` and leaves the current state untouched if there
    /// is no such device. Otherwise the current device is deactivated
    /// first, which drops every subscriber, so subscribe once this returns.
    ///
    /// On transport failure, the device is released and the controller is
    /// left without active device.
    pub fn activate(&self, name: &str) -> Result<bool, Error> {
        let mut active = self.lock_active();

        let mut device = match self.registry.find_device_by_name(name)? {
            Some(device) => device,
            None => {
                log::warn!("No MIDI input device named {name}");
                return Ok(false);
            }
        };

        self.deactivate_locked(&mut active);

        let session = self.dispatcher.open_session();
        if let Err(err) = self.wire(&mut device, session) {
            log::error!("Couldn't activate {name}: {err}");
            self.dispatcher.close_session();
            release(&mut device);
            return Err(err);
        }

        log::info!("Activated MIDI input {name}");
        *active = Some(device);

        Ok(true)
    }

    /// Releases the active device and drops every subscriber.
    ///
    /// Does nothing if no device is active. Once this returns, no event
    /// from the released device can reach a subscriber.
    pub fn deactivate(&self) {
        let mut active = self.lock_active();
        self.deactivate_locked(&mut active);
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    pub fn active_device_name(&self) -> Option<Arc<str>> {
        self.lock_active().as_ref().map(InputDevice::name)
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionToken {
        self.dispatcher.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.dispatcher.unsubscribe(token)
    }

    pub fn unsubscribe_all(&self, kind: Option<EventKind>) {
        self.dispatcher.unsubscribe_all(kind)
    }

    fn wire(&self, device: &mut T::Device, session: u64) -> Result<(), Error> {
        device.open()?;
        device.start_receiving()?;

        for (kind, handler) in self.dispatcher.raw_handlers(session) {
            device.add_handler(kind, handler);
        }

        Ok(())
    }

    fn deactivate_locked(&self, active: &mut Option<T::Device>) {
        if let Some(mut device) = active.take() {
            // Close the session first: a msg already in the transport
            // pipeline is then dropped instead of delivered.
            self.dispatcher.close_session();
            release(&mut device);

            log::info!("Deactivated MIDI input {}", device.name());
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<T::Device>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn release(device: &mut impl InputDevice) {
    if device.is_receiving() {
        device.stop_receiving();
    }

    device.remove_all_handlers();

    if device.is_open() {
        device.close();
    }
}

impl<T: Transport> Drop for ActiveDeviceController<T> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<T: Transport> fmt::Debug for ActiveDeviceController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDeviceController")
            .field("active", &self.active_device_name())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
