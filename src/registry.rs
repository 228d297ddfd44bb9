use std::sync::Arc;

use crate::{
    midi::Error,
    transport::{InputDevice, Transport},
};

/// Looks up installed input devices by name.
#[derive(Debug)]
pub struct DeviceRegistry<T> {
    transport: T,
}

impl<T: Transport> DeviceRegistry<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Lists the installed input devices in the order reported by the transport.
    pub fn list_device_names(&self) -> Result<Vec<Arc<str>>, Error> {
        Ok(self
            .transport
            .input_devices()?
            .iter()
            .map(InputDevice::name)
            .collect())
    }

    /// Returns the first device whose name is exactly `name`.
    pub fn find_device_by_name(&self, name: &str) -> Result<Option<T::Device>, Error> {
        Ok(self
            .transport
            .input_devices()?
            .into_iter()
            .find(|device| device.name().as_ref() == name))
    }

    pub fn device_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.find_device_by_name(name)?.is_some())
    }
}
